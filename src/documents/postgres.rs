//! JSONB-backed document store

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, types::Json};

use super::{
    DocResult, DocumentError, DocumentStore, Direction, Query, Snapshot, WriteBatch, WriteOp,
};

/// PgDocumentStore
///
/// Keeps every document as a row of the `documents` table
/// (`collection`, `id`, `data JSONB`). A batch runs inside one transaction; a failed
/// precondition returns early and the dropped transaction rolls back.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> DocResult<Option<Snapshot>> {
        let row = sqlx::query("SELECT id, data FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            let Json(data): Json<Value> = row.get("data");
            Snapshot {
                id: row.get("id"),
                data,
            }
        }))
    }

    async fn query(&self, query: &Query) -> DocResult<Vec<Snapshot>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
        builder.push_bind(query.collection.clone());

        for (field, value) in &query.filters {
            builder.push(" AND data -> ");
            builder.push_bind(field.clone());
            builder.push(" = ");
            builder.push_bind(Json(value.clone()));
        }

        match &query.order_by {
            Some((field, direction)) => {
                builder.push(" ORDER BY data -> ");
                builder.push_bind(field.clone());
                builder.push(match direction {
                    Direction::Asc => " ASC NULLS FIRST, id ASC",
                    Direction::Desc => " DESC NULLS LAST, id ASC",
                });
            }
            None => {
                builder.push(" ORDER BY id ASC");
            }
        }

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }
        if query.offset > 0 {
            builder.push(" OFFSET ");
            builder.push_bind(query.offset as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let Json(data): Json<Value> = row.get("data");
                Snapshot {
                    id: row.get("id"),
                    data,
                }
            })
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> DocResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Dropping the transaction on an early `?` rolls every op back.
        let mut tx = self.pool.begin().await?;
        for op in batch.into_ops() {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data, updated_at)
                        VALUES ($1, $2, $3, NOW())
                        ON CONFLICT (collection, id)
                        DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
                        "#,
                    )
                    .bind(collection)
                    .bind(id)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Merge {
                    collection,
                    id,
                    data,
                } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data, updated_at)
                        VALUES ($1, $2, $3, NOW())
                        ON CONFLICT (collection, id)
                        DO UPDATE SET data = documents.data || EXCLUDED.data, updated_at = NOW()
                        "#,
                    )
                    .bind(collection)
                    .bind(id)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Delete { collection, id } => {
                    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(collection)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
                WriteOp::Increment {
                    collection,
                    id,
                    field,
                    by,
                } => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data, updated_at)
                        VALUES ($1, $2, jsonb_build_object($3::text, $4::bigint), NOW())
                        ON CONFLICT (collection, id)
                        DO UPDATE SET data = jsonb_set(
                            documents.data,
                            ARRAY[$3::text],
                            to_jsonb(COALESCE((documents.data ->> $3::text)::bigint, 0) + $4::bigint)
                        ), updated_at = NOW()
                        "#,
                    )
                    .bind(collection)
                    .bind(id)
                    .bind(field)
                    .bind(by)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Create {
                    collection,
                    id,
                    data,
                } => {
                    let inserted = sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, data, updated_at)
                        VALUES ($1, $2, $3, NOW())
                        ON CONFLICT (collection, id) DO NOTHING
                        "#,
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await?;
                    if inserted.rows_affected() == 0 {
                        return Err(DocumentError::PreconditionFailed(format!(
                            "{collection}/{id} already exists"
                        )));
                    }
                }
                WriteOp::Require {
                    collection,
                    id,
                    field,
                    equals,
                } => {
                    // The row lock holds the checked value until the batch commits.
                    let row = sqlx::query(
                        r#"
                        SELECT 1 FROM documents
                        WHERE collection = $1 AND id = $2 AND data -> $3::text = $4
                        FOR UPDATE
                        "#,
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(&field)
                    .bind(Json(&equals))
                    .fetch_optional(&mut *tx)
                    .await?;
                    if row.is_none() {
                        return Err(DocumentError::PreconditionFailed(format!(
                            "{collection}/{id}: {field} != {equals}"
                        )));
                    }
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
