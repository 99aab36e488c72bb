//! Schema-less document storage.
//!
//! Collections hold JSON objects keyed by string ids. Nothing enforces field names; the
//! leaderboard and goal services agree on them through the shapes in [`crate::models`].

pub mod memory;
pub mod postgres;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{cmp::Ordering, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// A `Create` or `Require` op did not hold; nothing in the batch was applied.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}

/// Result type for document store operations
pub type DocResult<T> = Result<T, DocumentError>;

/// Snapshot
///
/// A document as read at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub data: Value,
}

impl Snapshot {
    pub fn decode<T: DeserializeOwned>(&self) -> DocResult<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Query
///
/// Equality filters, at most one sort key, and offset/limit paging over one collection.
/// Ties on the sort key (and unsorted results) are ordered by document id.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn filter(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the whole document.
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    /// Shallow-merge top-level fields, creating the document if absent.
    Merge {
        collection: String,
        id: String,
        data: Value,
    },
    Delete { collection: String, id: String },
    /// Add `by` to an integer field. A missing field or document counts as 0.
    Increment {
        collection: String,
        id: String,
        field: String,
        by: i64,
    },
    /// Insert a document that must not exist yet.
    Create {
        collection: String,
        id: String,
        data: Value,
    },
    /// Writes nothing; fails the batch unless the document exists and `field` equals `equals`.
    Require {
        collection: String,
        id: String,
        field: String,
        equals: Value,
    },
}

/// WriteBatch
///
/// A group of writes applied atomically: either every op lands or none does. Ops run in
/// order, so a `require` placed first guards everything after it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&mut self, collection: &str, id: &str, data: &T) -> DocResult<&mut Self> {
        let data = object(serde_json::to_value(data)?)?;
        self.ops.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        Ok(self)
    }

    pub fn merge(&mut self, collection: &str, id: &str, data: Value) -> DocResult<&mut Self> {
        let data = object(data)?;
        self.ops.push(WriteOp::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        Ok(self)
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn increment(&mut self, collection: &str, id: &str, field: &str, by: i64) -> &mut Self {
        self.ops.push(WriteOp::Increment {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            by,
        });
        self
    }

    pub fn create<T: Serialize>(&mut self, collection: &str, id: &str, data: &T) -> DocResult<&mut Self> {
        let data = object(serde_json::to_value(data)?)?;
        self.ops.push(WriteOp::Create {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
        Ok(self)
    }

    pub fn require(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
        equals: impl Into<Value>,
    ) -> &mut Self {
        self.ops.push(WriteOp::Require {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            equals: equals.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

fn object(value: Value) -> DocResult<Value> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(DocumentError::InvalidWrite(
            "documents must be JSON objects".to_string(),
        ))
    }
}

/// DocumentStore
///
/// Point reads, filtered/sorted queries and atomic batched writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> DocResult<Option<Snapshot>>;

    async fn query(&self, query: &Query) -> DocResult<Vec<Snapshot>>;

    /// Applies every op in the batch atomically. A failed batch is reported as-is.
    async fn commit(&self, batch: WriteBatch) -> DocResult<()>;
}

/// DocumentState
///
/// The shared handle stored in `AppState`.
pub type DocumentState = Arc<dyn DocumentStore>;

/// Reads and decodes one document through a trait object.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> DocResult<Option<T>> {
    match store.get(collection, id).await? {
        Some(snapshot) => Ok(Some(snapshot.decode()?)),
        None => Ok(None),
    }
}

/// Runs a query through a trait object and decodes every hit.
pub async fn query_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    query: &Query,
) -> DocResult<Vec<T>> {
    store
        .query(query)
        .await?
        .iter()
        .map(Snapshot::decode)
        .collect()
}

/// Total order over JSON values used for sorting. Types rank the way JSONB does, with a
/// missing field below everything: missing < null < string < number < bool < array < object.
/// Numbers compare numerically; arrays and objects compare equal among themselves.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::Bool(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
