//! In-process document store

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    DocResult, DocumentError, DocumentStore, Direction, Query, Snapshot, WriteBatch, WriteOp,
    compare_values,
};

type Collection = BTreeMap<String, Value>;

/// MemoryDocumentStore
///
/// Collections kept in a map behind one lock. A batch takes the write lock once, so readers
/// observe either none or all of its ops.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection (for tests and diagnostics).
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> DocResult<Option<Snapshot>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Snapshot {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn query(&self, query: &Query) -> DocResult<Vec<Snapshot>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        // BTreeMap iteration is already ordered by id.
        let mut hits: Vec<Snapshot> = docs
            .iter()
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| Snapshot {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some((field, direction)) = &query.order_by {
            // Stable sort keeps the id order among equal keys.
            hits.sort_by(|a, b| {
                let ord = compare_values(a.field(field), b.field(field));
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        let hits = hits.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => hits.take(limit).collect(),
            None => hits.collect(),
        })
    }

    async fn commit(&self, batch: WriteBatch) -> DocResult<()> {
        let mut collections = self.collections.write().await;

        // Results are staged per document (None = deleted) and only copied into the map once
        // every op has succeeded.
        let mut staged: Staged = HashMap::new();
        for op in batch.into_ops() {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    staged.insert((collection, id), Some(data));
                }
                WriteOp::Merge {
                    collection,
                    id,
                    data,
                } => {
                    let mut doc = current(&collections, &staged, &collection, &id)
                        .unwrap_or_else(|| Value::Object(Default::default()));
                    if let (Some(target), Value::Object(fields)) = (doc.as_object_mut(), data) {
                        target.extend(fields);
                    }
                    staged.insert((collection, id), Some(doc));
                }
                WriteOp::Delete { collection, id } => {
                    staged.insert((collection, id), None);
                }
                WriteOp::Increment {
                    collection,
                    id,
                    field,
                    by,
                } => {
                    let mut doc = current(&collections, &staged, &collection, &id)
                        .unwrap_or_else(|| Value::Object(Default::default()));
                    let old = match doc.get(&field) {
                        None | Some(Value::Null) => 0,
                        Some(value) => value.as_i64().ok_or_else(|| {
                            DocumentError::InvalidWrite(format!("{field} is not an integer"))
                        })?,
                    };
                    if let Some(target) = doc.as_object_mut() {
                        target.insert(field, Value::from(old + by));
                    }
                    staged.insert((collection, id), Some(doc));
                }
                WriteOp::Create {
                    collection,
                    id,
                    data,
                } => {
                    if current(&collections, &staged, &collection, &id).is_some() {
                        return Err(DocumentError::PreconditionFailed(format!(
                            "{collection}/{id} already exists"
                        )));
                    }
                    staged.insert((collection, id), Some(data));
                }
                WriteOp::Require {
                    collection,
                    id,
                    field,
                    equals,
                } => {
                    let holds = current(&collections, &staged, &collection, &id)
                        .is_some_and(|doc| doc.get(&field) == Some(&equals));
                    if !holds {
                        return Err(DocumentError::PreconditionFailed(format!(
                            "{collection}/{id}: {field} != {equals}"
                        )));
                    }
                }
            }
        }

        for ((collection, id), doc) in staged {
            match doc {
                Some(data) => {
                    collections.entry(collection).or_default().insert(id, data);
                }
                None => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

type Staged = HashMap<(String, String), Option<Value>>;

/// The document as the batch sees it so far.
fn current(
    collections: &HashMap<String, Collection>,
    staged: &Staged,
    collection: &str,
    id: &str,
) -> Option<Value> {
    match staged.get(&(collection.to_string(), id.to_string())) {
        Some(doc) => doc.clone(),
        None => collections.get(collection).and_then(|docs| docs.get(id)).cloned(),
    }
}
