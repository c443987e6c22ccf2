//! In-memory document store backed by a `DashMap` of collections.

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use super::{
    DeleteResult, Document, DocumentStore, ID_FIELD, InsertResult, StoreError, UpdateResult,
};

/// In-memory [`DocumentStore`]. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |docs| docs.len())
    }
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

/// Read or assign the document's `_id`.
fn ensure_id(doc: &mut Document) -> Result<String, StoreError> {
    match doc.get(ID_FIELD) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Err(StoreError::InvalidDocument(format!(
            "{ID_FIELD} must be a string, got {other}"
        ))),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            Ok(id)
        }
    }
}

/// Merge `fields` into `doc`, returning whether anything changed.
fn merge(doc: &mut Document, fields: Document) -> bool {
    let mut changed = false;
    for (k, v) in fields {
        if doc.get(&k) != Some(&v) {
            doc.insert(k, v);
            changed = true;
        }
    }
    changed
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, mut doc: Document) -> Result<InsertResult, StoreError> {
        let id = ensure_id(&mut doc)?;
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get(ID_FIELD) == doc.get(ID_FIELD)) {
            return Err(StoreError::Backend(format!("duplicate {ID_FIELD} '{id}'")));
        }
        docs.push(doc);
        debug!(collection, id = %id, "Inserted document");
        Ok(InsertResult { inserted_id: id })
    }

    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        fields: Document,
    ) -> Result<UpdateResult, StoreError> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        let Some(doc) = docs.iter_mut().find(|d| matches(d, filter)) else {
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            });
        };

        let modified = merge(doc, fields);
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: u64::from(modified),
            upserted_id: None,
        })
    }

    async fn upsert(
        &self,
        collection: &str,
        filter: &Document,
        fields: Document,
    ) -> Result<UpdateResult, StoreError> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if let Some(doc) = docs.iter_mut().find(|d| matches(d, filter)) {
            let modified = merge(doc, fields);
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: u64::from(modified),
                upserted_id: None,
            });
        }

        let mut doc = filter.clone();
        merge(&mut doc, fields);
        let id = ensure_id(&mut doc)?;
        docs.push(doc);
        debug!(collection, id = %id, "Upserted document");
        Ok(UpdateResult {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<DeleteResult, StoreError> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(DeleteResult { deleted_count: 0 });
        };
        let deleted_count = match docs.iter().position(|d| matches(d, filter)) {
            Some(index) => {
                docs.remove(index);
                1
            }
            None => 0,
        };
        Ok(DeleteResult { deleted_count })
    }
}
