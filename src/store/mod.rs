//! Document store abstraction used by the route handlers.
//!
//! The [`DocumentStore`] trait abstracts over storage backends. Documents are
//! JSON objects grouped into named collections; filters are JSON objects
//! whose fields must all be equal in a matching document. Updates merge the
//! given top-level fields into the matched document.
//!
//! The only built-in backend is [`MemoryStore`], selected by the
//! `memory://` connection string.

pub mod memory;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

pub use memory::MemoryStore;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Field carrying a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The value is not a JSON object, or carries a malformed `_id`.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Outcome of an insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResult {
    /// `_id` of the new document.
    pub inserted_id: String,
}

/// Outcome of an update or upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// Documents matching the filter (0 or 1).
    pub matched_count: u64,
    /// Documents actually changed.
    pub modified_count: u64,
    /// `_id` of a document created by an upsert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<String>,
}

/// Outcome of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Documents removed.
    pub deleted_count: u64,
}

/// Trait abstracting the document storage backend.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request handlers.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Insert `doc`, assigning an `_id` if it has none.
    async fn insert(&self, collection: &str, doc: Document) -> Result<InsertResult, StoreError>;

    /// All documents matching `filter`, in insertion order.
    async fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError>;

    /// Merge `fields` into the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        fields: Document,
    ) -> Result<UpdateResult, StoreError>;

    /// Like [`update_one`](Self::update_one), but insert `filter ∪ fields`
    /// when nothing matches.
    async fn upsert(
        &self,
        collection: &str,
        filter: &Document,
        fields: Document,
    ) -> Result<UpdateResult, StoreError>;

    /// Remove the first document matching `filter`.
    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<DeleteResult, StoreError>;
}

/// Open the store named by a connection string.
///
/// # Errors
///
/// Fails for any scheme other than `memory://`; the server refuses to start
/// rather than run without storage.
pub fn connect(url: &str) -> crate::Result<Arc<dyn DocumentStore>> {
    let scheme = url.split_once("://").map_or(url, |(scheme, _)| scheme);
    match scheme {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(crate::Error::Config(format!(
            "Unsupported storage scheme '{other}' in storage.url (supported: memory://)"
        ))),
    }
}

/// Convert a JSON value into a [`Document`].
pub fn into_document(value: Value) -> Result<Document, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
