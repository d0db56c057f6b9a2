mod sqlite;

pub use sqlite::SqliteStore;

use crate::errors::AppResult;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

/// Address of a document collection. User-scoped collections carry the
/// opaque user id in the path; shared collections are top-level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn user_scoped(root: &str, user_id: &str, segment: &str) -> Self {
        Self(format!("{root}/{user_id}/{segment}"))
    }

    pub fn top_level(root: &str) -> Self {
        Self(root.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A raw document as delivered by the store: opaque id plus JSON body.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub body: Value,
}

impl Document {
    /// Decode the body into a typed model, injecting the document id so
    /// model structs can carry it without the store persisting it.
    pub fn decode<T: DeserializeOwned>(&self) -> AppResult<T> {
        let mut body = self.body.clone();
        if let Value::Object(map) = &mut body {
            map.insert("id".to_string(), Value::String(self.id.clone()));
        }
        Ok(serde_json::from_value(body)?)
    }
}

/// Decode a batch, dropping documents that no longer match any known shape.
/// Malformed persisted data degrades to a skip, never a failure.
pub fn decode_documents<T: DeserializeOwned>(docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(doc_id = %doc.id, error = %error, "skipping undecodable document");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocChange {
    Created(Value),
    Updated(Value),
    Deleted,
}

#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub collection: String,
    pub doc_id: String,
    pub change: DocChange,
}

/// The remote document store contract: per-user hierarchical collections of
/// JSON documents with partial updates and live change subscriptions.
pub trait DocumentStore: Send + Sync {
    /// Create a document with a store-assigned id.
    fn create(&self, path: &CollectionPath, body: Value) -> AppResult<String>;

    /// Create or replace a document at a caller-chosen id.
    fn set(&self, path: &CollectionPath, id: &str, body: Value) -> AppResult<()>;

    fn get(&self, path: &CollectionPath, id: &str) -> AppResult<Option<Document>>;

    fn list(&self, path: &CollectionPath) -> AppResult<Vec<Document>>;

    /// Merge `patch` into an existing document. Only the keys present in the
    /// patch change; missing documents are an error.
    fn update(&self, path: &CollectionPath, id: &str, patch: Value) -> AppResult<()>;

    /// Hard delete. Deleting an absent document is not an error.
    fn delete(&self, path: &CollectionPath, id: &str) -> AppResult<()>;

    /// Live change feed for one collection. Dropping the receiver ends the
    /// subscription.
    fn subscribe(&self, path: &CollectionPath) -> broadcast::Receiver<StoreEvent>;
}

/// Recursive JSON merge used for partial updates: objects merge key-wise,
/// everything else is replaced.
pub fn merge_json(target: &mut Value, update: Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
