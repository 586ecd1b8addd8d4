//! Hosted-backend seam
//!
//! The product's persistent state lives in a third-party hosted backend: a
//! document store plus a realtime key-value tree. This trait is the only
//! surface the rest of the crate sees; implementations are the REST client
//! (production) and the in-memory backend (tests, simulation).

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors crossing the backend seam.
///
/// Listener and write failures are logged and ignored by callers; only the
/// initial fetch and a missing authentication terminate a flow.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("user is not authenticated")]
    Unauthenticated,
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payload decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend rejected {path}: status {code}")]
    Rejected { path: String, code: u16 },
}

/// Document and realtime-tree access.
///
/// Document paths are `collection/id`; tree paths are slash-separated keys.
/// All operations are single-step with no retry policy.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read a document; Ok(None) when it does not exist
    async fn get_doc(&self, path: &str) -> Result<Option<Value>, BackendError>;

    /// Create or replace a document
    async fn set_doc(&self, path: &str, value: Value) -> Result<(), BackendError>;

    /// Merge fields into an existing document
    async fn update_doc(&self, path: &str, fields: Value) -> Result<(), BackendError>;

    /// Delete a document
    async fn delete_doc(&self, path: &str) -> Result<(), BackendError>;

    /// Add a document with a generated id; returns the id
    async fn add_doc(&self, collection: &str, value: Value) -> Result<String, BackendError>;

    /// List documents in a collection whose `field` equals `value`
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, BackendError>;

    /// Read a realtime-tree node; Ok(None) when absent
    async fn tree_get(&self, path: &str) -> Result<Option<Value>, BackendError>;

    /// Write a realtime-tree node; None deletes the node
    async fn tree_set(&self, path: &str, value: Option<Value>) -> Result<(), BackendError>;
}
