//! In-memory backend with push fan-out
//!
//! Stands in for the hosted backend in tests and local simulation. Document
//! and tree writes fan out on a broadcast channel so tests can drive the
//! push feed the way the hosted backend's realtime channels would.

use crate::io::backend::{Backend, BackendError};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A document or tree write observed on the backend
#[derive(Debug, Clone)]
pub struct DocChange {
    pub path: String,
    /// None for deletions
    pub value: Option<Value>,
}

pub struct MemoryBackend {
    docs: Mutex<FxHashMap<String, Value>>,
    tree: Mutex<FxHashMap<String, Value>>,
    changes: broadcast::Sender<DocChange>,
    /// When set, every operation fails as if the user never signed in
    unauthenticated: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            docs: Mutex::new(FxHashMap::default()),
            tree: Mutex::new(FxHashMap::default()),
            changes,
            unauthenticated: AtomicBool::new(false),
        }
    }

    /// Observe subsequent document and tree writes
    pub fn subscribe(&self) -> broadcast::Receiver<DocChange> {
        self.changes.subscribe()
    }

    pub fn set_unauthenticated(&self, value: bool) {
        self.unauthenticated.store(value, Ordering::Relaxed);
    }

    fn check_auth(&self) -> Result<(), BackendError> {
        if self.unauthenticated.load(Ordering::Relaxed) {
            return Err(BackendError::Unauthenticated);
        }
        Ok(())
    }

    fn publish(&self, path: &str, value: Option<Value>) {
        // Nobody listening is fine; fan-out is best effort
        let _ = self.changes.send(DocChange { path: path.to_string(), value });
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_doc(&self, path: &str) -> Result<Option<Value>, BackendError> {
        self.check_auth()?;
        Ok(self.docs.lock().get(path).cloned())
    }

    async fn set_doc(&self, path: &str, value: Value) -> Result<(), BackendError> {
        self.check_auth()?;
        self.docs.lock().insert(path.to_string(), value.clone());
        self.publish(path, Some(value));
        Ok(())
    }

    async fn update_doc(&self, path: &str, fields: Value) -> Result<(), BackendError> {
        self.check_auth()?;
        let merged = {
            let mut docs = self.docs.lock();
            let doc = docs.entry(path.to_string()).or_insert_with(|| Value::Object(Default::default()));
            if let (Value::Object(target), Value::Object(updates)) = (&mut *doc, fields) {
                for (key, value) in updates {
                    target.insert(key, value);
                }
            }
            doc.clone()
        };
        self.publish(path, Some(merged));
        Ok(())
    }

    async fn delete_doc(&self, path: &str) -> Result<(), BackendError> {
        self.check_auth()?;
        self.docs.lock().remove(path);
        self.publish(path, None);
        Ok(())
    }

    async fn add_doc(&self, collection: &str, value: Value) -> Result<String, BackendError> {
        self.check_auth()?;
        let id = Uuid::now_v7().to_string();
        let path = format!("{collection}/{id}");
        self.docs.lock().insert(path.clone(), value.clone());
        self.publish(&path, Some(value));
        Ok(id)
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, BackendError> {
        self.check_auth()?;
        let prefix = format!("{collection}/");
        let docs = self.docs.lock();
        let mut rows: Vec<(String, Value)> = docs
            .iter()
            .filter(|(path, doc)| {
                path.starts_with(&prefix) && doc.get(field) == Some(value)
            })
            .map(|(path, doc)| (path[prefix.len()..].to_string(), doc.clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    async fn tree_get(&self, path: &str) -> Result<Option<Value>, BackendError> {
        self.check_auth()?;
        Ok(self.tree.lock().get(path).cloned())
    }

    async fn tree_set(&self, path: &str, value: Option<Value>) -> Result<(), BackendError> {
        self.check_auth()?;
        match &value {
            Some(v) => {
                self.tree.lock().insert(path.to_string(), v.clone());
            }
            None => {
                self.tree.lock().remove(path);
            }
        }
        self.publish(path, value);
        Ok(())
    }
}
