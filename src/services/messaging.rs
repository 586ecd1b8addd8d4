//! Support messaging with the administrator
//!
//! Users send messages; the admin answers by writing a response onto the
//! same document. Listing returns the user's thread ordered by timestamp.

use crate::io::backend::{Backend, BackendError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportMessage {
    #[serde(skip)]
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "fromAdmin")]
    pub from_admin: bool,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(
        rename = "responseTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub response_timestamp: Option<DateTime<Utc>>,
}

pub struct MessageBoard {
    backend: Arc<dyn Backend>,
    collection: String,
}

impl MessageBoard {
    pub fn new(backend: Arc<dyn Backend>, collection: &str) -> Self {
        Self { backend, collection: collection.to_string() }
    }

    /// The user's thread, oldest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<SupportMessage>, BackendError> {
        let rows = self
            .backend
            .query_eq(&self.collection, "userId", &json!(user_id))
            .await?;
        let mut messages = Vec::with_capacity(rows.len());
        for (id, value) in rows {
            let mut message: SupportMessage = serde_json::from_value(value)?;
            message.id = id;
            messages.push(message);
        }
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    /// Send a message to the admin; empty or whitespace-only text is dropped
    pub async fn send(
        &self,
        user_id: &str,
        user_email: &str,
        text: &str,
    ) -> Result<Option<String>, BackendError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let message = SupportMessage {
            id: String::new(),
            message: text.to_string(),
            timestamp: Utc::now(),
            from_admin: false,
            user_id: user_id.to_string(),
            user_email: user_email.to_string(),
            response: None,
            response_timestamp: None,
        };
        let id = self
            .backend
            .add_doc(&self.collection, serde_json::to_value(&message)?)
            .await?;
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryBackend;

    #[tokio::test]
    async fn test_send_and_list_ordered() {
        let backend = Arc::new(MemoryBackend::new());
        let board = MessageBoard::new(backend.clone(), "messages");

        board.send("u1", "u1@example.com", "first").await.unwrap();
        board.send("u1", "u1@example.com", "second").await.unwrap();
        board.send("u2", "u2@example.com", "other user").await.unwrap();

        let thread = board.list_for_user("u1").await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].message, "first");
        assert_eq!(thread[1].message, "second");
        assert!(!thread[0].from_admin);
    }

    #[tokio::test]
    async fn test_blank_message_not_sent() {
        let backend = Arc::new(MemoryBackend::new());
        let board = MessageBoard::new(backend, "messages");
        assert!(board.send("u1", "u1@example.com", "   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_admin_response_roundtrips() {
        let backend = Arc::new(MemoryBackend::new());
        let board = MessageBoard::new(backend.clone(), "messages");

        let id = board.send("u1", "u1@example.com", "help").await.unwrap().unwrap();
        backend
            .update_doc(
                &format!("messages/{id}"),
                json!({
                    "response": "on it",
                    "responseTimestamp": Utc::now(),
                }),
            )
            .await
            .unwrap();

        let thread = board.list_for_user("u1").await.unwrap();
        assert_eq!(thread[0].response.as_deref(), Some("on it"));
        assert!(thread[0].response_timestamp.is_some());
    }
}
