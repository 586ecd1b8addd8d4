//! Typed channel for outbound backend writes
//!
//! The session enqueues writes and moves on; a dedicated worker performs
//! the actual backend calls off the event-processing path. Writes are
//! fire-and-forget: failures are logged and counted, never retried, and
//! never surfaced to the user.

use crate::domain::session::epoch_ms;
use crate::domain::types::{NotificationRecord, ParkingRequest, RequestStatus};
use crate::infra::config::DocumentPaths;
use crate::infra::metrics::Metrics;
use crate::io::backend::Backend;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Write operations the session can request
#[derive(Debug)]
pub enum WriteCommand {
    /// Create or replace the user's parking-request record
    UpsertRequest(ParkingRequest),
    /// Toggle the status field of the user's request record
    SetRequestStatus { user_id: String, status: RequestStatus },
    /// Set the shared notification node (None clears it)
    SetNotification(Option<NotificationRecord>),
}

/// Cloneable handle for enqueueing writes without blocking
#[derive(Clone)]
pub struct WriteSender {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriteSender {
    pub fn upsert_request(&self, request: ParkingRequest) {
        self.try_send(WriteCommand::UpsertRequest(request));
    }

    pub fn set_request_status(&self, user_id: &str, status: RequestStatus) {
        self.try_send(WriteCommand::SetRequestStatus { user_id: user_id.to_string(), status });
    }

    pub fn set_notification(&self, record: NotificationRecord) {
        self.try_send(WriteCommand::SetNotification(Some(record)));
    }

    pub fn clear_notification(&self) {
        self.try_send(WriteCommand::SetNotification(None));
    }

    fn try_send(&self, command: WriteCommand) {
        if self.tx.try_send(command).is_err() {
            warn!("write_dropped: channel full or closed");
        }
    }
}

/// Worker that performs backend writes asynchronously
pub struct WriteWorker {
    backend: Arc<dyn Backend>,
    paths: DocumentPaths,
    rx: mpsc::Receiver<WriteCommand>,
    metrics: Arc<Metrics>,
}

impl WriteWorker {
    pub async fn run(mut self) {
        info!("write_worker_started");

        while let Some(command) = self.rx.recv().await {
            let result = match command {
                WriteCommand::UpsertRequest(request) => {
                    let path = format!("{}/{}", self.paths.requests, request.user_id);
                    debug!(path = %path, status = %request.status.as_str(), "request_upsert");
                    match serde_json::to_value(&request) {
                        Ok(value) => self.backend.set_doc(&path, value).await,
                        Err(e) => {
                            warn!(error = %e, "request_encode_failed");
                            continue;
                        }
                    }
                }
                WriteCommand::SetRequestStatus { user_id, status } => {
                    let path = format!("{}/{}", self.paths.requests, user_id);
                    debug!(path = %path, status = %status.as_str(), "request_status_set");
                    self.backend
                        .update_doc(
                            &path,
                            json!({ "status": status.as_str(), "updatedAt": epoch_ms() }),
                        )
                        .await
                }
                WriteCommand::SetNotification(record) => {
                    let value = match &record {
                        Some(record) => match serde_json::to_value(record) {
                            Ok(value) => Some(value),
                            Err(e) => {
                                warn!(error = %e, "notification_encode_failed");
                                continue;
                            }
                        },
                        None => None,
                    };
                    debug!(cleared = %record.is_none(), "notification_write");
                    self.backend.tree_set(&self.paths.notification, value).await
                }
            };

            match result {
                Ok(()) => self.metrics.record_write_ok(),
                Err(e) => {
                    // Logged only; no retry, no user-visible effect
                    self.metrics.record_write_failed();
                    warn!(error = %e, "backend_write_failed");
                }
            }
        }

        info!("write_worker_stopped");
    }
}

/// Create a bare write channel; the receiver side is normally owned by a
/// `WriteWorker`, or held directly by tests asserting on enqueued commands
pub fn write_channel(buffer_size: usize) -> (WriteSender, mpsc::Receiver<WriteCommand>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (WriteSender { tx }, rx)
}

/// Create the write channel and its worker
///
/// Returns the sender (for the session) and the worker (to be spawned)
pub fn create_write_worker(
    backend: Arc<dyn Backend>,
    paths: DocumentPaths,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (WriteSender, WriteWorker) {
    let (tx, rx) = write_channel(buffer_size);
    (tx, WriteWorker { backend, paths, rx, metrics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryBackend;

    fn test_paths() -> DocumentPaths {
        DocumentPaths::default()
    }

    #[tokio::test]
    async fn test_upsert_and_toggle_request() {
        let backend = Arc::new(MemoryBackend::new());
        let metrics = Arc::new(Metrics::new());
        let (sender, worker) =
            create_write_worker(backend.clone(), test_paths(), metrics.clone(), 16);

        sender.upsert_request(ParkingRequest {
            request_id: "r1".to_string(),
            user_id: "u1".to_string(),
            status: RequestStatus::Pending,
            updated_ms: 1,
        });
        sender.set_request_status("u1", RequestStatus::Completed);
        drop(sender);
        worker.run().await;

        let doc = backend.get_doc("requests/u1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "completed");
        assert_eq!(doc["requestId"], "r1");
        assert_eq!(metrics.snapshot().writes_ok, 2);
    }

    #[tokio::test]
    async fn test_notification_set_and_clear() {
        let backend = Arc::new(MemoryBackend::new());
        let metrics = Arc::new(Metrics::new());
        let (sender, worker) =
            create_write_worker(backend.clone(), test_paths(), metrics.clone(), 16);

        sender.set_notification(NotificationRecord {
            message: Some("hold on".to_string()),
            requester_id: Some("u1".to_string()),
        });
        sender.clear_notification();
        drop(sender);
        worker.run().await;

        let paths = test_paths();
        assert!(backend.tree_get(&paths.notification).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_failure_is_counted_not_fatal() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_unauthenticated(true);
        let metrics = Arc::new(Metrics::new());
        let (sender, worker) =
            create_write_worker(backend.clone(), test_paths(), metrics.clone(), 16);

        sender.clear_notification();
        drop(sender);
        worker.run().await;

        assert_eq!(metrics.snapshot().writes_failed, 1);
    }
}
