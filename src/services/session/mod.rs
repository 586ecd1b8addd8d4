//! Session reconciler - single owner of the parking-flow state
//!
//! The Session is the central event processor that coordinates:
//! - detection-source merging (presence, status, mirror, sensor)
//! - the parking-flow state machine (button enablement, QR dialog)
//! - gate transitions (valid-code access grant, slot-occupied clear)
//! - outbound writes (request lifecycle, shared notification node)
//! - the periodic drift-reconciliation poll against the backend
//!
//! Every producer feeds one bounded channel; this task is the only writer
//! of the derived state, published to consumers through a watch channel.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::session::{SessionMachine, SessionSnapshot};
use crate::domain::types::{SessionEvent, SourceVersions};
use crate::infra::config::{Config, DocumentPaths};
use crate::infra::metrics::Metrics;
use crate::io::backend::{Backend, BackendError};
use crate::io::writes::WriteSender;
use crate::services::detection::DetectionMerge;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{info, warn};

/// Cloneable UI surface: turns user actions into session events
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// User pressed the "I want to park" button
    pub fn open_qr(&self) {
        if self.tx.try_send(SessionEvent::OpenQr).is_err() {
            warn!("open_qr_dropped: session channel full or closed");
        }
    }

    /// User dismissed the QR dialog
    pub fn close_qr(&self) {
        if self.tx.try_send(SessionEvent::CloseQr).is_err() {
            warn!("close_qr_dropped: session channel full or closed");
        }
    }
}

/// Single-writer session state owner
pub struct Session {
    pub(crate) machine: SessionMachine,
    pub(crate) detection: DetectionMerge,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) writes: WriteSender,
    pub(crate) versions: Arc<SourceVersions>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) paths: DocumentPaths,
    pub(crate) user_id: String,
    pub(crate) state_tx: watch::Sender<SessionSnapshot>,
    pub(crate) last_notification_version: u64,
    pub(crate) last_gate_version: u64,
    poll_interval: Duration,
}

impl Session {
    /// Create a session and the watch receiver consumers read state from
    pub fn new(
        config: &Config,
        user_id: &str,
        backend: Arc<dyn Backend>,
        writes: WriteSender,
        versions: Arc<SourceVersions>,
        metrics: Arc<Metrics>,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());
        let session = Self {
            machine: SessionMachine::new(),
            detection: DetectionMerge::new(),
            backend,
            writes,
            versions,
            metrics,
            paths: config.documents().clone(),
            user_id: user_id.to_string(),
            state_tx,
            last_notification_version: 0,
            last_gate_version: 0,
            poll_interval: Duration::from_secs(config.poll_interval_secs()),
        };
        (session, state_rx)
    }

    /// Initial fetch of the status and gate records.
    ///
    /// A failure here is terminal for the flow (generic error screen); once
    /// running, backend failures are logged only.
    pub async fn prime(&mut self) -> Result<(), BackendError> {
        let status_path = self.paths.status.clone();
        if let Some(value) = self.backend.get_doc(&status_path).await? {
            self.prime_status(value, false);
        }
        let gate_path = self.paths.gate.clone();
        if let Some(value) = self.backend.get_doc(&gate_path).await? {
            self.prime_gate(value);
        }
        self.publish();
        info!(phase = %self.machine.phase().as_str(), "session_primed");
        Ok(())
    }

    /// Run the session, consuming events until shutdown or channel close.
    ///
    /// The poll tick re-reads the status document and its realtime mirror
    /// directly and force-corrects derived state that drifted.
    pub async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<SessionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut poll = interval(self.poll_interval);
        // The first tick fires immediately; prime() already read the backend
        poll.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            self.process_event(event);
                            self.metrics.record_event_processed();
                        }
                        None => break,
                    }
                }
                _ = poll.tick() => {
                    self.reconcile().await;
                }
            }
        }

        info!("session_stopped");
    }

    /// Publish the derived state if any output changed
    pub(crate) fn publish(&mut self) {
        let snapshot = self.machine.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.machine.snapshot()
    }
}
