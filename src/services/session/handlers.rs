//! Event handlers for the Session
//!
//! Each handler folds one event into the state machine; derived state is
//! republished only when an output actually changed.

use super::Session;
use crate::domain::session::{epoch_ms, GateOutcome, NOTIF_FLOW_IN_PROGRESS};
use crate::domain::types::{
    GateRecord, GateStatus, NotificationRecord, ParkingRequest, RequestStatus, SessionEvent,
    SourceId, StatusRecord,
};
use crate::services::detection::StatusFlags;
use serde_json::Value;
use tracing::{debug, info, warn};

impl Session {
    /// Process a single event, dispatching to the appropriate handler
    pub(crate) fn process_event(&mut self, event: SessionEvent) {
        let phase_before = self.machine.phase();

        match event {
            SessionEvent::Presence { version, record } => {
                if self.detection.accept_presence(version, record.detected) {
                    self.apply_merged_detection();
                } else {
                    self.metrics.record_stale_dropped();
                }
            }
            SessionEvent::Sensor { version, record } => {
                if self.detection.accept_sensor(version, record.detected) {
                    self.apply_merged_detection();
                } else {
                    self.metrics.record_stale_dropped();
                }
            }
            SessionEvent::Status { source, version, record } => {
                self.handle_status(source, version, &record);
            }
            SessionEvent::Notification { version, record } => {
                self.handle_notification(version, record);
            }
            SessionEvent::Gate { version, record } => {
                self.handle_gate(version, &record);
            }
            SessionEvent::OpenQr => {
                self.handle_open_qr();
            }
            SessionEvent::CloseQr => {
                self.handle_close_qr();
            }
        }

        if self.machine.phase() != phase_before {
            self.metrics.record_transition();
            info!(
                from = %phase_before.as_str(),
                to = %self.machine.phase().as_str(),
                "phase_changed"
            );
        }
        self.publish();
    }

    fn apply_merged_detection(&mut self) {
        let detected = self.detection.detected();
        if self.machine.apply_detection(detected) {
            debug!(detected = %detected, "detection_merged");
        }
    }

    fn handle_status(&mut self, source: SourceId, version: u64, record: &StatusRecord) {
        if !self.detection.accept_status(source, version, StatusFlags::from(record)) {
            self.metrics.record_stale_dropped();
            return;
        }
        // A message carried on the status record overrides the default text
        // until the notification channel clears it
        if let Some(message) = &record.message {
            self.machine.set_external_message(Some(message.clone()));
        }
        self.apply_merged_detection();
    }

    fn handle_notification(&mut self, version: u64, record: NotificationRecord) {
        if version <= self.last_notification_version {
            self.metrics.record_stale_dropped();
            return;
        }
        self.last_notification_version = version;
        if let Some(message) = &record.message {
            info!(message = %message, "notification_received");
        }
        self.machine.set_external_message(record.message);
    }

    fn handle_gate(&mut self, version: u64, record: &GateRecord) {
        if version <= self.last_gate_version {
            self.metrics.record_stale_dropped();
            return;
        }
        self.last_gate_version = version;

        let open = record.status == GateStatus::Open;
        match self.machine.apply_gate(open, record.reason.as_deref()) {
            GateOutcome::AccessGranted { request_id } => {
                // Informational alert for the user; QR dialog force-closed
                info!(request_id = %request_id, "gate_opened_for_code");
                self.writes.set_request_status(&self.user_id, RequestStatus::Completed);
                self.writes.clear_notification();
            }
            GateOutcome::FlowCleared => {
                info!("gate_closed_slot_occupied");
                self.writes.set_request_status(&self.user_id, RequestStatus::Cancelled);
            }
            GateOutcome::None => {
                debug!(status = %record.status.as_str(), reason = ?record.reason, "gate_ignored");
            }
        }
    }

    fn handle_open_qr(&mut self) {
        let Some(request_id) = self.machine.open_qr() else {
            debug!("open_qr_rejected: button not enabled");
            return;
        };
        info!(request_id = %request_id, "parking_flow_started");
        self.writes.upsert_request(ParkingRequest {
            request_id,
            user_id: self.user_id.clone(),
            status: RequestStatus::Pending,
            updated_ms: epoch_ms(),
        });
        self.writes.set_notification(NotificationRecord {
            message: Some(NOTIF_FLOW_IN_PROGRESS.to_string()),
            requester_id: Some(self.user_id.clone()),
        });
    }

    fn handle_close_qr(&mut self) {
        // A stray dismissal with nothing open must not touch the shared
        // notification node; an admin message may be sitting there
        if !self.machine.qr_visible() && !self.machine.phase().in_progress() {
            debug!("close_qr_ignored: no dialog open");
            return;
        }
        let cancelled = self.machine.close_qr();
        self.writes.clear_notification();
        if cancelled.is_some() {
            info!("parking_flow_cancelled");
            self.writes.set_request_status(&self.user_id, RequestStatus::Cancelled);
        }
    }

    /// Feed an initially fetched status document through the merge path
    pub(crate) fn prime_status(&mut self, value: Value, mirror: bool) {
        let record: StatusRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "status_decode_failed");
                return;
            }
        };
        let source = if mirror { SourceId::StatusMirror } else { SourceId::StatusDoc };
        let version = self.versions.next(source);
        if self.detection.accept_status(source, version, StatusFlags::from(&record)) {
            self.apply_merged_detection();
        }
    }

    /// Apply an initially fetched gate document
    pub(crate) fn prime_gate(&mut self, value: Value) {
        let record: GateRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "gate_decode_failed");
                return;
            }
        };
        self.last_gate_version = self.versions.next(SourceId::Gate);
        // No flow can be in progress before run(); outcome is always None
        let _ = self.machine.apply_gate(record.status == GateStatus::Open, record.reason.as_deref());
    }

    /// Periodic drift reconciliation: re-read the status document and its
    /// realtime mirror directly and force-correct derived state.
    ///
    /// The fresh reads get new versions from the same counters the push
    /// feed uses, so they outrank every push already delivered and the
    /// correction cannot be undone by a late stale push.
    pub(crate) async fn reconcile(&mut self) {
        let phase_before = self.machine.phase();
        let snapshot_before = self.machine.snapshot();

        let status_path = self.paths.status.clone();
        match self.backend.get_doc(&status_path).await {
            Ok(Some(value)) => self.prime_status(value, false),
            Ok(None) => {}
            Err(e) => {
                self.metrics.record_poll_failure();
                warn!(error = %e, "poll_status_read_failed");
            }
        }

        let mirror_path = self.paths.status_mirror.clone();
        match self.backend.tree_get(&mirror_path).await {
            Ok(Some(value)) => self.prime_status(value, true),
            Ok(None) => {}
            Err(e) => {
                self.metrics.record_poll_failure();
                warn!(error = %e, "poll_mirror_read_failed");
            }
        }

        if self.machine.snapshot() != snapshot_before {
            self.metrics.record_poll_correction();
            warn!(
                was_detected = %snapshot_before.vehicle_detected,
                now_detected = %self.machine.vehicle_detected(),
                "poll_corrected_drift"
            );
        }
        if self.machine.phase() != phase_before {
            self.metrics.record_transition();
        }
        self.publish();
    }
}
