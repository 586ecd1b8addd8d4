//! Session state machine for the parking flow
//!
//! Single authoritative model replacing the original screen's scattered
//! booleans. All derived UI state (button enablement, notification text,
//! QR visibility) is computed from the machine; callers never mutate the
//! derived values directly.

use serde::Serialize;
use smallvec::SmallVec;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) request id
pub fn new_request_id() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Notification shown while no vehicle has been detected
pub const NOTIF_WAITING_VEHICLE: &str = "waiting for vehicle";
/// Notification shown once a vehicle is detected and the button is live
pub const NOTIF_VEHICLE_DETECTED: &str = "vehicle detected";
/// Notification shown while a parking flow is in progress
pub const NOTIF_FLOW_IN_PROGRESS: &str = "wait until the previous vehicle has parked";
/// Notification shown when the gate opened for a valid code
pub const NOTIF_ACCESS_GRANTED: &str = "access granted, gate open";

/// Session phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No detection source observed yet
    Idle,
    VehicleAbsent,
    VehicleDetected,
    /// User requested a parking code; flow in progress
    RequestPending,
    /// Gate opened for this session's code; flow still in progress
    AccessGranted,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::VehicleAbsent => "vehicle_absent",
            SessionPhase::VehicleDetected => "vehicle_detected",
            SessionPhase::RequestPending => "request_pending",
            SessionPhase::AccessGranted => "access_granted",
        }
    }

    /// A parking flow is in progress (started, not yet completed or cancelled)
    #[inline]
    pub fn in_progress(&self) -> bool {
        matches!(self, SessionPhase::RequestPending | SessionPhase::AccessGranted)
    }
}

/// A recorded phase change, kept for logging and diagnostics
#[derive(Debug, Clone, Copy)]
pub struct PhaseChange {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub ts: u64,
}

/// Outcome of applying a gate-state update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// No session-visible effect
    None,
    /// Gate opened for this session's valid code; QR dialog force-closed
    AccessGranted { request_id: String },
    /// Gate closed over an occupied slot; in-progress flag cleared
    FlowCleared,
}

/// Derived, read-only view of the session published to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub vehicle_detected: bool,
    pub button_enabled: bool,
    pub qr_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_value: Option<String>,
    pub notification: String,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        SessionMachine::new().snapshot()
    }
}

/// The session state machine. Owns every mutable flag the original screen
/// spread across callbacks; transitions are the only write path.
#[derive(Debug)]
pub struct SessionMachine {
    phase: SessionPhase,
    /// Latest merged detection value, tracked even while a flow is in
    /// progress so enablement reverts to it when the flow clears
    vehicle_detected: bool,
    qr_visible: bool,
    request_id: Option<String>,
    /// Message from the notification record, overriding the phase default
    external_message: Option<String>,
    recent: SmallVec<[PhaseChange; 8]>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            vehicle_detected: false,
            qr_visible: false,
            request_id: None,
            external_message: None,
            recent: SmallVec::new(),
        }
    }

    #[inline]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[inline]
    pub fn vehicle_detected(&self) -> bool {
        self.vehicle_detected
    }

    #[inline]
    pub fn qr_visible(&self) -> bool {
        self.qr_visible
    }

    /// Enabled iff a vehicle is detected AND no parking flow is in progress
    #[inline]
    pub fn button_enabled(&self) -> bool {
        self.vehicle_detected && !self.phase.in_progress()
    }

    pub fn recent_changes(&self) -> &[PhaseChange] {
        &self.recent
    }

    fn set_phase(&mut self, to: SessionPhase) {
        if self.phase == to {
            return;
        }
        if self.recent.len() == 8 {
            self.recent.remove(0);
        }
        self.recent.push(PhaseChange { from: self.phase, to, ts: epoch_ms() });
        self.phase = to;
    }

    /// Phase that tracks the raw merged detection value
    fn tracking_phase(&self) -> SessionPhase {
        if self.vehicle_detected {
            SessionPhase::VehicleDetected
        } else {
            SessionPhase::VehicleAbsent
        }
    }

    /// Apply a merged detection update. Returns true if any derived output
    /// changed. While a flow is in progress only the remembered detection
    /// value moves; the phase stays put until the flow clears.
    pub fn apply_detection(&mut self, detected: bool) -> bool {
        let before = (self.vehicle_detected, self.phase);
        self.vehicle_detected = detected;
        if !self.phase.in_progress() {
            self.set_phase(self.tracking_phase());
        }
        before != (self.vehicle_detected, self.phase)
    }

    /// Record a notification-record message (None reverts to phase default)
    pub fn set_external_message(&mut self, message: Option<String>) -> bool {
        if self.external_message == message {
            return false;
        }
        self.external_message = message;
        true
    }

    /// User opened the QR dialog. Returns the new request id, or None when
    /// the button is not enabled (no vehicle, or a flow already running).
    pub fn open_qr(&mut self) -> Option<String> {
        if !self.button_enabled() {
            return None;
        }
        let request_id = new_request_id();
        self.request_id = Some(request_id.clone());
        self.qr_visible = true;
        self.set_phase(SessionPhase::RequestPending);
        Some(request_id)
    }

    /// User dismissed the QR dialog. Always clears the in-progress flag and
    /// restores enablement to track raw detection. Returns the request id
    /// of a pending flow that should be cancelled, if any.
    pub fn close_qr(&mut self) -> Option<String> {
        self.qr_visible = false;
        let cancel = if self.phase == SessionPhase::RequestPending {
            self.request_id.take()
        } else {
            self.request_id = None;
            None
        };
        if self.phase.in_progress() {
            self.set_phase(self.tracking_phase());
        }
        cancel
    }

    /// Apply a gate transition.
    ///
    /// open/valid_code while a request is pending force-closes the dialog
    /// and grants access; closed/slot_occupied while a flow is in progress
    /// clears the flag exactly once. Closed/slot_occupied never dismisses
    /// an open dialog by itself.
    pub fn apply_gate(&mut self, open: bool, reason: Option<&str>) -> GateOutcome {
        match (open, reason) {
            (true, Some(super::types::GATE_REASON_VALID_CODE)) => {
                if self.phase != SessionPhase::RequestPending {
                    return GateOutcome::None;
                }
                self.qr_visible = false;
                self.set_phase(SessionPhase::AccessGranted);
                match self.request_id.clone() {
                    Some(request_id) => GateOutcome::AccessGranted { request_id },
                    None => GateOutcome::None,
                }
            }
            (false, Some(super::types::GATE_REASON_SLOT_OCCUPIED)) => {
                if !self.phase.in_progress() {
                    return GateOutcome::None;
                }
                self.request_id = None;
                self.set_phase(self.tracking_phase());
                GateOutcome::FlowCleared
            }
            _ => GateOutcome::None,
        }
    }

    fn notification(&self) -> String {
        if let Some(message) = &self.external_message {
            return message.clone();
        }
        match self.phase {
            SessionPhase::Idle | SessionPhase::VehicleAbsent => NOTIF_WAITING_VEHICLE,
            SessionPhase::VehicleDetected => NOTIF_VEHICLE_DETECTED,
            SessionPhase::RequestPending => NOTIF_FLOW_IN_PROGRESS,
            SessionPhase::AccessGranted => NOTIF_ACCESS_GRANTED,
        }
        .to_string()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            vehicle_detected: self.vehicle_detected,
            button_enabled: self.button_enabled(),
            qr_visible: self.qr_visible,
            qr_value: self.request_id.as_ref().map(|id| format!("parking:{id}")),
            notification: self.notification(),
        }
    }
}
