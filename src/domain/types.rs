//! Shared types for the parking session service

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one of the independent backend channels feeding the session.
///
/// The status record exists twice upstream (document store and realtime-tree
/// mirror); each copy is its own source with its own version counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Presence,
    StatusDoc,
    StatusMirror,
    Sensor,
    Notification,
    Gate,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Presence => "presence",
            SourceId::StatusDoc => "status_doc",
            SourceId::StatusMirror => "status_mirror",
            SourceId::Sensor => "sensor",
            SourceId::Notification => "notification",
            SourceId::Gate => "gate",
        }
    }

    const COUNT: usize = 6;

    fn index(self) -> usize {
        match self {
            SourceId::Presence => 0,
            SourceId::StatusDoc => 1,
            SourceId::StatusMirror => 2,
            SourceId::Sensor => 3,
            SourceId::Notification => 4,
            SourceId::Gate => 5,
        }
    }
}

/// Per-source monotonic version counters, assigned at ingestion.
///
/// Versions are never trusted from payloads; the feed and the poll reader
/// share one instance so a polled re-read always outranks earlier pushes
/// from the same source.
#[derive(Debug, Default)]
pub struct SourceVersions {
    counters: [AtomicU64; SourceId::COUNT],
}

impl SourceVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next version for a source (first version is 1)
    pub fn next(&self, source: SourceId) -> u64 {
        self.counters[source.index()].fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Primary vehicle-presence record (document A)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub detected: bool,
}

/// Status record (document B and its realtime-tree mirror)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(rename = "vehiculo_detectado")]
    pub vehicle_detected: bool,
    /// Explicit "may generate code" flag; absent on older writers
    #[serde(rename = "puede_generar_qr", skip_serializing_if = "Option::is_none")]
    pub may_generate_qr: Option<bool>,
    #[serde(rename = "mensaje", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Ultrasonic sensor record (document C)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensorRecord {
    #[serde(rename = "detectado")]
    pub detected: bool,
}

/// Notification-message record (document D)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "mensaje")]
    pub message: Option<String>,
    #[serde(rename = "solicitanteId", skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<String>,
}

/// Barrier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Open,
    Closed,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStatus::Open => "open",
            GateStatus::Closed => "closed",
        }
    }
}

/// Gate-state record (document E)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRecord {
    pub status: GateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Gate reason emitted when a valid QR code opened the barrier
pub const GATE_REASON_VALID_CODE: &str = "valid_code";
/// Gate reason emitted when the barrier closed over an occupied slot
pub const GATE_REASON_SLOT_OCCUPIED: &str = "slot_occupied";

/// Parking request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Cancelled,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Completed => "completed",
        }
    }
}

/// Parking-request record, keyed by user id in the requests collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkingRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub status: RequestStatus,
    #[serde(rename = "updatedAt")]
    pub updated_ms: u64,
}

/// One event on the merged session stream.
///
/// Every producer (push feed, poll reader, UI surface) is an event producer
/// only; the session task is the single consumer and single state writer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Presence { version: u64, record: PresenceRecord },
    Status { source: SourceId, version: u64, record: StatusRecord },
    Sensor { version: u64, record: SensorRecord },
    Notification { version: u64, record: NotificationRecord },
    Gate { version: u64, record: GateRecord },
    /// User opened the QR dialog to start a parking flow
    OpenQr,
    /// User dismissed the QR dialog
    CloseQr,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Presence { .. } => "presence",
            SessionEvent::Status { .. } => "status",
            SessionEvent::Sensor { .. } => "sensor",
            SessionEvent::Notification { .. } => "notification",
            SessionEvent::Gate { .. } => "gate",
            SessionEvent::OpenQr => "open_qr",
            SessionEvent::CloseQr => "close_qr",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_versions_monotonic_per_source() {
        let versions = SourceVersions::new();
        assert_eq!(versions.next(SourceId::Sensor), 1);
        assert_eq!(versions.next(SourceId::Sensor), 2);
        // Independent counter per source
        assert_eq!(versions.next(SourceId::StatusDoc), 1);
        assert_eq!(versions.next(SourceId::Sensor), 3);
    }

    #[test]
    fn test_status_record_wire_names() {
        let json = r#"{"vehiculo_detectado":true,"puede_generar_qr":false}"#;
        let record: StatusRecord = serde_json::from_str(json).unwrap();
        assert!(record.vehicle_detected);
        assert_eq!(record.may_generate_qr, Some(false));
        assert!(record.message.is_none());
    }

    #[test]
    fn test_gate_record_lowercase_status() {
        let record: GateRecord =
            serde_json::from_str(r#"{"status":"closed","reason":"slot_occupied"}"#).unwrap();
        assert_eq!(record.status, GateStatus::Closed);
        assert_eq!(record.reason.as_deref(), Some(GATE_REASON_SLOT_OCCUPIED));
    }
}
