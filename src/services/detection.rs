//! Detection-source merge
//!
//! Single source of truth for "is a vehicle present". Each channel's latest
//! accepted value is kept per source; staleness is decided per source by
//! version ("last-writer-by-version"), and one precedence rule turns the
//! merged inputs into the derived boolean:
//!
//! - once a status record (document or mirror) has been observed, its
//!   explicit `puede_generar_qr` flag wins when present, its raw detection
//!   flag otherwise;
//! - before any status observation, the primary presence record and the
//!   ultrasonic sensor gate detection (either one reporting a vehicle
//!   counts as detected).

use crate::domain::types::{SourceId, StatusRecord};

/// Detection-relevant fields of a status record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags {
    pub detected: bool,
    pub may_generate_qr: Option<bool>,
}

impl From<&StatusRecord> for StatusFlags {
    fn from(record: &StatusRecord) -> Self {
        Self { detected: record.vehicle_detected, may_generate_qr: record.may_generate_qr }
    }
}

#[derive(Debug, Default)]
pub struct DetectionMerge {
    presence: Option<bool>,
    sensor: Option<bool>,
    /// Latest accepted status flags across document and mirror. The merger
    /// runs on a single task, so acceptance order is well defined.
    status: Option<StatusFlags>,
    presence_version: u64,
    sensor_version: u64,
    status_doc_version: u64,
    status_mirror_version: u64,
}

impl DetectionMerge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a presence update; false means it was stale and dropped
    pub fn accept_presence(&mut self, version: u64, detected: bool) -> bool {
        if version <= self.presence_version {
            return false;
        }
        self.presence_version = version;
        self.presence = Some(detected);
        true
    }

    /// Accept an ultrasonic sensor update
    pub fn accept_sensor(&mut self, version: u64, detected: bool) -> bool {
        if version <= self.sensor_version {
            return false;
        }
        self.sensor_version = version;
        self.sensor = Some(detected);
        true
    }

    /// Accept a status update from the document store or the realtime mirror
    pub fn accept_status(&mut self, source: SourceId, version: u64, flags: StatusFlags) -> bool {
        let last = match source {
            SourceId::StatusDoc => &mut self.status_doc_version,
            SourceId::StatusMirror => &mut self.status_mirror_version,
            other => {
                debug_assert!(false, "not a status source: {other:?}");
                return false;
            }
        };
        if version <= *last {
            return false;
        }
        *last = version;
        self.status = Some(flags);
        true
    }

    /// The merged detection value under the single precedence rule
    pub fn detected(&self) -> bool {
        if let Some(status) = &self.status {
            return status.may_generate_qr.unwrap_or(status.detected);
        }
        self.presence.unwrap_or(false) || self.sensor.unwrap_or(false)
    }

    /// Whether any source has reported yet
    pub fn any_observed(&self) -> bool {
        self.status.is_some() || self.presence.is_some() || self.sensor.is_some()
    }
}
