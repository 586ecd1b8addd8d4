//! Domain models - core business types and the session state machine
//!
//! This module contains the canonical data types used throughout the system:
//! - `SessionMachine` - the authoritative parking-flow state machine
//! - `SessionEvent` - events on the merged session stream
//! - `SourceId` / `SourceVersions` - channel identities and version counters
//! - backend record payloads (presence, status, sensor, notification, gate)

pub mod session;
pub mod types;
