//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `session` - Single-writer session reconciler and state owner
//! - `detection` - Detection-source merge with one precedence rule
//! - `slots` - Parking-slot directory
//! - `vehicles` - Vehicle registry
//! - `messaging` - Support messaging with the administrator

pub mod detection;
pub mod messaging;
pub mod session;
pub mod slots;
pub mod vehicles;

// Re-export commonly used types
pub use detection::DetectionMerge;
pub use messaging::MessageBoard;
pub use session::{Session, SessionHandle};
pub use slots::SlotDirectory;
pub use vehicles::VehicleRegistry;
