//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `backend` - the hosted-backend trait and error taxonomy
//! - `rest` - REST document/tree client for the hosted backend
//! - `memory` - in-memory backend with push fan-out (tests, simulation)
//! - `feed` - MQTT push feed parsing realtime channels into session events
//! - `writes` - typed channel and worker for fire-and-forget backend writes

pub mod backend;
pub mod feed;
pub mod memory;
pub mod rest;
pub mod writes;

// Re-export commonly used types
pub use backend::{Backend, BackendError};
pub use feed::start_push_feed;
pub use memory::MemoryBackend;
pub use rest::RestBackend;
pub use writes::{create_write_worker, WriteSender, WriteWorker};
