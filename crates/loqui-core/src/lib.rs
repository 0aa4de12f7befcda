//! Shared kernel of the loqui voice assistant.
//!
//! This crate holds everything both processes agree on: the domain types
//! (modes, sessions, audio payloads, memory records), the reserved event
//! vocabulary, the port traits through which external collaborators are
//! consumed, the YAML-backed configuration, and the on-disk layout of the
//! application-support directory.
//!
//! It deliberately contains no I/O beyond config/paths helpers: audio,
//! networking, and persistence live in the adapter crates.

pub mod config;
pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;

// Re-export key types for convenience
pub use config::AppConfig;
pub use domain::audio::{AudioPayload, SampleDtype};
pub use domain::memory::{MemoryRecord, MemorySnapshot, MEMORY_FIELD_MAX_BYTES};
pub use domain::mode::{Arbitration, Mode, ModeRequest, RejectReason};
pub use domain::recognition::{RecognitionFailure, RecognitionOutcome};
pub use domain::session::{SessionClock, SessionId};
pub use events::{Event, EventPayload, EventPriority};
