//! Core domain types for the gantry supervision layer.
//!
//! This crate holds the pure domain model shared by every adapter: the event
//! record emitted to the UI, the session connection state, the backend
//! configuration, the persisted process record, and path resolution. It has
//! no process, network, or filesystem-adapter code beyond path helpers.

pub mod config;
pub mod events;
pub mod paths;
pub mod record;
pub mod session;

// Re-export commonly used types for convenience
pub use config::BackendConfig;
pub use events::{EventSink, LogEvent, LogLevel, NoopEventSink};
pub use paths::{PathError, data_root, lock_record_path};
pub use record::ProcessRecord;
pub use session::{
    ConnectionState, Reachability, RetryBudget, SessionContext, StateTransition,
};
