//! Process supervision and connection resilience for the gantry launcher.
//!
//! This crate owns the OS- and network-facing half of the supervision layer:
//! spawning and singleton-guarding the backend process, polling its status
//! endpoint, and keeping the realtime event stream alive with bounded
//! reconnects and a synthetic fallback feed.

pub mod channel;
pub mod events;
pub mod health;
pub mod health_monitor;
pub mod lockfile;
pub mod process;
mod resolve;

// Re-export the supervisor and its spawn types
pub use process::{BackendSpec, BackendSupervisor, SpawnError};

// Re-export health utilities for direct use if needed
pub use health::{StatusCheck, check_status};
pub use health_monitor::HealthMonitor;

// Re-export the realtime channel surface
pub use channel::{
    ChannelError, ChannelEvent, ChannelEventKind, ListenerId, RealtimeChannel, StreamPayload,
    SyntheticFeed,
};

// Re-export event fan-out
pub use events::EventBroadcaster;

// Re-export lock record handling
pub use lockfile::{LockFile, LockRecordError, SweepOutcome};
