//! Log events and the event sink port.
//!
//! Every producer in the supervision layer (backend stdout/stderr readers,
//! the realtime channel, the health monitor, the synthetic feed) emits the
//! same immutable [`LogEvent`] record. The UI treats the resulting stream as
//! uniform regardless of where an event came from; the `synthetic` flag is
//! the only marker distinguishing fabricated data from live data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a log event.
///
/// The set mirrors the backend's logger levels, including the non-standard
/// `SUCCESS` level it uses for positive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Success,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Success => "SUCCESS",
        };
        f.write_str(name)
    }
}

/// A single event in the session stream.
///
/// Never mutated after creation; producers build a fresh value per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// When the event was produced.
    pub time: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Producer tag: `backend`, `backend-error`, `diagnostic`, `system`,
    /// or `synthetic`.
    pub source: String,
    /// Human-readable message.
    pub message: String,
    /// True when the event was fabricated locally rather than received from
    /// the backend.
    #[serde(default)]
    pub synthetic: bool,
}

impl LogEvent {
    /// Create an event with the current timestamp.
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            level,
            source: source.into(),
            message: message.into(),
            synthetic: false,
        }
    }

    /// Create an event tagged `source="system"` (supervision-layer origin).
    pub fn system(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, "system", message)
    }

    /// Mark the event as locally fabricated.
    #[must_use]
    pub fn with_synthetic(mut self, synthetic: bool) -> Self {
        self.synthetic = synthetic;
        self
    }
}

/// Port for delivering events to the host application.
///
/// Object-safe and fire-and-forget: implementations handle buffering and
/// delivery errors internally, producers never block on a sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Sink that discards every event. Useful for tests and headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: LogEvent) {}
}
