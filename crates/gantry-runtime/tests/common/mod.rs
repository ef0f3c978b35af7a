//! Shared fixtures for the integration suites.
#![allow(dead_code)] // not every suite uses every helper

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use gantry_core::{ConnectionState, EventSink, LogEvent, LogLevel, SessionContext};

/// Sink that records every emitted event for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    /// WARNING announcements of degraded mode (`source="system"`,
    /// `synthetic=true`).
    pub fn degraded_announcements(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| e.level == LogLevel::Warning && e.source == "system" && e.synthetic)
            .count()
    }

    /// Events fabricated by the synthetic feed (announcements excluded).
    pub fn synthetic_feed_events(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| e.source == "synthetic")
            .count()
    }

    pub fn contains(&self, source: &str, message: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.source == source && e.message == message)
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Initialize test logging once per binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Reserve a local port with nothing listening on it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let port = listener.local_addr().expect("no local addr").port();
    drop(listener);
    port
}

/// Poll until the session reaches `state` or the timeout elapses.
pub async fn wait_for_state(
    session: &SessionContext,
    state: ConnectionState,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if session.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    session.state() == state
}

/// Poll until `predicate` holds or the timeout elapses.
pub async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
