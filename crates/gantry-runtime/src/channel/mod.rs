//! Realtime event stream with bounded reconnects and synthetic fallback.
//!
//! [`RealtimeChannel`] keeps one WebSocket connection to the backend's
//! streaming endpoint alive. A single driver task owns the connection state
//! machine (`Idle → Connecting → Open → (Closed → Connecting)* →
//! SyntheticMode`), so transitions are strictly sequential; external calls
//! arrive as commands and are coalesced — `connect()` while already
//! connecting is a no-op, never a second parallel attempt.

mod driver;
mod listeners;
mod synthetic;

use std::sync::{Arc, Mutex};

use gantry_core::{BackendConfig, EventSink, LogEvent, SessionContext};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use listeners::ListenerId;
pub use synthetic::SyntheticFeed;

use listeners::ListenerSet;

/// Errors surfaced by [`RealtimeChannel::send`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The connection attempt sequence was abandoned (synthetic fallback or
    /// disconnect) before the payload could be delivered.
    #[error("send abandoned before the stream opened")]
    Abandoned,

    /// The underlying write failed on an open stream.
    #[error("realtime stream write failed: {0}")]
    Transport(String),
}

/// Payload delivered to `Message` listeners.
///
/// A payload that does not parse as an event is forwarded raw rather than
/// dropped, preserving at-least-once delivery of whatever arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPayload {
    Event(LogEvent),
    Raw(String),
}

/// Events delivered to registered listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Closed { reason: Option<String> },
    Error { message: String },
    Message(StreamPayload),
}

impl ChannelEvent {
    #[must_use]
    pub const fn kind(&self) -> ChannelEventKind {
        match self {
            Self::Open => ChannelEventKind::Open,
            Self::Closed { .. } => ChannelEventKind::Closed,
            Self::Error { .. } => ChannelEventKind::Error,
            Self::Message(_) => ChannelEventKind::Message,
        }
    }
}

/// Listener registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEventKind {
    Open,
    Closed,
    Error,
    Message,
}

/// Requests from the public API to the driver task.
pub(crate) enum Command {
    Connect,
    Send {
        payload: String,
        ack: oneshot::Sender<Result<(), ChannelError>>,
    },
}

struct DriverHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

/// Client for the backend's streaming endpoint.
pub struct RealtimeChannel {
    config: Arc<BackendConfig>,
    session: Arc<SessionContext>,
    listeners: Arc<ListenerSet>,
    sink: Arc<dyn EventSink>,
    driver: Mutex<Option<DriverHandle>>,
}

impl RealtimeChannel {
    pub fn new(
        config: Arc<BackendConfig>,
        session: Arc<SessionContext>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            session,
            listeners: Arc::new(ListenerSet::default()),
            sink,
            driver: Mutex::new(None),
        }
    }

    /// Start (or continue) connecting. A request while a connection attempt
    /// is already in flight is coalesced into it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let command_tx = self.ensure_driver();
        let _ = command_tx.send(Command::Connect);
    }

    /// Send a payload over the stream.
    ///
    /// When the stream is open the payload is written immediately and the
    /// write result returned. Otherwise the channel implicitly connects and
    /// the payload is queued until the stream opens — or fails with
    /// [`ChannelError::Abandoned`] when the attempt sequence is given up.
    pub async fn send(&self, payload: impl Into<String>) -> Result<(), ChannelError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let command_tx = self.ensure_driver();
        if command_tx
            .send(Command::Send {
                payload: payload.into(),
                ack: ack_tx,
            })
            .is_err()
        {
            return Err(ChannelError::Abandoned);
        }
        ack_rx.await.unwrap_or(Err(ChannelError::Abandoned))
    }

    /// Tear the channel down. Cancels the driver and with it every pending
    /// timer (reconnect delay, synthetic tick, connect timeout); queued
    /// sends fail with [`ChannelError::Abandoned`].
    pub fn disconnect(&self) {
        if let Some(handle) = self.driver.lock().unwrap().take() {
            debug!("disconnecting realtime channel");
            handle.cancel.cancel();
        }
    }

    /// Register a callback for one event kind. Callbacks run in
    /// registration order; a panicking callback is isolated and logged,
    /// the remaining callbacks still run.
    pub fn on(
        &self,
        kind: ChannelEventKind,
        callback: impl Fn(&ChannelEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.on(kind, callback)
    }

    /// Remove a callback previously registered with [`Self::on`].
    pub fn off(&self, kind: ChannelEventKind, id: ListenerId) -> bool {
        self.listeners.off(kind, id)
    }

    fn ensure_driver(&self) -> mpsc::UnboundedSender<Command> {
        let mut driver = self.driver.lock().unwrap();
        match driver.as_ref() {
            Some(handle) if !handle.command_tx.is_closed() => handle.command_tx.clone(),
            _ => {
                let handle = self.spawn_driver();
                let command_tx = handle.command_tx.clone();
                *driver = Some(handle);
                command_tx
            }
        }
    }

    fn spawn_driver(&self) -> DriverHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let ctx = driver::DriverCtx {
            config: self.config.clone(),
            session: self.session.clone(),
            listeners: self.listeners.clone(),
            sink: self.sink.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(driver::run(ctx, command_rx));
        DriverHandle { command_tx, cancel }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Ok(mut driver) = self.driver.lock()
            && let Some(handle) = driver.take()
        {
            handle.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::LogLevel;

    #[test]
    fn event_kinds_match_variants() {
        assert_eq!(ChannelEvent::Open.kind(), ChannelEventKind::Open);
        assert_eq!(
            ChannelEvent::Closed { reason: None }.kind(),
            ChannelEventKind::Closed
        );
        assert_eq!(
            ChannelEvent::Error {
                message: "boom".into()
            }
            .kind(),
            ChannelEventKind::Error
        );
        assert_eq!(
            ChannelEvent::Message(StreamPayload::Event(LogEvent::system(
                LogLevel::Info,
                "hello"
            )))
            .kind(),
            ChannelEventKind::Message
        );
    }
}
