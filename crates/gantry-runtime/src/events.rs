//! Event fan-out to UI consumers.
//!
//! One broadcaster per session, shared by `Arc`. Producers emit through the
//! [`EventSink`] port; subscribers get a live broadcast stream, and late
//! attachers can replay the bounded in-memory ring of recent events. Nothing
//! is persisted — the ring is session state only.

use std::collections::VecDeque;
use std::sync::RwLock;

use gantry_core::{EventSink, LogEvent};
use tokio::sync::broadcast;

/// Maximum number of events kept in the ring buffer.
const MAX_RECENT_EVENTS: usize = 5000;

/// Broadcast channel capacity for live subscribers.
const CHANNEL_CAPACITY: usize = 1000;

/// Fan-out sink: ring buffer for replay plus broadcast for live delivery.
pub struct EventBroadcaster {
    recent: RwLock<VecDeque<LogEvent>>,
    broadcast_tx: broadcast::Sender<LogEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
            broadcast_tx,
        }
    }

    /// Subscribe to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Snapshot of the retained events, oldest first.
    pub fn recent(&self) -> Vec<LogEvent> {
        self.recent.read().unwrap().iter().cloned().collect()
    }

    /// Drop all retained events.
    pub fn clear(&self) {
        self.recent.write().unwrap().clear();
    }

    /// Number of active live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBroadcaster {
    fn emit(&self, event: LogEvent) {
        {
            let mut recent = self.recent.write().unwrap();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        // Ignore the error when no subscriber is listening
        let _ = self.broadcast_tx.send(event);
    }
}
