//! Shared session state for one backend connection.
//!
//! [`SessionContext`] replaces the original implementation's process-wide
//! mutable flags with one explicit object holding the connection state, the
//! retry budget, and the reachability signal. The health monitor and the
//! realtime channel each hold an `Arc` to the same context; independent
//! sessions (e.g. under test) simply construct independent contexts.

use std::sync::{Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Connection state of a backend session.
///
/// `SyntheticMode` and `Connected` are mutually exclusive by construction:
/// the state is a single enum slot and every transition goes through
/// [`SessionContext::transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No live connection and no degraded feed.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The backend is reachable and the stream is open.
    Connected,
    /// Live events replaced by locally fabricated ones.
    SyntheticMode,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::SyntheticMode => "synthetic",
        };
        f.write_str(name)
    }
}

/// A state change that actually happened (`from != to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Bounded reconnect budget for one connection attempt sequence.
///
/// `attempts` saturates at `max_attempts` and is reset to zero on every
/// successful connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts: u32,
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl RetryBudget {
    #[must_use]
    pub const fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            delay_ms,
        }
    }

    /// True once every permitted attempt has been consumed.
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Fixed delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Outcome of the health monitor's view of the backend, published to the
/// realtime channel through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// No check has completed yet.
    Unknown,
    /// The last status check succeeded.
    Reachable,
    /// The last status check failed. `exhausted` is the global fall-back-now
    /// signal: the monitor has used up its consecutive-failure budget.
    Unreachable { exhausted: bool },
}

/// Authoritative per-session state: exactly one instance per running
/// session, shared by `Arc` between the health monitor and the channel.
pub struct SessionContext {
    state: RwLock<ConnectionState>,
    budget: Mutex<RetryBudget>,
    reachability_tx: watch::Sender<Reachability>,
}

impl SessionContext {
    #[must_use]
    pub fn new(budget: RetryBudget) -> Self {
        let (reachability_tx, _) = watch::channel(Reachability::Unknown);
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            budget: Mutex::new(budget),
            reachability_tx,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    /// Move to `next`, returning the transition if the state actually
    /// changed. Redundant transitions (same state) return `None` and are
    /// never re-emitted downstream.
    pub fn transition_to(&self, next: ConnectionState) -> Option<StateTransition> {
        let mut state = self.state.write().unwrap();
        if *state == next {
            return None;
        }
        let transition = StateTransition {
            from: *state,
            to: next,
        };
        *state = next;
        debug!(from = %transition.from, to = %transition.to, "connection state changed");
        Some(transition)
    }

    /// Move to `next` only if the current state is `from`.
    pub fn transition_if(
        &self,
        from: ConnectionState,
        next: ConnectionState,
    ) -> Option<StateTransition> {
        let mut state = self.state.write().unwrap();
        if *state != from || *state == next {
            return None;
        }
        let transition = StateTransition {
            from: *state,
            to: next,
        };
        *state = next;
        debug!(from = %transition.from, to = %transition.to, "connection state changed");
        Some(transition)
    }

    /// Snapshot of the retry budget.
    pub fn budget(&self) -> RetryBudget {
        *self.budget.lock().unwrap()
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset_attempts(&self) {
        self.budget.lock().unwrap().attempts = 0;
    }

    /// Consume one budget unit and return the updated budget. The counter
    /// saturates at `max_attempts`.
    pub fn consume_attempt(&self) -> RetryBudget {
        let mut budget = self.budget.lock().unwrap();
        if budget.attempts < budget.max_attempts {
            budget.attempts += 1;
        }
        *budget
    }

    /// Publish a reachability observation to channel-side watchers.
    pub fn publish_reachability(&self, reachability: Reachability) {
        let _ = self.reachability_tx.send(reachability);
    }

    /// Subscribe to reachability observations.
    pub fn watch_reachability(&self) -> watch::Receiver<Reachability> {
        self.reachability_tx.subscribe()
    }
}
