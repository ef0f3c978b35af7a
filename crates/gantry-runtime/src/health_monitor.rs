//! Continuous backend reachability monitoring.
//!
//! Polls the status endpoint on a fixed interval and drives the shared
//! [`SessionContext`]: transitions into `Connected` on recovery, out of it
//! on failure, and publishes the reachability signal the realtime channel
//! uses to gate reconnect attempts. The monitor is policy-free about what
//! happens next — the channel owns the reconnect/fallback machinery.

use std::sync::Arc;

use async_stream::stream;
use futures_util::Stream;
use gantry_core::{
    BackendConfig, ConnectionState, EventSink, LogEvent, LogLevel, Reachability, SessionContext,
    StateTransition,
};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::health::{StatusCheck, check_status};

/// Interval-driven status poller for one backend session.
pub struct HealthMonitor {
    config: Arc<BackendConfig>,
    session: Arc<SessionContext>,
    sink: Arc<dyn EventSink>,
    backend_alive: Option<watch::Receiver<bool>>,
    cancel: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        config: Arc<BackendConfig>,
        session: Arc<SessionContext>,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            session,
            sink,
            backend_alive: None,
            cancel,
        }
    }

    /// Wire in the supervisor's liveness watch. While it reports the
    /// process dead, checks short-circuit to unreachable without touching
    /// the network.
    #[must_use]
    pub fn with_backend_alive(mut self, alive: watch::Receiver<bool>) -> Self {
        self.backend_alive = Some(alive);
        self
    }

    fn backend_process_dead(&self) -> bool {
        self.backend_alive
            .as_ref()
            .is_some_and(|alive| !*alive.borrow())
    }

    /// Start polling and return a stream of state transitions.
    ///
    /// The check is awaited inside the tick loop, so exactly one request is
    /// ever in flight; a tick that lands while a check is still running is
    /// skipped, not queued. The stream completes when `max_health_retries`
    /// consecutive failures accumulate (soft stop — construct and drive a
    /// new monitor to restart polling) or when the cancel token fires.
    pub fn monitor(self) -> impl Stream<Item = StateTransition> {
        stream! {
            let client = match crate::health::build_client(&self.config) {
                Ok(client) => client,
                Err(e) => {
                    warn!(error = %e, "failed to build status client");
                    self.sink.emit(LogEvent::system(
                        LogLevel::Error,
                        format!("health monitoring unavailable: {e}"),
                    ));
                    return;
                }
            };

            let mut ticker = interval(self.config.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut consecutive_failures = 0u32;
            let mut was_ever_connected = false;
            let mut was_degraded = false;

            debug!(url = %self.config.status_url(), "starting health monitor");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = if self.backend_process_dead() {
                            // Never report reachable while the process is known dead
                            StatusCheck::Unreachable {
                                reason: "backend process is not running".to_string(),
                            }
                        } else {
                            check_status(&client, &self.config).await
                        };

                        match outcome {
                            StatusCheck::Reachable => {
                                consecutive_failures = 0;
                                self.session.reset_attempts();

                                if let Some(transition) = self.session.transition_to(ConnectionState::Connected) {
                                    if was_ever_connected && was_degraded {
                                        self.sink.emit(LogEvent::system(
                                            LogLevel::Success,
                                            "reconnected to backend service",
                                        ));
                                    }
                                    self.session.publish_reachability(Reachability::Reachable);
                                    yield transition;
                                }
                                was_ever_connected = true;
                                was_degraded = false;
                            }
                            StatusCheck::Unreachable { reason } => {
                                consecutive_failures += 1;
                                was_degraded = true;
                                debug!(%reason, consecutive_failures, "status check failed");

                                // Only a connected session transitions here; one that is
                                // already down keeps its state (no redundant transitions)
                                let transition = self.session.transition_if(
                                    ConnectionState::Connected,
                                    ConnectionState::Disconnected,
                                );

                                if consecutive_failures >= self.config.max_health_retries {
                                    warn!(
                                        retries = consecutive_failures,
                                        "status retries exhausted, stopping health polling"
                                    );
                                    self.session.publish_reachability(Reachability::Unreachable {
                                        exhausted: true,
                                    });
                                    if let Some(transition) = transition {
                                        yield transition;
                                    }
                                    break;
                                }

                                if let Some(transition) = transition {
                                    self.session.publish_reachability(Reachability::Unreachable {
                                        exhausted: false,
                                    });
                                    yield transition;
                                }
                            }
                        }
                    }
                    () = self.cancel.cancelled() => {
                        debug!("health monitor cancelled");
                        break;
                    }
                }
            }
        }
    }
}
