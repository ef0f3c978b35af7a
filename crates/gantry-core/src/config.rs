//! Backend connection configuration.
//!
//! An explicit structure enumerating every knob the supervision layer uses,
//! with defaults matching the launcher's observed behavior. Callers build a
//! config once per session and share it behind an `Arc`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::session::RetryBudget;

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Configuration for one backend session.
///
/// The health timeout is kept strictly shorter than the polling interval so
/// a check can never overlap the next tick; likewise the connect timeout is
/// shorter than the reconnect delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base HTTP URL of the backend service.
    pub base_url: String,
    /// Status poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Timeout of one status request in milliseconds.
    pub health_timeout_ms: u64,
    /// Consecutive failed polls before health polling soft-stops.
    pub max_health_retries: u32,
    /// Timeout of one stream connection attempt in milliseconds.
    pub connect_timeout_ms: u64,
    /// Reconnect attempts before falling back to synthetic events.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Cadence of synthetic events while degraded, in milliseconds.
    pub synthetic_tick_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: 5_000,
            health_timeout_ms: 2_000,
            max_health_retries: 12,
            connect_timeout_ms: 2_000,
            max_reconnect_attempts: 3,
            reconnect_delay_ms: 3_000,
            synthetic_tick_ms: 10_000,
        }
    }
}

impl BackendConfig {
    /// Override the backend base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the reconnect budget.
    #[must_use]
    pub fn with_reconnect(mut self, max_attempts: u32, delay_ms: u64) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Override the health polling parameters.
    #[must_use]
    pub fn with_polling(mut self, interval_ms: u64, timeout_ms: u64, max_retries: u32) -> Self {
        self.poll_interval_ms = interval_ms;
        self.health_timeout_ms = timeout_ms;
        self.max_health_retries = max_retries;
        self
    }

    /// Override the synthetic event cadence.
    #[must_use]
    pub fn with_synthetic_tick(mut self, tick_ms: u64) -> Self {
        self.synthetic_tick_ms = tick_ms;
        self
    }

    /// URL of the status endpoint.
    pub fn status_url(&self) -> String {
        format!("{}/api/status", self.base_url.trim_end_matches('/'))
    }

    /// URL of the streaming endpoint, with the scheme switched to ws/wss.
    pub fn stream_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/api/logs/stream")
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub const fn synthetic_tick(&self) -> Duration {
        Duration::from_millis(self.synthetic_tick_ms)
    }

    /// The retry budget for one connection attempt sequence.
    pub const fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_reconnect_attempts, self.reconnect_delay_ms)
    }
}
