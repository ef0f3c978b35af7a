//! Status endpoint checking.
//!
//! A single bounded-timeout request against the backend's status endpoint.
//! Intentionally minimal: reachability is binary, every failure mode
//! (non-200, refusal, timeout) is just "unreachable" with a reason.

use gantry_core::BackendConfig;
use reqwest::Client;

/// Outcome of one status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCheck {
    Reachable,
    Unreachable { reason: String },
}

impl StatusCheck {
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable)
    }
}

/// Build the HTTP client used for status checks, with the configured
/// per-request timeout (strictly shorter than the polling interval).
pub fn build_client(config: &BackendConfig) -> reqwest::Result<Client> {
    Client::builder().timeout(config.health_timeout()).build()
}

/// Issue one `GET /api/status` request.
pub async fn check_status(client: &Client, config: &BackendConfig) -> StatusCheck {
    match client.get(config.status_url()).send().await {
        Ok(response) if response.status().is_success() => StatusCheck::Reachable,
        Ok(response) => StatusCheck::Unreachable {
            reason: format!("status endpoint returned {}", response.status()),
        },
        Err(e) if e.is_timeout() => StatusCheck::Unreachable {
            reason: "status request timed out".to_string(),
        },
        Err(e) => StatusCheck::Unreachable {
            reason: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_when_nothing_listens() {
        // Port 1 is never serving our status endpoint
        let config = BackendConfig::default().with_base_url("http://127.0.0.1:1");
        let client = build_client(&config).expect("client build failed");

        let outcome = check_status(&client, &config).await;
        assert!(!outcome.is_reachable());
    }
}
