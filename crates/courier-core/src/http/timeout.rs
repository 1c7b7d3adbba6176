//! Timeout configuration for pooled HTTP requests
//!
//! All values are milliseconds. A value of `0` means "wait indefinitely";
//! the defaults are bounded and unbounded waits have to be asked for
//! explicitly with [`TimeoutConfig::unbounded`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout configuration for HTTP requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum inactivity between two reads on an open connection
    pub socket_timeout_ms: u64,
    /// Time allowed to establish a connection (TCP + TLS handshake)
    pub connect_timeout_ms: u64,
    /// Time allowed to wait for a free slot in the connection pool
    pub connection_request_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            socket_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            connection_request_timeout_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration
    pub fn new(
        socket_timeout_ms: u64,
        connect_timeout_ms: u64,
        connection_request_timeout_ms: u64,
    ) -> Self {
        Self {
            socket_timeout_ms,
            connect_timeout_ms,
            connection_request_timeout_ms,
        }
    }

    /// Wait indefinitely on every phase of a request
    pub fn unbounded() -> Self {
        Self::new(0, 0, 0)
    }

    /// Socket read timeout, `None` when unbounded
    pub fn socket_timeout(&self) -> Option<Duration> {
        to_duration(self.socket_timeout_ms)
    }

    /// Connect timeout, `None` when unbounded
    pub fn connect_timeout(&self) -> Option<Duration> {
        to_duration(self.connect_timeout_ms)
    }

    /// Pool wait timeout, `None` when unbounded
    pub fn connection_request_timeout(&self) -> Option<Duration> {
        to_duration(self.connection_request_timeout_ms)
    }

    /// Check whether any phase waits indefinitely
    pub fn has_unbounded_phase(&self) -> bool {
        self.socket_timeout_ms == 0
            || self.connect_timeout_ms == 0
            || self.connection_request_timeout_ms == 0
    }
}

fn to_duration(millis: u64) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}

/// Run a future under an optional timeout
///
/// `None` awaits the future to completion.
pub async fn with_optional_timeout<F, T>(
    timeout: Option<Duration>,
    future: F,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, future).await,
        None => Ok(future.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_config_default_is_bounded() {
        let config = TimeoutConfig::default();
        assert_eq!(config.socket_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.connection_request_timeout(), Some(Duration::from_secs(10)));
        assert!(!config.has_unbounded_phase());
    }

    #[test]
    fn test_zero_means_unbounded() {
        let config = TimeoutConfig::unbounded();
        assert_eq!(config.socket_timeout(), None);
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.connection_request_timeout(), None);
        assert!(config.has_unbounded_phase());

        let config = TimeoutConfig::new(1500, 0, 250);
        assert_eq!(config.socket_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.connect_timeout(), None);
        assert!(config.has_unbounded_phase());
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: TimeoutConfig = serde_json::from_str(r#"{"connect_timeout_ms": 0}"#).unwrap();
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.socket_timeout_ms, 60_000);
    }

    #[tokio::test]
    async fn test_optional_timeout_wrapper() {
        // Fast operation should succeed
        let result = with_optional_timeout(Some(Duration::from_millis(200)), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            42
        })
        .await;
        assert_eq!(result.unwrap(), 42);

        // Slow operation should timeout
        let result = with_optional_timeout(Some(Duration::from_millis(20)), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await;
        assert!(result.is_err());

        // No timeout waits it out
        let result = with_optional_timeout(None, async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            "done"
        })
        .await;
        assert_eq!(result.unwrap(), "done");
    }
}
