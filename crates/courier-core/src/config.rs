//! Dispatcher configuration
//!
//! Everything the dispatcher needs at construction time, loadable with
//! serde and overridable from `COURIER_*` environment variables.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::http::pool::PoolConfig;
use crate::http::timeout::TimeoutConfig;
use crate::http::tls::TlsConfig;
use crate::{Error, Result};

/// Environment variable overriding the socket timeout
pub const ENV_SOCKET_TIMEOUT_MS: &str = "COURIER_SOCKET_TIMEOUT_MS";
/// Environment variable overriding the connect timeout
pub const ENV_CONNECT_TIMEOUT_MS: &str = "COURIER_CONNECT_TIMEOUT_MS";
/// Environment variable overriding the pool wait timeout
pub const ENV_CONNECTION_REQUEST_TIMEOUT_MS: &str = "COURIER_CONNECTION_REQUEST_TIMEOUT_MS";
/// Environment variable overriding the per-route cap
pub const ENV_MAX_PER_ROUTE: &str = "COURIER_MAX_PER_ROUTE";
/// Environment variable overriding the total cap
pub const ENV_MAX_TOTAL: &str = "COURIER_MAX_TOTAL";
/// Environment variable overriding the user agent
pub const ENV_USER_AGENT: &str = "COURIER_USER_AGENT";
/// Environment variable overriding `https_only`
pub const ENV_HTTPS_ONLY: &str = "COURIER_HTTPS_ONLY";

/// Complete dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Timeouts for every request phase
    pub timeouts: TimeoutConfig,
    /// Pool limits
    pub pool: PoolConfig,
    /// TLS settings shared by every pooled client
    pub tls: TlsConfig,
    /// User agent sent with every request
    pub user_agent: String,
    /// Refuse plain-HTTP URLs
    pub https_only: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            pool: PoolConfig::default(),
            tls: TlsConfig::secure(),
            user_agent: crate::default_user_agent(),
            https_only: true,
        }
    }
}

impl DispatcherConfig {
    /// Set the timeouts
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the pool limits
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the TLS settings
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Allow or refuse plain-HTTP URLs
    pub fn with_https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    /// Apply `COURIER_*` overrides from the process environment
    pub fn merge_with_env(self) -> Result<Self> {
        self.merge_with_lookup(|name| std::env::var(name).ok())
    }

    /// Apply `COURIER_*` overrides read through `lookup`
    pub fn merge_with_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var(&lookup, ENV_SOCKET_TIMEOUT_MS)? {
            self.timeouts.socket_timeout_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, ENV_CONNECT_TIMEOUT_MS)? {
            self.timeouts.connect_timeout_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, ENV_CONNECTION_REQUEST_TIMEOUT_MS)? {
            self.timeouts.connection_request_timeout_ms = ms;
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_PER_ROUTE)? {
            self.pool.max_per_route = max;
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_TOTAL)? {
            self.pool.max_total = Some(max);
        }
        if let Some(https_only) = parse_var(&lookup, ENV_HTTPS_ONLY)? {
            self.https_only = https_only;
        }
        if let Some(user_agent) = lookup(ENV_USER_AGENT).filter(|v| !v.trim().is_empty()) {
            self.user_agent = user_agent;
        }

        Ok(self)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.tls.validate()?;

        if self.timeouts.has_unbounded_phase() {
            warn!(timeouts = ?self.timeouts, "Some request phases wait indefinitely");
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }

    value.parse().map(Some).map_err(|e: T::Err| Error::Configuration {
        message: format!("Invalid value for {}: '{}'", name, value),
        source: Some(anyhow::anyhow!("{}", e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::TlsVersion;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.pool.max_per_route, 50);
        assert_eq!(config.pool.max_total, None);
        assert_eq!(config.tls.min_tls_version, TlsVersion::TLS1_2);
        assert!(config.https_only);
        assert!(config.user_agent.starts_with("/courier-"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = DispatcherConfig::default()
            .merge_with_lookup(lookup(&[
                (ENV_SOCKET_TIMEOUT_MS, "1500"),
                (ENV_CONNECT_TIMEOUT_MS, "0"),
                (ENV_MAX_PER_ROUTE, " 8 "),
                (ENV_MAX_TOTAL, "64"),
                (ENV_USER_AGENT, "/acme-mailer-2.1"),
                (ENV_HTTPS_ONLY, "false"),
            ]))
            .unwrap();

        assert_eq!(config.timeouts.socket_timeout_ms, 1500);
        assert_eq!(config.timeouts.connect_timeout(), None);
        assert_eq!(config.timeouts.connection_request_timeout_ms, 10_000);
        assert_eq!(config.pool.max_per_route, 8);
        assert_eq!(config.pool.max_total, Some(64));
        assert_eq!(config.user_agent, "/acme-mailer-2.1");
        assert!(!config.https_only);
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        let result =
            DispatcherConfig::default().merge_with_lookup(lookup(&[(ENV_MAX_PER_ROUTE, "many")]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_PER_ROUTE));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        let config = DispatcherConfig::default()
            .merge_with_lookup(lookup(&[(ENV_SOCKET_TIMEOUT_MS, ""), (ENV_USER_AGENT, "  ")]))
            .unwrap();
        assert_eq!(config, DispatcherConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_limits() {
        let config =
            DispatcherConfig::default().with_pool(PoolConfig::default().with_max_per_route(0));
        assert!(config.validate().is_err());

        let tls = TlsConfig::default().with_min_tls_version(TlsVersion::TLS1_1);
        let config = DispatcherConfig::default().with_tls(tls);
        assert!(matches!(config.validate(), Err(Error::Tls(_))));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: DispatcherConfig = serde_json::from_str(
            r#"{
                "timeouts": {"socket_timeout_ms": 5000},
                "pool": {"max_total": 100},
                "tls": {"min_tls_version": "1.3"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.timeouts.socket_timeout_ms, 5000);
        assert_eq!(config.timeouts.connect_timeout_ms, 10_000);
        assert_eq!(config.pool.max_per_route, 50);
        assert_eq!(config.pool.max_total, Some(100));
        assert_eq!(config.tls.min_tls_version, TlsVersion::TLS1_3);
        assert!(config.https_only);
    }
}
