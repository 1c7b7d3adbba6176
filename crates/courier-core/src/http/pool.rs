//! Shared connection pool bounded per destination route
//!
//! reqwest keeps the actual keep-alive connections; this module decides how
//! many requests may use a route at the same time and hands out one client
//! per proxy choice. Every client is built from the same immutable TLS and
//! timeout settings.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};
use url::Url;

use crate::http::error::{TransportError, TransportErrorKind};
use crate::http::proxy::ProxyEndpoint;
use crate::http::timeout::{with_optional_timeout, TimeoutConfig};
use crate::http::tls::TlsConfig;
use crate::{Error, Result};

/// Default number of concurrent leases per route
pub const DEFAULT_MAX_PER_ROUTE: usize = 50;

/// Connection pool limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent leases per route
    pub max_per_route: usize,
    /// Maximum concurrent leases across all routes, unlimited when `None`
    pub max_total: Option<usize>,
    /// How long idle connections are kept, `0` keeps them forever
    pub idle_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_route: DEFAULT_MAX_PER_ROUTE,
            max_total: None,
            idle_timeout_ms: 90_000,
        }
    }
}

impl PoolConfig {
    /// Set the per-route cap
    pub fn with_max_per_route(mut self, max_per_route: usize) -> Self {
        self.max_per_route = max_per_route;
        self
    }

    /// Set the total cap
    pub fn with_max_total(mut self, max_total: usize) -> Self {
        self.max_total = Some(max_total);
        self
    }

    /// Validate limits
    pub fn validate(&self) -> Result<()> {
        if self.max_per_route == 0 {
            return Err(Error::configuration("max_per_route must be greater than zero"));
        }
        if self.max_total == Some(0) {
            return Err(Error::configuration("max_total must be greater than zero when set"));
        }
        Ok(())
    }

    fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.idle_timeout_ms))
        }
    }
}

/// A destination route: scheme, host and port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    scheme: String,
    host: String,
    port: u16,
}

impl Route {
    /// Route of `url`, `None` when the URL has no host
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;

        Some(Self {
            scheme: url.scheme().to_string(),
            host: host.to_ascii_lowercase(),
            port,
        })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Routes seen so far
    pub routes: usize,
    /// Clients built, the direct client included
    pub clients: usize,
    /// Leases currently held
    pub leased: usize,
    /// Whether the pool refuses new leases
    pub closed: bool,
}

#[derive(Default)]
struct PoolState {
    proxied: HashMap<ProxyEndpoint, reqwest::Client>,
    routes: HashMap<Route, Arc<Semaphore>>,
}

/// Immutable settings every pooled client is built from
#[derive(Debug, Clone)]
struct ClientSettings {
    timeouts: TimeoutConfig,
    tls: TlsConfig,
    user_agent: String,
    https_only: bool,
    max_idle_per_host: usize,
    idle_timeout: Option<Duration>,
}

impl ClientSettings {
    fn build(&self, proxy: Option<&ProxyEndpoint>) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .https_only(self.https_only)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout);

        if let Some(timeout) = self.timeouts.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.timeouts.socket_timeout() {
            builder = builder.read_timeout(timeout);
        }

        builder = match proxy {
            None => builder.no_proxy(),
            Some(endpoint) => {
                let proxy =
                    reqwest::Proxy::all(endpoint.to_url()).map_err(|source| Error::ClientBuild {
                        message: format!("invalid proxy {}", endpoint),
                        source,
                    })?;
                builder.proxy(proxy)
            }
        };

        let builder = self.tls.apply(builder)?;
        builder.build().map_err(|source| Error::ClientBuild {
            message: "failed to build HTTP client".to_string(),
            source,
        })
    }
}

/// Long-lived pool shared by every dispatch
pub struct ConnectionPool {
    config: PoolConfig,
    settings: ClientSettings,
    direct: reqwest::Client,
    state: Mutex<PoolState>,
    total: Option<Arc<Semaphore>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Build the pool and its direct client
    ///
    /// TLS problems surface here rather than on the first request.
    pub fn new(
        config: PoolConfig,
        timeouts: TimeoutConfig,
        tls: &TlsConfig,
        user_agent: impl Into<String>,
        https_only: bool,
    ) -> Result<Self> {
        config.validate()?;
        tls.validate()?;

        let settings = ClientSettings {
            timeouts,
            tls: tls.clone(),
            user_agent: user_agent.into(),
            https_only,
            max_idle_per_host: config.max_per_route,
            idle_timeout: config.idle_timeout(),
        };
        let direct = settings.build(None)?;

        info!(
            max_per_route = config.max_per_route,
            max_total = ?config.max_total,
            min_tls = %tls.min_tls_version,
            "Connection pool created"
        );

        Ok(Self {
            total: config.max_total.map(|max| Arc::new(Semaphore::new(max))),
            config,
            settings,
            direct,
            state: Mutex::new(PoolState::default()),
            closed: AtomicBool::new(false),
        })
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client_for(
        &self,
        proxy: Option<&ProxyEndpoint>,
    ) -> std::result::Result<reqwest::Client, TransportError> {
        let Some(endpoint) = proxy else {
            return Ok(self.direct.clone());
        };

        if let Some(client) = self.state().proxied.get(endpoint) {
            return Ok(client.clone());
        }

        // Built outside the lock; a concurrent build for the same proxy keeps the first
        let client = self.settings.build(Some(endpoint)).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Request,
                format!("cannot use proxy {}", endpoint),
            )
            .with_source(e)
        })?;
        debug!(proxy = %endpoint, "Built client for proxy");

        Ok(self
            .state()
            .proxied
            .entry(endpoint.clone())
            .or_insert(client)
            .clone())
    }

    fn route_semaphore(&self, route: &Route) -> Arc<Semaphore> {
        self.state()
            .routes
            .entry(route.clone())
            .or_insert_with(|| {
                let slots = Arc::new(Semaphore::new(self.config.max_per_route));
                // A route first seen while closing must not accept waiters
                if self.is_closed() {
                    slots.close();
                }
                slots
            })
            .clone()
    }

    /// Lease a client for `url` routed through `proxy`
    ///
    /// Waits for a free slot on the route (and in the total budget) for at
    /// most the connection request timeout. The slot is held until the
    /// returned [`PooledClient`] is released or dropped.
    pub async fn lease(
        &self,
        url: &Url,
        proxy: Option<&ProxyEndpoint>,
    ) -> std::result::Result<PooledClient, TransportError> {
        if self.is_closed() {
            return Err(pool_closed());
        }

        let route = Route::from_url(url).ok_or_else(|| {
            TransportError::new(
                TransportErrorKind::Request,
                format!("URL has no routable host: {}", url),
            )
        })?;
        let client = self.client_for(proxy)?;
        let route_slots = self.route_semaphore(&route);
        let total_slots = self.total.clone();

        let acquire = async move {
            let route_permit = route_slots.acquire_owned().await?;
            let total_permit = match total_slots {
                Some(slots) => Some(slots.acquire_owned().await?),
                None => None,
            };
            Ok::<_, tokio::sync::AcquireError>((route_permit, total_permit))
        };

        let wait = self.settings.timeouts.connection_request_timeout();
        let (route_permit, total_permit) = with_optional_timeout(wait, acquire)
            .await
            .map_err(|_| {
                TransportError::new(
                    TransportErrorKind::PoolTimeout,
                    format!(
                        "Timeout waiting for connection from pool after {}ms (route {})",
                        self.settings.timeouts.connection_request_timeout_ms, route
                    ),
                )
            })?
            .map_err(|_| pool_closed())?;

        Ok(PooledClient {
            client,
            route,
            proxy: proxy.cloned(),
            route_permit,
            total_permit,
        })
    }

    /// Refuse new leases and wake every waiter with an error
    ///
    /// Leases already handed out stay usable until released.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let state = self.state();
        for slots in state.routes.values() {
            slots.close();
        }
        if let Some(total) = &self.total {
            total.close();
        }
        info!(routes = state.routes.len(), "Connection pool closed");
    }

    /// Check whether the pool was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.state();
        let leased = state
            .routes
            .values()
            .map(|slots| self.config.max_per_route.saturating_sub(slots.available_permits()))
            .sum();

        PoolStats {
            routes: state.routes.len(),
            clients: state.proxied.len() + 1,
            leased,
            closed: self.is_closed(),
        }
    }

    /// Pool limits
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Timeout settings shared by every client
    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.settings.timeouts
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn pool_closed() -> TransportError {
    TransportError::new(TransportErrorKind::PoolClosed, "Connection pool is closed")
}

/// A leased client holding its route slot
#[derive(Debug)]
pub struct PooledClient {
    client: reqwest::Client,
    route: Route,
    proxy: Option<ProxyEndpoint>,
    route_permit: OwnedSemaphorePermit,
    total_permit: Option<OwnedSemaphorePermit>,
}

impl PooledClient {
    /// The underlying HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Route this lease is counted against
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Proxy this lease goes through
    pub fn proxy(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }

    /// Return the route and total slots to the pool
    pub(crate) fn return_slots(self) {
        drop(self.total_permit);
        drop(self.route_permit);
    }
}
