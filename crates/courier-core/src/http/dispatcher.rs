//! Request execution
//!
//! [`Dispatcher::execute`] runs one request end to end: it picks the proxy
//! for this request only, leases a connection, reads the whole response,
//! classifies it and gives the connection back exactly once.

use std::sync::OnceLock;

use tracing::{debug, error};

use crate::config::DispatcherConfig;
use crate::http::classifier::classify;
use crate::http::error::DispatchError;
use crate::http::pool::ConnectionPool;
use crate::http::proxy::ProxyResolver;
use crate::http::request::RequestDescriptor;
use crate::http::transport::{Connection, Transport};
use crate::{Error, Result};

static GLOBAL_DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();

/// Executes request descriptors over a shared transport
#[derive(Debug)]
pub struct Dispatcher<T: Transport = ConnectionPool> {
    transport: T,
    resolver: ProxyResolver,
}

impl Dispatcher<ConnectionPool> {
    /// Build a dispatcher with a fresh pool and environment proxy detection
    pub fn from_config(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;

        let pool = ConnectionPool::new(
            config.pool,
            config.timeouts,
            &config.tls,
            config.user_agent,
            config.https_only,
        )?;

        Ok(Self::new(pool, ProxyResolver::from_env()))
    }

    /// Install the process-wide dispatcher
    ///
    /// Fails with [`Error::AlreadyInitialized`] on every call after the
    /// first successful one.
    pub fn init_global(config: DispatcherConfig) -> Result<&'static Self> {
        if GLOBAL_DISPATCHER.get().is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let dispatcher = Self::from_config(config)?;
        GLOBAL_DISPATCHER
            .set(dispatcher)
            .map_err(|_| Error::AlreadyInitialized)?;
        GLOBAL_DISPATCHER.get().ok_or(Error::AlreadyInitialized)
    }

    /// The process-wide dispatcher, if installed
    pub fn global() -> Option<&'static Self> {
        GLOBAL_DISPATCHER.get()
    }

    /// The underlying pool
    pub fn pool(&self) -> &ConnectionPool {
        &self.transport
    }

    /// Close the pool; later dispatches fail with a transport error
    pub fn close(&self) {
        self.transport.close();
    }
}

impl<T: Transport> Dispatcher<T> {
    /// Create a dispatcher from its parts
    pub fn new(transport: T, resolver: ProxyResolver) -> Self {
        Self { transport, resolver }
    }

    /// Replace the proxy resolver
    pub fn with_resolver(mut self, resolver: ProxyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// The transport requests go through
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The proxy resolver
    pub fn resolver(&self) -> &ProxyResolver {
        &self.resolver
    }

    /// Execute `descriptor` and classify the response
    pub async fn execute<D>(&self, descriptor: &D) -> std::result::Result<D::Output, DispatchError>
    where
        D: RequestDescriptor,
    {
        let url = descriptor.url();
        let request = descriptor.request();

        let proxy = self.resolver.resolve(url);
        if let Some(endpoint) = &proxy {
            debug!(url = %url, proxy = %endpoint, "Using proxy @{}", endpoint);
        }

        debug!(url = %url, method = %request.method(), "starting request '{}'", url);
        let mut connection = self
            .transport
            .acquire(request.url(), proxy.as_ref())
            .await
            .map_err(|source| DispatchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let outcome = match connection.send(request).await {
            Ok(response) => {
                debug!(url = %url, status = response.status.as_u16(), "Response received");
                classify(descriptor, response)
            }
            Err(source) => Err(DispatchError::Transport {
                url: url.to_string(),
                source,
            }),
        };

        match connection.release().await {
            Ok(()) => outcome,
            Err(source) => {
                error!(url = %url, error = %source, "Error releasing connection");
                Err(DispatchError::Release {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }
}
