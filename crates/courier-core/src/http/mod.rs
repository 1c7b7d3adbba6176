//! Pooled HTTP dispatch for JSON API clients
//!
//! This module provides:
//! - TLS and timeout settings shared by every pooled client
//! - A connection pool bounded per destination route
//! - Per-request proxy detection that never fails a request
//! - Request execution with guaranteed connection release
//! - Classification of responses into typed values or API errors

pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod proxy;
pub mod request;
pub mod timeout;
pub mod tls;
pub mod transport;

pub use classifier::classify;
pub use dispatcher::Dispatcher;
pub use error::{
    ApiError, DispatchError, DispatchErrorKind, ParseError, TransportError, TransportErrorKind,
    INVALID_ERROR_FORMAT,
};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledClient, Route, DEFAULT_MAX_PER_ROUTE};
pub use proxy::{
    EnvProxySelector, NoProxySelector, ProxyCandidate, ProxyCredentials, ProxyEndpoint, ProxyError,
    ProxyResolver, ProxyScheme, ProxySelector, StaticProxySelector,
};
pub use request::{parse_method, ApiRequest, JsonRequest, RequestDescriptor, RequestError};
pub use timeout::TimeoutConfig;
pub use tls::{TlsConfig, TlsConfigError, TlsVersion, MINIMUM_TLS_VERSION};
pub use transport::{Connection, RawResponse, Transport};

// Re-export commonly used types
pub use reqwest::{Method, StatusCode};
