//! Transport seam between the dispatcher and the HTTP stack
//!
//! The dispatcher only needs to acquire a connection, send one request on it
//! and give it back. [`ConnectionPool`] is the production implementation;
//! tests substitute their own to observe the lease lifecycle.

use async_trait::async_trait;
use hyper::ext::ReasonPhrase;
use reqwest::StatusCode;
use url::Url;

use crate::http::error::{TransportError, TransportErrorKind};
use crate::http::pool::{ConnectionPool, PooledClient};
use crate::http::proxy::ProxyEndpoint;
use crate::http::request::ApiRequest;

/// A fully read HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Response status
    pub status: StatusCode,
    /// Complete response body
    pub body: String,
    /// Reason phrase sent by the server when it differs from the canonical one
    pub reason: Option<String>,
}

impl RawResponse {
    /// Create a response from its parts
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            reason: None,
        }
    }

    /// Record the reason phrase the server sent
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Reason phrase for the status line: the server's own, else the
    /// canonical one, else `"Unknown"`
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("Unknown")
    }
}

/// hyper only records a reason phrase when it is not the canonical one
fn custom_reason(phrase: Option<&ReasonPhrase>) -> Option<String> {
    phrase
        .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).trim().to_string())
        .filter(|phrase| !phrase.is_empty())
}

/// Source of connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connection handed out by [`Transport::acquire`]
    type Connection: Connection;

    /// Acquire a connection for `url`, routed through `proxy` when given
    async fn acquire(
        &self,
        url: &Url,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<Self::Connection, TransportError>;
}

/// A leased connection
#[async_trait]
pub trait Connection: Send + Sized {
    /// Send `request` and read the whole response body
    async fn send(&mut self, request: &ApiRequest) -> Result<RawResponse, TransportError>;

    /// Give the connection back to its transport
    async fn release(self) -> std::io::Result<()>;
}

#[async_trait]
impl Transport for ConnectionPool {
    type Connection = PooledClient;

    async fn acquire(
        &self,
        url: &Url,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<PooledClient, TransportError> {
        self.lease(url, proxy).await
    }
}

#[async_trait]
impl Connection for PooledClient {
    async fn send(&mut self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let response = request
            .to_reqwest(self.client())
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let reason = custom_reason(response.extensions().get::<ReasonPhrase>());
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::from_reqwest(e)
            } else {
                TransportError::new(
                    TransportErrorKind::Body,
                    format!("failed to read response body: {}", e),
                )
                .with_source(e)
            }
        })?;

        Ok(RawResponse {
            status,
            body,
            reason,
        })
    }

    async fn release(self) -> std::io::Result<()> {
        self.return_slots();
        Ok(())
    }
}
