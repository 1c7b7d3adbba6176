//! Shared test support utilities for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::http::{
    ApiRequest, Connection, ProxyCandidate, ProxyEndpoint, ProxyError, ProxySelector, RawResponse,
    StatusCode, Transport, TransportError, TransportErrorKind,
};
use url::Url;

/// What a fake connection does when used
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer with this status and body
    Respond(u16, String),
    /// Fail while sending
    SendFails,
    /// Fail while acquiring
    AcquireFails,
    /// Answer, then fail while releasing
    ReleaseFails(u16, String),
}

impl Behavior {
    pub fn respond(status: u16, body: &str) -> Self {
        Behavior::Respond(status, body.to_string())
    }
}

/// One acquire observed by the fake transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub host: String,
    pub proxy: Option<ProxyEndpoint>,
}

/// Lease bookkeeping shared between a transport and its connections
#[derive(Debug, Default)]
pub struct LeaseCounters {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub sent: AtomicUsize,
    pub acquisitions: Mutex<Vec<Acquisition>>,
}

impl LeaseCounters {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> Vec<Acquisition> {
        self.acquisitions.lock().unwrap().clone()
    }
}

/// Transport that never touches the network
#[derive(Debug, Clone)]
pub struct FakeTransport {
    pub counters: Arc<LeaseCounters>,
    behavior: Behavior,
    latency: Duration,
}

impl FakeTransport {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            counters: Arc::new(LeaseCounters::default()),
            behavior,
            latency: Duration::ZERO,
        }
    }

    /// Delay every send, so concurrent dispatches interleave
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Connection = FakeConnection;

    async fn acquire(
        &self,
        url: &Url,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<FakeConnection, TransportError> {
        if let Behavior::AcquireFails = self.behavior {
            return Err(TransportError::new(TransportErrorKind::PoolTimeout, "no free slot"));
        }

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        self.counters.acquisitions.lock().unwrap().push(Acquisition {
            host: url.host_str().unwrap_or_default().to_string(),
            proxy: proxy.cloned(),
        });

        Ok(FakeConnection {
            counters: Arc::clone(&self.counters),
            behavior: self.behavior.clone(),
            latency: self.latency,
            proxy: proxy.cloned(),
        })
    }
}

/// Connection handed out by [`FakeTransport`]
#[derive(Debug)]
pub struct FakeConnection {
    counters: Arc<LeaseCounters>,
    behavior: Behavior,
    latency: Duration,
    proxy: Option<ProxyEndpoint>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send(&mut self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.counters.sent.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match &self.behavior {
            Behavior::Respond(status, body) | Behavior::ReleaseFails(status, body) => {
                // Echo the route back so tests can check which proxy carried the request
                let proxy = self
                    .proxy
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "direct".to_string());
                let body = body
                    .replace("{host}", request.url().host_str().unwrap_or_default())
                    .replace("{proxy}", &proxy);
                Ok(RawResponse::new(StatusCode::from_u16(*status).unwrap(), body))
            }
            Behavior::SendFails => Err(TransportError::new(
                TransportErrorKind::Connect,
                "connection refused",
            )),
            Behavior::AcquireFails => unreachable!("acquire already failed"),
        }
    }

    async fn release(self) -> io::Result<()> {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::ReleaseFails(..) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "socket already closed",
            )),
            _ => Ok(()),
        }
    }
}

/// Selector mapping target hosts to proxies
#[derive(Debug, Default)]
pub struct HostProxySelector {
    proxies: HashMap<String, ProxyEndpoint>,
}

impl HostProxySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, host: &str, proxy: ProxyEndpoint) -> Self {
        self.proxies.insert(host.to_string(), proxy);
        self
    }
}

impl ProxySelector for HostProxySelector {
    fn select(&self, target: &Url) -> Result<Vec<ProxyCandidate>, ProxyError> {
        let host = target.host_str().unwrap_or_default();
        Ok(match self.proxies.get(host) {
            Some(proxy) => vec![ProxyCandidate::Proxy(proxy.clone())],
            None => vec![ProxyCandidate::Direct],
        })
    }
}

/// Selector that always reports a platform failure
#[derive(Debug)]
pub struct BrokenSelector;

impl ProxySelector for BrokenSelector {
    fn select(&self, _target: &Url) -> Result<Vec<ProxyCandidate>, ProxyError> {
        Err(ProxyError::Unavailable("proxy auto-config script failed".to_string()))
    }
}

/// Selector that panics
#[derive(Debug)]
pub struct PanickingSelector;

impl ProxySelector for PanickingSelector {
    fn select(&self, _target: &Url) -> Result<Vec<ProxyCandidate>, ProxyError> {
        panic!("proxy selector crashed");
    }
}
