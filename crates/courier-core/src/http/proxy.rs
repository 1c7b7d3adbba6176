//! Proxy detection for outgoing requests
//!
//! The platform proxy configuration is consulted on every request and never
//! cached, since it may change while the process runs. Detection is
//! best-effort: [`ProxyResolver::resolve`] turns every fault into "no proxy".

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

/// Scheme used to talk to the proxy itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
}

impl ProxyScheme {
    fn as_str(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
        }
    }
}

/// Basic-auth credentials for a proxy, kept percent-encoded as in the URL
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProxyCredentials {
    username: String,
    password: Option<String>,
}

impl ProxyCredentials {
    /// Credentials from percent-encoded URL userinfo parts
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// User name, percent-encoded
    pub fn username(&self) -> &str {
        &self.username
    }

    fn userinfo(&self) -> String {
        match &self.password {
            Some(password) => format!("{}:{}@", self.username, password),
            None => format!("{}@", self.username),
        }
    }
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A proxy server address
///
/// Credentials never appear in `Display` or serialized output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// Proxy host name or IP address
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Scheme of the proxy connection
    #[serde(default)]
    pub scheme: ProxyScheme,
    /// Basic-auth credentials sent to the proxy
    #[serde(skip)]
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyEndpoint {
    /// Create a plain-HTTP proxy endpoint without credentials
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            scheme: ProxyScheme::Http,
            credentials: None,
        }
    }

    /// Talk to the proxy over `scheme`
    pub fn with_scheme(mut self, scheme: ProxyScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Authenticate to the proxy with `credentials`
    pub fn with_credentials(mut self, credentials: ProxyCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Proxy URL understood by the HTTP client, userinfo included
    pub fn to_url(&self) -> String {
        let userinfo = self
            .credentials
            .as_ref()
            .map(ProxyCredentials::userinfo)
            .unwrap_or_default();
        format!("{}://{}{}:{}", self.scheme.as_str(), userinfo, self.host, self.port)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One routing option offered by a [`ProxySelector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyCandidate {
    /// Connect to the target directly
    Direct,
    /// Connect through this proxy
    Proxy(ProxyEndpoint),
}

impl ProxyCandidate {
    /// Proxy address, `None` for direct connections
    pub fn address(&self) -> Option<&ProxyEndpoint> {
        match self {
            ProxyCandidate::Direct => None,
            ProxyCandidate::Proxy(endpoint) => Some(endpoint),
        }
    }
}

/// Proxy detection errors
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid proxy in {variable} ('{value}'): {message}")]
    InvalidProxyUrl {
        variable: String,
        value: String,
        message: String,
    },

    #[error("Target URL has no host: {0}")]
    MissingHost(String),

    #[error("Proxy configuration unavailable: {0}")]
    Unavailable(String),
}

/// Source of proxy candidates for a target URL
pub trait ProxySelector: Send + Sync + fmt::Debug {
    /// Candidate routes for `target`, in order of preference
    fn select(&self, target: &Url) -> Result<Vec<ProxyCandidate>, ProxyError>;
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads the conventional proxy environment variables on every call
///
/// `HTTPS_PROXY` / `HTTP_PROXY` (by target scheme) come before `ALL_PROXY`;
/// lowercase spellings are honoured too. Hosts matching `NO_PROXY` are
/// reached directly. An `https://` proxy URL is contacted over TLS and any
/// `user:pass@` userinfo is sent as proxy basic auth.
#[derive(Clone)]
pub struct EnvProxySelector {
    lookup: EnvLookup,
}

impl EnvProxySelector {
    /// Read from the process environment
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Read variables through `lookup` instead of the process environment
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    fn var(&self, name: &str) -> Option<(String, String)> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| (name.to_string(), value))
    }

    fn first_var(&self, names: &[&str]) -> Option<(String, String)> {
        names.iter().find_map(|name| self.var(name))
    }

    fn bypasses(&self, host: &str) -> bool {
        match self.first_var(&["NO_PROXY", "no_proxy"]) {
            Some((_, value)) => no_proxy_matches(&value, host),
            None => false,
        }
    }
}

impl Default for EnvProxySelector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvProxySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvProxySelector").finish_non_exhaustive()
    }
}

impl ProxySelector for EnvProxySelector {
    fn select(&self, target: &Url) -> Result<Vec<ProxyCandidate>, ProxyError> {
        let host = target
            .host_str()
            .ok_or_else(|| ProxyError::MissingHost(target.to_string()))?;

        if self.bypasses(host) {
            return Ok(vec![ProxyCandidate::Direct]);
        }

        let scheme_vars: &[&str] = match target.scheme() {
            "https" => &["HTTPS_PROXY", "https_proxy"],
            "http" => &["HTTP_PROXY", "http_proxy"],
            _ => &[],
        };

        let fallback_vars: &[&str] = &["ALL_PROXY", "all_proxy"];

        let mut candidates = Vec::new();
        for names in [scheme_vars, fallback_vars] {
            if let Some((variable, value)) = self.first_var(names) {
                let endpoint = parse_proxy_value(&variable, &value)?;
                let candidate = ProxyCandidate::Proxy(endpoint);
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }

        candidates.push(ProxyCandidate::Direct);
        Ok(candidates)
    }
}

/// Always offers the same candidate
#[derive(Debug, Clone)]
pub struct StaticProxySelector {
    candidate: ProxyCandidate,
}

impl StaticProxySelector {
    /// Never use a proxy
    pub fn direct() -> Self {
        Self {
            candidate: ProxyCandidate::Direct,
        }
    }

    /// Always use `endpoint`
    pub fn proxy(endpoint: ProxyEndpoint) -> Self {
        Self {
            candidate: ProxyCandidate::Proxy(endpoint),
        }
    }
}

impl ProxySelector for StaticProxySelector {
    fn select(&self, _target: &Url) -> Result<Vec<ProxyCandidate>, ProxyError> {
        Ok(vec![self.candidate.clone()])
    }
}

/// Ignores the environment and always connects directly
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProxySelector;

impl ProxySelector for NoProxySelector {
    fn select(&self, _target: &Url) -> Result<Vec<ProxyCandidate>, ProxyError> {
        Ok(vec![ProxyCandidate::Direct])
    }
}

/// Parse a proxy variable value such as `http://proxy:3128` or `proxy:3128`
fn parse_proxy_value(variable: &str, value: &str) -> Result<ProxyEndpoint, ProxyError> {
    let invalid = |message: String| ProxyError::InvalidProxyUrl {
        variable: variable.to_string(),
        value: value.to_string(),
        message,
    };

    let with_scheme = if value.contains("://") {
        value.to_string()
    } else {
        format!("http://{}", value)
    };

    let url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported proxy scheme '{}'", url.scheme())));
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("missing host".to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port".to_string()))?;

    let scheme = match url.scheme() {
        "https" => ProxyScheme::Https,
        _ => ProxyScheme::Http,
    };
    let mut endpoint = ProxyEndpoint::new(host, port).with_scheme(scheme);
    if !url.username().is_empty() {
        let password = url.password().map(str::to_string);
        endpoint = endpoint.with_credentials(ProxyCredentials::new(url.username(), password));
    }

    Ok(endpoint)
}

/// Check `host` against a comma separated `NO_PROXY` list
fn no_proxy_matches(no_proxy: &str, host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();

    no_proxy
        .split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            if entry == "*" {
                return true;
            }
            let domain = entry.trim_start_matches("*.").trim_start_matches('.');
            // Entries may carry a port; routing decisions here are per host
            let domain = match domain.rsplit_once(':') {
                Some((name, port))
                    if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
                {
                    name
                }
                _ => domain,
            };
            let domain = domain.trim_start_matches('[').trim_end_matches(']');
            host == domain || host.ends_with(&format!(".{}", domain))
        })
}

/// Resolves the proxy to use for a request, never failing
#[derive(Debug, Clone)]
pub struct ProxyResolver {
    selector: Arc<dyn ProxySelector>,
}

impl ProxyResolver {
    /// Resolve through `selector`
    pub fn new(selector: Arc<dyn ProxySelector>) -> Self {
        Self { selector }
    }

    /// Resolve from the process environment
    pub fn from_env() -> Self {
        Self::new(Arc::new(EnvProxySelector::new()))
    }

    /// Never use a proxy
    pub fn direct() -> Self {
        Self::new(Arc::new(NoProxySelector))
    }

    /// First proxy with an address for `url`, or `None`
    ///
    /// Malformed URLs, selector errors and selector panics are logged and
    /// reported as "no proxy". Later candidates are not consulted once one
    /// with an address was found.
    pub fn resolve(&self, url: &str) -> Option<ProxyEndpoint> {
        let target = match Url::parse(url) {
            Ok(target) => target,
            Err(e) => {
                error!(url = %url, error = %e, "Error detecting proxy server");
                return None;
            }
        };

        let selected = catch_unwind(AssertUnwindSafe(|| self.selector.select(&target)));
        match selected {
            Ok(Ok(candidates)) => {
                let proxy = candidates.into_iter().find_map(|candidate| match candidate {
                    ProxyCandidate::Proxy(endpoint) => Some(endpoint),
                    ProxyCandidate::Direct => None,
                });
                if proxy.is_none() {
                    debug!(url = %url, "No proxy detected");
                }
                proxy
            }
            Ok(Err(e)) => {
                error!(url = %url, error = %e, "Error detecting proxy server");
                None
            }
            Err(_) => {
                error!(url = %url, "Proxy selector panicked; continuing without proxy");
                None
            }
        }
    }
}

impl Default for ProxyResolver {
    fn default() -> Self {
        Self::from_env()
    }
}
