//! Courier Core - pooled, TLS-secured request dispatcher for JSON API clients
//!
//! Given a typed description of a request, the dispatcher sends it over a
//! pooled HTTPS connection, routes it through the system proxy when one is
//! configured, and turns the response into either a typed value or a
//! structured API error.
//!
//! # Main Components
//!
//! - **Configuration**: [`DispatcherConfig`] with timeouts, pool limits and TLS settings
//! - **Connection Pool**: shared clients with per-route concurrency caps
//! - **Proxy Resolver**: per-request, fail-open proxy detection
//! - **Dispatcher**: request execution and response classification
//!
//! # Example
//!
//! ```no_run
//! use courier_core::http::{ApiRequest, JsonRequest};
//! use courier_core::{Dispatcher, DispatcherConfig};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Pong {
//!     #[serde(rename = "PING")]
//!     ping: String,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::from_config(DispatcherConfig::default().merge_with_env()?)?;
//! let request = ApiRequest::post_json(
//!     "https://mandrillapp.com/api/1.0/users/ping2.json",
//!     &serde_json::json!({"key": "example-key"}),
//! )?;
//! let pong: Pong = dispatcher.execute(&JsonRequest::new(request)).await?;
//! println!("{}", pong.ping);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;

// Re-export main types for convenience
pub use config::DispatcherConfig;
pub use error::{Error, Result};
pub use http::{
    ApiError, ApiRequest, DispatchError, DispatchErrorKind, Dispatcher, JsonRequest, ProxyEndpoint,
    RequestDescriptor,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent when none is configured
pub fn default_user_agent() -> String {
    format!("/courier-{}", VERSION)
}
