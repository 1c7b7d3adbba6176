//! Error types for the Courier core library
//!
//! Construction-time failures (configuration, TLS setup, client building)
//! live here. Failures of an individual dispatch are modelled separately by
//! [`crate::http::DispatchError`] so callers can tell the two apart.

use thiserror::Error;

use crate::http::tls::TlsConfigError;

/// Main error type for building and configuring a dispatcher
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// TLS settings could not be honoured
    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsConfigError),

    /// The underlying HTTP client could not be constructed
    #[error("HTTP client construction failed: {message}")]
    ClientBuild {
        message: String,
        #[source]
        source: reqwest::Error,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// A process-wide dispatcher was already installed
    #[error("Global dispatcher already initialized")]
    AlreadyInitialized,
}

impl Error {
    /// Create a configuration error without an underlying cause
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;
