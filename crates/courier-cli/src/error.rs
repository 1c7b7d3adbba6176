//! Error types and handling for the CLI
//!
//! This module provides error types and utilities for handling
//! various failure modes in the CLI application.

use std::io;
use std::path::PathBuf;

use courier_core::http::{DispatchError, DispatchErrorKind, RequestError};

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from courier-core while building the dispatcher
    #[error("Core error: {0}")]
    Core(#[from] courier_core::Error),

    /// A dispatched request failed
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    /// File not found
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Invalid file format
    #[error("Invalid file format for {}: expected {} format", path.display(), expected)]
    InvalidFormat { path: PathBuf, expected: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument combination
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with context
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid arguments error
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }

    /// Create a generic error with message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 1,
            Self::Core(_) => 2,
            Self::FileNotFound { .. } => 3,
            Self::InvalidFormat { .. } => 4,
            Self::Config(_) => 5,
            Self::InvalidArgs(_) | Self::Request(_) => 6,
            Self::Dispatch(e) => match e.kind() {
                DispatchErrorKind::Api => 7,
                DispatchErrorKind::Transport => 8,
                DispatchErrorKind::ResponseParse => 9,
                DispatchErrorKind::Release => 10,
            },
            Self::Json(_) => 12,
            Self::Yaml(_) => 13,
            Self::Toml(_) => 14,
            Self::Other { .. } => 99,
        }
    }

    /// Check if this error should display usage help
    pub fn should_show_help(&self) -> bool {
        matches!(self, Self::InvalidArgs(_) | Self::Request(_))
    }
}

/// Format an error for display to the user
pub fn format_error(error: &Error, use_color: bool) -> String {
    let mut message = if use_color {
        use colored::Colorize;
        format!("{} {}", "Error:".red().bold(), error)
    } else {
        format!("Error: {}", error)
    };

    if let Error::Dispatch(dispatch) = error {
        if let Some(api) = dispatch.api_error() {
            message.push_str(&format!("\n  name: {}\n  message: {}", api.name, api.message));
            if let Some(code) = api.code {
                message.push_str(&format!("\n  code: {}", code));
            }
        } else if let Some(source) = std::error::Error::source(dispatch) {
            message.push_str(&format!("\n  caused by: {}", source));
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::http::{ApiError, StatusCode, TransportError, TransportErrorKind};

    fn api_failure() -> Error {
        let body =
            r#"{"status":"error","code":-1,"name":"Invalid_Key","message":"Invalid API key"}"#;
        Error::Dispatch(DispatchError::api(
            "https://mandrillapp.com/api/1.0/users/ping.json",
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::from_body(body, 500).unwrap(),
        ))
    }

    #[test]
    fn test_exit_codes_distinguish_dispatch_failures() {
        assert_eq!(api_failure().exit_code(), 7);

        let transport = Error::Dispatch(DispatchError::Transport {
            url: "https://x".to_string(),
            source: TransportError::new(TransportErrorKind::Connect, "refused"),
        });
        assert_eq!(transport.exit_code(), 8);

        let parse = Error::Dispatch(DispatchError::ResponseParse {
            url: "https://x".to_string(),
            source: "expected value".into(),
        });
        assert_eq!(parse.exit_code(), 9);

        assert_eq!(Error::config("bad").exit_code(), 5);
        assert_eq!(Error::other("boom").exit_code(), 99);
    }

    #[test]
    fn test_format_api_error() {
        let formatted = format_error(&api_failure(), false);
        assert!(formatted
            .starts_with("Error: Unexpected http status in response: 500 (Internal Server Error)"));
        assert!(formatted.contains("name: Invalid_Key"));
        assert!(formatted.contains("message: Invalid API key"));
        assert!(formatted.contains("code: -1"));
    }

    #[test]
    fn test_format_transport_error_shows_cause() {
        let error = Error::Dispatch(DispatchError::Transport {
            url: "https://x".to_string(),
            source: TransportError::new(TransportErrorKind::Timeout, "read timed out"),
        });
        let formatted = format_error(&error, false);
        assert!(formatted.contains("caused by: timeout error: read timed out"));
    }

    #[test]
    fn test_should_show_help() {
        assert!(Error::invalid_args("missing body").should_show_help());
        assert!(!Error::config("x").should_show_help());
    }
}
