//! Dispatch failure taxonomy and the structured API error
//!
//! A dispatch ends in exactly one of four failure kinds: the transport
//! failed, the server answered with a non-success status ([`ApiError`]),
//! a success body could not be parsed, or releasing the connection failed.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Message used for both message fields when an error body is unreadable
pub const INVALID_ERROR_FORMAT: &str = "Invalid Error Format";

/// Boxed error returned by success-body parsers
pub type ParseError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error reported by the remote API
///
/// The JSON shape is `{"status": "error", "code": -1, "name": "Invalid_Key",
/// "message": "..."}`. Any JSON object is accepted: absent or `null` fields
/// read as empty, so a body carrying only `name` still keeps it.
/// `raw_body` and `status_code` are filled in from the HTTP response and
/// never come from the body itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// API-level status marker, usually `"error"`
    #[serde(default)]
    pub status: Option<String>,
    /// API-specific error code
    #[serde(default)]
    pub code: Option<i64>,
    /// Short error name
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    /// Detailed, human-readable message
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
    /// Response body exactly as received
    #[serde(skip_deserializing, default)]
    pub raw_body: String,
    /// HTTP status code of the response
    #[serde(skip_deserializing, default)]
    pub status_code: u16,
}

impl ApiError {
    /// Parse an error body, keeping the raw body and status alongside
    ///
    /// Fails for anything but a JSON object, including `null` and arrays.
    pub fn from_body(body: &str, status_code: u16) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("error body is not a JSON object"));
        }

        let mut error: ApiError = serde_json::from_value(value)?;
        error.raw_body = body.to_string();
        error.status_code = status_code;
        Ok(error)
    }

    /// Build the fixed shape used when an error body cannot be parsed
    pub fn invalid_format(body: &str, status_code: u16) -> Self {
        Self {
            status: None,
            code: None,
            name: INVALID_ERROR_FORMAT.to_string(),
            message: INVALID_ERROR_FORMAT.to_string(),
            raw_body: body.to_string(),
            status_code,
        }
    }

    /// Whether this error was synthesized from an unparseable body
    pub fn is_fallback(&self) -> bool {
        self.status.is_none()
            && self.code.is_none()
            && self.name == INVALID_ERROR_FORMAT
            && self.message == INVALID_ERROR_FORMAT
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (HTTP {}): {}", self.name, self.status_code, self.message)
    }
}

/// Category of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// Connection could not be established (refused, DNS, TLS handshake)
    Connect,
    /// Connect or read timed out
    Timeout,
    /// No pool slot became free within the connection request timeout
    PoolTimeout,
    /// The pool was closed
    PoolClosed,
    /// Reading the response body failed
    Body,
    /// The request could not be built or sent
    Request,
    /// Anything else
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::PoolTimeout => write!(f, "pool timeout"),
            TransportErrorKind::PoolClosed => write!(f, "pool closed"),
            TransportErrorKind::Body => write!(f, "body"),
            TransportErrorKind::Request => write!(f, "request"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

/// I/O-level failure while talking to the remote host
#[derive(Debug, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl TransportError {
    /// Create a transport error without an underlying cause
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_body() || error.is_decode() {
            TransportErrorKind::Body
        } else if error.is_request() || error.is_builder() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        Self::new(kind, error.to_string()).with_source(error)
    }

    /// The failure category
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Check if the failure was a timeout of any phase
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Timeout | TransportErrorKind::PoolTimeout)
    }
}

/// Coarse failure kind of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchErrorKind {
    /// Connection, I/O or timeout failure
    Transport,
    /// Non-success HTTP status
    Api,
    /// Success status with an unparseable body
    ResponseParse,
    /// Releasing the connection failed
    Release,
}

/// Failure of a single dispatch
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request never produced a response
    #[error("Transport failure for request '{url}': {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// The server answered with a status the request does not accept
    #[error("{message}")]
    Api {
        url: String,
        message: String,
        error: ApiError,
    },

    /// The server reported success but the body could not be parsed
    #[error("Failed to parse response from request '{url}'")]
    ResponseParse {
        url: String,
        #[source]
        source: ParseError,
    },

    /// The connection could not be released after the exchange
    #[error("Error releasing connection for request '{url}'")]
    Release {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    /// Build the API failure for a rejected status, using its canonical
    /// reason phrase
    pub fn api(url: impl Into<String>, status: reqwest::StatusCode, error: ApiError) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unknown");
        Self::api_with_reason(url, status, reason, error)
    }

    /// Build the API failure with the reason phrase the server sent
    pub fn api_with_reason(
        url: impl Into<String>,
        status: reqwest::StatusCode,
        reason: &str,
        error: ApiError,
    ) -> Self {
        let message = format!(
            "Unexpected http status in response: {} ({})",
            status.as_u16(),
            reason
        );

        Self::Api {
            url: url.into(),
            message,
            error,
        }
    }

    /// The failure kind
    pub fn kind(&self) -> DispatchErrorKind {
        match self {
            DispatchError::Transport { .. } => DispatchErrorKind::Transport,
            DispatchError::Api { .. } => DispatchErrorKind::Api,
            DispatchError::ResponseParse { .. } => DispatchErrorKind::ResponseParse,
            DispatchError::Release { .. } => DispatchErrorKind::Release,
        }
    }

    /// URL of the request that failed
    pub fn url(&self) -> &str {
        match self {
            DispatchError::Transport { url, .. }
            | DispatchError::Api { url, .. }
            | DispatchError::ResponseParse { url, .. }
            | DispatchError::Release { url, .. } => url,
        }
    }

    /// The structured API error, for `Api` failures
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            DispatchError::Api { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The HTTP status code, when a response was received
    pub fn status_code(&self) -> Option<u16> {
        self.api_error().map(|error| error.status_code)
    }

    /// The transport failure, for `Transport` failures
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            DispatchError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_api_error_from_body() {
        let body = r#"{"status":"error","code":-1,"name":"Invalid_Key","message":"bad key"}"#;
        let error = ApiError::from_body(body, 500).unwrap();
        assert_eq!(error.status.as_deref(), Some("error"));
        assert_eq!(error.code, Some(-1));
        assert_eq!(error.name, "Invalid_Key");
        assert_eq!(error.message, "bad key");
        assert_eq!(error.raw_body, body);
        assert_eq!(error.status_code, 500);
        assert!(!error.is_fallback());
    }

    #[test]
    fn test_body_cannot_override_response_fields() {
        let body = r#"{"name":"X","message":"y","raw_body":"forged","status_code":200}"#;
        let error = ApiError::from_body(body, 503).unwrap();
        assert_eq!(error.raw_body, body);
        assert_eq!(error.status_code, 503);
    }

    #[test]
    fn test_api_error_rejects_non_error_shapes() {
        assert!(ApiError::from_body("not json", 500).is_err());
        assert!(ApiError::from_body("", 500).is_err());
        assert!(ApiError::from_body("null", 500).is_err());
        assert!(ApiError::from_body("[]", 500).is_err());
        assert!(ApiError::from_body(r#""Invalid_Key""#, 500).is_err());
        assert!(ApiError::from_body(r#"{"name":42}"#, 500).is_err());
    }

    #[test]
    fn test_partial_error_body_keeps_name_and_code() {
        let body = r#"{"status":"error","code":-1,"name":"Invalid_Key","message":null}"#;
        let error = ApiError::from_body(body, 500).unwrap();
        assert_eq!(error.name, "Invalid_Key");
        assert_eq!(error.code, Some(-1));
        assert_eq!(error.message, "");
        assert!(!error.is_fallback());

        let body = r#"{"status":"error","code":-1,"name":"ValidationError"}"#;
        let error = ApiError::from_body(body, 400).unwrap();
        assert_eq!(error.name, "ValidationError");
        assert_eq!(error.message, "");

        let error = ApiError::from_body(r#"{"unexpected":true}"#, 500).unwrap();
        assert_eq!(error.name, "");
        assert!(error.code.is_none());
    }

    #[test]
    fn test_invalid_format_fallback() {
        let error = ApiError::invalid_format("<html>oops</html>", 502);
        assert_eq!(error.name, INVALID_ERROR_FORMAT);
        assert_eq!(error.message, INVALID_ERROR_FORMAT);
        assert_eq!(error.raw_body, "<html>oops</html>");
        assert_eq!(error.status_code, 502);
        assert!(error.is_fallback());
    }

    #[test]
    fn test_api_dispatch_error_message() {
        let error = DispatchError::api(
            "https://api.example.com/users/ping.json",
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::invalid_format("", 500),
        );
        assert_eq!(
            error.to_string(),
            "Unexpected http status in response: 500 (Internal Server Error)"
        );
        assert_eq!(error.kind(), DispatchErrorKind::Api);
        assert_eq!(error.status_code(), Some(500));
        assert_eq!(error.url(), "https://api.example.com/users/ping.json");
    }

    #[test]
    fn test_unknown_reason_phrase() {
        let status = StatusCode::from_u16(599).unwrap();
        let error = DispatchError::api("https://x", status, ApiError::invalid_format("", 599));
        assert_eq!(error.to_string(), "Unexpected http status in response: 599 (Unknown)");

        let error = DispatchError::api_with_reason(
            "https://x",
            status,
            "Upstream Melted",
            ApiError::invalid_format("", 599),
        );
        assert_eq!(
            error.to_string(),
            "Unexpected http status in response: 599 (Upstream Melted)"
        );
    }

    #[test]
    fn test_dispatch_error_kinds() {
        let transport = DispatchError::Transport {
            url: "https://x".to_string(),
            source: TransportError::new(TransportErrorKind::PoolTimeout, "no free slot"),
        };
        assert_eq!(transport.kind(), DispatchErrorKind::Transport);
        assert!(transport.transport_error().unwrap().is_timeout());
        assert!(transport.api_error().is_none());
        assert!(transport.status_code().is_none());

        let parse = DispatchError::ResponseParse {
            url: "https://x".to_string(),
            source: "expected value".into(),
        };
        assert_eq!(parse.kind(), DispatchErrorKind::ResponseParse);
        assert_eq!(parse.to_string(), "Failed to parse response from request 'https://x'");

        let release = DispatchError::Release {
            url: "https://x".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reset"),
        };
        assert_eq!(release.kind(), DispatchErrorKind::Release);
    }

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::new(TransportErrorKind::Connect, "connection refused");
        assert_eq!(error.to_string(), "connect error: connection refused");
        assert_eq!(error.kind(), TransportErrorKind::Connect);
        assert!(!error.is_timeout());
    }
}
