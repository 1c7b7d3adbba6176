//! Tracing setup for the `courier` binary
//!
//! Events go to stderr so stdout stays reserved for command output. Each run
//! gets a session id that is attached to every operation span.

use std::io::{self, IsTerminal};
use std::str::FromStr;
use std::sync::OnceLock;

use tracing::{field, Span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Environment variable selecting the log format
pub const LOG_FORMAT_ENV: &str = "COURIER_LOG_FORMAT";

static SESSION_ID: OnceLock<String> = OnceLock::new();

/// Log line layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::config(format!(
                "unknown log format '{}' (expected compact, full or json)",
                other
            ))),
        }
    }
}

/// How the subscriber is set up for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives
    pub filter: String,
    pub format: LogFormat,
    /// Colored output, only honoured when stderr is a terminal
    pub ansi: bool,
    /// Thread ids, source locations and span close timings
    pub detailed: bool,
}

impl LoggingConfig {
    /// Map `-v` counts to filters
    ///
    /// `-vv` turns on debug output for courier's own crates only; `-vvv`
    /// traces everything, reqwest and hyper included.
    pub fn from_verbosity(verbosity: u8) -> Self {
        let (filter, format, detailed) = match verbosity {
            0 => ("warn", LogFormat::Compact, false),
            1 => ("info", LogFormat::Compact, false),
            2 => ("warn,courier=debug,courier_core=debug", LogFormat::Compact, true),
            _ => ("trace", LogFormat::Full, true),
        };

        Self {
            filter: filter.to_string(),
            format,
            ansi: true,
            detailed,
        }
    }

    /// Only errors, no colors
    pub fn quiet() -> Self {
        Self {
            filter: "error".to_string(),
            format: LogFormat::Compact,
            ansi: false,
            detailed: false,
        }
    }

    /// Apply `RUST_LOG` and `COURIER_LOG_FORMAT` read through `lookup`
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.trim().is_empty()) {
            self.filter = filter;
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            self.format = format.parse()?;
        }
        Ok(self)
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| Error::config(format!("invalid log filter '{}': {}", config.filter, e)))?;

    let ansi = config.ansi && io::stderr().is_terminal();
    let span_events = if config.detailed {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_writer(io::stderr)
        .with_thread_ids(config.detailed)
        .with_file(config.detailed)
        .with_line_number(config.detailed)
        .with_span_events(span_events);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Compact => base.with_ansi(ansi).compact().boxed(),
        LogFormat::Full => base.with_ansi(ansi).boxed(),
        LogFormat::Json => base.with_ansi(false).json().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| Error::other(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(
        session = session_id(),
        filter = %config.filter,
        format = ?config.format,
        "Logging initialized"
    );
    Ok(())
}

/// Id shared by every span of this run
pub fn session_id() -> &'static str {
    SESSION_ID.get_or_init(|| format!("run_{}", Uuid::new_v4().simple()))
}

/// Span for one named operation, optionally about a target such as a URL
pub fn operation_span(name: &str, target: Option<&str>) -> Span {
    tracing::info_span!(
        "operation",
        op = name,
        subject = target.unwrap_or(""),
        session = session_id(),
        elapsed_ms = field::Empty,
    )
}

/// Masking of credentials before they reach a log line
pub mod redaction {
    use regex::Regex;
    use serde_json::Value;
    use std::sync::OnceLock;

    /// Key fragments whose values are never logged
    const SENSITIVE_KEY_PARTS: &[&str] = &["key", "token", "secret", "password", "auth"];

    static CREDENTIAL: OnceLock<Option<Regex>> = OnceLock::new();

    // `"key": "md-..."`, `api_key=...`, `token: ...` and `Bearer ...`
    fn credential_pattern() -> Option<&'static Regex> {
        CREDENTIAL
            .get_or_init(|| {
                Regex::new(concat!(
                    r#"(?i)((?:"?\b(?:api[_-]?key|key|token|secret|password)"?\s*[:=]\s*"?)"#,
                    r#"|(?:\bbearer\s+))[A-Za-z0-9_.\-]{6,}"#,
                ))
                .ok()
            })
            .as_ref()
    }

    /// Mask credential values in free text, such as a raw request body
    pub fn redact_sensitive(input: &str) -> String {
        match credential_pattern() {
            Some(pattern) => pattern.replace_all(input, "${1}***").into_owned(),
            None => input.to_string(),
        }
    }

    /// Mask sensitive keys in a JSON document, in place
    pub fn redact_json_value(value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    if is_sensitive_key(key) {
                        *val = Value::String("***".to_string());
                    } else {
                        redact_json_value(val);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(redact_json_value),
            Value::String(text) => *text = redact_sensitive(text),
            _ => {}
        }
    }

    /// Whether a JSON key or header name names a credential
    pub fn is_sensitive_key(key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        SENSITIVE_KEY_PARTS.iter().any(|part| key.contains(part))
    }
}

/// Wall-clock timing of CLI operations
pub mod timing {
    use std::time::{Duration, Instant};
    use tracing::Span;

    /// Records `elapsed_ms` on its operation span when dropped
    pub struct Timer {
        started: Instant,
        span: Span,
    }

    impl Timer {
        pub fn start(name: &str) -> Self {
            Self::with_span(super::operation_span(name, None))
        }

        pub fn start_for(name: &str, target: &str) -> Self {
            Self::with_span(super::operation_span(name, Some(target)))
        }

        fn with_span(span: Span) -> Self {
            Self {
                started: Instant::now(),
                span,
            }
        }

        pub fn elapsed(&self) -> Duration {
            self.started.elapsed()
        }
    }

    impl Drop for Timer {
        fn drop(&mut self) {
            let elapsed_ms = self.started.elapsed().as_millis() as u64;
            self.span.record("elapsed_ms", &elapsed_ms);
            self.span.in_scope(|| tracing::debug!(elapsed_ms, "Operation finished"));
        }
    }
}
