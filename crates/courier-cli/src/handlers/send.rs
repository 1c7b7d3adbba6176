//! Send command handler

use crate::cli::SendArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::redaction;
use crate::logging::timing::Timer;
use crate::output::OutputWriter;
use courier_core::http::{
    parse_method, ApiRequest, Method, ParseError, ProxyResolver, RequestDescriptor, StatusCode,
};
use courier_core::Dispatcher;
use serde_json::Value;
use std::fs;
use tracing::{debug, info, instrument};

/// A request typed in on the command line
///
/// Success bodies are read as arbitrary JSON; an empty body yields `null`.
#[derive(Debug)]
pub struct CliRequest {
    request: ApiRequest,
    expected: Vec<u16>,
}

impl CliRequest {
    pub fn new(request: ApiRequest, expected: Vec<u16>) -> Self {
        Self { request, expected }
    }
}

impl RequestDescriptor for CliRequest {
    type Output = Value;

    fn request(&self) -> &ApiRequest {
        &self.request
    }

    fn is_success(&self, status: StatusCode) -> bool {
        if self.expected.is_empty() {
            status.is_success()
        } else {
            self.expected.contains(&status.as_u16())
        }
    }

    fn parse_success(&self, body: &str) -> std::result::Result<Value, ParseError> {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(body)?)
    }
}

/// Split a `Name: value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| {
            Error::invalid_args(format!("Header '{}' must look like 'Name: value'", raw))
        })?;

    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_args(format!("Header '{}' has an empty name", raw)));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

/// Read the request body from `--data` or `--data-file`, checking it is JSON
fn load_body(args: &SendArgs) -> Result<Option<String>> {
    let body = match (&args.data, &args.data_file) {
        (Some(data), _) => data.clone(),
        (None, Some(path)) => {
            if !path.exists() {
                return Err(Error::FileNotFound { path: path.clone() });
            }
            fs::read_to_string(path)?
        }
        (None, None) => return Ok(None),
    };

    serde_json::from_str::<Value>(&body).map_err(|e| Error::InvalidFormat {
        path: args.data_file.clone().unwrap_or_else(|| "--data".into()),
        expected: format!("JSON ({})", e),
    })?;

    Ok(Some(body))
}

/// Assemble the request from the arguments and configured default headers
pub fn build_request(args: &SendArgs, config: &Config) -> Result<CliRequest> {
    let body = load_body(args)?;

    let method = match &args.method {
        Some(method) => parse_method(method)?,
        None if body.is_some() => Method::POST,
        None => Method::GET,
    };

    let mut request = ApiRequest::new(method, &args.url)?;

    for (name, value) in &config.headers {
        request = request.header(name, value)?;
    }

    if let Some(body) = body {
        request = request.header("Content-Type", "application/json")?.with_body(body);
    }

    // Command-line headers win over configured ones
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        request = request.header(&name, &value)?;
    }

    Ok(CliRequest::new(request, args.expect_status.clone()))
}

/// Handle the send command
#[instrument(skip(args, config, output), fields(url = %args.url))]
pub async fn handle_send(args: SendArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let _timer = Timer::start_for("send_command", &args.url);
    info!("Starting send command execution");

    let descriptor = build_request(&args, config)?;
    if let Some(body) = descriptor.request().body() {
        debug!(
            body = %redaction::redact_sensitive(&String::from_utf8_lossy(body)),
            "Request body prepared"
        );
    }

    let mut dispatcher = Dispatcher::from_config(config.dispatcher.clone())?;
    if args.no_proxy {
        dispatcher = dispatcher.with_resolver(ProxyResolver::direct());
    }
    let proxy = dispatcher.resolver().resolve(&args.url);

    let pb = output.spinner(&format!("{} {}", descriptor.request().method(), args.url));
    let timer = Timer::start("dispatch");
    let result = dispatcher.execute(&descriptor).await;
    let elapsed = timer.elapsed();
    drop(timer);
    dispatcher.close();

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if args.metrics {
        output.section("Execution Metrics")?;
        output.field("Method", descriptor.request().method().as_str())?;
        let route = proxy
            .map(|p| p.to_string())
            .unwrap_or_else(|| "direct".to_string());
        output.field("Proxy", &route)?;
        output.field("Execution Time", &format!("{:.2}s", elapsed.as_secs_f64()))?;
        output.field(
            "Outcome",
            match &result {
                Ok(_) => "success",
                Err(_) => "failure",
            },
        )?;
    }

    let value = match result {
        Ok(value) => value,
        Err(e) => {
            if output.format() != crate::cli::OutputFormat::Human {
                if let Some(api) = e.api_error() {
                    output.data(api)?;
                }
            }
            return Err(e.into());
        }
    };

    if let Some(path) = &args.save_to {
        debug!("Writing response to file: {}", path.display());
        fs::write(path, output.format().render(&value)?)?;
        output.success(&format!("✓ Response saved to {}", path.display()))?;
    } else {
        output.section("Response")?;
        output.data(&value)?;
    }

    Ok(())
}
