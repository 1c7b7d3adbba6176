//! Proxy command handler

use crate::cli::{OutputFormat, ProxyArgs};
use crate::error::Result;
use crate::output::OutputWriter;
use courier_core::http::{ApiRequest, ProxyEndpoint, ProxyResolver};
use serde::Serialize;

/// What the resolver picked for a URL
#[derive(Debug, Serialize)]
struct ProxyReport<'a> {
    url: &'a str,
    proxy: Option<ProxyEndpoint>,
}

/// Handle the proxy command
pub fn handle_proxy(args: ProxyArgs, output: &mut OutputWriter) -> Result<()> {
    // Reject malformed URLs up front instead of silently reporting "direct"
    ApiRequest::get(&args.url)?;

    let proxy = ProxyResolver::from_env().resolve(&args.url);

    if output.format() == OutputFormat::Human {
        match &proxy {
            Some(endpoint) => output.writeln(&format!("{} -> proxy {}", args.url, endpoint))?,
            None => output.writeln(&format!("{} -> direct", args.url))?,
        }
        return Ok(());
    }

    output.data(&ProxyReport {
        url: &args.url,
        proxy,
    })
}
