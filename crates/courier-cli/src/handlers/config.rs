//! Configuration command handlers

use crate::cli::{ConfigAction, ConfigArgs, ConfigFormat, ConfigShowArgs};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::OutputWriter;

/// Handle the config command
pub fn handle_config(args: ConfigArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    match args.action {
        ConfigAction::Show(show_args) => handle_config_show(show_args, config, output),
        ConfigAction::Path => handle_config_path(config, output),
        ConfigAction::Validate => handle_config_validate(config, output),
    }
}

/// Handle config show subcommand
fn handle_config_show(
    args: ConfigShowArgs,
    config: &Config,
    output: &mut OutputWriter,
) -> Result<()> {
    let content = match args.format {
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map_err(|e| Error::config(format!("Failed to serialize as TOML: {}", e)))?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| Error::config(format!("Failed to serialize as JSON: {}", e)))?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)
            .map_err(|e| Error::config(format!("Failed to serialize as YAML: {}", e)))?,
    };

    output.writeln(content.trim_end())
}

/// Handle config path subcommand
fn handle_config_path(config: &Config, output: &mut OutputWriter) -> Result<()> {
    match &config.source {
        Some(path) => output.writeln(&path.display().to_string()),
        None => {
            output.warning("No configuration file found; using defaults")?;
            output.info("Searched:")?;
            for path in Config::default_config_paths() {
                output.info(&format!("  {}", path.display()))?;
            }
            Ok(())
        }
    }
}

/// Handle config validate subcommand
fn handle_config_validate(config: &Config, output: &mut OutputWriter) -> Result<()> {
    config.validate()?;

    output.success("✓ Configuration is valid")?;
    let timeouts = &config.dispatcher.timeouts;
    output.field("Socket timeout", &format_ms(timeouts.socket_timeout_ms))?;
    output.field("Connect timeout", &format_ms(timeouts.connect_timeout_ms))?;
    output.field("Pool wait timeout", &format_ms(timeouts.connection_request_timeout_ms))?;
    output.field("Max per route", &config.dispatcher.pool.max_per_route.to_string())?;
    output.field("Minimum TLS", &config.dispatcher.tls.min_tls_version.to_string())?;

    if timeouts.has_unbounded_phase() {
        output.warning("A timeout of 0 disables that bound; requests may hang")?;
    }

    Ok(())
}

fn format_ms(ms: u64) -> String {
    if ms == 0 {
        "unbounded".to_string()
    } else {
        format!("{}ms", ms)
    }
}
