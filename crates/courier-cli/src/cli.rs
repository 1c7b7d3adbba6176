//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API,
//! providing a type-safe and well-documented command interface.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Courier CLI - pooled, TLS-secured JSON API requests
///
/// Sends requests through the same dispatcher library clients use, so proxy
/// detection, pool limits, TLS settings and error mapping can be checked
/// from the shell.
#[derive(Parser, Debug)]
#[command(
    name = "courier",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "COURIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, value_enum, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one request through the pooled dispatcher
    Send(SendArgs),

    /// Show the proxy that would be used for a URL
    Proxy(ProxyArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),

    /// Generate shell completions for the specified shell
    Completions(CompletionsArgs),
}

/// Arguments for the send command
#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Target URL
    #[arg(value_name = "URL")]
    pub url: String,

    /// HTTP method (defaults to POST with a body, GET without)
    #[arg(short = 'X', long)]
    pub method: Option<String>,

    /// JSON request body
    #[arg(short = 'd', long, conflicts_with = "data_file")]
    pub data: Option<String>,

    /// Read the JSON request body from a file
    #[arg(long, value_name = "FILE")]
    pub data_file: Option<PathBuf>,

    /// Extra header, e.g. 'X-Trace: abc' (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Status codes counted as success (default: any 2xx)
    #[arg(long = "expect-status", value_name = "CODE")]
    pub expect_status: Vec<u16>,

    /// Skip proxy detection and connect directly
    #[arg(long)]
    pub no_proxy: bool,

    /// Save the response to a file
    #[arg(long = "save-to", value_name = "OUTPUT_FILE")]
    pub save_to: Option<PathBuf>,

    /// Show execution metrics (timing, proxy)
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for the proxy command
#[derive(Parser, Debug)]
pub struct ProxyArgs {
    /// Target URL
    #[arg(value_name = "URL")]
    pub url: String,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration inspection actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration values
    Show(ConfigShowArgs),

    /// Show which configuration file is in use
    Path,

    /// Validate current configuration
    Validate,
}

/// Arguments for config show
#[derive(Parser, Debug)]
pub struct ConfigShowArgs {
    /// Show configuration in specified format
    #[arg(short, long, value_enum, default_value = "toml")]
    pub format: ConfigFormat,
}

/// Configuration file formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Arguments for generating shell completions
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Output format options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Pretty-printed JSON output
    JsonPretty,
}

/// Supported shells for completion generation
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

impl Shell {
    /// Convert to clap_complete shell type
    pub fn to_clap_shell(self) -> clap_complete::Shell {
        match self {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Verify that the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_send_arguments() {
        let cli = Cli::parse_from([
            "courier",
            "send",
            "https://mandrillapp.com/api/1.0/users/ping2.json",
            "-d",
            r#"{"key":"abc"}"#,
            "-H",
            "X-Trace: 1",
            "-H",
            "X-Tenant: acme",
            "--expect-status",
            "200",
            "--expect-status",
            "202",
        ]);

        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.url, "https://mandrillapp.com/api/1.0/users/ping2.json");
                assert_eq!(args.data.as_deref(), Some(r#"{"key":"abc"}"#));
                assert_eq!(args.headers, vec!["X-Trace: 1", "X-Tenant: acme"]);
                assert_eq!(args.expect_status, vec![200, 202]);
                assert!(args.method.is_none());
                assert!(!args.no_proxy);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_data_and_data_file_conflict() {
        let result = Cli::try_parse_from([
            "courier",
            "send",
            "https://api.example.com",
            "-d",
            "{}",
            "--data-file",
            "body.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbosity_level() {
        let cli = Cli {
            verbose: 2,
            quiet: false,
            config: None,
            output: OutputFormat::Human,
            no_color: false,
            command: Commands::Proxy(ProxyArgs {
                url: "https://api.example.com".to_string(),
            }),
        };
        assert_eq!(cli.verbosity_level(), 2);

        let quiet_cli = Cli {
            verbose: 2,
            quiet: true,
            ..cli
        };
        assert_eq!(quiet_cli.verbosity_level(), 0);
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::parse_from(["courier", "config", "show", "--format", "yaml"]);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: ConfigAction::Show(ConfigShowArgs {
                    format: ConfigFormat::Yaml
                })
            })
        ));

        let cli = Cli::parse_from(["courier", "-o", "json", "config", "path"]);
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: ConfigAction::Path
            })
        ));
    }
}
