//! Courier CLI - send pooled, TLS-secured JSON API requests from the shell
//!
//! This is the main entry point for the `courier` binary. It loads the
//! dispatcher configuration, sets up logging and runs one subcommand.

mod cli;
mod config;
mod error;
mod handlers;
mod logging;
mod output;

use cli::{Cli, Commands};
use colored::control;
use config::Config;
use error::Result;
use logging::{timing::Timer, LoggingConfig};
use output::OutputWriter;
use std::process;
use tracing::instrument;

#[tokio::main]
async fn main() {
    // .env values act as environment defaults
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    control::set_override(cli.use_color());

    if let Err(e) = init_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => {
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}", error::format_error(&e, control::SHOULD_COLORIZE.should_colorize()));

            if e.should_show_help() {
                eprintln!("\nFor more information, try '--help'");
            }

            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
#[instrument(skip(cli), fields(command = ?cli.command))]
async fn run(cli: Cli) -> Result<()> {
    let _timer = Timer::start("cli_execution");

    // Completions must work even with a broken configuration
    let config = if matches!(cli.command, Commands::Completions(_)) {
        Config::default()
    } else {
        let _config_timer = Timer::start("config_loading");
        tracing::info!("Loading configuration");
        Config::load_with_file(cli.config.as_deref())?
    };

    let mut output = OutputWriter::new(cli.output, cli.use_color(), cli.quiet);

    tracing::info!(
        command = ?cli.command,
        verbosity = cli.verbosity_level(),
        "Executing command"
    );

    match cli.command {
        Commands::Send(args) => handlers::handle_send(args, &config, &mut output).await,
        Commands::Proxy(args) => handlers::handle_proxy(args, &mut output),
        Commands::Config(args) => handlers::handle_config(args, &config, &mut output),
        Commands::Completions(args) => handlers::handle_completions(args),
    }
}

/// Initialize the logging system
fn init_logging(cli: &Cli) -> Result<()> {
    let mut logging_config = LoggingConfig::from_verbosity(cli.verbosity_level())
        .apply_env(|name| std::env::var(name).ok())?;

    // Quiet wins over RUST_LOG
    if cli.quiet {
        logging_config = LoggingConfig {
            format: logging_config.format,
            ..LoggingConfig::quiet()
        };
    }
    logging_config.ansi &= cli.use_color();

    logging::init_logging(&logging_config)
}
