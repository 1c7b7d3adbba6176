//! Command handlers for CLI subcommands
//!
//! This module contains the implementation logic for each CLI subcommand.

mod completions;
mod config;
mod proxy;
mod send;

pub use completions::handle_completions;
pub use config::handle_config;
pub use proxy::handle_proxy;
pub use send::handle_send;
