//! Subcommand handlers. `main` owns configuration, tracing and the audit
//! trail; each handler receives them ready to use.

pub mod args;
mod config;
mod setup;
mod validate;

pub use args::{Cli, Commands, InputArgs};
pub use config::handle_config_command;
pub use setup::{SetupCommandOptions, handle_setup_command};
pub use validate::handle_validate_command;
