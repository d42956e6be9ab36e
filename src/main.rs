//! stencil - project scaffolding with a sandboxed setup runtime
//!
//! Thin binary entry point: loads configuration, sets up tracing and the
//! audit trail, then delegates to the handlers in `cli`.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use stencil_commons::sanitize_error_message;
use stencil_config::{ConfigManager, StencilConfig};
use stencil_core::AuditLogger;

mod cli;

use cli::{Cli, Commands, SetupCommandOptions};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", sanitize_error_message(&format!("{err:#}")));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Cli) -> Result<()> {
    let manager = ConfigManager::load(args.config.as_deref())?;
    initialize_tracing(manager.config());

    if matches!(args.command, Commands::Config) {
        return cli::handle_config_command(&manager);
    }

    let config = manager.into_config();
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let audit = AuditLogger::from_config(&config.audit);

    let result = dispatch(args, &config, &audit, &cwd).await;
    // Flush on every path so failures are on disk before the process exits.
    audit.close().await;
    result
}

async fn dispatch(
    args: &Cli,
    config: &StencilConfig,
    audit: &AuditLogger,
    cwd: &Path,
) -> Result<()> {
    match &args.command {
        Commands::Validate { inputs, required } => {
            cli::handle_validate_command(config, audit, cwd, &args.user, inputs, required)
        }
        Commands::Setup {
            inputs,
            authoring,
            options,
        } => {
            let command = SetupCommandOptions {
                inputs: inputs.clone(),
                authoring: *authoring,
                options: options.clone(),
            };
            cli::handle_setup_command(config, audit, cwd, &args.user, &command).await
        }
        Commands::Config => Ok(()),
    }
}

/// `RUST_LOG` takes precedence; otherwise the `[debug]` section decides.
fn initialize_tracing(config: &StencilConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.debug.filter_directive()));

    // Logs go to stderr so stdout stays machine-readable.
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
    if installed.is_err() {
        eprintln!("warning: tracing subscriber already installed");
    }
}
