use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use stencil_config::StencilConfig;
use stencil_core::context::AuthoringMode;
use stencil_core::security::TokioFilesystem;
use stencil_core::{
    AuditLogger, ContextOptions, DeclarativeSetup, GateContext, InputGate, SelectedOptions,
    SetupRunner, create_context,
};

use super::InputArgs;

#[derive(Debug, Clone, Default)]
pub struct SetupCommandOptions {
    pub inputs: InputArgs,
    pub authoring: bool,
    pub options: Vec<String>,
}

pub async fn handle_setup_command(
    config: &StencilConfig,
    audit: &AuditLogger,
    cwd: &Path,
    user: &str,
    command: &SetupCommandOptions,
) -> Result<()> {
    let gate = InputGate::new(&config.gate, audit.clone(), cwd);
    // Extra template inputs only survive the gate when required.
    let gate_context = GateContext::new("setup")
        .with_user(user)
        .require(["project_name", "project_directory"])
        .require(command.inputs.extra_keys());
    let validated = gate.enforce(&command.inputs.to_json(), &gate_context)?;

    let mode = if command.authoring {
        AuthoringMode::Authoring
    } else {
        AuthoringMode::Standard
    };
    let context = create_context(
        ContextOptions::from_validated(&validated)
            .with_cwd(cwd)
            .with_mode(mode.as_str())
            .with_assets_dir(config.sandbox.assets_dir.as_str())
            .with_options(SelectedOptions::from_tokens(command.options.iter().cloned())),
    )
    .context("Failed to build execution context")?;

    let runner = SetupRunner::new(audit.clone(), &config.sandbox);
    let bounded = runner.enforcer_for(&context).wrap_filesystem(TokioFilesystem);
    let assets_root = context.project_directory().join(context.assets_dir());
    let Some(plan) =
        DeclarativeSetup::discover(&bounded, &assets_root, &config.sandbox.setup_file).await?
    else {
        info!(project = %context.project_name(), "No setup plan found");
        println!(
            "No setup plan in {}; nothing to do",
            stencil_commons::relative_display(cwd, &assets_root)
        );
        return Ok(());
    };

    runner.run(&context, &plan).await?;
    println!(
        "Setup '{}' completed for {} ({} steps)",
        plan.name,
        context.project_name(),
        plan.steps.len()
    );
    Ok(())
}
