use std::path::Path;

use anyhow::{Context, Result};
use stencil_config::StencilConfig;
use stencil_core::{AuditLogger, GateContext, InputGate};

use super::InputArgs;

pub fn handle_validate_command(
    config: &StencilConfig,
    audit: &AuditLogger,
    cwd: &Path,
    user: &str,
    inputs: &InputArgs,
    required: &[String],
) -> Result<()> {
    let gate = InputGate::new(&config.gate, audit.clone(), cwd);
    let context = GateContext::new("validate")
        .with_user(user)
        .require(required.iter().map(String::as_str));
    let validated = gate.enforce(&inputs.to_json(), &context)?;

    let rendered = serde_json::to_string_pretty(&validated.to_json())
        .context("Failed to render validated inputs")?;
    println!("{rendered}");
    Ok(())
}
