//! # stencil-core
//!
//! Runtime for running untrusted project-setup code against a freshly
//! scaffolded directory.
//!
//! ## Layers
//!
//! - [`security::InputGate`]: validates raw command inputs, caches successful
//!   validations and flags repeated failures as potential abuse.
//! - [`context::ExecutionContext`]: the immutable description of the project
//!   handed to setup code.
//! - [`security::BoundaryEnforcer`] and [`security::BoundedFilesystem`]:
//!   every filesystem path is resolved and checked against the project root.
//! - [`tools::SetupTools`]: the only capabilities setup code receives.
//! - [`setup::SetupRunner`]: wires the above together and records the run in
//!   the [`security::AuditLogger`].
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use stencil_core::{ContextOptions, DeclarativeSetup, GateContext, InputGate, SetupRunner};
//!
//! let gate = InputGate::new(&config.gate, audit.clone(), cwd);
//! let inputs = gate.enforce(&raw, &GateContext::new("create").require(["project_name"]))?;
//! let context = stencil_core::create_context(ContextOptions::from_validated(&inputs))?;
//! let plan = DeclarativeSetup::from_toml_str(&source, "setup.toml")?;
//! SetupRunner::new(audit.clone(), &config.sandbox).run(&context, &plan).await?;
//! audit.close().await;
//! ```

pub mod context;
pub mod security;
pub mod setup;
pub mod tools;

pub use context::{
    AuthoringMode, ContextError, ContextOptions, DimensionValue, ExecutionContext, InputValue,
    SelectedOptions, create_context, is_execution_context,
};
pub use security::{
    AuditLogger, AuditLoggerOptions, BoundaryEnforcer, BoundaryViolation, GateContext, GateError,
    InputGate, ValidatedInputs,
};
pub use setup::{DeclarativeSetup, SetupArgs, SetupError, SetupRunner, SetupScript};
pub use tools::{SetupTools, ToolError};
