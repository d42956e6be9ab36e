//! Running author-supplied setup code against a fresh project tree.
//!
//! A [`SetupScript`] receives the [`ExecutionContext`] and a [`SetupTools`]
//! bound to the project directory, and nothing else. Steps run in order;
//! the first failure stops the run and nothing is rolled back.

mod declarative;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use stencil_commons::sanitize_error_message;
use stencil_config::sandbox::SandboxConfig;

use crate::context::ExecutionContext;
use crate::security::audit::AuditLogger;
use crate::security::boundary::BoundaryEnforcer;
use crate::security::errors::BoundaryViolation;
use crate::security::fs::{Filesystem, TokioFilesystem};
use crate::tools::{HostLogger, SetupTools, ToolError, TracingHostLogger};

pub use declarative::{DeclarativeSetup, LogLevel, SetupStep};

pub const SETUP_STARTED_EVENT: &str = "setup_started";
pub const SETUP_COMPLETED_EVENT: &str = "setup_completed";
pub const SETUP_FAILED_EVENT: &str = "setup_failed";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("setup plan '{path}' is invalid: {reason}")]
    Plan { path: String, reason: String },

    #[error(transparent)]
    Script(#[from] anyhow::Error),
}

impl SetupError {
    /// The boundary violation that ended the run, if any.
    pub fn boundary_violation(&self) -> Option<&BoundaryViolation> {
        match self {
            Self::Tool(ToolError::Boundary(violation)) => Some(violation),
            _ => None,
        }
    }
}

/// Everything setup code gets to see.
#[derive(Debug, Clone)]
pub struct SetupArgs {
    pub context: ExecutionContext,
    pub tools: SetupTools,
}

#[async_trait]
pub trait SetupScript: Send + Sync {
    fn name(&self) -> &str {
        "setup"
    }

    async fn run(&self, args: SetupArgs) -> Result<(), SetupError>;
}

/// Wires a context to its sandboxed tool surface and runs scripts.
#[derive(Clone)]
pub struct SetupRunner {
    audit: AuditLogger,
    host_logger: Arc<dyn HostLogger>,
    ignored_entries: Vec<String>,
}

impl std::fmt::Debug for SetupRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupRunner")
            .field("ignored_entries", &self.ignored_entries)
            .finish_non_exhaustive()
    }
}

impl SetupRunner {
    pub fn new(audit: AuditLogger, sandbox: &SandboxConfig) -> Self {
        Self {
            audit,
            host_logger: Arc::new(TracingHostLogger),
            ignored_entries: sandbox.ignored_entries(),
        }
    }

    pub fn with_host_logger(mut self, host_logger: Arc<dyn HostLogger>) -> Self {
        self.host_logger = host_logger;
        self
    }

    /// Boundary enforcer scoped to the context's project directory.
    pub fn enforcer_for(&self, context: &ExecutionContext) -> BoundaryEnforcer {
        BoundaryEnforcer::new(context.project_directory(), self.audit.clone())
    }

    /// Tool surface over a bounded `tokio::fs` adapter.
    pub fn tools_for(&self, context: &ExecutionContext) -> SetupTools {
        let enforcer = self.enforcer_for(context);
        let fs: Arc<dyn Filesystem> = Arc::new(enforcer.wrap_filesystem(TokioFilesystem));
        SetupTools::new(
            context.clone(),
            enforcer,
            fs,
            Arc::clone(&self.host_logger),
            self.ignored_entries.clone(),
        )
    }

    pub async fn run(
        &self,
        context: &ExecutionContext,
        script: &dyn SetupScript,
    ) -> Result<(), SetupError> {
        let project = context.project_name().to_string();
        self.audit.log_security_event(
            SETUP_STARTED_EVENT,
            json!({ "project": project, "script": script.name() }),
        );
        info!(project = %project, script = script.name(), "Running setup");

        let args = SetupArgs {
            context: context.clone(),
            tools: self.tools_for(context),
        };
        match script.run(args).await {
            Ok(()) => {
                self.audit.log_security_event(
                    SETUP_COMPLETED_EVENT,
                    json!({ "project": project, "script": script.name() }),
                );
                info!(project = %project, "Setup completed");
                Ok(())
            }
            Err(err) => {
                let message = sanitize_error_message(&err.to_string());
                self.audit.log_security_event(
                    SETUP_FAILED_EVENT,
                    json!({
                        "project": project,
                        "script": script.name(),
                        "error": message,
                        "boundary_violation": err.boundary_violation().is_some(),
                    }),
                );
                warn!(project = %project, error = %message, "Setup failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextOptions, create_context};
    use crate::security::audit::{AuditEvent, AuditLoggerOptions};
    use tempfile::TempDir;

    struct Escape;

    #[async_trait]
    impl SetupScript for Escape {
        fn name(&self) -> &str {
            "escape"
        }

        async fn run(&self, args: SetupArgs) -> Result<(), SetupError> {
            args.tools.files.ensure_line("ok.txt", "fine").await?;
            args.tools.files.ensure_line("../../outside.txt", "nope").await?;
            args.tools.files.ensure_line("never.txt", "x").await?;
            Ok(())
        }
    }

    fn security_events(audit: &AuditLogger) -> Vec<String> {
        audit
            .memory_entries()
            .into_iter()
            .filter_map(|entry| match entry.event {
                AuditEvent::SecurityEvent { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn failure_stops_run_without_rollback() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLogger::in_memory(AuditLoggerOptions::default());
        let runner = SetupRunner::new(audit.clone(), &SandboxConfig::default());
        let context = create_context(ContextOptions {
            project_name: "demo".into(),
            project_directory: dir.path().to_path_buf(),
            ..ContextOptions::default()
        })
        .unwrap();

        let err = runner.run(&context, &Escape).await.unwrap_err();
        assert!(err.boundary_violation().is_some());
        assert!(dir.path().join("ok.txt").exists());
        assert!(!dir.path().join("never.txt").exists());

        audit.close().await;
        assert_eq!(
            security_events(&audit),
            vec![SETUP_STARTED_EVENT, SETUP_FAILED_EVENT]
        );
        let kinds: Vec<&str> = audit
            .memory_entries()
            .iter()
            .map(|entry| entry.event.kind())
            .collect();
        assert!(kinds.contains(&"boundary_violation"));
    }
}
