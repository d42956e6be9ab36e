//! Capability-scoped tool surface handed to setup code.
//!
//! Setup code never sees a raw filesystem. Every operation takes
//! project-relative path arguments, rejects malformed ones with a
//! [`SandboxError`], and resolves the rest through the project's
//! [`BoundaryEnforcer`] before touching the bounded [`Filesystem`].

mod glob;
mod json;
mod logger;
mod placeholders;
mod templates;
mod text;
mod walk;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::security::boundary::BoundaryEnforcer;
use crate::security::errors::{BoundaryViolation, SandboxError};
use crate::security::fs::{Filesystem, FsError};

pub use glob::GlobMatcher;
pub use json::JsonTools;
pub use logger::{HostLogger, LoggerTools, TracingHostLogger};
pub use placeholders::PlaceholderTools;
pub use templates::TemplateTools;
pub use text::FileTools;
pub use walk::list_files;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Boundary(#[from] BoundaryViolation),

    #[error(transparent)]
    Fs(FsError),

    #[error("'{path}' does not contain valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<FsError> for ToolError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Boundary(violation) => Self::Boundary(violation),
            other => Self::Fs(other),
        }
    }
}

/// A path argument as received from setup code.
///
/// Implemented for string types and for untyped JSON so declarative steps
/// and native scripts share one validation path.
pub trait PathArg {
    fn as_path_str(&self) -> Option<&str>;
}

impl PathArg for str {
    fn as_path_str(&self) -> Option<&str> {
        Some(self)
    }
}

impl PathArg for String {
    fn as_path_str(&self) -> Option<&str> {
        Some(self)
    }
}

impl PathArg for Value {
    fn as_path_str(&self) -> Option<&str> {
        self.as_str()
    }
}

/// State shared by every namespace of one [`SetupTools`] instance.
pub(crate) struct ToolSandbox {
    context: ExecutionContext,
    enforcer: BoundaryEnforcer,
    fs: Arc<dyn Filesystem>,
    ignored: Vec<String>,
}

impl ToolSandbox {
    pub(crate) fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub(crate) fn fs(&self) -> &dyn Filesystem {
        self.fs.as_ref()
    }

    pub(crate) fn root(&self) -> &Path {
        self.enforcer.root()
    }

    pub(crate) fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Validate a path argument and resolve it under the project root.
    pub(crate) fn resolve<P: PathArg + ?Sized>(
        &self,
        operation: &'static str,
        argument: &'static str,
        path: &P,
    ) -> Result<PathBuf, ToolError> {
        let Some(raw) = path.as_path_str() else {
            return Err(self.reject(SandboxError::NonStringArgument {
                operation,
                argument: argument.to_string(),
            }));
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(self.reject(SandboxError::EmptyPath { operation }));
        }
        if stencil_commons::is_absolute_like(trimmed) {
            return Err(self.reject(SandboxError::AbsolutePath {
                operation,
                path: trimmed.to_string(),
            }));
        }
        Ok(self.enforcer.validate_path(trimmed, operation)?)
    }

    /// Resolve an entry found by walking the project tree. Entries are
    /// already root-relative, so the argument-shape checks do not apply.
    pub(crate) fn resolve_entry(
        &self,
        operation: &'static str,
        relative: &str,
    ) -> Result<PathBuf, ToolError> {
        Ok(self
            .enforcer
            .validate_path(self.root().join(relative), operation)?)
    }

    /// Resolve a path argument relative to the author-assets directory.
    pub(crate) fn resolve_asset<P: PathArg + ?Sized>(
        &self,
        operation: &'static str,
        argument: &'static str,
        path: &P,
    ) -> Result<PathBuf, ToolError> {
        let Some(raw) = path.as_path_str() else {
            return Err(self.reject(SandboxError::NonStringArgument {
                operation,
                argument: argument.to_string(),
            }));
        };
        let trimmed = raw.trim();
        if stencil_commons::is_absolute_like(trimmed) {
            return Err(self.reject(SandboxError::AbsolutePath {
                operation,
                path: trimmed.to_string(),
            }));
        }
        let assets_root = self.enforcer.validate_path(self.context.assets_dir(), operation)?;
        let joined = if trimmed.is_empty() || trimmed == "." {
            assets_root.clone()
        } else {
            assets_root.join(trimmed)
        };
        let resolved = self.enforcer.validate_path(&joined, operation)?;
        if !stencil_commons::is_within(&assets_root, &resolved) {
            return Err(self.reject(SandboxError::InvalidArgument {
                operation,
                reason: format!("'{trimmed}' is outside the assets directory"),
            }));
        }
        Ok(resolved)
    }

    /// Validate a glob argument.
    pub(crate) fn glob<P: PathArg + ?Sized>(
        &self,
        operation: &'static str,
        pattern: &P,
    ) -> Result<GlobMatcher, ToolError> {
        let Some(raw) = pattern.as_path_str() else {
            return Err(self.reject(SandboxError::NonStringArgument {
                operation,
                argument: "pattern".to_string(),
            }));
        };
        GlobMatcher::new(raw.trim(), operation).map_err(|err| self.reject(err))
    }

    /// Record a sandbox misuse in the audit trail and convert it.
    pub(crate) fn reject(&self, err: SandboxError) -> ToolError {
        let operation = match &err {
            SandboxError::NonStringArgument { operation, .. }
            | SandboxError::EmptyPath { operation }
            | SandboxError::AbsolutePath { operation, .. }
            | SandboxError::NonStringReplacement { operation, .. }
            | SandboxError::InvalidArgument { operation, .. } => *operation,
        };
        self.enforcer
            .audit()
            .log_sandbox_violation(operation, &err.to_string());
        ToolError::Sandbox(err)
    }

    pub(crate) fn relative(&self, path: &Path) -> String {
        stencil_commons::relative_display(self.root(), path).replace('\\', "/")
    }

    pub(crate) async fn ensure_parent(&self, path: &Path) -> Result<(), ToolError> {
        if let Some(parent) = path.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// The full tool surface, grouped by namespace.
#[derive(Clone)]
pub struct SetupTools {
    pub placeholders: PlaceholderTools,
    pub templates: TemplateTools,
    pub files: FileTools,
    pub json: JsonTools,
    pub logger: LoggerTools,
}

impl std::fmt::Debug for SetupTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupTools").finish_non_exhaustive()
    }
}

impl SetupTools {
    /// Build the tool surface for `context`. `fs` should already be bounded
    /// to `enforcer`'s root; each call is validated again regardless.
    pub fn new(
        context: ExecutionContext,
        enforcer: BoundaryEnforcer,
        fs: Arc<dyn Filesystem>,
        host_logger: Arc<dyn HostLogger>,
        ignored_entries: Vec<String>,
    ) -> Self {
        let mut ignored = ignored_entries;
        let assets = context.assets_dir().to_string();
        if !ignored.contains(&assets) {
            ignored.push(assets);
        }
        let sandbox = Arc::new(ToolSandbox {
            context,
            enforcer,
            fs,
            ignored,
        });
        Self {
            placeholders: PlaceholderTools::new(Arc::clone(&sandbox)),
            templates: TemplateTools::new(Arc::clone(&sandbox)),
            files: FileTools::new(Arc::clone(&sandbox)),
            json: JsonTools::new(sandbox),
            logger: LoggerTools::new(host_logger),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::context::{ContextOptions, InputValue, create_context};
    use crate::security::audit::{AuditLogger, AuditLoggerOptions};
    use crate::security::fs::TokioFilesystem;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    pub(crate) fn tools_for(dir: &TempDir, inputs: &[(&str, &str)]) -> (SetupTools, AuditLogger) {
        tools_for_path(dir.path(), inputs)
    }

    pub(crate) fn tools_for_path(
        root: &Path,
        inputs: &[(&str, &str)],
    ) -> (SetupTools, AuditLogger) {
        let audit = AuditLogger::in_memory(AuditLoggerOptions::default());
        let context = create_context(ContextOptions {
            project_name: "demo".into(),
            project_directory: root.to_path_buf(),
            inputs: inputs
                .iter()
                .map(|(key, value)| ((*key).to_string(), InputValue::from(*value)))
                .collect::<IndexMap<_, _>>(),
            ..ContextOptions::default()
        })
        .unwrap();
        let enforcer = BoundaryEnforcer::new(context.project_directory(), audit.clone());
        let fs: Arc<dyn Filesystem> = Arc::new(enforcer.wrap_filesystem(TokioFilesystem));
        let tools = SetupTools::new(
            context,
            enforcer,
            fs,
            Arc::new(TracingHostLogger),
            vec![".git".to_string()],
        );
        (tools, audit)
    }
}
