//! Runtime enforcement of the allowed root directory.
//!
//! Every candidate path is joined onto the root and normalized lexically;
//! the result must equal the root or sit below it component-wise. That
//! resolution plus prefix check is the only ground truth. Input shape checks
//! (absolute paths, empty strings) live in the sanitizers and tool surface.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use stencil_commons::paths::{is_within, normalize_path};

use super::audit::AuditLogger;
use super::errors::{BoundaryViolation, ViolationReason};
use super::fs::{BoundedFilesystem, Filesystem};

#[derive(Debug, Clone)]
pub struct BoundaryEnforcer {
    root: PathBuf,
    audit: AuditLogger,
}

impl BoundaryEnforcer {
    /// Scope the enforcer to `root`. Relative roots are made absolute against
    /// the current directory.
    pub fn new(root: impl AsRef<Path>, audit: AuditLogger) -> Self {
        let root = root.as_ref();
        let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: normalize_path(&absolute),
            audit,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Resolve `candidate` against the root and return the absolute path.
    pub fn validate_path(
        &self,
        candidate: impl AsRef<Path>,
        operation: &str,
    ) -> Result<PathBuf, BoundaryViolation> {
        let candidate = candidate.as_ref();
        if candidate.as_os_str().as_encoded_bytes().contains(&0) {
            return Err(self.violation(
                operation,
                ViolationReason::NullByte,
                candidate.to_string_lossy().replace('\0', "\\0"),
                None,
            ));
        }

        let resolved = self.resolve(candidate);
        if !is_within(&self.root, &resolved) {
            return Err(self.violation(
                operation,
                ViolationReason::PathTraversal,
                candidate.to_string_lossy().into_owned(),
                Some(resolved),
            ));
        }
        Ok(resolved)
    }

    /// Same as [`validate_path`](Self::validate_path) for untyped input.
    pub fn validate_value(
        &self,
        candidate: &Value,
        operation: &str,
    ) -> Result<PathBuf, BoundaryViolation> {
        match candidate {
            Value::String(path) => self.validate_path(path, operation),
            other => Err(self.violation(
                operation,
                ViolationReason::NonString,
                other.to_string(),
                None,
            )),
        }
    }

    /// Validate every candidate; the first violation fails the batch.
    pub fn validate_paths<I, P>(
        &self,
        candidates: I,
        operation: &str,
    ) -> Result<Vec<PathBuf>, BoundaryViolation>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        candidates
            .into_iter()
            .map(|candidate| self.validate_path(candidate, operation))
            .collect()
    }

    /// Boolean form of [`validate_path`](Self::validate_path). Does not audit.
    pub fn is_within_boundary(&self, candidate: impl AsRef<Path>) -> bool {
        let candidate = candidate.as_ref();
        !candidate.as_os_str().as_encoded_bytes().contains(&0)
            && is_within(&self.root, &self.resolve(candidate))
    }

    /// Wrap `inner` so every path-taking call is validated before delegating.
    pub fn wrap_filesystem<F: Filesystem>(&self, inner: F) -> BoundedFilesystem<F> {
        BoundedFilesystem::new(self.clone(), inner)
    }

    fn resolve(&self, candidate: &Path) -> PathBuf {
        normalize_path(&self.root.join(candidate))
    }

    fn violation(
        &self,
        operation: &str,
        reason: ViolationReason,
        original: String,
        resolved: Option<PathBuf>,
    ) -> BoundaryViolation {
        let violation = BoundaryViolation {
            operation: operation.to_string(),
            reason,
            original,
            resolved,
            root: self.root.clone(),
        };
        warn!(
            operation,
            reason = %reason,
            original = %violation.original,
            "Blocked path outside the allowed root"
        );
        self.audit.log_boundary_violation(&violation);
        violation
    }
}
