//! Error taxonomy for the security layer.
//!
//! Four kinds with non-overlapping context:
//! - [`ValidationError`]: one input field failed a sanitizer rule
//! - [`BoundaryViolation`]: a resolved path escaped the allowed root
//! - [`GateError`]: raised only by the input gate, wraps validation failures
//! - [`SandboxError`]: misuse of the setup tool surface

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Which sanitizer rule rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    NotAString,
    Empty,
    NullByte,
    PathTraversal,
    AbsolutePath,
    OutsideBase,
    TooLong,
    InvalidCharacters,
    InvalidFormat,
    DisallowedScheme,
    PrivateNetwork,
    OutOfRange,
}

impl ValidationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAString => "not_a_string",
            Self::Empty => "empty",
            Self::NullByte => "null_byte",
            Self::PathTraversal => "path_traversal",
            Self::AbsolutePath => "absolute_path",
            Self::OutsideBase => "outside_base",
            Self::TooLong => "too_long",
            Self::InvalidCharacters => "invalid_characters",
            Self::InvalidFormat => "invalid_format",
            Self::DisallowedScheme => "disallowed_scheme",
            Self::PrivateNetwork => "private_network",
            Self::OutOfRange => "out_of_range",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single input field rejected by a sanitizer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
    /// Offending value, kept for diagnostics and never rendered by `Display`.
    #[serde(skip)]
    pub value: Option<String>,
    /// Constraints the value violated.
    pub constraints: Vec<String>,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
            value: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }
}

/// Why a path was refused by the boundary enforcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    NonString,
    NullByte,
    PathTraversal,
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NonString => "non-string path",
            Self::NullByte => "null byte",
            Self::PathTraversal => "path traversal",
        })
    }
}

/// A path that resolved outside the allowed root, or was not a usable path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("boundary violation in {operation}: {reason} ('{original}')")]
pub struct BoundaryViolation {
    pub operation: String,
    pub reason: ViolationReason,
    pub original: String,
    pub resolved: Option<PathBuf>,
    pub root: PathBuf,
}

/// Raised by the input gate. This is the error callers at the architectural
/// boundary are expected to handle.
#[derive(Debug, Clone, Error)]
pub enum GateError {
    #[error("'{command}' is missing required input: {}", .fields.join(", "))]
    MissingFields { command: String, fields: Vec<String> },

    #[error("'{command}' rejected {} input field(s): {}", .failures.len(), summarize(.failures))]
    Validation {
        command: String,
        failures: Vec<ValidationError>,
    },
}

impl GateError {
    pub fn command(&self) -> &str {
        match self {
            Self::MissingFields { command, .. } | Self::Validation { command, .. } => command,
        }
    }

    /// Individual field failures; empty for missing-field errors.
    pub fn failures(&self) -> &[ValidationError] {
        match self {
            Self::MissingFields { .. } => &[],
            Self::Validation { failures, .. } => failures,
        }
    }

    pub fn has_kind(&self, kind: ValidationErrorKind) -> bool {
        self.failures().iter().any(|failure| failure.kind == kind)
    }
}

fn summarize(failures: &[ValidationError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Misuse of the setup tool surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("{operation}: argument '{argument}' must be a string")]
    NonStringArgument {
        operation: &'static str,
        argument: String,
    },

    #[error("{operation}: path argument must not be empty")]
    EmptyPath { operation: &'static str },

    #[error("{operation}: absolute paths are not allowed ('{path}')")]
    AbsolutePath {
        operation: &'static str,
        path: String,
    },

    #[error("{operation}: replacement for '{token}' must be a string")]
    NonStringReplacement {
        operation: &'static str,
        token: String,
    },

    #[error("{operation}: {reason}")]
    InvalidArgument {
        operation: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_omits_value() {
        let err = ValidationError::new(
            "branch",
            ValidationErrorKind::InvalidCharacters,
            "contains shell metacharacters",
        )
        .with_value("main; rm -rf /");
        assert_eq!(err.to_string(), "branch: contains shell metacharacters");
    }

    #[test]
    fn gate_error_lists_failures() {
        let err = GateError::Validation {
            command: "new".into(),
            failures: vec![
                ValidationError::new("a", ValidationErrorKind::Empty, "must not be empty"),
                ValidationError::new("b", ValidationErrorKind::TooLong, "too long"),
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("2 input field(s)"));
        assert!(rendered.contains("a: must not be empty; b: too long"));
        assert!(err.has_kind(ValidationErrorKind::TooLong));
        assert!(!err.has_kind(ValidationErrorKind::NullByte));
    }

    #[test]
    fn missing_fields_error_names_fields() {
        let err = GateError::MissingFields {
            command: "new".into(),
            fields: vec!["project_name".into(), "template".into()],
        };
        assert_eq!(
            err.to_string(),
            "'new' is missing required input: project_name, template"
        );
        assert!(err.failures().is_empty());
    }
}
