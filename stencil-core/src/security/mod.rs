//! Defense-in-depth layer: sanitizers, input gate, boundary enforcement,
//! and the audit trail they report to.

pub mod audit;
pub mod boundary;
pub mod errors;
pub mod fs;
pub mod gate;
pub mod sanitizers;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditLoggerOptions, ValidationStatus};
pub use boundary::BoundaryEnforcer;
pub use errors::{
    BoundaryViolation, GateError, SandboxError, ValidationError, ValidationErrorKind,
    ViolationReason,
};
pub use fs::{
    BoundedFilesystem, DirEntryInfo, EntryKind, FileMetadata, Filesystem, FsError, TokioFilesystem,
};
pub use gate::{GateContext, InputField, InputGate, ValidatedInputs};
pub use sanitizers::Locator;
