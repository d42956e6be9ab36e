//! Shared helpers reused across the stencil crates.
//!
//! Kept free of configuration and I/O wiring so the security layer in
//! `stencil-core` and the binary can both depend on it without pulling in
//! runtime state.

pub mod paths;
pub mod sanitizer;

pub use paths::{is_absolute_like, is_within, normalize_path, relative_display};
pub use sanitizer::{MAX_MESSAGE_LENGTH, redact_secrets, sanitize_error_message};
