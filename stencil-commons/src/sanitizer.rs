//! Redaction utilities for error messages and log lines.
//!
//! Every error that reaches a log sink, the audit trail, or the terminal goes
//! through [`sanitize_error_message`] first. It strips:
//! - credential assignments (`token=...`, `api_key: ...`, `password=...`)
//! - well-known key shapes (`sk-...`, `AKIA...`, `Bearer ...`)
//! - home-directory segments and absolute filesystem paths
//! - IPv4 addresses and port numbers
//! - long alphanumeric, hex, or base64 runs that look like tokens
//!
//! and truncates the result to [`MAX_MESSAGE_LENGTH`] characters.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum number of characters kept from a sanitized message.
pub const MAX_MESSAGE_LENGTH: usize = 500;

const REDACTED: &str = "[REDACTED]";
const TRUNCATION_MARKER: &str = "...";

/// OpenAI-style API key: sk- followed by a long alphanumeric run
static OPENAI_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"\bsk-[A-Za-z0-9_\-]{20,}"));

/// AWS Access Key ID: AKIA followed by 16 uppercase alphanumerics
static AWS_ACCESS_KEY_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"\bAKIA[0-9A-Z]{16}\b"));

static BEARER_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)\bBearer\s+[A-Za-z0-9.\-_~+/]{8,}=*"));

/// `token=...`, `api_key: ...`, `client_secret=...`, `password=...`
static SECRET_ASSIGNMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(
        r#"(?i)\b([A-Za-z0-9_\-]*(?:key|token|secret|password|passwd|pwd))(\s*[:=]\s*)(["']?)[^\s"'&,;]+"#,
    )
});

static HOME_DIR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"(?i)(?:/home/|/Users/|[A-Z]:\\Users\\)[^/\\\s'`\x22]+|~[A-Za-z0-9_\-]+")
});

static UNIX_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r#"(^|[\s'"`(\[\]=,:])((?:/[A-Za-z0-9._\-~@+%]+)+/?)"#)
});

static WINDOWS_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r#"\b[A-Za-z]:\\[^\s'"`]*"#));

static IPV4_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"\b(?:\d{1,3}\.){3}\d{1,3}\b"));

static PORT_REGEX: LazyLock<Regex> = LazyLock::new(|| compile_regex(r":\d{2,5}\b"));

static LONG_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"[A-Za-z0-9+/]{32,}={0,2}"));

/// Redact credentials with a well-known shape.
///
/// This is a best-effort operation using well-known regex patterns.
/// Redacted values are replaced with `[REDACTED]`.
///
/// # Examples
///
/// ```
/// use stencil_commons::sanitizer::redact_secrets;
///
/// let output = redact_secrets("api_key=abcdef123456");
/// assert_eq!(output, "api_key=[REDACTED]");
/// ```
pub fn redact_secrets(input: &str) -> String {
    let redacted = OPENAI_KEY_REGEX.replace_all(input, REDACTED);
    let redacted = AWS_ACCESS_KEY_ID_REGEX.replace_all(&redacted, REDACTED);
    let redacted = BEARER_TOKEN_REGEX.replace_all(&redacted, "Bearer [REDACTED]");
    let redacted = SECRET_ASSIGNMENT_REGEX.replace_all(&redacted, "$1$2$3[REDACTED]");
    redacted.into_owned()
}

/// Sanitize a free-text error message before it is logged or rendered.
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = redact_secrets(message);
    let sanitized = HOME_DIR_REGEX.replace_all(&sanitized, "[HOME]");
    let sanitized = UNIX_PATH_REGEX.replace_all(&sanitized, "${1}[PATH]");
    let sanitized = WINDOWS_PATH_REGEX.replace_all(&sanitized, "[PATH]");
    let sanitized = IPV4_REGEX.replace_all(&sanitized, "[IP]");
    let sanitized = PORT_REGEX.replace_all(&sanitized, ":[PORT]");
    let sanitized = LONG_TOKEN_REGEX.replace_all(&sanitized, REDACTED);
    truncate_chars(&sanitized, MAX_MESSAGE_LENGTH)
}

fn truncate_chars(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_owned();
    }
    let keep = max.saturating_sub(TRUNCATION_MARKER.len());
    let mut truncated: String = input.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        // Panic is acceptable thanks to the `load_regex` test
        Err(err) => panic!("invalid regex pattern `{pattern}`: {err}"),
    }
}
