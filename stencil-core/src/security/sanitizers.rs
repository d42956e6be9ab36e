//! Pure validators for one class of untrusted string input each.
//!
//! Every sanitizer accepts an untyped [`Value`] so non-string input coming
//! from the CLI, a setup plan, or a JSON payload is rejected in one place.
//! Failures are field-tagged [`ValidationError`]s.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use url::{Host, Url};

use stencil_commons::paths::{is_absolute_like, is_within, normalize_path};

use super::errors::{ValidationError, ValidationErrorKind as Kind};

pub const MAX_BRANCH_LENGTH: usize = 255;
pub const MAX_LOCATOR_LENGTH: usize = 2_048;
pub const MAX_PROJECT_NAME_LENGTH: usize = 214;
pub const MAX_PATH_LENGTH: usize = 4_096;
/// One year, in seconds.
pub const MAX_CACHE_TTL_SECS: u64 = 31_536_000;

const BRANCH_FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', ']', '\\'];
const SHELL_METACHARACTERS: &[&str] = &[";", "&", "|", "`", "$(", "${"];
const ALLOWED_URL_SCHEMES: &[&str] = &["https", "http", "ssh", "git", "git+ssh", "git+https"];

static SHORTHAND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,38})/[A-Za-z0-9._-]{1,100}$")
});

static SCP_LIKE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"^(?P<user>[A-Za-z0-9_.-]+)@(?P<host>[A-Za-z0-9.-]+):(?P<path>[A-Za-z0-9_./-]+)$")
});

static URL_SCHEME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"^[A-Za-z][A-Za-z0-9+.\-]*:"));

static PROJECT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"^[A-Za-z0-9_][A-Za-z0-9._-]*$"));

fn compile_regex(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("invalid regex pattern `{pattern}`: {err}"),
    }
}

fn expect_str<'a>(field: &str, input: &'a Value) -> Result<&'a str, ValidationError> {
    input.as_str().ok_or_else(|| {
        ValidationError::new(field, Kind::NotAString, "must be a string")
            .with_constraint("type: string")
    })
}

fn reject_null_byte(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.contains('\0') {
        return Err(
            ValidationError::new(field, Kind::NullByte, "contains a null character")
                .with_value(value.replace('\0', "\\0")),
        );
    }
    Ok(())
}

fn contains_shell_metacharacters(value: &str) -> bool {
    SHELL_METACHARACTERS
        .iter()
        .any(|pattern| value.contains(pattern))
}

/// Validate a relative path and return it normalized.
///
/// The normalized relative path is returned, not the absolute resolution;
/// callers that need an absolute path go through the boundary enforcer.
pub fn sanitize_path(field: &str, input: &Value, base: &Path) -> Result<String, ValidationError> {
    let raw = expect_str(field, input)?;
    reject_null_byte(field, raw)?;

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, Kind::Empty, "must not be empty"));
    }
    if trimmed.len() > MAX_PATH_LENGTH {
        return Err(
            ValidationError::new(field, Kind::TooLong, "path is too long")
                .with_constraint(format!("max length: {MAX_PATH_LENGTH}")),
        );
    }
    if is_absolute_like(trimmed) {
        return Err(
            ValidationError::new(field, Kind::AbsolutePath, "absolute paths are not allowed")
                .with_value(trimmed),
        );
    }

    let segments = normalize_relative(trimmed);
    if segments.iter().any(|segment| *segment == "..") {
        return Err(ValidationError::new(
            field,
            Kind::PathTraversal,
            "path traversal detected: parent directory segments are not allowed",
        )
        .with_value(trimmed)
        .with_constraint("no '..' segments after normalization"));
    }

    let normalized = if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    };

    let base = normalize_path(base);
    let resolved = normalize_path(&base.join(&normalized));
    if !is_within(&base, &resolved) {
        return Err(ValidationError::new(
            field,
            Kind::OutsideBase,
            "path resolves outside the allowed base directory",
        )
        .with_value(trimmed));
    }

    Ok(normalized)
}

/// Lexical normalization that keeps leading `..` segments so escapes stay
/// visible. `a/../b` becomes `b`, `a/../../b` becomes `../b`.
fn normalize_relative(path: &str) -> Vec<&str> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|last| *last != "..") {
                    stack.pop();
                } else {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }
    stack
}

/// Validate a git branch, tag, or similar ref-like identifier.
pub fn sanitize_branch(field: &str, input: &Value) -> Result<String, ValidationError> {
    let raw = expect_str(field, input)?;
    reject_null_byte(field, raw)?;
    let value = raw.trim();

    if value.is_empty() {
        return Err(ValidationError::new(field, Kind::Empty, "must not be empty"));
    }
    if value.len() > MAX_BRANCH_LENGTH {
        return Err(ValidationError::new(
            field,
            Kind::TooLong,
            format!("must be at most {MAX_BRANCH_LENGTH} characters"),
        )
        .with_constraint(format!("max length: {MAX_BRANCH_LENGTH}")));
    }
    if contains_shell_metacharacters(value) {
        return Err(
            ValidationError::new(field, Kind::InvalidCharacters, "contains shell metacharacters")
                .with_value(value),
        );
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::new(
            field,
            Kind::InvalidCharacters,
            "contains whitespace or control characters",
        )
        .with_value(value));
    }
    if let Some(bad) = value.chars().find(|c| BRANCH_FORBIDDEN_CHARS.contains(c)) {
        return Err(ValidationError::new(
            field,
            Kind::InvalidCharacters,
            format!("contains forbidden character '{bad}'"),
        )
        .with_value(value));
    }
    if value.contains("..") {
        return Err(
            ValidationError::new(field, Kind::PathTraversal, "must not contain '..'")
                .with_value(value),
        );
    }
    if value.starts_with('.') || value.ends_with('.') {
        return Err(ValidationError::new(
            field,
            Kind::InvalidFormat,
            "must not start or end with '.'",
        ));
    }
    if value.ends_with(".lock") {
        return Err(ValidationError::new(
            field,
            Kind::InvalidFormat,
            "must not end with '.lock'",
        ));
    }
    if value.starts_with('/') || value.ends_with('/') || value.contains("//") {
        return Err(ValidationError::new(
            field,
            Kind::InvalidFormat,
            "must not start or end with '/' or contain '//'",
        ));
    }
    if value.contains("@{") {
        return Err(ValidationError::new(
            field,
            Kind::InvalidFormat,
            "must not contain '@{'",
        ));
    }

    Ok(value.to_string())
}

/// A validated repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// `owner/name` shorthand for the default hosting service.
    Shorthand { owner: String, name: String },
    /// URL with an allowed scheme and a public host.
    Url { url: String },
    /// `user@host:path` form used by ssh remotes.
    ScpLike {
        user: String,
        host: String,
        path: String,
    },
    /// Local filesystem reference (`/`, `./`, `../`, `~/`).
    Local { path: String },
}

impl Locator {
    pub fn as_display(&self) -> String {
        match self {
            Self::Shorthand { owner, name } => format!("{owner}/{name}"),
            Self::Url { url } => url.clone(),
            Self::ScpLike { user, host, path } => format!("{user}@{host}:{path}"),
            Self::Local { path } => path.clone(),
        }
    }
}

/// Validate a repository locator: shorthand, URL, scp-like remote, or local path.
pub fn sanitize_locator(field: &str, input: &Value) -> Result<Locator, ValidationError> {
    let raw = expect_str(field, input)?;
    reject_null_byte(field, raw)?;
    let value = raw.trim();

    if value.is_empty() {
        return Err(ValidationError::new(field, Kind::Empty, "must not be empty"));
    }
    if value.len() > MAX_LOCATOR_LENGTH {
        return Err(ValidationError::new(
            field,
            Kind::TooLong,
            format!("must be at most {MAX_LOCATOR_LENGTH} characters"),
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::new(
            field,
            Kind::InvalidCharacters,
            "contains control characters",
        ));
    }
    if contains_shell_metacharacters(value) {
        return Err(
            ValidationError::new(field, Kind::InvalidCharacters, "contains shell metacharacters")
                .with_value(value),
        );
    }

    if ["/", "./", "../", "~/"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
    {
        return Ok(Locator::Local {
            path: value.to_string(),
        });
    }

    if let Some(captures) = SCP_LIKE_REGEX.captures(value) {
        let host = &captures["host"];
        check_domain(field, host)?;
        if let Ok(ip) = host.parse::<IpAddr>() {
            check_ip(field, ip)?;
        }
        return Ok(Locator::ScpLike {
            user: captures["user"].to_string(),
            host: host.to_string(),
            path: captures["path"].to_string(),
        });
    }

    if URL_SCHEME_REGEX.is_match(value) {
        return sanitize_url(field, value);
    }

    if SHORTHAND_REGEX.is_match(value) {
        if let Some((owner, name)) = value.split_once('/')
            && name != "."
            && name != ".."
        {
            return Ok(Locator::Shorthand {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }
    }

    Err(ValidationError::new(
        field,
        Kind::InvalidFormat,
        "expected 'owner/name', an http(s)/ssh/git URL, or a local path",
    )
    .with_value(value))
}

fn sanitize_url(field: &str, value: &str) -> Result<Locator, ValidationError> {
    let url = Url::parse(value).map_err(|err| {
        ValidationError::new(field, Kind::InvalidFormat, format!("invalid URL: {err}"))
    })?;

    let scheme = url.scheme().to_ascii_lowercase();
    if !ALLOWED_URL_SCHEMES.contains(&scheme.as_str()) {
        return Err(ValidationError::new(
            field,
            Kind::DisallowedScheme,
            format!("URL scheme '{scheme}' is not allowed"),
        )
        .with_constraint(format!("allowed schemes: {}", ALLOWED_URL_SCHEMES.join(", "))));
    }
    if url.password().is_some() {
        return Err(ValidationError::new(
            field,
            Kind::InvalidFormat,
            "URL must not embed credentials",
        ));
    }

    match url.host() {
        None => {
            return Err(ValidationError::new(
                field,
                Kind::InvalidFormat,
                "URL must include a host",
            ));
        }
        Some(Host::Domain(domain)) => check_domain(field, domain)?,
        Some(Host::Ipv4(ip)) => check_ip(field, IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => check_ip(field, IpAddr::V6(ip))?,
    }

    Ok(Locator::Url {
        url: url.to_string(),
    })
}

fn check_domain(field: &str, domain: &str) -> Result<(), ValidationError> {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    let internal = domain == "localhost"
        || domain.ends_with(".localhost")
        || domain.ends_with(".local")
        || domain.ends_with(".internal");
    if internal {
        return Err(ValidationError::new(
            field,
            Kind::PrivateNetwork,
            "loopback and internal hosts are not allowed",
        ));
    }
    Ok(())
}

fn check_ip(field: &str, ip: IpAddr) -> Result<(), ValidationError> {
    let blocked = match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => is_internal_v6(v6),
    };
    if blocked {
        return Err(ValidationError::new(
            field,
            Kind::PrivateNetwork,
            "loopback and private network addresses are not allowed",
        ));
    }
    Ok(())
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && (64..=127).contains(&b))
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_internal_v4(mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // unique local, fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link local, fe80::/10
        || (first & 0xffc0) == 0xfe80
}

/// Validate a project name used for directory names and placeholder values.
pub fn sanitize_project_name(field: &str, input: &Value) -> Result<String, ValidationError> {
    let raw = expect_str(field, input)?;
    reject_null_byte(field, raw)?;
    let value = raw.trim();

    if value.is_empty() {
        return Err(ValidationError::new(field, Kind::Empty, "must not be empty"));
    }
    if value.len() > MAX_PROJECT_NAME_LENGTH {
        return Err(ValidationError::new(
            field,
            Kind::TooLong,
            format!("must be at most {MAX_PROJECT_NAME_LENGTH} characters"),
        ));
    }
    if value.contains("..") {
        return Err(ValidationError::new(
            field,
            Kind::PathTraversal,
            "must not contain '..'",
        ));
    }
    if !PROJECT_NAME_REGEX.is_match(value) {
        return Err(ValidationError::new(
            field,
            Kind::InvalidCharacters,
            "may only contain letters, digits, '.', '_' and '-', and must not start with '.' or '-'",
        )
        .with_value(value));
    }
    Ok(value.to_string())
}

/// Validate a cache TTL given either as a JSON number or a digit string.
pub fn sanitize_cache_ttl(field: &str, input: &Value) -> Result<u64, ValidationError> {
    let parsed = match input {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    let Some(ttl) = parsed else {
        return Err(ValidationError::new(
            field,
            Kind::InvalidFormat,
            "must be a non-negative integer number of seconds",
        ));
    };
    if ttl > MAX_CACHE_TTL_SECS {
        return Err(ValidationError::new(
            field,
            Kind::OutOfRange,
            format!("must not exceed {MAX_CACHE_TTL_SECS} seconds"),
        ));
    }
    Ok(ttl)
}
