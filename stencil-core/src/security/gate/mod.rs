//! The mandatory checkpoint between raw external input and everything else.
//!
//! `InputGate::enforce` checks required fields, consults the result cache,
//! runs the per-field sanitizers and records the outcome in the audit trail.
//! Every failure surfaces as a [`GateError`]; nothing is ever passed through
//! unvalidated.

mod abuse;
mod cache;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use stencil_commons::sanitize_error_message;
use stencil_config::gate::GateConfig;

use super::audit::{AuditLogger, ValidationStatus};
use super::errors::{GateError, ValidationError, ValidationErrorKind};
use super::sanitizers::{
    Locator, sanitize_branch, sanitize_cache_ttl, sanitize_locator, sanitize_path,
    sanitize_project_name,
};
use crate::context::InputValue;

pub use abuse::{AbuseAlert, AbuseSnapshot, AbuseTracker};
pub use cache::{CacheStats, ValidationCache};

/// Event name recorded when a caller keeps failing validation.
pub const POTENTIAL_ABUSE_EVENT: &str = "potential_abuse";

/// Known input fields, each bound to one sanitizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputField {
    ProjectDirectory,
    ProjectName,
    Template,
    Repo,
    Branch,
    CacheTtl,
    LogFile,
}

impl InputField {
    pub const ALL: [InputField; 7] = [
        Self::ProjectDirectory,
        Self::ProjectName,
        Self::Template,
        Self::Repo,
        Self::Branch,
        Self::CacheTtl,
        Self::LogFile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ProjectDirectory => "project_directory",
            Self::ProjectName => "project_name",
            Self::Template => "template",
            Self::Repo => "repo",
            Self::Branch => "branch",
            Self::CacheTtl => "cache_ttl",
            Self::LogFile => "log_file",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    fn validate(self, value: &Value, base: &Path) -> Result<FieldOutput, ValidationError> {
        let field = self.name();
        match self {
            Self::ProjectDirectory | Self::LogFile => {
                sanitize_path(field, value, base).map(FieldOutput::text)
            }
            Self::ProjectName => sanitize_project_name(field, value).map(FieldOutput::text),
            Self::Branch => sanitize_branch(field, value).map(FieldOutput::text),
            Self::Template | Self::Repo => {
                sanitize_locator(field, value).map(|locator| FieldOutput {
                    value: InputValue::String(locator.as_display()),
                    locator: Some(locator),
                })
            }
            Self::CacheTtl => sanitize_cache_ttl(field, value).map(|ttl| FieldOutput {
                value: InputValue::from(ttl),
                locator: None,
            }),
        }
    }
}

struct FieldOutput {
    value: InputValue,
    locator: Option<Locator>,
}

impl FieldOutput {
    fn text(value: String) -> Self {
        Self {
            value: InputValue::String(value),
            locator: None,
        }
    }
}

/// Who is calling and what the command needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateContext {
    pub command: String,
    pub user: String,
    pub required_fields: Vec<String>,
}

impl GateContext {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            user: "anonymous".to_string(),
            required_fields: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn require<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    fn tracker_key(&self) -> String {
        AbuseTracker::key(&self.command, &self.user)
    }
}

/// Output of a successful gate pass. The only way to obtain one is
/// [`InputGate::enforce`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedInputs {
    values: BTreeMap<String, InputValue>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    locators: BTreeMap<String, Locator>,
}

impl ValidatedInputs {
    pub fn get(&self, field: &str) -> Option<&InputValue> {
        self.values.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(InputValue::as_str)
    }

    pub fn locator(&self, field: &str) -> Option<&Locator> {
        self.locators.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

#[derive(Debug)]
pub struct InputGate {
    audit: AuditLogger,
    allowed_base: PathBuf,
    cache: ValidationCache<ValidatedInputs>,
    tracker: AbuseTracker,
}

impl InputGate {
    /// `allowed_base` is the directory relative path inputs must stay under.
    pub fn new(config: &GateConfig, audit: AuditLogger, allowed_base: impl Into<PathBuf>) -> Self {
        Self {
            audit,
            allowed_base: allowed_base.into(),
            cache: ValidationCache::new(config.cache_capacity),
            tracker: AbuseTracker::new(
                config.abuse_threshold,
                config.abuse_window(),
                config.recent_error_limit,
            )
            .with_max_contexts(config.abuse_max_contexts),
        }
    }

    pub fn enforce(
        &self,
        raw_inputs: &Value,
        context: &GateContext,
    ) -> Result<ValidatedInputs, GateError> {
        let audit_context = context.tracker_key();

        let Some(inputs) = raw_inputs.as_object() else {
            let failure = ValidationError::new(
                "input",
                ValidationErrorKind::InvalidFormat,
                "input must be an object of named fields",
            );
            return Err(self.fail(
                context,
                GateError::Validation {
                    command: context.command.clone(),
                    failures: vec![failure],
                },
            ));
        };

        let missing: Vec<String> = context
            .required_fields
            .iter()
            .filter(|field| is_missing(inputs.get(field.as_str())))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(self.fail(
                context,
                GateError::MissingFields {
                    command: context.command.clone(),
                    fields: missing,
                },
            ));
        }

        let key = cache_key(raw_inputs, &context.required_fields);
        if let Some(cached) = self.cache.get(&key) {
            debug!(context = %audit_context, "Input gate cache hit");
            self.audit.log_validation(
                &audit_context,
                ValidationStatus::SuccessCached,
                None,
                cached.values.keys().cloned().collect(),
            );
            return Ok(cached);
        }

        let mut validated = ValidatedInputs {
            values: BTreeMap::new(),
            locators: BTreeMap::new(),
        };
        let mut failures = Vec::new();
        for (name, value) in inputs {
            match InputField::from_name(name) {
                Some(field) => match field.validate(value, &self.allowed_base) {
                    Ok(output) => {
                        validated.values.insert(name.clone(), output.value);
                        if let Some(locator) = output.locator {
                            validated.locators.insert(name.clone(), locator);
                        }
                    }
                    Err(failure) => failures.push(failure),
                },
                // Unknown fields only pass through when the command requires them.
                None if context.required_fields.contains(name) => {
                    match InputValue::from_json(value) {
                        Some(scalar) => {
                            validated.values.insert(name.clone(), scalar);
                        }
                        None => failures.push(ValidationError::new(
                            name.as_str(),
                            ValidationErrorKind::InvalidFormat,
                            "must be a string, number or boolean",
                        )),
                    }
                }
                None => {}
            }
        }

        if !failures.is_empty() {
            return Err(self.fail(
                context,
                GateError::Validation {
                    command: context.command.clone(),
                    failures,
                },
            ));
        }

        self.cache.insert(key, validated.clone());
        self.audit.log_validation(
            &audit_context,
            ValidationStatus::Success,
            None,
            validated.values.keys().cloned().collect(),
        );
        self.tracker.reset(&audit_context);
        Ok(validated)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn abuse_snapshot(&self, command: &str, user: &str) -> Option<AbuseSnapshot> {
        self.tracker.snapshot(&AbuseTracker::key(command, user))
    }

    fn fail(&self, context: &GateContext, error: GateError) -> GateError {
        let audit_context = context.tracker_key();
        let message = error.to_string();
        let fields = match &error {
            GateError::MissingFields { fields, .. } => fields.clone(),
            GateError::Validation { failures, .. } => {
                failures.iter().map(|failure| failure.field.clone()).collect()
            }
        };
        self.audit.log_validation(
            &audit_context,
            ValidationStatus::Failure,
            Some(&message),
            fields,
        );

        if let Some(alert) = self.tracker.record_failure(&audit_context, &message) {
            warn!(
                context = %alert.key,
                failures = alert.count,
                window_secs = alert.window_secs,
                "Repeated validation failures from one caller"
            );
            self.audit.log_security_event(
                POTENTIAL_ABUSE_EVENT,
                json!({
                    "context": alert.key,
                    "failures": alert.count,
                    "window_secs": alert.window_secs,
                    "recent_errors": alert
                        .recent_errors
                        .iter()
                        .map(String::as_str)
                        .map(sanitize_error_message)
                        .collect::<Vec<_>>(),
                }),
            );
        }
        error
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

/// Serialize with object keys sorted at every level so logically equal
/// inputs share one key.
fn cache_key(raw: &Value, required: &[String]) -> String {
    let mut key = String::new();
    write_canonical(raw, &mut key);
    let mut required: Vec<&str> = required.iter().map(String::as_str).collect();
    required.sort_unstable();
    required.dedup();
    key.push_str("|required=");
    key.push_str(&required.join(","));
    key
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (index, key) in keys.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        if let Some(value) = map.get(key) {
            write_canonical(value, out);
        }
    }
    out.push('}');
}
