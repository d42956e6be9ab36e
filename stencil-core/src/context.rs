//! Immutable snapshot of the project handed to setup code.
//!
//! Collections are shared behind `Arc` and only exposed through shared
//! references, so nothing reachable from an [`ExecutionContext`] can be
//! mutated after construction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use stencil_commons::paths::normalize_path;

use crate::security::gate::ValidatedInputs;

pub const DEFAULT_ASSETS_DIR: &str = "__scaffold__";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to resolve the working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),
}

impl ContextError {
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => Some(field),
            Self::WorkingDirectory(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthoringMode {
    #[default]
    Standard,
    Authoring,
}

impl AuthoringMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Authoring => "authoring",
        }
    }
}

impl fmt::Display for AuthoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthoringMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "authoring" => Ok(Self::Authoring),
            other => Err(format!(
                "unknown mode '{other}', expected 'standard' or 'authoring'"
            )),
        }
    }
}

/// Scalar input value visible to setup code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl InputValue {
    /// Convert a JSON scalar. Arrays, objects and null have no input form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(flag) => Some(Self::Bool(*flag)),
            Value::Number(number) => Some(Self::Number(number.clone())),
            Value::String(text) => Some(Self::String(text.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Number(number) => Value::Number(number.clone()),
            Self::String(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Number(number) => write!(f, "{number}"),
            Self::String(text) => f.write_str(text),
        }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for InputValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

/// Selection for one option dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionValue {
    Single(String),
    Multiple(IndexSet<String>),
}

impl DimensionValue {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(single) => single == value,
            Self::Multiple(values) => values.contains(value),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(single) => vec![single.as_str()],
            Self::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Template options chosen for this run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectedOptions {
    raw: Arc<[String]>,
    by_dimension: Arc<IndexMap<String, DimensionValue>>,
}

impl SelectedOptions {
    pub fn new(raw: Vec<String>, by_dimension: IndexMap<String, DimensionValue>) -> Self {
        Self {
            raw: raw.into(),
            by_dimension: Arc::new(by_dimension),
        }
    }

    /// Build selections from `dimension=value` tokens. A dimension named more
    /// than once becomes an ordered set; tokens without `=` are kept only in
    /// the raw list.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let mut by_dimension: IndexMap<String, DimensionValue> = IndexMap::new();
        for token in &raw {
            let Some((dimension, value)) = token.split_once('=') else {
                continue;
            };
            let (dimension, value) = (dimension.trim(), value.trim());
            if dimension.is_empty() || value.is_empty() {
                continue;
            }
            match by_dimension.get_mut(dimension) {
                None => {
                    by_dimension.insert(
                        dimension.to_string(),
                        DimensionValue::Single(value.to_string()),
                    );
                }
                Some(DimensionValue::Single(existing)) => {
                    if existing != value {
                        let set: IndexSet<String> =
                            [existing.clone(), value.to_string()].into_iter().collect();
                        by_dimension.insert(dimension.to_string(), DimensionValue::Multiple(set));
                    }
                }
                Some(DimensionValue::Multiple(values)) => {
                    values.insert(value.to_string());
                }
            }
        }
        Self::new(raw, by_dimension)
    }

    pub fn raw(&self) -> &[String] {
        &self.raw
    }

    pub fn by_dimension(&self) -> &IndexMap<String, DimensionValue> {
        &self.by_dimension
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionValue> {
        self.by_dimension.get(name)
    }
}

/// Construction parameters for [`create_context`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub project_name: String,
    pub project_directory: PathBuf,
    /// Invocation directory; defaults to the process working directory.
    pub cwd: Option<PathBuf>,
    /// `standard` or `authoring`; defaults to `standard`.
    pub authoring_mode: Option<String>,
    pub assets_dir: Option<String>,
    pub inputs: IndexMap<String, InputValue>,
    pub constants: IndexMap<String, InputValue>,
    pub options: SelectedOptions,
}

impl ContextOptions {
    /// Seed construction parameters from gate output. The project directory
    /// is the validated relative path, resolved later against `cwd`.
    pub fn from_validated(validated: &ValidatedInputs) -> Self {
        let inputs: IndexMap<String, InputValue> = validated
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        Self {
            project_name: validated.get_str("project_name").unwrap_or_default().to_string(),
            project_directory: PathBuf::from(
                validated.get_str("project_directory").unwrap_or_default(),
            ),
            inputs,
            ..Self::default()
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.authoring_mode = Some(mode.into());
        self
    }

    pub fn with_assets_dir(mut self, assets_dir: impl Into<String>) -> Self {
        self.assets_dir = Some(assets_dir.into());
        self
    }

    pub fn with_constant(mut self, key: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.constants.insert(key.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: SelectedOptions) -> Self {
        self.options = options;
        self
    }
}

/// Read-only view of one scaffolding run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionContext {
    project_name: String,
    project_directory: PathBuf,
    cwd: PathBuf,
    authoring_mode: AuthoringMode,
    assets_dir: String,
    inputs: Arc<IndexMap<String, InputValue>>,
    constants: Arc<IndexMap<String, InputValue>>,
    options: SelectedOptions,
}

impl ExecutionContext {
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn project_directory(&self) -> &Path {
        &self.project_directory
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn authoring_mode(&self) -> AuthoringMode {
        self.authoring_mode
    }

    pub fn assets_dir(&self) -> &str {
        &self.assets_dir
    }

    pub fn inputs(&self) -> &IndexMap<String, InputValue> {
        &self.inputs
    }

    pub fn input(&self, key: &str) -> Option<&InputValue> {
        self.inputs.get(key)
    }

    pub fn constants(&self) -> &IndexMap<String, InputValue> {
        &self.constants
    }

    pub fn options(&self) -> &SelectedOptions {
        &self.options
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn create_context(options: ContextOptions) -> Result<ExecutionContext, ContextError> {
    let project_name = options.project_name.trim();
    if project_name.is_empty() {
        return Err(ContextError::Missing {
            field: "project_name",
        });
    }
    if options.project_directory.as_os_str().is_empty() {
        return Err(ContextError::Missing {
            field: "project_directory",
        });
    }

    let authoring_mode = match options.authoring_mode.as_deref() {
        None => AuthoringMode::Standard,
        Some(raw) => raw.parse().map_err(|reason| ContextError::Invalid {
            field: "authoring_mode",
            reason,
        })?,
    };

    let assets_dir = options
        .assets_dir
        .unwrap_or_else(|| DEFAULT_ASSETS_DIR.to_string());
    let single_segment = !assets_dir.is_empty()
        && assets_dir != "."
        && assets_dir != ".."
        && !assets_dir.contains(['/', '\\', '\0']);
    if !single_segment {
        return Err(ContextError::Invalid {
            field: "assets_dir",
            reason: "must be a single directory name".to_string(),
        });
    }

    let cwd = match options.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().map_err(ContextError::WorkingDirectory)?,
    };
    let cwd = normalize_path(&std::path::absolute(&cwd).map_err(ContextError::WorkingDirectory)?);
    let project_directory = normalize_path(&cwd.join(&options.project_directory));

    Ok(ExecutionContext {
        project_name: project_name.to_string(),
        project_directory,
        cwd,
        authoring_mode,
        assets_dir,
        inputs: Arc::new(options.inputs),
        constants: Arc::new(options.constants),
        options: options.options,
    })
}

/// Whether `value` has the full serialized shape of an [`ExecutionContext`].
pub fn is_execution_context(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    let is_string = |key: &str| object.get(key).is_some_and(Value::is_string);
    let is_scalar_map = |key: &str| {
        object.get(key).and_then(Value::as_object).is_some_and(|map| {
            map.values()
                .all(|entry| entry.is_string() || entry.is_number() || entry.is_boolean())
        })
    };
    let mode_ok = object
        .get("authoring_mode")
        .and_then(Value::as_str)
        .is_some_and(|mode| mode.parse::<AuthoringMode>().is_ok());
    let options_ok = object
        .get("options")
        .and_then(Value::as_object)
        .is_some_and(|options| {
            let raw_ok = options
                .get("raw")
                .and_then(Value::as_array)
                .is_some_and(|raw| raw.iter().all(Value::is_string));
            let dims_ok = options
                .get("by_dimension")
                .and_then(Value::as_object)
                .is_some_and(|dims| {
                    dims.values().all(|dim| match dim {
                        Value::String(_) => true,
                        Value::Array(items) => items.iter().all(Value::is_string),
                        _ => false,
                    })
                });
            raw_ok && dims_ok
        });

    ["project_name", "project_directory", "cwd", "assets_dir"]
        .into_iter()
        .all(is_string)
        && mode_ok
        && is_scalar_map("inputs")
        && is_scalar_map("constants")
        && options_ok
}
