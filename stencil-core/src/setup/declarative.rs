//! Setup plans written as data instead of code.
//!
//! A plan is an ordered list of steps, each naming one tool of the surface.
//! Path arguments stay untyped until the tool surface checks them, so a
//! number where a path belongs fails as a sandbox error, not a parse error.
//!
//! ```toml
//! name = "starter"
//!
//! [[steps]]
//! tool = "placeholders.replace_all"
//! target = "**/*.md"
//!
//! [[steps]]
//! tool = "files.ensure_line"
//! file = ".gitignore"
//! line = "node_modules"
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{SetupArgs, SetupError, SetupScript};
use crate::security::fs::Filesystem;
use crate::tools::ToolError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

fn default_target() -> Value {
    Value::String("**/*".to_string())
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", deny_unknown_fields)]
pub enum SetupStep {
    #[serde(rename = "placeholders.replace_in_file")]
    ReplaceInFile { file: Value, replacements: Value },

    #[serde(rename = "placeholders.replace_in_files")]
    ReplaceInFiles { pattern: Value, replacements: Value },

    #[serde(rename = "placeholders.replace_all")]
    ReplaceAll {
        #[serde(default = "default_target")]
        target: Value,
        #[serde(default)]
        extra: Option<Value>,
    },

    #[serde(rename = "templates.render_file")]
    RenderFile {
        src: Value,
        dest: Value,
        #[serde(default = "empty_object")]
        data: Value,
    },

    #[serde(rename = "templates.copy_assets")]
    CopyAssets { from: Value, to: Value },

    #[serde(rename = "files.insert_after")]
    InsertAfter {
        file: Value,
        anchor: String,
        content: String,
    },

    #[serde(rename = "files.insert_before")]
    InsertBefore {
        file: Value,
        anchor: String,
        content: String,
    },

    #[serde(rename = "files.replace_block")]
    ReplaceBlock {
        file: Value,
        start: String,
        end: String,
        content: String,
    },

    #[serde(rename = "files.remove_block")]
    RemoveBlock {
        file: Value,
        start: String,
        end: String,
    },

    #[serde(rename = "files.ensure_line")]
    EnsureLine { file: Value, line: String },

    #[serde(rename = "json.set")]
    JsonSet {
        file: Value,
        key: String,
        value: Value,
    },

    #[serde(rename = "json.merge")]
    JsonMerge { file: Value, value: Value },

    #[serde(rename = "json.remove")]
    JsonRemove { file: Value, key: String },

    #[serde(rename = "log")]
    Log {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },
}

impl SetupStep {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::ReplaceInFile { .. } => "placeholders.replace_in_file",
            Self::ReplaceInFiles { .. } => "placeholders.replace_in_files",
            Self::ReplaceAll { .. } => "placeholders.replace_all",
            Self::RenderFile { .. } => "templates.render_file",
            Self::CopyAssets { .. } => "templates.copy_assets",
            Self::InsertAfter { .. } => "files.insert_after",
            Self::InsertBefore { .. } => "files.insert_before",
            Self::ReplaceBlock { .. } => "files.replace_block",
            Self::RemoveBlock { .. } => "files.remove_block",
            Self::EnsureLine { .. } => "files.ensure_line",
            Self::JsonSet { .. } => "json.set",
            Self::JsonMerge { .. } => "json.merge",
            Self::JsonRemove { .. } => "json.remove",
            Self::Log { .. } => "log",
        }
    }

    async fn apply(&self, args: &SetupArgs) -> Result<(), SetupError> {
        let tools = &args.tools;
        match self {
            Self::ReplaceInFile { file, replacements } => {
                tools.placeholders.replace_in_file(file, replacements).await?;
            }
            Self::ReplaceInFiles {
                pattern,
                replacements,
            } => {
                tools
                    .placeholders
                    .replace_in_files(pattern, replacements)
                    .await?;
            }
            Self::ReplaceAll { target, extra } => {
                tools.placeholders.replace_all(target, extra.as_ref()).await?;
            }
            Self::RenderFile { src, dest, data } => {
                tools.templates.render_file(src, dest, data).await?;
            }
            Self::CopyAssets { from, to } => {
                tools.templates.copy_assets(from, to).await?;
            }
            Self::InsertAfter {
                file,
                anchor,
                content,
            } => {
                tools.files.insert_after(file, anchor, content).await?;
            }
            Self::InsertBefore {
                file,
                anchor,
                content,
            } => {
                tools.files.insert_before(file, anchor, content).await?;
            }
            Self::ReplaceBlock {
                file,
                start,
                end,
                content,
            } => {
                tools.files.replace_block(file, start, end, content).await?;
            }
            Self::RemoveBlock { file, start, end } => {
                tools.files.remove_block(file, start, end).await?;
            }
            Self::EnsureLine { file, line } => {
                tools.files.ensure_line(file, line).await?;
            }
            Self::JsonSet { file, key, value } => {
                tools.json.set(file, key, value.clone()).await?;
            }
            Self::JsonMerge { file, value } => {
                tools.json.merge(file, value).await?;
            }
            Self::JsonRemove { file, key } => {
                tools.json.remove(file, key).await?;
            }
            Self::Log { level, message } => match level {
                LogLevel::Debug => tools.logger.debug(message),
                LogLevel::Info => tools.logger.info(message),
                LogLevel::Warn => tools.logger.warn(message),
                LogLevel::Error => tools.logger.error(message),
            },
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeclarativeSetup {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<SetupStep>,
}

fn default_name() -> String {
    "declarative".to_string()
}

impl DeclarativeSetup {
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, SetupError> {
        toml::from_str(content).map_err(|err| SetupError::Plan {
            path: origin.to_string(),
            reason: err.to_string(),
        })
    }

    pub fn from_json_str(content: &str, origin: &str) -> Result<Self, SetupError> {
        serde_json::from_str(content).map_err(|err| SetupError::Plan {
            path: origin.to_string(),
            reason: err.to_string(),
        })
    }

    /// Look for `setup_file` in `assets_root`, then for its `.json` sibling.
    /// Returns `None` when neither exists.
    pub async fn discover(
        fs: &dyn Filesystem,
        assets_root: &Path,
        setup_file: &str,
    ) -> Result<Option<Self>, SetupError> {
        let primary = assets_root.join(setup_file);
        let candidates = [primary.clone(), primary.with_extension("json")];
        for candidate in candidates {
            let exists = fs.exists(&candidate).await.map_err(ToolError::from)?;
            if !exists {
                continue;
            }
            let origin = candidate
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = fs
                .read_to_string(&candidate)
                .await
                .map_err(ToolError::from)?;
            let plan = if candidate.extension().is_some_and(|ext| ext == "json") {
                Self::from_json_str(&content, &origin)?
            } else {
                Self::from_toml_str(&content, &origin)?
            };
            debug!(plan = %plan.name, steps = plan.steps.len(), "Loaded setup plan");
            return Ok(Some(plan));
        }
        Ok(None)
    }
}

#[async_trait]
impl SetupScript for DeclarativeSetup {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, args: SetupArgs) -> Result<(), SetupError> {
        for (index, step) in self.steps.iter().enumerate() {
            debug!(step = index + 1, tool = step.tool_name(), "Applying setup step");
            step.apply(&args).await?;
        }
        Ok(())
    }
}
