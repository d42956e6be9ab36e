//! Structured edits of JSON files such as `package.json`.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{PathArg, ToolError, ToolSandbox};
use crate::security::errors::SandboxError;

#[derive(Clone)]
pub struct JsonTools {
    sandbox: Arc<ToolSandbox>,
}

impl JsonTools {
    pub(crate) fn new(sandbox: Arc<ToolSandbox>) -> Self {
        Self { sandbox }
    }

    pub async fn read<P: PathArg + ?Sized>(&self, file: &P) -> Result<Value, ToolError> {
        let path = self.sandbox.resolve("json.read", "file", file)?;
        self.load(&path).await
    }

    /// Set the value at a dotted `key_path`, creating intermediate objects.
    /// A missing file starts as an empty object.
    pub async fn set<P: PathArg + ?Sized>(
        &self,
        file: &P,
        key_path: &str,
        value: Value,
    ) -> Result<bool, ToolError> {
        const OP: &str = "json.set";
        let path = self.sandbox.resolve(OP, "file", file)?;
        let segments = self.key_segments(OP, key_path)?;
        let mut document = self.load_or_empty(&path).await?;

        let Some((last, parents)) = segments.split_last() else {
            return Ok(false);
        };
        let mut cursor = &mut document;
        for segment in parents {
            make_object(cursor);
            cursor = &mut cursor[*segment];
        }
        make_object(cursor);
        if cursor.get(*last) == Some(&value) {
            return Ok(false);
        }
        cursor[*last] = value;
        self.store(&path, &document).await?;
        Ok(true)
    }

    /// Deep-merge `patch` into the file. Objects merge key by key; any other
    /// value replaces what was there.
    pub async fn merge<P: PathArg + ?Sized>(
        &self,
        file: &P,
        patch: &Value,
    ) -> Result<bool, ToolError> {
        const OP: &str = "json.merge";
        let path = self.sandbox.resolve(OP, "file", file)?;
        if !patch.is_object() {
            return Err(self.sandbox.reject(SandboxError::InvalidArgument {
                operation: OP,
                reason: "merge value must be an object".to_string(),
            }));
        }
        let original = self.load_or_empty(&path).await?;
        let mut document = original.clone();
        deep_merge(&mut document, patch);
        if document == original {
            return Ok(false);
        }
        self.store(&path, &document).await?;
        Ok(true)
    }

    /// Remove the value at `key_path`. Returns whether anything was removed.
    pub async fn remove<P: PathArg + ?Sized>(
        &self,
        file: &P,
        key_path: &str,
    ) -> Result<bool, ToolError> {
        const OP: &str = "json.remove";
        let path = self.sandbox.resolve(OP, "file", file)?;
        let segments = self.key_segments(OP, key_path)?;
        let mut document = self.load(&path).await?;

        let Some((last, parents)) = segments.split_last() else {
            return Ok(false);
        };
        let mut cursor = &mut document;
        for segment in parents {
            match cursor.get_mut(*segment) {
                Some(next) => cursor = next,
                None => return Ok(false),
            }
        }
        let removed = cursor
            .as_object_mut()
            .and_then(|object| object.remove(*last))
            .is_some();
        if removed {
            self.store(&path, &document).await?;
        }
        Ok(removed)
    }

    fn key_segments<'k>(
        &self,
        operation: &'static str,
        key_path: &'k str,
    ) -> Result<Vec<&'k str>, ToolError> {
        let segments: Vec<&str> = key_path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(self.sandbox.reject(SandboxError::InvalidArgument {
                operation,
                reason: format!("invalid key path '{key_path}'"),
            }));
        }
        Ok(segments)
    }

    async fn load(&self, path: &Path) -> Result<Value, ToolError> {
        let content = self.sandbox.fs().read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|source| ToolError::Json {
            path: self.sandbox.relative(path),
            source,
        })
    }

    async fn load_or_empty(&self, path: &Path) -> Result<Value, ToolError> {
        match self.load(path).await {
            Err(ToolError::Fs(err)) if err.is_not_found() => Ok(Value::Object(Map::new())),
            other => other,
        }
    }

    async fn store(&self, path: &Path, document: &Value) -> Result<(), ToolError> {
        let mut rendered =
            serde_json::to_string_pretty(document).map_err(|source| ToolError::Json {
                path: self.sandbox.relative(path),
                source,
            })?;
        rendered.push('\n');
        self.sandbox.ensure_parent(path).await?;
        self.sandbox.fs().write(path, rendered.as_bytes()).await?;
        Ok(())
    }
}

/// Replace anything that is not an object with an empty one.
fn make_object(value: &mut Value) {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
}

fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && target.get(key).is_some_and(Value::is_object);
                if nested && let Some(existing) = target.get_mut(key) {
                    deep_merge(existing, value);
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
