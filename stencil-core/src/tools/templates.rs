//! Templated rendering and asset copying.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use super::{PathArg, ToolError, ToolSandbox};
use crate::security::errors::SandboxError;
use crate::security::fs::EntryKind;

static VARIABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}") {
        Ok(regex) => regex,
        Err(err) => panic!("invalid template variable pattern: {err}"),
    }
});

#[derive(Clone)]
pub struct TemplateTools {
    sandbox: Arc<ToolSandbox>,
}

impl TemplateTools {
    pub(crate) fn new(sandbox: Arc<ToolSandbox>) -> Self {
        Self { sandbox }
    }

    /// Render `{{ name }}` and `{{ nested.key }}` variables from `data`.
    /// Unknown variables are left as written.
    pub fn render_string(&self, template: &str, data: &Value) -> Result<String, ToolError> {
        if !data.is_object() {
            return Err(self.sandbox.reject(SandboxError::InvalidArgument {
                operation: "templates.render_string",
                reason: "template data must be an object".to_string(),
            }));
        }
        Ok(render(template, data))
    }

    /// Render `src` into `dest`, creating parent directories as needed.
    pub async fn render_file<S, D>(&self, src: &S, dest: &D, data: &Value) -> Result<(), ToolError>
    where
        S: PathArg + ?Sized,
        D: PathArg + ?Sized,
    {
        const OP: &str = "templates.render_file";
        let source = self.sandbox.resolve(OP, "src", src)?;
        let destination = self.sandbox.resolve(OP, "dest", dest)?;
        if !data.is_object() {
            return Err(self.sandbox.reject(SandboxError::InvalidArgument {
                operation: OP,
                reason: "template data must be an object".to_string(),
            }));
        }

        let fs = self.sandbox.fs();
        let template = fs.read_to_string(&source).await?;
        let rendered = render(&template, data);
        self.sandbox.ensure_parent(&destination).await?;
        fs.write(&destination, rendered.as_bytes()).await?;
        debug!(
            src = %self.sandbox.relative(&source),
            dest = %self.sandbox.relative(&destination),
            "Rendered template"
        );
        Ok(())
    }

    /// Copy a file or directory from the author-assets area into the
    /// project. Version-control metadata and the assets marker are skipped.
    /// Returns the number of files copied.
    pub async fn copy_assets<F, T>(&self, from: &F, to: &T) -> Result<usize, ToolError>
    where
        F: PathArg + ?Sized,
        T: PathArg + ?Sized,
    {
        const OP: &str = "templates.copy_assets";
        let source = self.sandbox.resolve_asset(OP, "from", from)?;
        let destination = self.sandbox.resolve(OP, "to", to)?;
        let fs = self.sandbox.fs();

        let metadata = fs.metadata(&source).await?;
        match metadata.kind {
            EntryKind::File => {
                let into_directory = fs
                    .metadata(&destination)
                    .await
                    .is_ok_and(|meta| meta.kind == EntryKind::Dir);
                let target = if into_directory {
                    match source.file_name() {
                        Some(name) => destination.join(name),
                        None => destination,
                    }
                } else {
                    destination
                };
                self.sandbox.ensure_parent(&target).await?;
                fs.copy(&source, &target).await?;
                Ok(1)
            }
            EntryKind::Dir => {
                if stencil_commons::is_within(&source, &destination) {
                    return Err(self.sandbox.reject(SandboxError::InvalidArgument {
                        operation: OP,
                        reason: format!(
                            "cannot copy '{}' into itself",
                            self.sandbox.relative(&source)
                        ),
                    }));
                }
                self.copy_tree(&source, &destination).await
            }
            EntryKind::Symlink | EntryKind::Other => {
                Err(self.sandbox.reject(SandboxError::InvalidArgument {
                    operation: OP,
                    reason: "only regular files and directories can be copied".to_string(),
                }))
            }
        }
    }

    async fn copy_tree(&self, source: &Path, destination: &Path) -> Result<usize, ToolError> {
        let fs = self.sandbox.fs();
        let mut copied = 0;
        let mut pending: Vec<(PathBuf, PathBuf)> =
            vec![(source.to_path_buf(), destination.to_path_buf())];

        while let Some((from_dir, to_dir)) = pending.pop() {
            fs.create_dir_all(&to_dir).await?;
            for entry in fs.read_dir(&from_dir).await? {
                if self.sandbox.ignored().iter().any(|name| *name == entry.name) {
                    continue;
                }
                let from = from_dir.join(&entry.name);
                let to = to_dir.join(&entry.name);
                match entry.kind {
                    EntryKind::Dir => pending.push((from, to)),
                    EntryKind::File => {
                        fs.copy(&from, &to).await?;
                        copied += 1;
                    }
                    EntryKind::Symlink | EntryKind::Other => {
                        debug!(path = %self.sandbox.relative(&from), "Skipping non-regular asset");
                    }
                }
            }
        }
        Ok(copied)
    }
}

pub(crate) fn render(template: &str, data: &Value) -> String {
    VARIABLE_REGEX
        .replace_all(template, |captures: &Captures<'_>| {
            match lookup(data, &captures[1]) {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Null) | None => captures[0].to_string(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

fn lookup<'a>(data: &'a Value, key_path: &str) -> Option<&'a Value> {
    key_path
        .split('.')
        .try_fold(data, |current, segment| current.get(segment))
}
