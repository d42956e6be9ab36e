//! Token substitution across project files.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{GlobMatcher, PathArg, ToolError, ToolSandbox, walk};
use crate::security::errors::SandboxError;
use crate::security::fs::FsError;

const PROJECT_NAME_TOKEN: &str = "{{PROJECT_NAME}}";

/// Token to replacement, in the order given by the caller.
pub(crate) type Replacements = IndexMap<String, String>;

#[derive(Clone)]
pub struct PlaceholderTools {
    sandbox: Arc<ToolSandbox>,
}

impl PlaceholderTools {
    pub(crate) fn new(sandbox: Arc<ToolSandbox>) -> Self {
        Self { sandbox }
    }

    /// Replace every token of `replacements` in one file. Returns whether the
    /// file was rewritten; a file with no matching token is left untouched.
    pub async fn replace_in_file<P: PathArg + ?Sized>(
        &self,
        file: &P,
        replacements: &Value,
    ) -> Result<bool, ToolError> {
        const OP: &str = "placeholders.replace_in_file";
        let path = self.sandbox.resolve(OP, "file", file)?;
        let replacements = self.replacement_map(OP, replacements)?;
        let Some(substitution) = self.compile(OP, &replacements)? else {
            return Ok(false);
        };
        self.rewrite(&path, &substitution).await
    }

    /// Apply `replacements` to every file matching `pattern`. Returns the
    /// project-relative paths that were rewritten.
    pub async fn replace_in_files<P: PathArg + ?Sized>(
        &self,
        pattern: &P,
        replacements: &Value,
    ) -> Result<Vec<String>, ToolError> {
        const OP: &str = "placeholders.replace_in_files";
        let matcher = self.sandbox.glob(OP, pattern)?;
        let replacements = self.replacement_map(OP, replacements)?;
        self.rewrite_matching(OP, &matcher, &replacements).await
    }

    /// Substitute `{{KEY}}` tokens derived from the context inputs across
    /// every file matching `target`. `{{PROJECT_NAME}}` falls back to the
    /// project name; `extra` entries override derived ones.
    pub async fn replace_all<P: PathArg + ?Sized>(
        &self,
        target: &P,
        extra: Option<&Value>,
    ) -> Result<Vec<String>, ToolError> {
        const OP: &str = "placeholders.replace_all";
        let matcher = self.sandbox.glob(OP, target)?;

        let context = self.sandbox.context();
        let mut replacements: Replacements = context
            .inputs()
            .iter()
            .map(|(key, value)| (format!("{{{{{}}}}}", key.to_ascii_uppercase()), value.to_string()))
            .collect();
        replacements
            .entry(PROJECT_NAME_TOKEN.to_string())
            .or_insert_with(|| context.project_name().to_string());
        if let Some(extra) = extra {
            for (token, value) in self.replacement_map(OP, extra)? {
                replacements.insert(token, value);
            }
        }

        self.rewrite_matching(OP, &matcher, &replacements).await
    }

    fn replacement_map(
        &self,
        operation: &'static str,
        replacements: &Value,
    ) -> Result<Replacements, ToolError> {
        let Some(object) = replacements.as_object() else {
            return Err(self.sandbox.reject(SandboxError::InvalidArgument {
                operation,
                reason: "replacements must be an object of token to string".to_string(),
            }));
        };
        let mut map = Replacements::with_capacity(object.len());
        for (token, value) in object {
            let Some(text) = value.as_str() else {
                return Err(self.sandbox.reject(SandboxError::NonStringReplacement {
                    operation,
                    token: token.clone(),
                }));
            };
            if token.is_empty() {
                return Err(self.sandbox.reject(SandboxError::InvalidArgument {
                    operation,
                    reason: "replacement tokens must not be empty".to_string(),
                }));
            }
            map.insert(token.clone(), text.to_string());
        }
        Ok(map)
    }

    async fn rewrite_matching(
        &self,
        operation: &'static str,
        matcher: &GlobMatcher,
        replacements: &Replacements,
    ) -> Result<Vec<String>, ToolError> {
        let Some(substitution) = self.compile(operation, replacements)? else {
            return Ok(Vec::new());
        };
        let root = self.sandbox.root().to_path_buf();
        let files = walk::list_files(self.sandbox.fs(), &root, self.sandbox.ignored()).await?;
        let mut rewritten = Vec::new();
        for relative in files.into_iter().filter(|file| matcher.is_match(file)) {
            let path = self.sandbox.resolve_entry(operation, &relative)?;
            if self.rewrite(&path, &substitution).await? {
                rewritten.push(relative);
            }
        }
        debug!(
            pattern = matcher.as_str(),
            rewritten = rewritten.len(),
            "Placeholder substitution finished"
        );
        Ok(rewritten)
    }

    fn compile(
        &self,
        operation: &'static str,
        replacements: &Replacements,
    ) -> Result<Option<Substitution>, ToolError> {
        Substitution::new(replacements).map_err(|err| {
            self.sandbox.reject(SandboxError::InvalidArgument {
                operation,
                reason: format!("replacement tokens cannot be compiled: {err}"),
            })
        })
    }

    async fn rewrite(&self, path: &Path, substitution: &Substitution) -> Result<bool, ToolError> {
        let fs = self.sandbox.fs();
        let content = match fs.read_to_string(path).await {
            Ok(content) => content,
            // Binary files carry no text tokens.
            Err(FsError::InvalidUtf8 { .. }) => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        match substitution.apply(&content) {
            Some(updated) => {
                fs.write(path, updated.as_bytes()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// A token map compiled into one alternation, reused for every file.
pub(crate) struct Substitution {
    regex: Regex,
    replacements: Replacements,
}

impl Substitution {
    /// `None` for an empty map.
    pub(crate) fn new(replacements: &Replacements) -> Result<Option<Self>, regex::Error> {
        if replacements.is_empty() {
            return Ok(None);
        }
        let mut tokens: Vec<&str> = replacements.keys().map(String::as_str).collect();
        // Longest first so overlapping tokens prefer the most specific match.
        tokens.sort_by_key(|token| std::cmp::Reverse(token.len()));
        let alternation = tokens
            .iter()
            .map(|token| regex::escape(token))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Some(Self {
            regex: Regex::new(&alternation)?,
            replacements: replacements.clone(),
        }))
    }

    /// Single-pass substitution; replaced text is never scanned again.
    /// Returns `None` when no token occurs in `content`.
    pub(crate) fn apply(&self, content: &str) -> Option<String> {
        if !self.regex.is_match(content) {
            return None;
        }
        let replaced = self.regex.replace_all(content, |captures: &regex::Captures<'_>| {
            self.replacements
                .get(&captures[0])
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        });
        Some(replaced.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::tools_for;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn substitute(content: &str, replacements: &Replacements) -> Option<String> {
        Substitution::new(replacements).unwrap()?.apply(content)
    }

    fn map(pairs: &[(&str, &str)]) -> Replacements {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn substitution_is_single_pass() {
        let replacements = map(&[("{{A}}", "{{B}}"), ("{{B}}", "b")]);
        assert_eq!(
            substitute("{{A}} {{B}}", &replacements).unwrap(),
            "{{B}} b"
        );
    }

    #[test]
    fn no_match_returns_none() {
        assert!(substitute("plain text", &map(&[("{{A}}", "a")])).is_none());
    }

    #[test]
    fn longer_tokens_win() {
        let replacements = map(&[("NAME", "x"), ("NAME_UPPER", "Y")]);
        assert_eq!(substitute("NAME_UPPER NAME", &replacements).unwrap(), "Y x");
    }

    #[tokio::test]
    async fn untouched_file_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        let (tools, _) = tools_for(&dir, &[]);
        let changed = tools
            .placeholders
            .replace_in_file("README.md", &json!({ "{{X}}": "y" }))
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn replace_all_derives_tokens_from_inputs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/main.txt"),
            "{{PROJECT_NAME}} by {{AUTHOR}} ({{LICENSE}})",
        )
        .unwrap();
        let (tools, _) = tools_for(&dir, &[("author", "Ada")]);
        let rewritten = tools
            .placeholders
            .replace_all("**/*.txt", Some(&json!({ "{{LICENSE}}": "MIT" })))
            .await
            .unwrap();
        assert_eq!(rewritten, vec!["src/main.txt"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/main.txt")).unwrap(),
            "demo by Ada (MIT)"
        );
    }

    #[tokio::test]
    async fn non_string_replacement_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = tools_for(&dir, &[]);
        let err = tools
            .placeholders
            .replace_in_files("*.md", &json!({ "{{X}}": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Sandbox(SandboxError::NonStringReplacement { .. })
        ));
    }

    #[tokio::test]
    async fn tilde_named_files_are_ordinary_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "{{X}}").unwrap();
        std::fs::write(dir.path().join("~draft.md"), "draft {{X}}").unwrap();
        let (tools, audit) = tools_for(&dir, &[]);
        let mut rewritten = tools
            .placeholders
            .replace_in_files("**/*.md", &json!({ "{{X}}": "y" }))
            .await
            .unwrap();
        rewritten.sort();
        assert_eq!(rewritten, vec!["README.md", "~draft.md"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("~draft.md")).unwrap(),
            "draft y"
        );
        audit.close().await;
        assert!(audit.memory_entries().is_empty());
    }

    #[tokio::test]
    async fn uncompilable_token_map_is_an_invalid_argument() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "{{X}}").unwrap();
        let (tools, _) = tools_for(&dir, &[]);
        let tokens: serde_json::Map<String, Value> = (0..20_000)
            .map(|i| (format!("{{{{T{i:05}_{}}}}}", "x".repeat(90)), json!("v")))
            .collect();
        let err = tools
            .placeholders
            .replace_in_files("*.md", &Value::Object(tokens))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Sandbox(SandboxError::InvalidArgument { .. })
        ));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "{{X}}"
        );
    }
}
