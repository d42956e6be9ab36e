//! Line-oriented text block editing.
//!
//! Anchors match the first line containing the given text. Every operation
//! is idempotent: applying it twice leaves the file as after the first call,
//! and a call that would not change anything does not rewrite the file.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{PathArg, ToolError, ToolSandbox};

#[derive(Clone)]
pub struct FileTools {
    sandbox: Arc<ToolSandbox>,
}

impl FileTools {
    pub(crate) fn new(sandbox: Arc<ToolSandbox>) -> Self {
        Self { sandbox }
    }

    /// Insert `content` on the lines following the first line containing `anchor`.
    pub async fn insert_after<P: PathArg + ?Sized>(
        &self,
        file: &P,
        anchor: &str,
        content: &str,
    ) -> Result<bool, ToolError> {
        let path = self.sandbox.resolve("files.insert_after", "file", file)?;
        self.edit(&path, |lines| {
            let index = find_line(lines, anchor, 0)?;
            let block = block_lines(content);
            let at = index + 1;
            if lines.get(at..at + block.len()) == Some(block.as_slice()) {
                return None;
            }
            lines.splice(at..at, block);
            Some(())
        })
        .await
    }

    /// Insert `content` on the lines preceding the first line containing `anchor`.
    pub async fn insert_before<P: PathArg + ?Sized>(
        &self,
        file: &P,
        anchor: &str,
        content: &str,
    ) -> Result<bool, ToolError> {
        let path = self.sandbox.resolve("files.insert_before", "file", file)?;
        self.edit(&path, |lines| {
            let index = find_line(lines, anchor, 0)?;
            let block = block_lines(content);
            if index >= block.len() && lines[index - block.len()..index] == block[..] {
                return None;
            }
            lines.splice(index..index, block);
            Some(())
        })
        .await
    }

    /// Replace the lines strictly between the `start` and `end` marker lines.
    pub async fn replace_block<P: PathArg + ?Sized>(
        &self,
        file: &P,
        start: &str,
        end: &str,
        content: &str,
    ) -> Result<bool, ToolError> {
        let path = self.sandbox.resolve("files.replace_block", "file", file)?;
        self.edit(&path, |lines| {
            let (first, last) = find_block(lines, start, end)?;
            let block = block_lines(content);
            if lines[first + 1..last] == block[..] {
                return None;
            }
            lines.splice(first + 1..last, block);
            Some(())
        })
        .await
    }

    /// Remove the `start` and `end` marker lines and everything between them.
    pub async fn remove_block<P: PathArg + ?Sized>(
        &self,
        file: &P,
        start: &str,
        end: &str,
    ) -> Result<bool, ToolError> {
        let path = self.sandbox.resolve("files.remove_block", "file", file)?;
        self.edit(&path, |lines| {
            let (first, last) = find_block(lines, start, end)?;
            lines.drain(first..=last);
            Some(())
        })
        .await
    }

    /// Append `line` unless an identical line already exists. Creates the
    /// file when missing.
    pub async fn ensure_line<P: PathArg + ?Sized>(
        &self,
        file: &P,
        line: &str,
    ) -> Result<bool, ToolError> {
        let path = self.sandbox.resolve("files.ensure_line", "file", file)?;
        let fs = self.sandbox.fs();
        let existing = match fs.read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        let updated = match existing {
            Some(content) => {
                if content.lines().any(|current| current == line) {
                    return Ok(false);
                }
                let separator = if content.is_empty() || content.ends_with('\n') {
                    ""
                } else {
                    "\n"
                };
                format!("{content}{separator}{line}\n")
            }
            None => {
                self.sandbox.ensure_parent(&path).await?;
                format!("{line}\n")
            }
        };
        fs.write(&path, updated.as_bytes()).await?;
        Ok(true)
    }

    /// Read, apply `change`, and write back only if `change` reports an edit.
    async fn edit<F>(&self, path: &Path, change: F) -> Result<bool, ToolError>
    where
        F: FnOnce(&mut Vec<String>) -> Option<()>,
    {
        let fs = self.sandbox.fs();
        let content = fs.read_to_string(path).await?;
        let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
        if change(&mut lines).is_none() {
            debug!(file = %self.sandbox.relative(path), "Text edit made no change");
            return Ok(false);
        }
        fs.write(path, lines.join("\n").as_bytes()).await?;
        Ok(true)
    }
}

fn block_lines(content: &str) -> Vec<String> {
    content
        .strip_suffix('\n')
        .unwrap_or(content)
        .split('\n')
        .map(str::to_string)
        .collect()
}

fn find_line(lines: &[String], needle: &str, from: usize) -> Option<usize> {
    lines
        .iter()
        .skip(from)
        .position(|line| line.contains(needle))
        .map(|offset| offset + from)
}

fn find_block(lines: &[String], start: &str, end: &str) -> Option<(usize, usize)> {
    let first = find_line(lines, start, 0)?;
    let last = find_line(lines, end, first + 1)?;
    Some((first, last))
}
