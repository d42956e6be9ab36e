//! Recursive listing through a [`Filesystem`], never following symlinks.

use std::path::Path;

use crate::security::fs::{EntryKind, Filesystem, FsError};

/// Files below `root`, as sorted `/`-separated relative paths. Entries whose
/// name is in `ignored` are skipped along with everything beneath them.
pub async fn list_files(
    fs: &dyn Filesystem,
    root: &Path,
    ignored: &[String],
) -> Result<Vec<String>, FsError> {
    let mut files = Vec::new();
    let mut pending: Vec<String> = vec![String::new()];

    while let Some(relative) = pending.pop() {
        let directory = if relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&relative)
        };
        for entry in fs.read_dir(&directory).await? {
            if ignored.iter().any(|name| *name == entry.name) {
                continue;
            }
            let child = if relative.is_empty() {
                entry.name.clone()
            } else {
                format!("{relative}/{}", entry.name)
            };
            match entry.kind {
                EntryKind::Dir => pending.push(child),
                EntryKind::File => files.push(child),
                EntryKind::Symlink | EntryKind::Other => {}
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::fs::TokioFilesystem;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn skips_ignored_entries() {
        let dir = TempDir::new().unwrap();
        dir.child("a.md").write_str("a").unwrap();
        dir.child("b/c.md").write_str("c").unwrap();
        dir.child(".git/HEAD").write_str("ref").unwrap();
        dir.child("__scaffold__/setup.toml").write_str("").unwrap();

        let ignored = vec![".git".to_string(), "__scaffold__".to_string()];
        let files = list_files(&TokioFilesystem, dir.path(), &ignored)
            .await
            .unwrap();
        assert_eq!(files, vec!["a.md", "b/c.md"]);
    }
}
