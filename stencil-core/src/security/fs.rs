//! Filesystem adapter seam.
//!
//! Setup tools never touch `tokio::fs` directly; they go through a
//! [`Filesystem`] which, for untrusted code, is always a
//! [`BoundedFilesystem`] scoped to the project root.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::boundary::BoundaryEnforcer;
use super::errors::BoundaryViolation;

#[derive(Debug, Error)]
pub enum FsError {
    #[error(transparent)]
    Boundary(#[from] BoundaryViolation),

    #[error("{operation} failed for '{}': {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{}' is not valid UTF-8", .path.display())]
    InvalidUtf8 { path: PathBuf },

    #[error("{operation} is not supported on this platform")]
    Unsupported { operation: &'static str },
}

impl FsError {
    pub fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

impl EntryKind {
    fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Dir
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub kind: EntryKind,
    pub len: u64,
    pub readonly: bool,
    /// Unix permission bits, when available.
    pub mode: Option<u32>,
}

/// Async filesystem operations available to the setup layer.
#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FsError>;

    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|_| FsError::InvalidUtf8 {
            path: path.to_path_buf(),
        })
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError>;
    async fn append(&self, path: &Path, contents: &[u8]) -> Result<(), FsError>;
    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>, FsError>;
    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;
    async fn remove_dir_all(&self, path: &Path) -> Result<(), FsError>;
    /// Metadata without following a trailing symlink.
    async fn metadata(&self, path: &Path) -> Result<FileMetadata, FsError>;
    async fn exists(&self, path: &Path) -> Result<bool, FsError>;
    async fn remove_file(&self, path: &Path) -> Result<(), FsError>;
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, FsError>;
    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;
    async fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), FsError>;
    async fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>)
    -> Result<(), FsError>;
    async fn read_link(&self, path: &Path) -> Result<PathBuf, FsError>;
    /// Create `link` pointing at `target`.
    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), FsError>;
}

/// Default adapter over `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFilesystem;

#[async_trait]
impl Filesystem for TokioFilesystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        tokio::fs::read(path)
            .await
            .map_err(|err| FsError::io("read", path, err))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|err| FsError::io("write", path, err))
    }

    async fn append(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|err| FsError::io("append", path, err))?;
        file.write_all(contents)
            .await
            .map_err(|err| FsError::io("append", path, err))?;
        file.flush()
            .await
            .map_err(|err| FsError::io("append", path, err))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>, FsError> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|err| FsError::io("read_dir", path, err))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| FsError::io("read_dir", path, err))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| FsError::io("read_dir", &entry.path(), err))?;
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: EntryKind::from_file_type(file_type),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|err| FsError::io("create_dir_all", path, err))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::remove_dir_all(path)
            .await
            .map_err(|err| FsError::io("remove_dir_all", path, err))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata, FsError> {
        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|err| FsError::io("metadata", path, err))?;

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };
        #[cfg(not(unix))]
        let mode = None;

        Ok(FileMetadata {
            kind: EntryKind::from_file_type(metadata.file_type()),
            len: metadata.len(),
            readonly: metadata.permissions().readonly(),
            mode,
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool, FsError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|err| FsError::io("exists", path, err))
    }

    async fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|err| FsError::io("remove_file", path, err))
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, FsError> {
        tokio::fs::copy(from, to)
            .await
            .map_err(|err| FsError::io("copy", from, err))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|err| FsError::io("rename", from, err))
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), FsError> {
        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::Permissions::from_mode(mode)
        };
        #[cfg(not(unix))]
        let permissions = {
            let mut permissions = tokio::fs::metadata(path)
                .await
                .map_err(|err| FsError::io("set_permissions", path, err))?
                .permissions();
            permissions.set_readonly(mode & 0o222 == 0);
            permissions
        };
        tokio::fs::set_permissions(path, permissions)
            .await
            .map_err(|err| FsError::io("set_permissions", path, err))
    }

    #[cfg(unix)]
    async fn chown(
        &self,
        path: &Path,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<(), FsError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || std::os::unix::fs::chown(&owned, uid, gid))
            .await
            .map_err(|err| FsError::io("chown", path, io::Error::other(err)))?
            .map_err(|err| FsError::io("chown", path, err))
    }

    #[cfg(not(unix))]
    async fn chown(
        &self,
        _path: &Path,
        _uid: Option<u32>,
        _gid: Option<u32>,
    ) -> Result<(), FsError> {
        Err(FsError::Unsupported { operation: "chown" })
    }

    async fn read_link(&self, path: &Path) -> Result<PathBuf, FsError> {
        tokio::fs::read_link(path)
            .await
            .map_err(|err| FsError::io("read_link", path, err))
    }

    #[cfg(unix)]
    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), FsError> {
        tokio::fs::symlink(target, link)
            .await
            .map_err(|err| FsError::io("symlink", link, err))
    }

    #[cfg(windows)]
    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), FsError> {
        tokio::fs::symlink_file(target, link)
            .await
            .map_err(|err| FsError::io("symlink", link, err))
    }

    #[cfg(not(any(unix, windows)))]
    async fn symlink(&self, _target: &Path, _link: &Path) -> Result<(), FsError> {
        Err(FsError::Unsupported {
            operation: "symlink",
        })
    }
}

/// Decorator that validates every path argument against a
/// [`BoundaryEnforcer`] before delegating to the wrapped adapter.
#[derive(Debug, Clone)]
pub struct BoundedFilesystem<F> {
    enforcer: BoundaryEnforcer,
    inner: F,
}

impl<F: Filesystem> BoundedFilesystem<F> {
    pub fn new(enforcer: BoundaryEnforcer, inner: F) -> Self {
        Self { enforcer, inner }
    }

    pub fn enforcer(&self) -> &BoundaryEnforcer {
        &self.enforcer
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    fn check(&self, path: &Path, operation: &str) -> Result<PathBuf, FsError> {
        Ok(self.enforcer.validate_path(path, operation)?)
    }
}

#[async_trait]
impl<F: Filesystem> Filesystem for BoundedFilesystem<F> {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let path = self.check(path, "read")?;
        self.inner.read(&path).await
    }

    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        let path = self.check(path, "read")?;
        self.inner.read_to_string(&path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        let path = self.check(path, "write")?;
        self.inner.write(&path, contents).await
    }

    async fn append(&self, path: &Path, contents: &[u8]) -> Result<(), FsError> {
        let path = self.check(path, "append")?;
        self.inner.append(&path, contents).await
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>, FsError> {
        let path = self.check(path, "read_dir")?;
        self.inner.read_dir(&path).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        let path = self.check(path, "create_dir_all")?;
        self.inner.create_dir_all(&path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), FsError> {
        let path = self.check(path, "remove_dir_all")?;
        self.inner.remove_dir_all(&path).await
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata, FsError> {
        let path = self.check(path, "metadata")?;
        self.inner.metadata(&path).await
    }

    async fn exists(&self, path: &Path) -> Result<bool, FsError> {
        let path = self.check(path, "exists")?;
        self.inner.exists(&path).await
    }

    async fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        let path = self.check(path, "remove_file")?;
        self.inner.remove_file(&path).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, FsError> {
        let from = self.check(from, "copy")?;
        let to = self.check(to, "copy")?;
        self.inner.copy(&from, &to).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let from = self.check(from, "rename")?;
        let to = self.check(to, "rename")?;
        self.inner.rename(&from, &to).await
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), FsError> {
        let path = self.check(path, "set_permissions")?;
        self.inner.set_permissions(&path, mode).await
    }

    async fn chown(
        &self,
        path: &Path,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<(), FsError> {
        let path = self.check(path, "chown")?;
        self.inner.chown(&path, uid, gid).await
    }

    async fn read_link(&self, path: &Path) -> Result<PathBuf, FsError> {
        let path = self.check(path, "read_link")?;
        self.inner.read_link(&path).await
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), FsError> {
        let link = self.check(link, "symlink")?;
        // Relative targets resolve from the link's directory.
        let target_in_root = match link.parent() {
            Some(parent) if target.is_relative() => parent.join(target),
            _ => target.to_path_buf(),
        };
        self.check(&target_in_root, "symlink")?;
        self.inner.symlink(target, &link).await
    }
}
