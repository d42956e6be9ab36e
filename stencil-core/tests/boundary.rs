use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::json;
use stencil_core::security::{
    AuditEvent, AuditLogger, AuditLoggerOptions, BoundaryEnforcer, DirEntryInfo, FileMetadata,
    Filesystem, FsError, ViolationReason,
};

/// Records how often the wrapped adapter is actually reached.
#[derive(Default)]
struct CountingFs {
    calls: AtomicUsize,
}

impl CountingFs {
    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Filesystem for CountingFs {
    async fn read(&self, _path: &Path) -> Result<Vec<u8>, FsError> {
        self.hit();
        Ok(b"contents".to_vec())
    }

    async fn write(&self, _path: &Path, _contents: &[u8]) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }

    async fn append(&self, _path: &Path, _contents: &[u8]) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }

    async fn read_dir(&self, _path: &Path) -> Result<Vec<DirEntryInfo>, FsError> {
        self.hit();
        Ok(Vec::new())
    }

    async fn create_dir_all(&self, _path: &Path) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }

    async fn remove_dir_all(&self, _path: &Path) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }

    async fn metadata(&self, _path: &Path) -> Result<FileMetadata, FsError> {
        self.hit();
        Err(FsError::Unsupported {
            operation: "metadata",
        })
    }

    async fn exists(&self, _path: &Path) -> Result<bool, FsError> {
        self.hit();
        Ok(true)
    }

    async fn remove_file(&self, _path: &Path) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }

    async fn copy(&self, _from: &Path, _to: &Path) -> Result<u64, FsError> {
        self.hit();
        Ok(0)
    }

    async fn rename(&self, _from: &Path, _to: &Path) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }

    async fn set_permissions(&self, _path: &Path, _mode: u32) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }

    async fn chown(
        &self,
        _path: &Path,
        _uid: Option<u32>,
        _gid: Option<u32>,
    ) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }

    async fn read_link(&self, path: &Path) -> Result<PathBuf, FsError> {
        self.hit();
        Ok(path.to_path_buf())
    }

    async fn symlink(&self, _target: &Path, _link: &Path) -> Result<(), FsError> {
        self.hit();
        Ok(())
    }
}

fn enforcer() -> (BoundaryEnforcer, AuditLogger) {
    let audit = AuditLogger::in_memory(AuditLoggerOptions::default());
    (BoundaryEnforcer::new("/srv/project", audit.clone()), audit)
}

#[tokio::test]
async fn escaping_read_never_reaches_the_adapter() {
    let (enforcer, audit) = enforcer();
    let fs = enforcer.wrap_filesystem(CountingFs::default());

    let err = fs.read(Path::new("../x")).await.unwrap_err();
    assert!(matches!(
        err,
        FsError::Boundary(ref violation) if violation.reason == ViolationReason::PathTraversal
    ));
    assert_eq!(fs.inner().calls.load(Ordering::SeqCst), 0);

    fs.read(Path::new("src/lib.rs")).await.unwrap();
    assert_eq!(fs.inner().calls.load(Ordering::SeqCst), 1);

    audit.close().await;
    let violations: Vec<_> = audit
        .memory_entries()
        .into_iter()
        .filter(|entry| matches!(entry.event, AuditEvent::BoundaryViolation { .. }))
        .collect();
    assert_eq!(violations.len(), 1);
}

#[tokio::test]
async fn two_path_operations_check_both_sides() {
    let (enforcer, _audit) = enforcer();
    let fs = enforcer.wrap_filesystem(CountingFs::default());

    assert!(fs.copy(Path::new("a.txt"), Path::new("/tmp/a.txt")).await.is_err());
    assert!(fs.rename(Path::new("../a"), Path::new("b")).await.is_err());
    assert!(fs
        .symlink(Path::new("../../../etc/passwd"), Path::new("link"))
        .await
        .is_err());
    assert_eq!(fs.inner().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn non_string_values_are_refused() {
    let (enforcer, _audit) = enforcer();
    let err = enforcer.validate_value(&json!(["a"]), "read").unwrap_err();
    assert_eq!(err.reason, ViolationReason::NonString);
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("..".to_string()),
        Just(".".to_string()),
        "[a-z]{1,6}",
    ]
}

proptest! {
    #[test]
    fn accepted_paths_stay_under_the_root(segments in prop::collection::vec(segment(), 1..8)) {
        let (enforcer, _audit) = enforcer();
        let candidate = segments.join("/");
        match enforcer.validate_path(&candidate, "read") {
            Ok(resolved) => {
                prop_assert!(resolved.starts_with(enforcer.root()));
                prop_assert!(enforcer.is_within_boundary(&candidate));
            }
            Err(violation) => {
                prop_assert_eq!(violation.reason, ViolationReason::PathTraversal);
                prop_assert!(!enforcer.is_within_boundary(&candidate));
            }
        }
    }

    #[test]
    fn plain_relative_paths_are_always_accepted(segments in prop::collection::vec("[a-z0-9_]{1,8}", 1..6)) {
        let (enforcer, _audit) = enforcer();
        let candidate = segments.join("/");
        let resolved = enforcer.validate_path(&candidate, "write").unwrap();
        prop_assert_eq!(resolved, enforcer.root().join(&candidate));
    }

    #[test]
    fn sibling_prefix_is_not_inside(suffix in "[a-z]{1,5}") {
        let (enforcer, _audit) = enforcer();
        let sibling = format!("/srv/project{suffix}/file");
        prop_assert!(enforcer.validate_path(&sibling, "read").is_err());
    }
}
