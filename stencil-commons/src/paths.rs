use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving `.` and `..` components lexically.
///
/// No filesystem access happens here, so the result is stable for paths that
/// do not exist yet. `..` at the root is absorbed (`/../x` becomes `/x`), and a
/// relative path that climbs above its start keeps no trace of the climb, so
/// callers that care about escapes must compare against an absolute base.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Returns true when `candidate` equals `root` or is nested below it.
///
/// Comparison is component-wise, so `/safe/rootx` is not inside `/safe/root`.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate == root || candidate.starts_with(root)
}

/// Returns true for argument strings that name a location outside any
/// relative base: rooted paths, home-relative paths and drive letters.
pub fn is_absolute_like(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || path.starts_with('~')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Render `path` relative to `root` for log output, falling back to the full
/// path when it is not below `root`.
pub fn relative_display<'a>(root: &Path, path: &'a Path) -> Cow<'a, str> {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_parent_segments() {
        let path = Path::new("/safe/root/a/../../b");
        assert_eq!(normalize_path(path), PathBuf::from("/safe/b"));
    }

    #[test]
    fn normalize_absorbs_climb_past_filesystem_root() {
        assert_eq!(
            normalize_path(Path::new("/a/../../../etc")),
            PathBuf::from("/etc")
        );
    }

    #[test]
    fn normalize_drops_current_dir_segments() {
        assert_eq!(
            normalize_path(Path::new("./src/./lib.rs")),
            PathBuf::from("src/lib.rs")
        );
    }

    #[test]
    fn is_within_is_component_wise() {
        let root = Path::new("/safe/root");
        assert!(is_within(root, Path::new("/safe/root")));
        assert!(is_within(root, Path::new("/safe/root/a/b")));
        assert!(!is_within(root, Path::new("/safe/rootx")));
        assert!(!is_within(root, Path::new("/safe")));
    }

    #[test]
    fn absolute_like_covers_home_and_drive_forms() {
        for path in ["/etc", "\\share", "~/x", "~draft.md", "C:/x", "c:"] {
            assert!(is_absolute_like(path), "{path}");
        }
        for path in ["src/x", "./a", "draft~.md", "1:x"] {
            assert!(!is_absolute_like(path), "{path}");
        }
    }

    #[test]
    fn relative_display_strips_root() {
        let root = Path::new("/work/project");
        assert_eq!(
            relative_display(root, Path::new("/work/project/src/main.rs")),
            "src/main.rs"
        );
        assert_eq!(relative_display(root, Path::new("/other")), "/other");
    }
}
