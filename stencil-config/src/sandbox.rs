//! Setup sandbox configuration.

use serde::{Deserialize, Serialize};

/// Entries never enumerated, copied, or matched by the tool surface.
pub const DEFAULT_IGNORED_ENTRIES: &[&str] = &[".git", ".hg", ".svn", ".DS_Store"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxConfig {
    /// Name of the author-assets directory inside a template.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// File inside the assets directory describing the declarative setup.
    #[serde(default = "default_setup_file")]
    pub setup_file: String,

    /// Extra entry names to skip on top of [`DEFAULT_IGNORED_ENTRIES`].
    #[serde(default)]
    pub extra_ignored_entries: Vec<String>,
}

fn default_assets_dir() -> String {
    "__scaffold__".to_string()
}

fn default_setup_file() -> String {
    "setup.toml".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            setup_file: default_setup_file(),
            extra_ignored_entries: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// All ignorable entry names, including the assets marker itself.
    pub fn ignored_entries(&self) -> Vec<String> {
        DEFAULT_IGNORED_ENTRIES
            .iter()
            .map(|name| (*name).to_string())
            .chain(std::iter::once(self.assets_dir.clone()))
            .chain(self.extra_ignored_entries.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_entries_include_assets_marker() {
        let cfg = SandboxConfig {
            extra_ignored_entries: vec!["node_modules".into()],
            ..SandboxConfig::default()
        };
        let ignored = cfg.ignored_entries();
        assert!(ignored.contains(&".git".to_string()));
        assert!(ignored.contains(&"__scaffold__".to_string()));
        assert!(ignored.contains(&"node_modules".to_string()));
    }
}
