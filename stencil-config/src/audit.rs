//! Audit trail configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Controls where and how often security events are persisted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Persist audit entries to disk.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding the audit file. `~` expands to the home directory.
    #[serde(default)]
    pub directory: Option<String>,

    /// File name of the newline-delimited audit log.
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Flush as soon as this many entries are buffered.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Idle window before a buffered batch is flushed.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Mirror each entry to stderr.
    #[serde(default)]
    pub mirror_to_console: bool,
}

fn default_true() -> bool {
    true
}

fn default_file_name() -> String {
    "security-audit.log".to_string()
}

fn default_flush_threshold() -> usize {
    10
}

fn default_flush_interval_ms() -> u64 {
    1_000
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            directory: None,
            file_name: default_file_name(),
            flush_threshold: default_flush_threshold(),
            flush_interval_ms: default_flush_interval_ms(),
            mirror_to_console: false,
        }
    }
}

impl AuditConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Resolve the audit directory, expanding `~` and falling back to the
    /// user's local data directory.
    pub fn directory_path(&self) -> PathBuf {
        self.directory
            .as_ref()
            .and_then(|dir| {
                if let Some(rest) = dir.strip_prefix('~') {
                    dirs::home_dir().map(|home| home.join(rest.trim_start_matches('/')))
                } else {
                    Some(PathBuf::from(dir))
                }
            })
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .map(|dir| dir.join("stencil").join("audit"))
                    .unwrap_or_else(|| PathBuf::from(".stencil/audit"))
            })
    }

    pub fn log_path(&self) -> PathBuf {
        self.directory_path().join(&self.file_name)
    }
}
