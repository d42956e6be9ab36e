//! Input gate tuning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// Validated results kept before the oldest entry is evicted.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Failures within the window that raise a potential-abuse event.
    #[serde(default = "default_abuse_threshold")]
    pub abuse_threshold: u32,

    /// Sliding window, measured from the first failure of a streak.
    #[serde(default = "default_abuse_window_secs")]
    pub abuse_window_secs: u64,

    /// Recent error messages retained per caller context.
    #[serde(default = "default_recent_error_limit")]
    pub recent_error_limit: usize,

    /// Caller contexts tracked at once; the stalest streak is dropped first.
    #[serde(default = "default_abuse_max_contexts")]
    pub abuse_max_contexts: usize,
}

fn default_cache_capacity() -> usize {
    1_000
}

fn default_abuse_threshold() -> u32 {
    10
}

fn default_abuse_window_secs() -> u64 {
    60
}

fn default_recent_error_limit() -> usize {
    5
}

fn default_abuse_max_contexts() -> usize {
    10_000
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            abuse_threshold: default_abuse_threshold(),
            abuse_window_secs: default_abuse_window_secs(),
            recent_error_limit: default_recent_error_limit(),
            abuse_max_contexts: default_abuse_max_contexts(),
        }
    }
}

impl GateConfig {
    pub fn abuse_window(&self) -> Duration {
        Duration::from_secs(self.abuse_window_secs)
    }
}
