//! Configuration for the stencil sandbox.
//!
//! [`StencilConfig`] is deserialized from TOML with per-field defaults, so an
//! empty or partial file is always valid. [`ConfigManager`] resolves which
//! file to read.

pub mod audit;
pub mod debug;
pub mod gate;
pub mod loader;
pub mod sandbox;

use serde::{Deserialize, Serialize};

pub use audit::AuditConfig;
pub use debug::{DebugConfig, TraceLevel};
pub use gate::GateConfig;
pub use loader::ConfigManager;
pub use sandbox::SandboxConfig;

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "stencil.toml";

/// Environment variable that pins the configuration file path.
pub const CONFIG_PATH_ENV: &str = "STENCIL_CONFIG_PATH";

/// Root configuration document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StencilConfig {
    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub debug: DebugConfig,
}
