use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{CONFIG_FILE_NAME, CONFIG_PATH_ENV, StencilConfig};

/// Resolves and loads the effective [`StencilConfig`].
///
/// Lookup order, first hit wins:
/// 1. an explicit path (CLI `--config`)
/// 2. `STENCIL_CONFIG_PATH`
/// 3. `stencil.toml` in the workspace directory
/// 4. `<config_dir>/stencil/config.toml`
/// 5. built-in defaults
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: StencilConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration for the current working directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let workspace = std::env::current_dir().context("Failed to read current directory")?;
        Self::load_for_workspace(explicit, &workspace)
    }

    pub fn load_for_workspace(explicit: Option<&Path>, workspace: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!("Failed to load configuration from {CONFIG_PATH_ENV}={trimmed}")
                });
            }
        }

        let workspace_config = workspace.join(CONFIG_FILE_NAME);
        if workspace_config.is_file() {
            return Self::load_from_file(&workspace_config);
        }

        if let Some(user_config) = user_config_path()
            && user_config.is_file()
        {
            return Self::load_from_file(&user_config);
        }

        debug!("No configuration file found; using defaults");
        Ok(Self {
            config: StencilConfig::default(),
            config_path: None,
        })
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn parse(content: &str) -> Result<StencilConfig> {
        toml::from_str(content).context("Invalid TOML configuration")
    }

    pub fn config(&self) -> &StencilConfig {
        &self.config
    }

    pub fn into_config(self) -> StencilConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(&self.config).context("Failed to serialize configuration")
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stencil").join("config.toml"))
}
