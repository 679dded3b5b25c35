//! `.warden/config.toml`: loop settings under `[agent]`, tool settings under
//! `[tools]`. Permissions live separately in `permissions.toml`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_contracts::error::{WardenError, WardenResult};
use warden_core::AgentConfig;
use warden_policy::CONFIG_DIR;
use warden_tools::ToolSettings;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub agent: AgentConfig,
    pub tools: ToolSettings,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse settings TOML: {e}"),
        })
    }

    pub fn file_path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load `.warden/config.toml`, or defaults when it does not exist.
    pub fn load_or_default(workspace_root: &Path) -> WardenResult<Self> {
        let path = Self::file_path(workspace_root);
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read settings file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn save(&self, workspace_root: &Path) -> WardenResult<PathBuf> {
        let path = Self::file_path(workspace_root);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| WardenError::ConfigError {
                reason: format!("failed to create '{}': {e}", dir.display()),
            })?;
        }
        let body = toml::to_string_pretty(self).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to serialize settings: {e}"),
        })?;
        fs::write(&path, body).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to write '{}': {e}", path.display()),
        })?;
        Ok(path)
    }
}
