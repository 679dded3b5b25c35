//! Permission configuration schema and persistence.
//!
//! A `PermissionsConfig` is loaded once per session from
//! `<workspace>/.warden/permissions.toml` and only changes through an
//! explicit `save()`. Every field has a serde default, so a partial file is
//! valid; the defaults are restrictive.
//!
//! Example:
//! ```toml
//! run_command = true
//! write_file = true
//! allowlisted_commands = ["cargo test", "cargo fmt --check"]
//! deny_patterns = ['rm\s+-rf\s+/', '\bsudo\b']
//! network_access = true
//! allowed_domains = ["docs.rs", "crates.io"]
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use warden_contracts::error::{WardenError, WardenResult};

/// The agent's own configuration directory, relative to the workspace root.
/// Writes inside it are always refused.
pub const CONFIG_DIR: &str = ".warden";

pub const PERMISSIONS_FILE: &str = "permissions.toml";

/// Deny patterns installed when the configuration does not name its own.
pub const DEFAULT_DENY_PATTERNS: &[&str] = &[
    r"rm\s+-[a-z]*r[a-z]*f?\s+/",
    r"\bsudo\b",
    r"\b(curl|wget)\b.*\|\s*(ba|z)?sh\b",
    r"\bchmod\s+-R\b.*\s/",
    r"\bmkfs\b",
    r"\bdd\s+if=",
    r":\(\)\s*\{",
    r"\b(shutdown|reboot|halt|poweroff)\b",
    r">\s*/dev/sd[a-z]",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Filesystem boundary for every tool. Relative values resolve against
    /// the directory the configuration was loaded for.
    pub workspace_root: PathBuf,
    /// Sub-paths the agent may touch. Empty means the whole workspace.
    pub allowed_paths: Vec<String>,
    pub run_command: bool,
    pub write_file: bool,
    pub require_approval_for_commands: bool,
    pub require_diff_approval: bool,
    /// Commands exempt from the command approval prompt, matched exactly or
    /// as a whole-token prefix.
    pub allowlisted_commands: Vec<String>,
    /// Case-insensitive regex sources. A match blocks the command.
    pub deny_patterns: Vec<String>,
    pub network_access: bool,
    /// When non-empty, the only hosts network tools may reach. Replaces the
    /// deny-list check entirely.
    pub allowed_domains: Vec<String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::new(),
            allowed_paths: Vec::new(),
            run_command: false,
            write_file: false,
            require_approval_for_commands: true,
            require_diff_approval: true,
            allowlisted_commands: Vec::new(),
            deny_patterns: DEFAULT_DENY_PATTERNS.iter().map(|s| s.to_string()).collect(),
            network_access: false,
            allowed_domains: Vec::new(),
        }
    }
}

impl PermissionsConfig {
    /// Default configuration rooted at `root`.
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: root.into(),
            ..Self::default()
        }
    }

    /// Parse `s` as TOML.
    ///
    /// Returns `WardenError::ConfigError` if the TOML is malformed or does not
    /// match the schema.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse permissions TOML: {e}"),
        })
    }

    /// Path of the permissions file for a workspace.
    pub fn file_path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join(PERMISSIONS_FILE)
    }

    /// Load the permissions file for `workspace_root`.
    pub fn load(workspace_root: &Path) -> WardenResult<Self> {
        let path = Self::file_path(workspace_root);
        let contents = fs::read_to_string(&path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read permissions file '{}': {e}", path.display()),
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        config.anchor(workspace_root);
        Ok(config)
    }

    /// Load the permissions file, or fall back to restrictive defaults when
    /// the file does not exist.
    pub fn load_or_default(workspace_root: &Path) -> WardenResult<Self> {
        if Self::file_path(workspace_root).exists() {
            Self::load(workspace_root)
        } else {
            Ok(Self::for_workspace(workspace_root))
        }
    }

    /// Persist to `<workspace_root>/.warden/permissions.toml`.
    pub fn save(&self) -> WardenResult<PathBuf> {
        let dir = self.config_dir();
        fs::create_dir_all(&dir).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to create '{}': {e}", dir.display()),
        })?;

        let body = toml::to_string_pretty(self).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to serialize permissions: {e}"),
        })?;
        let path = dir.join(PERMISSIONS_FILE);
        fs::write(&path, body).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to write '{}': {e}", path.display()),
        })?;

        info!(path = %path.display(), "permissions saved");
        Ok(path)
    }

    /// The protected configuration subtree.
    pub fn config_dir(&self) -> PathBuf {
        self.workspace_root.join(CONFIG_DIR)
    }

    fn anchor(&mut self, loaded_for: &Path) {
        if self.workspace_root.as_os_str().is_empty() {
            self.workspace_root = loaded_for.to_path_buf();
        } else if self.workspace_root.is_relative() {
            self.workspace_root = loaded_for.join(&self.workspace_root);
        }
    }
}
