//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::git::{DEFAULT_REMOTE, UserCredentials};

/// Settings for a session, read from YAML.
///
/// # Example YAML
///
/// ```yaml
/// remote: upstream
/// username: alice
/// secret_env: GIT_TOKEN
/// log_level: debug
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote used for push and pull.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Username tried before prompting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Environment variable holding the password or token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_env: Option<String>,

    /// Log filter used by the command line tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_remote() -> String {
    DEFAULT_REMOTE.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            username: None,
            secret_env: None,
            log_level: None,
        }
    }
}

impl SyncConfig {
    /// Load config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SyncError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file {}: {}", path.as_ref().display(), e),
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load the per-user config, or defaults when there is none.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/stage-sync/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stage-sync").join("config.yaml"))
    }

    /// Credentials to try first, if a username is configured.
    pub fn initial_credentials(&self) -> Option<UserCredentials> {
        let username = self.username.as_ref()?;
        let secret = self
            .secret_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default();
        Some(UserCredentials::new(username.clone(), secret))
    }
}
