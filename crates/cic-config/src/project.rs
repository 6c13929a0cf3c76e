//! Per-project registration payload, persisted as `config.json` at the root
//! of a project's storage directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "config.json";

/// Registration payload for a single indexed project. Mirrors the body of
/// `POST /sync/register/:project_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub local_path: PathBuf,
    pub storage_path: PathBuf,
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub ignored_paths: Vec<String>,
    #[serde(default)]
    pub included_paths: Vec<String>,
}

impl ProjectConfig {
    /// Load `config.json` from `storage_dir`. A missing file is logged and
    /// treated as "not registered" rather than a fatal error.
    pub fn load(storage_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let path = storage_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!(path = %path.display(), "no project config registered yet");
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::read_file(&path, e))?;
        match serde_json::from_str(&raw) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt project config, treating as unregistered");
                Ok(None)
            }
        }
    }

    /// Persist this registration to `config.json` under `storage_dir`,
    /// creating the directory if needed.
    pub fn save(&self, storage_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(storage_dir).map_err(|e| ConfigError::create_dir(storage_dir, e))?;
        let path = storage_dir.join(CONFIG_FILE_NAME);
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::write_file(&path, e))
    }
}
