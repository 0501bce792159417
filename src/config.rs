//! Facility configuration stored in `~/.cellblock/config.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::{CellDb, DbError};

const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 300;

fn default_load_timeout_secs() -> u64 {
    DEFAULT_LOAD_TIMEOUT_SECS
}

fn default_snapshot_ttl_secs() -> u64 {
    DEFAULT_SNAPSHOT_TTL_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityConfig {
    /// Database file; `~/.cellblock/cellblock.db` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Upper bound for a background dashboard load.
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    /// How long a dashboard snapshot stays fresh.
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
            snapshot_ttl_secs: DEFAULT_SNAPSHOT_TTL_SECS,
        }
    }
}

impl FacilityConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs.max(1))
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    /// Open the configured database, or the default one.
    pub fn open_database(&self) -> Result<CellDb, DbError> {
        match &self.database_path {
            Some(path) => CellDb::open_at(path.clone()),
            None => CellDb::open(),
        }
    }
}

/// Path of the config file: `~/.cellblock/config.json`.
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".cellblock").join("config.json"))
}

/// Load configuration from `~/.cellblock/config.json`, falling back to
/// defaults when the file does not exist.
pub fn load_config() -> Result<FacilityConfig, String> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<FacilityConfig, String> {
    if !path.exists() {
        log::info!("No config at {}; using defaults", path.display());
        return Ok(FacilityConfig::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Write configuration, creating the parent directory if needed.
pub fn save_config_to(path: &Path, config: &FacilityConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}
