//! Store configuration persisted as JSON.
//!
//! Holds where the tree database and the legacy menu database live, and how
//! long mirror notifications are held back.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default delay before a rename/delete reaches the file mirror.
pub const DEFAULT_NOTIFY_DELAY_MS: u64 = 2000;

/// Persisted store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// SQLite file holding the tree record.
    pub database_path: String,
    /// Deprecated menu database to import on first run, if any.
    pub legacy_database_path: Option<String>,
    pub notify_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_data_directory()
                .join("workspace.db")
                .to_string_lossy()
                .to_string(),
            legacy_database_path: None,
            notify_delay_ms: DEFAULT_NOTIFY_DELAY_MS,
        }
    }
}

impl StoreConfig {
    /// A config pointing at `database_path` with every other field defaulted.
    pub fn at<P: AsRef<Path>>(database_path: P) -> Self {
        Self {
            database_path: database_path.as_ref().to_string_lossy().to_string(),
            ..Self::default()
        }
    }

    pub fn notify_delay(&self) -> Duration {
        Duration::from_millis(self.notify_delay_ms)
    }
}

/// Returns the path to the config JSON file.
///
/// - macOS / Linux: `~/.config/notetree/config.json`
/// - Windows: `%APPDATA%/Notetree/config.json`
pub fn config_file_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("Notetree").join("config.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("notetree").join("config.json")
    }
}

/// Returns the default data directory: `<platform data dir>/notetree`.
pub fn default_data_directory() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join("notetree")
}

/// Loads config from `path`; returns defaults if the file is missing or corrupt.
pub fn load_config<P: AsRef<Path>>(path: P) -> StoreConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => StoreConfig::default(),
    }
}

/// Saves config to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`crate::NoteTreeError::Io`] or [`crate::NoteTreeError::Json`].
pub fn save_config<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = StoreConfig {
            database_path: "/tmp/tree.db".to_string(),
            legacy_database_path: Some("/tmp/menu.db".to_string()),
            notify_delay_ms: 50,
        };
        save_config(&path, &config).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("notifyDelayMs"));
        assert_eq!(load_config(&path), config);
    }

    #[test]
    fn test_missing_or_corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(load_config(&missing), StoreConfig::default());

        let corrupt = dir.path().join("bad.json");
        fs::write(&corrupt, "{ not json").unwrap();
        assert_eq!(load_config(&corrupt), StoreConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "databasePath": "/data/tree.db" }"#).unwrap();
        let config = load_config(&path);
        assert_eq!(config.database_path, "/data/tree.db");
        assert_eq!(config.notify_delay_ms, DEFAULT_NOTIFY_DELAY_MS);
        assert!(config.legacy_database_path.is_none());
    }
}
