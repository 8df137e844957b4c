use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILENAME: &str = "config.json";
const DEFAULT_USER_ID: &str = "default-user";
const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_KEEP_COUNT: usize = 10;

/// Configuration for the tracker, stored as config.json in the data
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Owner of the dataset document. Single-user deployments leave this at
    /// the default.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// How many backups listings show by default.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// How many backups retention cleanup keeps.
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_keep_count() -> usize {
    DEFAULT_KEEP_COUNT
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            keep_count: DEFAULT_KEEP_COUNT,
        }
    }
}

impl TrackerConfig {
    /// Load config from the given directory, or return defaults if not found.
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_dir.join(CONFIG_FILENAME), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.user_id, "default-user");
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.keep_count, 10);
    }

    #[test]
    fn load_missing_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::load(dir.path()).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig {
            user_id: "exam-prep".to_string(),
            history_limit: 100,
            keep_count: 25,
        };
        config.save(dir.path()).unwrap();
        assert_eq!(TrackerConfig::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), r#"{"keepCount": 5}"#).unwrap();
        // Unknown casing is not accepted; snake_case fields as written.
        let config = TrackerConfig::load(dir.path()).unwrap();
        assert_eq!(config.keep_count, 10);

        fs::write(dir.path().join(CONFIG_FILENAME), r#"{"keep_count": 5}"#).unwrap();
        let config = TrackerConfig::load(dir.path()).unwrap();
        assert_eq!(config.keep_count, 5);
        assert_eq!(config.user_id, "default-user");
    }
}
