// ⚙️ Configuration - JSON file with environment overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding `db_path`
pub const DB_PATH_VAR: &str = "PRICE_CATALOG_DB";

/// Environment variable overriding `recent_limit`
pub const RECENT_LIMIT_VAR: &str = "PRICE_CATALOG_RECENT";

/// Environment variable naming the JSON config file
pub const CONFIG_PATH_VAR: &str = "PRICE_CATALOG_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Rows shown by "recent" listings
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("catalog.db")
}

fn default_recent_limit() -> u32 {
    10
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            db_path: default_db_path(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl CatalogConfig {
    /// Load config from a JSON file; missing keys take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: CatalogConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// File named by PRICE_CATALOG_CONFIG (if any), then env overrides
    pub fn load() -> Result<Self> {
        let config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => CatalogConfig::from_file(path)?,
            Err(_) => CatalogConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DB_PATH_VAR) {
            self.db_path = PathBuf::from(path);
        }

        if let Some(limit) = lookup(RECENT_LIMIT_VAR) {
            self.recent_limit = limit
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", RECENT_LIMIT_VAR, limit))?;
        }

        tracing::debug!(db_path = ?self.db_path, recent_limit = self.recent_limit, "configuration loaded");
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CatalogConfig::default();
        assert_eq!(config.db_path, PathBuf::from("catalog.db"));
        assert_eq!(config.recent_limit, 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CatalogConfig = serde_json::from_str(r#"{"recent_limit": 25}"#).unwrap();
        assert_eq!(config.recent_limit, 25);
        assert_eq!(config.db_path, PathBuf::from("catalog.db"));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("price-catalog-config-{}.json", std::process::id()));
        fs::write(&path, r#"{"db_path": "/tmp/prices.db"}"#).unwrap();

        let config = CatalogConfig::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/prices.db"));
        assert_eq!(config.recent_limit, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [(DB_PATH_VAR, "other.db"), (RECENT_LIMIT_VAR, "3")].into_iter().collect();

        let config = CatalogConfig::default()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.db_path, PathBuf::from("other.db"));
        assert_eq!(config.recent_limit, 3);
    }

    #[test]
    fn test_bad_override_fails() {
        let result = CatalogConfig::default()
            .apply_overrides(|key| (key == RECENT_LIMIT_VAR).then(|| "lots".to_string()));
        assert!(result.is_err());
    }
}
