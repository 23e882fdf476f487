//! Configuration loading
//!
//! ```toml
//! [database.sqlite3]
//! enable = true
//! cachettl = "1h"
//! path = "data/sqlite3"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::{DATABASE_FILE_NAME, LinkageMode};
use crate::{Context, Error, Result};

/// Env var overriding the sqlite3 database directory
pub const DATABASE_PATH_ENV: &str = "MSGDB_DATABASE_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MsgdbConfig {
    /// One section per backend, decoded by that backend's constructor
    #[serde(default)]
    pub database: BTreeMap<String, toml::Value>,
}

/// `[database.sqlite3]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SqliteConfig {
    pub enable: bool,
    /// Row time-to-live, e.g. "1h" or "30m"; "0s" disables expiry
    pub cachettl: String,
    /// Directory holding the database file
    pub path: PathBuf,
    /// Fail inserts whose attribute/quote rows cannot be written
    pub strict_linkage: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            enable: true,
            cachettl: "1h".to_string(),
            path: PathBuf::from("data").join("sqlite3"),
            strict_linkage: false,
        }
    }
}

impl SqliteConfig {
    /// Decode a backend section
    pub fn from_value(value: &toml::Value) -> Result<Self> {
        value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config(format!("invalid sqlite3 section: {}", e)))
    }

    pub fn ttl(&self) -> Result<Duration> {
        humantime::parse_duration(self.cachettl.trim())
            .map_err(|e| Error::Config(format!("illegal ttl config {:?}: {}", self.cachettl, e)))
    }

    pub fn linkage(&self) -> LinkageMode {
        if self.strict_linkage {
            LinkageMode::Strict
        } else {
            LinkageMode::BestEffort
        }
    }

    pub fn database_file(&self) -> PathBuf {
        self.path.join(DATABASE_FILE_NAME)
    }

    /// Replace `path` with an override (typically from [`DATABASE_PATH_ENV`])
    pub fn with_path_override(mut self, path: Option<String>) -> Self {
        if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
            self.path = PathBuf::from(path);
        }
        self
    }
}

impl MsgdbConfig {
    /// Config used when no file exists: sqlite3 enabled with defaults
    pub fn with_defaults() -> Self {
        let mut database = BTreeMap::new();
        database.insert(
            "sqlite3".to_string(),
            toml::Value::try_from(SqliteConfig::default())
                .unwrap_or_else(|_| toml::Value::Table(Default::default())),
        );
        Self { database }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// The sqlite3 section, if present, with the env override applied
    pub fn sqlite(&self) -> Result<Option<SqliteConfig>> {
        self.database
            .get("sqlite3")
            .map(|value| {
                SqliteConfig::from_value(value)
                    .map(|cfg| cfg.with_path_override(std::env::var(DATABASE_PATH_ENV).ok()))
            })
            .transpose()
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("msgdb.toml")
}

/// Load the config file, falling back to defaults when it does not exist
pub fn load_config(path: Option<&Path>) -> Result<MsgdbConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(MsgdbConfig::with_defaults());
    }

    let contents = std::fs::read_to_string(&path).context("read config error")?;
    MsgdbConfig::parse(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sqlite_section() {
        let config = MsgdbConfig::parse(
            r#"
            [database.sqlite3]
            enable = true
            cachettl = "30m"
            path = "/var/lib/relay"
            "#,
        )
        .unwrap();

        let value = &config.database["sqlite3"];
        let sqlite = SqliteConfig::from_value(value).unwrap();
        assert!(sqlite.enable);
        assert_eq!(sqlite.ttl().unwrap(), Duration::from_secs(1800));
        assert_eq!(sqlite.database_file(), PathBuf::from("/var/lib/relay/msg.db"));
        assert_eq!(sqlite.linkage(), LinkageMode::BestEffort);
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let config = MsgdbConfig::parse("[database.sqlite3]\nenable = false\n").unwrap();
        let sqlite = SqliteConfig::from_value(&config.database["sqlite3"]).unwrap();
        assert!(!sqlite.enable);
        assert_eq!(sqlite.cachettl, "1h");
        assert_eq!(sqlite.ttl().unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_ttl_parses() {
        let sqlite = SqliteConfig { cachettl: "0s".to_string(), ..Default::default() };
        assert_eq!(sqlite.ttl().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_illegal_ttl_is_config_error() {
        let sqlite = SqliteConfig { cachettl: "forever".to_string(), ..Default::default() };
        assert!(matches!(sqlite.ttl(), Err(Error::Config(_))));
    }

    #[test]
    fn test_path_override() {
        let sqlite = SqliteConfig::default().with_path_override(Some("/tmp/other".to_string()));
        assert_eq!(sqlite.path, PathBuf::from("/tmp/other"));

        let sqlite = SqliteConfig::default().with_path_override(Some("  ".to_string()));
        assert_eq!(sqlite.path, PathBuf::from("data").join("sqlite3"));
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        let sqlite = SqliteConfig::from_value(&config.database["sqlite3"]).unwrap();
        assert_eq!(sqlite, SqliteConfig::default());
    }
}
