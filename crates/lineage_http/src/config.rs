//! Server configuration.
//!
//! Values come from an optional TOML file; command-line flags and
//! `LINEAGE_*` environment variables override them.

use crate::api::ApiSettings;
use lineage_core::{default_log_level, DEFAULT_LEADER_LIMIT, MAX_LEADER_LIMIT};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE_NAME: &str = "lineage.sqlite3";
const LOG_DIR_NAME: &str = "lineage-logs";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `ip:port`.
    pub bind_addr: String,
    /// SQLite member store file.
    pub db_path: PathBuf,
    pub log_level: String,
    /// Rolling log directory; relative paths resolve against the working dir.
    pub log_dir: PathBuf,
    /// Upper bound for one member store query.
    pub query_timeout_ms: u64,
    pub default_leader_limit: u32,
    pub max_leader_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            db_path: std::env::temp_dir().join(DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: std::env::temp_dir().join(LOG_DIR_NAME),
            query_timeout_ms: 5_000,
            default_leader_limit: DEFAULT_LEADER_LIMIT,
            max_leader_limit: MAX_LEADER_LIMIT,
        }
    }
}

/// Command-line / environment overrides; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Loads `path` when given and present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_addr) = overrides.bind_addr {
            self.bind_addr = bind_addr;
        }
        if let Some(db_path) = overrides.db_path {
            self.db_path = db_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
        if let Some(log_dir) = overrides.log_dir {
            self.log_dir = log_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "query_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_leader_limit == 0 {
            return Err(ConfigError::Invalid(
                "max_leader_limit must be greater than 0".to_string(),
            ));
        }
        if self.default_leader_limit == 0 || self.default_leader_limit > self.max_leader_limit {
            return Err(ConfigError::Invalid(format!(
                "default_leader_limit must be within 1..={}, got {}",
                self.max_leader_limit, self.default_leader_limit
            )));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|err| {
            ConfigError::Invalid(format!("bind_addr `{}` is not ip:port: {err}", self.bind_addr))
        })
    }

    /// Log directory as an absolute path.
    pub fn absolute_log_dir(&self) -> Result<PathBuf, ConfigError> {
        if self.log_dir.is_absolute() {
            return Ok(self.log_dir.clone());
        }
        let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
            path: self.log_dir.clone(),
            source,
        })?;
        Ok(cwd.join(&self.log_dir))
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            db_path: self.db_path.clone(),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            default_leader_limit: self.default_leader_limit,
            max_leader_limit: self.max_leader_limit,
        }
    }
}
