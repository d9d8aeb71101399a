//! Runtime configuration.
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`BEACON_COLLECT_URL`, `BEACON_CACHE_DIR`)
//! 2. TOML file passed to [`BeaconConfig::load`]
//! 3. Compiled defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::kernel::telemetry::buffer::DEFAULT_MAX_BYTES;
use crate::storage::cache::DEFAULT_CACHE_FILE;

pub const ENV_COLLECT_URL: &str = "BEACON_COLLECT_URL";
pub const ENV_CACHE_DIR: &str = "BEACON_CACHE_DIR";

const CACHE_SUBDIR: &str = "beacon";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    pub url: String,
    pub timeout_secs: f64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/collect".to_string(),
            timeout_secs: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Flush cadence.
    pub period_secs: f64,
    /// Cadence of the "still running" bookkeeping record.
    pub session_period_secs: f64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period_secs: 60.0,
            session_period_secs: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Set to false on targets without writable persistent storage.
    pub enabled: bool,
    /// Defaults to `<local data dir>/beacon`.
    pub dir: Option<PathBuf>,
    pub file_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            file_name: DEFAULT_CACHE_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Events are dropped once the buffer holds this many bytes.
    pub max_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_id: Option<String>,
    pub install_id: Option<String>,
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub collect: CollectConfig,
    pub heartbeat: HeartbeatConfig,
    pub cache: CacheConfig,
    pub buffer: BufferConfig,
    pub identity: IdentityConfig,
}

impl BeaconConfig {
    /// Defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_COLLECT_URL) {
            self.collect.url = url;
        }
        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collect.url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "collect.url".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        check_period("collect.timeout_secs", self.collect.timeout_secs)?;
        check_period("heartbeat.period_secs", self.heartbeat.period_secs)?;
        check_period("heartbeat.session_period_secs", self.heartbeat.session_period_secs)?;
        if self.buffer.max_bytes == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "buffer.max_bytes".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.cache.file_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "cache.file_name".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.collect.timeout_secs)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat.period_secs)
    }

    pub fn session_period(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat.session_period_secs)
    }

    /// Where the disk cache lives, or `None` when persistence is off or no
    /// data directory exists on this target.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if !self.cache.enabled {
            return None;
        }
        self.cache
            .dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|d| d.join(CACHE_SUBDIR)))
    }
}

fn check_period(field: &str, secs: f64) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::ValidationFailed {
        field: field.to_string(),
        message,
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid("must be a positive number of seconds".to_string()));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(e.to_string()))?;
    Ok(())
}
