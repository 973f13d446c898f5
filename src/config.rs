//! Service configuration, loaded from an optional TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub projection: ProjectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sessions idle for longer than this are dropped.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Root of the chart API; the ticker path is appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Zero disables the per-ticker cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default = "default_months")]
    pub default_months: u32,
    #[serde(default = "default_max_months")]
    pub max_months: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_session_ttl_secs() -> u64 {
    1800
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_user_agent() -> String {
    concat!("budgetpilot/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_months() -> u32 {
    12
}

fn default_max_months() -> u32 {
    36
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            default_months: default_months(),
            max_months: default_max_months(),
        }
    }
}

impl ServerConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl MarketConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` when given, otherwise falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.session_ttl_secs must be > 0".to_string(),
            ));
        }
        if self.market.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "market.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.market.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "market.base_url must not be empty".to_string(),
            ));
        }
        if self.projection.max_months == 0 {
            return Err(ConfigError::Invalid(
                "projection.max_months must be > 0".to_string(),
            ));
        }
        if !(1..=self.projection.max_months).contains(&self.projection.default_months) {
            return Err(ConfigError::Invalid(format!(
                "projection.default_months must be between 1 and {}",
                self.projection.max_months
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_planning_page() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.projection.default_months, 12);
        assert_eq!(config.projection.max_months, 36);
        assert_eq!(config.market.timeout(), Duration::from_secs(10));
        assert_eq!(config.server.session_ttl(), Duration::from_secs(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_session_ttl() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[server]\nsession_ttl_secs = 0\n").expect("write config");

        let err = AppConfig::from_file(file.path()).expect_err("must reject ttl");
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("session_ttl_secs")));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[server]\nport = 9000\n\n[market]\ncache_ttl_secs = 0\n"
        )
        .expect("write config");

        let config = AppConfig::from_file(file.path()).expect("valid config");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.market.cache_ttl(), Duration::ZERO);
        assert_eq!(config.market.timeout_secs, 10);
        assert_eq!(config.projection.default_months, 12);
    }

    #[test]
    fn rejects_default_horizon_beyond_max() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[projection]\ndefault_months = 48\n").expect("write config");

        let err = AppConfig::from_file(file.path()).expect_err("must reject horizon");
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("default_months")));
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[server\nport = ").expect("write config");

        let err = AppConfig::from_file(file.path()).expect_err("must reject bad toml");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/budgetpilot.toml")))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
