//! Configuration (spec §6, SPEC_FULL §4.0): a single TOML file parsed into
//! nested `serde`-derived structs, each paired with free-function defaults,
//! mirroring the teacher's `config.rs`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub listen: ListenConfig,
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub ip_api: IpApiConfig,
    pub genders: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            listen: ListenConfig::default(),
            database: DatabaseConfig::default(),
            bus: BusConfig::default(),
            ip_api: IpApiConfig::default(),
            genders: default_genders(),
        }
    }
}

fn default_genders() -> Vec<String> {
    vec!["male".into(), "female".into(), "secret".into()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub session_cookie_name: String,
    pub max_message_size: usize,
    pub all_room_id: i64,
    pub metrics_port: u16,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: default_session_cookie_name(),
            max_message_size: default_max_message_size(),
            all_room_id: default_all_room_id(),
            metrics_port: default_metrics_port(),
            log_format: LogFormat::Pretty,
        }
    }
}

fn default_session_cookie_name() -> String {
    "sessionid".to_string()
}
fn default_max_message_size() -> usize {
    10_000
}
fn default_all_room_id() -> i64 {
    1
}
fn default_metrics_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub address: String,
    pub path: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            path: "/ws".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "chatfan.sqlite3".to_string() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Unset ⇒ an `InMemoryBus` is used in place of Redis.
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpApiConfig {
    /// `%s`-templated geo-IP endpoint. Unset disables enrichment entirely.
    pub url_template: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_message_size == 0 {
            return Err(ConfigError::Invalid("server.max_message_size must be > 0".into()));
        }
        if self.server.all_room_id <= 0 {
            return Err(ConfigError::Invalid("server.all_room_id must be > 0".into()));
        }
        if self.genders.is_empty() {
            return Err(ConfigError::Invalid("genders must not be empty".into()));
        }
        if self.server.session_cookie_name.is_empty() {
            return Err(ConfigError::Invalid("server.session_cookie_name must not be empty".into()));
        }
        Ok(())
    }

    /// Label index → display label, per spec §6 `GENDERS`.
    pub fn gender_label(&self, index: i64) -> Option<&str> {
        self.genders.get(usize::try_from(index).ok()?).map(String::as_str)
    }
}

/// Helper for tests/demo configs that want a deterministic label table
/// without reading a TOML file.
pub fn gender_table(labels: &[&str]) -> BTreeMap<i64, String> {
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| (i as i64, l.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_message_size() {
        let mut config = Config::default();
        config.server.max_message_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_genders() {
        let mut config = Config::default();
        config.genders.clear();
        assert!(config.validate().is_err());
    }
}
