//! Engine configuration.
//!
//! [`EngineConfig::load`] reads `config/config.toml` (optional) and then
//! environment variables prefixed with `LIFEGRAPH` (nested keys separated by
//! `__`, e.g. `LIFEGRAPH__ENGINE__CACHE__DEFAULT_TTL_SECONDS=60`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::query::args::WhereMode;
use crate::sql::SqlDialect;

const CONFIG_FILE: &str = "config/config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub connections: Vec<ConnectionSettings>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub default_where_mode: WhereMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connections: Vec::new(),
            cache: CacheSettings::default(),
            date_format: default_date_format(),
            default_where_mode: WhereMode::default(),
        }
    }
}

/// Per-connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub dialect: SqlDialect,
    /// Upper bound for the root query's LIMIT
    #[serde(default = "default_row_cap")]
    pub row_cap: u64,
}

impl ConnectionSettings {
    pub fn new(id: impl Into<String>, dialect: SqlDialect) -> Self {
        Self {
            id: id.into(),
            url: String::new(),
            dialect,
            row_cap: default_row_cap(),
        }
    }

    pub fn with_row_cap(mut self, row_cap: u64) -> Self {
        self.row_cap = row_cap;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            default_ttl_seconds: default_ttl_seconds(),
        }
    }
}

fn default_row_cap() -> u64 {
    100_000
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_date_format() -> String {
    "%Y-%m-%dT%H:%M:%S%.3fZ".to_string()
}

impl EngineConfig {
    /// Load the engine configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("LIFEGRAPH").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // A present but unreadable file should not stop env-only deployments
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("LIFEGRAPH").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        // A missing `engine` section means defaults everywhere
        match settings.get::<EngineConfig>("engine") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(EngineConfig::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Engine configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    pub fn connection(&self, id: &str) -> Option<&ConnectionSettings> {
        self.connections.iter().find(|c| c.id == id)
    }
}
