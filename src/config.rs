use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8780
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/dealtrack.db")
}

fn default_pool_size() -> usize {
    8
}

fn default_command_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    /// Deals older than this many days are hard-deleted by the sweeper.
    #[serde(default = "default_deal_days")]
    pub deal_days: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            deal_days: default_deal_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_deal_days() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    /// Exact origin allowed to call the API cross-origin. Empty allows any
    /// origin (the endpoints are read-only).
    #[serde(default)]
    pub origin: String,
}

impl AppConfig {
    /// Validate configuration before startup.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.pool_size == 0 {
            return Err("database.pool_size must be at least 1. \
                 Set it in config.toml or via DEALTRACK__DATABASE__POOL_SIZE env var."
                .to_string());
        }
        if self.database.command_timeout_secs == 0 {
            return Err("database.command_timeout_secs must be at least 1. \
                 Set it in config.toml or via DEALTRACK__DATABASE__COMMAND_TIMEOUT_SECS env var."
                .to_string());
        }
        if self.retention.deal_days == 0 {
            return Err("retention.deal_days must be at least 1. \
                 Set it in config.toml or via DEALTRACK__RETENTION__DEAL_DAYS env var."
                .to_string());
        }
        if self.retention.sweep_interval_secs == 0 {
            return Err("retention.sweep_interval_secs must be at least 1. \
                 Set it in config.toml or via DEALTRACK__RETENTION__SWEEP_INTERVAL_SECS env var."
                .to_string());
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // Load from config file
        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Overlay with environment variables (DEALTRACK__SERVER__PORT=8781, etc.)
        builder = builder.add_source(
            Environment::with_prefix("DEALTRACK")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
