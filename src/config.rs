use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::domain::League;
use crate::pipeline::PipelineSettings;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub leagues: LeaguesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// API key sent on every provider request
    pub api_key: String,
    /// Rate limit shared by all leagues of this provider
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Burst size before the limiter starts pacing
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_burst() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log directory for the rolling file appender; empty disables it
    #[serde(default)]
    pub dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaguesConfig {
    /// Leagues the pipeline runs for, in lock/cursor order
    pub enabled: Vec<String>,
}

impl Default for LeaguesConfig {
    fn default() -> Self {
        Self {
            enabled: League::ALL.iter().map(|l| l.as_str().to_string()).collect(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 5)?
            .set_default("provider.requests_per_minute", 60)?
            .set_default("provider.burst", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.dir", "")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("MATCHDAY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (MATCHDAY_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("MATCHDAY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// The enabled league list parsed and order-preserved.
    pub fn enabled_leagues(&self) -> Result<Vec<League>, String> {
        let mut leagues = Vec::with_capacity(self.leagues.enabled.len());
        for name in &self.leagues.enabled {
            leagues.push(League::try_from(name.as_str())?);
        }
        Ok(leagues)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.is_empty() {
            errors.push("database.url must be set".to_string());
        }

        if self.provider.api_key.is_empty() {
            errors.push("provider.api_key must be set".to_string());
        }

        if self.provider.requests_per_minute == 0 {
            errors.push("provider.requests_per_minute must be positive".to_string());
        }

        if self.pipeline.window_back_hours < 0 || self.pipeline.window_ahead_hours < 0 {
            errors.push("pipeline window hours must not be negative".to_string());
        }

        if self.pipeline.lock_ttl_secs <= 0 {
            errors.push("pipeline.lock_ttl_secs must be positive".to_string());
        }

        if self.pipeline.max_items <= 0 {
            errors.push("pipeline.max_items must be positive".to_string());
        }

        if self.leagues.enabled.is_empty() {
            errors.push("leagues.enabled must name at least one league".to_string());
        }

        if let Err(e) = self.enabled_leagues() {
            errors.push(format!("leagues.enabled: {e}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
