// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub push: PushConfig,
    pub dispatcher: DispatcherConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// FCM project identifier
    pub project_id: String,
    /// Bearer token used for the messages:send calls; minted externally
    pub auth_token: String,
    /// Override for tests and emulators; the real endpoint is derived from
    /// `project_id` when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub poll_interval_seconds: u64,
    pub lock_ttl_seconds: u64,
    pub max_notifications_per_poll: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.redis.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }

        if self.push.project_id.is_empty() {
            return Err("Push project_id cannot be empty".to_string());
        }
        if self.push.request_timeout_seconds == 0 {
            return Err("Push request_timeout_seconds must be greater than 0".to_string());
        }

        if self.dispatcher.poll_interval_seconds == 0 {
            return Err("Dispatcher poll_interval_seconds must be greater than 0".to_string());
        }
        if self.dispatcher.lock_ttl_seconds == 0 {
            return Err("Dispatcher lock_ttl_seconds must be greater than 0".to_string());
        }
        if self.dispatcher.max_notifications_per_poll == 0 {
            return Err("Dispatcher max_notifications_per_poll must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/notify_dispatcher".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                pool_size: 10,
            },
            push: PushConfig {
                project_id: "notify-dispatcher".to_string(),
                auth_token: "change-me-in-production".to_string(),
                endpoint: None,
                request_timeout_seconds: 10,
            },
            dispatcher: DispatcherConfig {
                poll_interval_seconds: 60,
                lock_ttl_seconds: 55,
                max_notifications_per_poll: 500,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
            },
        }
    }
}
