//! Embedding Server Configuration
//!
//! Defaults, overlaid by an optional TOML file, overlaid by `PORT`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{EmbeddingError, ModelConfig};

/// Env var naming the configuration file
pub const CONFIG_PATH_ENV: &str = "EMBEDDING_SERVER_CONFIG";
/// Configuration file used when the env var is unset and the file exists
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub model: ModelConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            keep_alive: true,
        }
    }
}

impl NetworkConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EmbeddingError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, EmbeddingError> {
        let config: ServerConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Resolve the process configuration from the file (if any) and environment
    pub fn load() -> Result<Self, EmbeddingError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).is_file() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.model.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), EmbeddingError> {
        if let Some(port) = lookup("PORT") {
            self.network.port = port.trim().parse().map_err(|_| EmbeddingError::ConfigError {
                message: format!("PORT must be a port number, got '{}'", port),
            })?;
        }
        Ok(())
    }
}
