//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Cloud provider configuration
    pub cloud: CloudConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub gce: Option<GceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GceConfig {
    pub project: String,
    pub zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://drydock.db".to_string(),
                max_connections: 10,
            },
            cloud: CloudConfig { gce: None },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment or defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let config_path =
            std::env::var("DRYDOCK_CONFIG").unwrap_or_else(|_| "drydock.yaml".to_string());

        if std::path::Path::new(&config_path).exists() {
            Self::load(PathBuf::from(config_path))
        } else {
            Ok(Self::default())
        }
    }
}
