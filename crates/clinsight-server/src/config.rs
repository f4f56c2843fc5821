//! Configuration file support for the prediction service
//!
//! Supports both YAML and TOML configuration files.
//!
//! # Example YAML configuration:
//! ```yaml
//! # Clinsight configuration file
//!
//! server:
//!   port: 9090
//!   bind: "0.0.0.0"
//!
//! models:
//!   storage_dir: /app/models
//!   skip_loading: false
//!
//! redis:
//!   url: "redis://localhost:6379"
//!
//! kafka:
//!   bootstrap_servers: "localhost:9092"
//!   topic: "ai-predictions"
//!
//! thresholds:
//!   no_show_label: 0.5
//!   high_risk: 0.7
//!   medium_risk: 0.4
//!
//! logging:
//!   level: info
//!   format: json
//! ```

use clinsight_runtime::Thresholds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Model storage and loading configuration
    pub models: ModelsConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Kafka publisher configuration
    pub kafka: Option<KafkaConfig>,

    /// Classification and risk-bucket thresholds
    pub thresholds: Thresholds,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Bind address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            bind: "127.0.0.1".to_string(),
        }
    }
}

/// Model storage and loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding persisted model snapshots
    pub storage_dir: PathBuf,

    /// Start without loading or training any model
    pub skip_loading: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("models"),
            skip_loading: false,
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Kafka publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    pub bootstrap_servers: String,

    /// Topic prediction events are published to
    pub topic: String,

    /// Producer client ID
    pub client_id: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: "ai-predictions".to_string(),
            client_id: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => {
                // Try YAML first, then TOML
                Self::from_yaml(&content).or_else(|_| Self::from_toml(&content))
            }
        }
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Merge another config into this one (other values take precedence if set)
    pub fn merge(&mut self, other: Config) {
        if other.server.port != ServerConfig::default().port {
            self.server.port = other.server.port;
        }
        if other.server.bind != ServerConfig::default().bind {
            self.server.bind = other.server.bind;
        }

        if other.models.storage_dir != ModelsConfig::default().storage_dir {
            self.models.storage_dir = other.models.storage_dir;
        }
        if other.models.skip_loading {
            self.models.skip_loading = true;
        }

        if other.redis.url != RedisConfig::default().url {
            self.redis.url = other.redis.url;
        }

        if other.kafka.is_some() {
            self.kafka = other.kafka;
        }

        let defaults = Thresholds::default();
        if other.thresholds.no_show_label != defaults.no_show_label {
            self.thresholds.no_show_label = other.thresholds.no_show_label;
        }
        if other.thresholds.high_risk != defaults.high_risk {
            self.thresholds.high_risk = other.thresholds.high_risk;
        }
        if other.thresholds.medium_risk != defaults.medium_risk {
            self.thresholds.medium_risk = other.thresholds.medium_risk;
        }

        if other.logging.level != LoggingConfig::default().level {
            self.logging.level = other.logging.level;
        }
        if other.logging.format != LoggingConfig::default().format {
            self.logging.format = other.logging.format;
        }
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Self {
            server: ServerConfig {
                port: 9090,
                bind: "0.0.0.0".to_string(),
            },
            models: ModelsConfig {
                storage_dir: PathBuf::from("/app/models"),
                skip_loading: false,
            },
            redis: RedisConfig {
                url: "redis://redis:6379".to_string(),
            },
            kafka: Some(KafkaConfig {
                bootstrap_servers: "kafka:9092".to_string(),
                topic: "ai-predictions".to_string(),
                client_id: Some("clinsight".to_string()),
            }),
            thresholds: Thresholds::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }

    /// Generate example YAML configuration
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }

    /// Generate example TOML configuration
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::example()).unwrap_or_default()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.thresholds.no_show_label, 0.5);
        assert!(config.kafka.is_none());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
server:
  port: 8080
  bind: "0.0.0.0"
models:
  storage_dir: /data/models
kafka:
  bootstrap_servers: "kafka:9092"
thresholds:
  high_risk: 0.8
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.models.storage_dir, PathBuf::from("/data/models"));
        assert_eq!(
            config.kafka.unwrap().bootstrap_servers,
            "kafka:9092".to_string()
        );
        assert_eq!(config.thresholds.high_risk, 0.8);
        // Unset thresholds keep their defaults
        assert_eq!(config.thresholds.medium_risk, 0.4);
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
[server]
port = 8080
bind = "0.0.0.0"

[redis]
url = "redis://cache:6379"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.redis.url, "redis://cache:6379");
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let override_config = Config {
            server: ServerConfig {
                port: 8888,
                ..Default::default()
            },
            ..Default::default()
        };

        base.merge(override_config);
        assert_eq!(base.server.port, 8888);
        assert_eq!(base.server.bind, "127.0.0.1");
    }

    #[test]
    fn test_example_round_trips() {
        let config = Config::from_yaml(&Config::example_yaml()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert!(config.kafka.is_some());
    }
}
