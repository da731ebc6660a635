//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod client;
mod pipeline;
mod server;

pub use client::ServicesConfig;
pub use pipeline::{ConsumerConfig, GroupsConfig, TopicsConfig};
pub use server::ServerConfig;

use serde::Deserialize;

use crate::bus::{MessagingConfig, MessagingType};
use crate::handlers::AssemblyConfig;
use crate::outbox::OutboxConfig;
use crate::services::IamConfig;
use crate::storage::StorageConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SHIPYARD_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SHIPYARD";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub messaging: MessagingConfig,
    pub topics: TopicsConfig,
    pub groups: GroupsConfig,
    pub consumer: ConsumerConfig,
    /// Dependency service addresses.
    pub services: ServicesConfig,
    pub assembly: AssemblyConfig,
    pub outbox: OutboxConfig,
    pub iam: IamConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `SHIPYARD_CONFIG` environment variable (if set)
    /// 4. Environment variables with `SHIPYARD__` prefix, `__` between keys
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("topics.order_paid", &self.topics.order_paid),
            ("topics.ship_assembled", &self.topics.ship_assembled),
            ("groups.order_ship_assembled", &self.groups.order_ship_assembled),
            ("groups.assembly_order_paid", &self.groups.assembly_order_paid),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ConfigError::Invalid(format!("{name} must not be empty")));
        }

        if self.messaging.messaging_type == MessagingType::Channel
            && self.messaging.channel.partitions == 0
        {
            return Err(ConfigError::Invalid(
                "messaging.channel.partitions must be at least 1".to_string(),
            ));
        }

        if self.outbox.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "outbox.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;
    use crate::handlers::InvalidPayloadPolicy;
    use crate::storage::StorageType;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.topics.order_paid, "order.paid");
        assert_eq!(config.topics.ship_assembled, "ship.assembled");
        assert_eq!(config.groups.order_ship_assembled, "order.ship_assembled");
        assert_eq!(config.groups.assembly_order_paid, "assembly.order_paid");
        assert_eq!(config.assembly.build_duration_secs, 10);
        assert_eq!(config.consumer.invalid_payload, InvalidPayloadPolicy::Retry);
        assert_eq!(config.messaging.messaging_type, MessagingType::Channel);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "storage:\n  type: memory\nassembly:\n  build_duration_secs: 2\nconsumer:\n  invalid_payload: drop\nserver:\n  http_port: 9999"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();

        assert_eq!(config.storage.storage_type, StorageType::Memory);
        assert_eq!(config.assembly.build_duration_secs, 2);
        assert_eq!(config.consumer.invalid_payload, InvalidPayloadPolicy::Drop);
        assert_eq!(config.server.http_port, 9999);
        // untouched sections keep their defaults
        assert_eq!(config.topics.order_paid, "order.paid");
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "topics:\n  order_paid: from-file").unwrap();

        std::env::set_var("SHIPYARD__TOPICS__ORDER_PAID", "from-env");
        std::env::set_var("SHIPYARD__OUTBOX__BATCH_SIZE", "7");
        let config = Config::load(file.path().to_str());
        std::env::remove_var("SHIPYARD__TOPICS__ORDER_PAID");
        std::env::remove_var("SHIPYARD__OUTBOX__BATCH_SIZE");

        let config = config.unwrap();
        assert_eq!(config.topics.order_paid, "from-env");
        assert_eq!(config.outbox.batch_size, 7);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        assert!(matches!(
            Config::load(Some("/nonexistent/shipyard.yaml")),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_topic() {
        let mut config = Config::default();
        config.topics.ship_assembled.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_partitions() {
        let mut config = Config::default();
        config.messaging.channel.partitions = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
