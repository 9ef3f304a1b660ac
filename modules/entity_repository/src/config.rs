//! Configuration for the entity repository

use crate::contract::Tracking;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Prefix of environment overrides, e.g. `ENTITY_REPOSITORY_STREAM_BATCH_SIZE`
pub const ENV_PREFIX: &str = "ENTITY_REPOSITORY_";

/// Errors from loading or validating a [`Config`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration value `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Entity repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Tracking mode for query specs that do not state one
    #[serde(default)]
    pub default_tracking: Tracking,

    /// Entities fetched per round trip by `for_each`
    #[serde(default = "default_stream_batch_size")]
    pub stream_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_tracking: Tracking::default(),
            stream_batch_size: default_stream_batch_size(),
        }
    }
}

impl Config {
    /// Load defaults, then the YAML file, then environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "stream_batch_size",
                message: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

fn default_stream_batch_size() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_tracking, Tracking::Tracked);
        assert_eq!(config.stream_batch_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "repository.yaml",
                "default_tracking: tracked\nstream_batch_size: 32\n",
            )?;
            jail.set_env("ENTITY_REPOSITORY_DEFAULT_TRACKING", "untracked");

            let config = Config::load("repository.yaml").map_err(|e| e.to_string())?;
            assert_eq!(config.default_tracking, Tracking::Untracked);
            assert_eq!(config.stream_batch_size, 32);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load("absent.yaml").map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("repository.yaml", "cache_results: true\n")?;
            let err = Config::load("repository.yaml").expect_err("unknown field must fail");
            assert!(matches!(err, ConfigError::Load(_)));
            Ok(())
        });
    }

    #[test]
    fn test_entity_check_cannot_be_switched_off() {
        Jail::expect_with(|jail| {
            jail.create_file("repository.yaml", "validate_entity_type: false\n")?;
            let err = Config::load("repository.yaml").expect_err("removed field must fail");
            assert!(matches!(err, ConfigError::Load(_)));
            Ok(())
        });
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("ENTITY_REPOSITORY_STREAM_BATCH_SIZE", "0");
            let err = Config::load("absent.yaml").expect_err("zero batch size must fail");
            assert!(matches!(
                err,
                ConfigError::Invalid {
                    field: "stream_batch_size",
                    ..
                }
            ));
            Ok(())
        });
    }
}
