//! Configuration management for the gateway.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation

mod broker;
mod gateway;
mod monitoring;
mod storage;

pub use broker::*;
pub use gateway::*;
pub use monitoring::*;
pub use storage::*;


use std::env;
use std::fmt::Debug;
use std::path::Path;
use std::path::PathBuf;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Main configuration container.
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with the `SHEPHERD__` prefix (highest priority)
#[derive(Serialize, Deserialize, Clone)]
pub struct ShepherdConfig {
    /// Gateway identity and protocol timing
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// MQTT broker connection
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Device record persistence
    #[serde(default)]
    pub storage: StorageConfig,
    /// Prometheus exporter
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Directory for `shepherd.log`
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ShepherdConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            broker: BrokerConfig::default(),
            storage: StorageConfig::default(),
            monitoring: MonitoringConfig::default(),
            log_dir: default_log_dir(),
        }
    }
}

impl Debug for ShepherdConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ShepherdConfig")
            .field("gateway", &self.gateway)
            .field("broker", &self.broker)
            .field("storage", &self.storage)
            .finish()
    }
}

impl ShepherdConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `SHEPHERD__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied with
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("SHEPHERD__BROKER__PORT", "1884");
    /// let cfg = ShepherdConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SHEPHERD")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("SHEPHERD")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.gateway.validate()?;
        self.broker.validate()?;
        self.storage.validate()?;
        self.monitoring.validate(&self.broker)?;
        validate_directory(&self.log_dir, "log_dir")?;
        Ok(self)
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

pub(super) fn invalid(message: impl Into<String>) -> Error {
    Error::Config(ConfigError::Message(message.into()))
}

/// Ensures directory path is valid and writable
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(invalid(format!("{name} path cannot be empty")));
    }

    #[cfg(not(test))]
    {
        use std::fs;
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| {
                invalid(format!(
                    "Failed to create {} directory at {}: {}",
                    name,
                    path.display(),
                    e
                ))
            })?;
        }

        let test_file = path.join(".permission_test");
        fs::write(&test_file, b"test").map_err(|e| {
            invalid(format!(
                "No write permission in {} directory {}: {}",
                name,
                path.display(),
                e
            ))
        })?;
        fs::remove_file(&test_file).ok();
    }

    Ok(())
}
