//! Configuration management module for the repository mirror.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation
mod coordination;
mod dispatcher;
mod retry;
mod storage;
pub use coordination::*;
pub use dispatcher::*;
pub use retry::*;
pub use storage::*;
#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::constants::CONFIG_PATH_ENV;
use crate::Result;

/// Main configuration container for the mirror components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct MirrorConfig {
    /// Coordination store connection and namespace
    #[serde(default)]
    pub coordination: CoordinationConfig,
    /// Release/snapshot storage descriptors
    #[serde(default)]
    pub storage: StorageConfig,
    /// Retry policies for remote operations
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Notification dispatcher behaviour
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

impl Debug for MirrorConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        // storage descriptors carry credentials
        f.debug_struct("MirrorConfig")
            .field("coordination", &self.coordination)
            .field("retry", &self.retry)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl MirrorConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `MIRROR__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred to allow further overrides via `with_override_config()`.
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/mirror.toml");
    /// std::env::set_var("MIRROR__COORDINATION__ROOT", "/cache_share");
    /// let cfg = MirrorConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

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
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem:
    /// - Empty or relative namespace root
    /// - Storage descriptors without a user identity
    /// - Retry policies that can never succeed
    pub fn validate(self) -> Result<Self> {
        self.coordination.validate()?;
        self.storage.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
