use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct BackoffPolicy {
    /// Maximum number of attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.max_retries must be greater than 0"
            ))));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.timeout_ms must be greater than 0"
            ))));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by operation domain
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Connecting to the coordination store during ready()
    #[serde(default = "default_connect_policy")]
    pub connect: BackoffPolicy,

    // Remote writes issued by the write-back engine
    #[serde(default = "default_write_back_policy")]
    pub write_back: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            connect: default_connect_policy(),
            write_back: default_write_back_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.connect.validate("connect")?;
        self.write_back.validate("write_back")?;
        Ok(())
    }
}

fn default_connect_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 30,
        timeout_ms: 5000,
        base_delay_ms: 200,
        max_delay_ms: 10_000,
    }
}
fn default_write_back_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 2000,
        base_delay_ms: 50,
        max_delay_ms: 1000,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    100
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
