use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_ROOT;
use crate::Error;
use crate::Result;

/// Coordination store connection parameters
///
/// # Defaults
/// Field-level defaults use helper functions prefixed with `default_`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoordinationConfig {
    /// Comma separated `host:port` list of the coordination ensemble
    ///
    /// Default: `default_connect_string()` (127.0.0.1:2181)
    #[serde(default = "default_connect_string")]
    pub connect_string: String,

    /// Namespace every partition user lives under
    ///
    /// Default: `/npm_cache_share`
    #[serde(default = "default_root")]
    pub root: String,

    /// Session timeout negotiated with the store (unit: milliseconds)
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            connect_string: default_connect_string(),
            root: default_root(),
            session_timeout_ms: default_session_timeout_ms(),
        }
    }
}

impl CoordinationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_string.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "coordination.connect_string cannot be empty".into(),
            )));
        }

        if !self.root.starts_with('/') || self.root.ends_with('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "coordination.root must be absolute without trailing slash, got {:?}",
                self.root
            ))));
        }

        if self.session_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "coordination.session_timeout_ms must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_connect_string() -> String {
    "127.0.0.1:2181".to_string()
}
fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}
fn default_session_timeout_ms() -> u64 {
    30_000
}
