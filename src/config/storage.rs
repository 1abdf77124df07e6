use serde::Deserialize;
use serde::Serialize;

use crate::MirrorError;
use crate::Result;

/// Storage descriptors of the release and snapshot partitions
///
/// A descriptor has the form `kind|user:credential@host`. Only the user part is
/// consumed here: it names the partition's root node in the coordination store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_descriptor")]
    pub release: String,

    #[serde(default = "default_descriptor")]
    pub snapshot: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            release: default_descriptor(),
            snapshot: default_descriptor(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        storage_user(&self.release)?;
        storage_user(&self.snapshot)?;
        Ok(())
    }

    pub fn release_user(&self) -> Result<String> {
        storage_user(&self.release)
    }

    pub fn snapshot_user(&self) -> Result<String> {
        storage_user(&self.snapshot)
    }
}

/// Extracts the user identity out of `kind|user:credential@host`
pub fn storage_user(descriptor: &str) -> Result<String> {
    let user = descriptor
        .split('|')
        .nth(1)
        .and_then(|rest| rest.split(':').next())
        .map(str::trim)
        .unwrap_or_default();

    if user.is_empty() || user.contains('/') {
        return Err(MirrorError::MalformedStorage(descriptor.to_string()).into());
    }
    Ok(user.to_string())
}

fn default_descriptor() -> String {
    "localfile|npm_cache:".to_string()
}
