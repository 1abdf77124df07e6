use serde::Deserialize;
use serde::Serialize;

/// Notification dispatcher settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DispatcherConfig {
    /// Emit a debug event with the full payload of every notification
    #[serde(default)]
    pub log_notifications: bool,
}
