//! Coordination store client interface
//!
//! The mirror talks to a ZooKeeper-like tree through [`CoordinationClient`].
//! Watches are persistent: once registered, every change to the path is
//! delivered to the sink until the watch is unregistered.

mod mem_store;
pub use mem_store::*;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::CoordinationError;
use crate::Error;
use crate::Result;

/// Event kind a watch is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    ChildrenChanged,
    DataChanged,
}

impl WatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchKind::ChildrenChanged => "children_changed",
            WatchKind::DataChanged => "data_changed",
        }
    }
}

/// State of the node after the change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPayload {
    /// Current child names
    Children(Vec<String>),
    /// Current value, `None` once the node is gone
    Data(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNotification {
    pub kind: WatchKind,
    pub path: String,
    pub payload: NotificationPayload,
}

/// Delivery channel of persistent watches
pub type NotificationSink = mpsc::UnboundedSender<WatchNotification>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Establishes the session. Every other call requires it.
    async fn connect(&self) -> Result<()>;

    async fn exists(
        &self,
        path: &str,
    ) -> Result<bool>;

    /// Creates `path` and every missing ancestor. Existing nodes are left alone.
    async fn mkdir_recursive(
        &self,
        path: &str,
    ) -> Result<()>;

    async fn get_data(
        &self,
        path: &str,
    ) -> Result<Option<String>>;

    async fn set_data(
        &self,
        path: &str,
        value: &str,
    ) -> Result<()>;

    async fn get_children(
        &self,
        path: &str,
    ) -> Result<Vec<String>>;

    /// Removes `path` together with its subtree.
    async fn remove(
        &self,
        path: &str,
    ) -> Result<()>;

    async fn register_watch(
        &self,
        kind: WatchKind,
        path: &str,
        sink: NotificationSink,
    ) -> Result<()>;

    async fn unregister_watch(
        &self,
        kind: WatchKind,
        path: &str,
    ) -> Result<()>;
}

pub(crate) fn validate_path(path: &str) -> Result<()> {
    let valid = path.starts_with('/')
        && path.len() > 1
        && !path.ends_with('/')
        && !path[1..].split('/').any(str::is_empty);
    if !valid {
        return Err(CoordinationError::InvalidPath(path.to_string()).into());
    }
    Ok(())
}

pub(crate) fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

/// Check-then-create. A failed create is tolerated when the node exists
/// afterwards, since another client may have created it concurrently.
///
/// Returns true if this call created the node.
pub(crate) async fn ensure_node(
    client: &dyn CoordinationClient,
    path: &str,
) -> Result<bool> {
    if client.exists(path).await? {
        return Ok(false);
    }
    match client.mkdir_recursive(path).await {
        Ok(()) => Ok(true),
        Err(e) => {
            if client.exists(path).await.unwrap_or(false) {
                debug!(path, "node created concurrently: {:?}", e);
                Ok(false)
            } else {
                Err(e)
            }
        }
    }
}

pub(crate) fn is_no_node(error: &Error) -> bool {
    matches!(error, Error::Coordination(CoordinationError::NoNode { .. }))
}
