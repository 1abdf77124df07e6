//! Mirror Error Hierarchy
//!
//! Defines the error types of the repository mirror, categorized by the layer
//! that raises them: the coordination store, the configuration loader and the
//! in-memory mirror itself.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failures reported by the remote coordination store
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Local mirror rejected the request
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// Retry policy exhaustion
    #[error("Task failed after retries: {0}")]
    RetryTaskFailed(String),

    /// Single attempt exceeded its timeout
    #[error("Retry timeout after {0:?}")]
    RetryTimeout(Duration),

    #[error("Failed to send shutdown signal: {0}")]
    SignalSenderClosed(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether another attempt of the same call can succeed.
    ///
    /// Node state and input errors are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Coordination(
                CoordinationError::NoNode { .. }
                    | CoordinationError::NodeExists { .. }
                    | CoordinationError::NodeConflict { .. }
                    | CoordinationError::InvalidPath(_)
            ) | Error::Config(_)
                | Error::Mirror(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Remote store could not be reached
    #[error("Coordination store unreachable: {0}")]
    Unreachable(String),

    /// Operation issued before `connect()` succeeded
    #[error("Coordination client is not connected")]
    NotConnected,

    /// Target node does not exist
    #[error("No node at {path}")]
    NoNode { path: String },

    /// Create raced with another creator
    #[error("Node already exists at {path}")]
    NodeExists { path: String },

    /// An ancestor of the path cannot hold children
    #[error("Node conflict at {path}: {reason}")]
    NodeConflict { path: String, reason: String },

    /// Path is not an absolute, slash separated node path
    #[error("Invalid node path: {0}")]
    InvalidPath(String),

    /// Receiving side of a watch sink went away
    #[error("Notification sink closed for {path}")]
    SinkClosed { path: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Storage descriptor does not carry a `kind|user:...` identity
    #[error("Malformed storage descriptor: {0}")]
    MalformedStorage(String),

    /// Package identifier has no module name
    #[error("Malformed package identifier: {0}")]
    MalformedIdentifier(String),

    /// `ready()` has not completed yet
    #[error("Mirror is not ready")]
    NotReady,
}
