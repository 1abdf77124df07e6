//! Single consumer of all watch notifications.
//!
//! Every persistent watch delivers into one channel; the dispatcher applies
//! the notifications one at a time in arrival order. A failing notification
//! is logged and the loop moves on to the next one.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use super::TreeWatchEngine;
use crate::coord::WatchNotification;
use crate::Result;

pub struct WatchDispatcher {
    engine: Arc<TreeWatchEngine>,

    notifications: mpsc::UnboundedReceiver<WatchNotification>,

    /// Shutdown signal
    shutdown: watch::Receiver<()>,
}

impl WatchDispatcher {
    pub fn new(
        engine: Arc<TreeWatchEngine>,
        notifications: mpsc::UnboundedReceiver<WatchNotification>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            engine,
            notifications,
            shutdown,
        }
    }

    /// Runs until shutdown is signalled or every sink is dropped.
    pub async fn run(mut self) -> Result<()> {
        info!("Watch dispatcher started");

        loop {
            tokio::select! {
                maybe = self.notifications.recv() => {
                    let Some(notification) = maybe else {
                        info!("Notification channel closed");
                        break;
                    };
                    let path = notification.path.clone();
                    if let Err(e) = self.engine.handle(notification).await {
                        warn!(%path, "notification handling failed: {:?}", e);
                    }
                }

                _ = self.shutdown.changed() => {
                    info!("Watch dispatcher shutting down");
                    break;
                }
            }
        }

        info!("Watch dispatcher stopped");
        Ok(())
    }
}
