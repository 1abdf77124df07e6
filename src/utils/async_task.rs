use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Runs `task` until it succeeds, each attempt bounded by `policy.timeout_ms`.
///
/// The delay between attempts starts at `base_delay_ms` and doubles up to
/// `max_delay_ms`. After `max_retries` attempts the last error is returned.
/// Errors that are not [`Error::is_retryable`] are returned at once.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let mut retries = 0;
    let mut last_error = Error::RetryTaskFailed("task was never attempted".to_string());

    while retries < policy.max_retries {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r);
            }
            Ok(Err(e)) if !e.is_retryable() => {
                debug!(attempt = retries + 1, "task failed permanently: {:?}", &e);
                return Err(e);
            }
            Ok(Err(e)) => {
                warn!(attempt = retries + 1, "task failed with error: {:?}", &e);
                last_error = e;
            }
            Err(_) => {
                warn!(attempt = retries + 1, "task timed out after {:?}", timeout_duration);
                last_error = Error::RetryTimeout(timeout_duration);
            }
        };

        retries += 1;
        if retries < policy.max_retries {
            sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }

    warn!("Task failed after {} retries", retries);
    Err(last_error)
}

// Helper function to spawn tasks and track their JoinHandles
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<tokio::task::JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}
