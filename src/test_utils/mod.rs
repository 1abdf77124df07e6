//! Shared helpers for unit tests: fixed test namespace, a connected in-memory
//! store, and polling for conditions reached by background tasks.

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;

use crate::BackoffPolicy;
use crate::CoordinationClient;
use crate::MemCoordinationStore;
use crate::MirrorConfig;
use crate::PathResolver;

pub(crate) const TEST_ROOT: &str = "/npm_cache_share";
pub(crate) const RELEASE_USER: &str = "npm_cache";
pub(crate) const SNAPSHOT_USER: &str = "npm_cache_snapshot";

static LOGGER_INIT: Once = Once::new();

pub fn enable_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub(crate) fn test_resolver() -> PathResolver {
    PathResolver::new(TEST_ROOT, RELEASE_USER, SNAPSHOT_USER).expect("valid test users")
}

pub(crate) fn fast_policy(max_retries: usize) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        timeout_ms: 500,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

/// Separate release and snapshot users, retries short enough for tests.
pub(crate) fn test_config() -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.coordination.root = TEST_ROOT.to_string();
    config.storage.release = format!("localfile|{RELEASE_USER}:secret@10.0.0.1");
    config.storage.snapshot = format!("localfile|{SNAPSHOT_USER}:secret@10.0.0.1");
    config.retry.connect = fast_policy(3);
    config.retry.write_back = fast_policy(3);
    config
}

pub(crate) async fn connected_store() -> Arc<MemCoordinationStore> {
    let store = Arc::new(MemCoordinationStore::new());
    store.connect().await.expect("in-memory store connects");
    store
}

/// Creates `path` (and ancestors) and optionally sets its value.
pub(crate) async fn seed(
    store: &MemCoordinationStore,
    path: &str,
    value: Option<&str>,
) {
    store.mkdir_recursive(path).await.expect("seed mkdir");
    if let Some(value) = value {
        store.set_data(path, value).await.expect("seed set_data");
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub(crate) async fn wait_until<F>(
    timeout: Duration,
    condition: F,
) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}
