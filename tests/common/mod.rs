use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use repo_mirror::BackoffPolicy;
use repo_mirror::MemCoordinationStore;
use repo_mirror::MirrorCache;
use repo_mirror::MirrorConfig;
use tokio::time::sleep;
use tokio::time::Instant;

pub const ROOT: &str = "/npm_cache_share";
pub const RELEASE_USER: &str = "npm_cache";
pub const SNAPSHOT_USER: &str = "npm_cache_snapshot";

// Convergence through the dispatcher is asynchronous
pub const CONVERGE_TIMEOUT: Duration = Duration::from_secs(3);

static LOGGER_INIT: Once = Once::new();

pub fn enable_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn node_config() -> MirrorConfig {
    let policy = BackoffPolicy {
        max_retries: 3,
        timeout_ms: 500,
        base_delay_ms: 1,
        max_delay_ms: 10,
    };
    let mut config = MirrorConfig::default();
    config.coordination.root = ROOT.to_string();
    config.storage.release = format!("localfile|{RELEASE_USER}:secret@10.0.0.1");
    config.storage.snapshot = format!("localfile|{SNAPSHOT_USER}:secret@10.0.0.1");
    config.retry.connect = policy;
    config.retry.write_back = policy;
    config
}

/// A ready cache on its own session of `store`.
pub async fn ready_node(store: &MemCoordinationStore) -> MirrorCache {
    let cache = MirrorCache::new(node_config(), Arc::new(store.session())).expect("valid node config");
    cache.ready().await.expect("node becomes ready");
    cache
}

pub fn module_path(
    user: &str,
    repository: &str,
    module: &str,
) -> String {
    format!("{ROOT}/{user}/{repository}/{module}")
}

pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + CONVERGE_TIMEOUT;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}
