use std::sync::Arc;

use repo_mirror::CoordinationClient;
use repo_mirror::MemCoordinationStore;
use repo_mirror::MirrorCache;
use repo_mirror::Partition;
use repo_mirror::RepositoryStat;
use serde_json::json;

use crate::common::enable_logger;
use crate::common::module_path;
use crate::common::node_config;
use crate::common::ready_node;
use crate::common::wait_until;
use crate::common::RELEASE_USER;
use crate::common::SNAPSHOT_USER;

#[tokio::test]
async fn test_existing_tree_is_mirrored_on_ready() {
    enable_logger();
    let store = MemCoordinationStore::new();
    store.connect().await.unwrap();
    let five = module_path(RELEASE_USER, "repoA", "five");
    store.mkdir_recursive(&five).await.unwrap();
    store.set_data(&five, "five@0.0.1,five@0.0.11").await.unwrap();
    store
        .set_data(&format!("/npm_cache_share/{RELEASE_USER}/repoA"), r#"{"owner":"ci"}"#)
        .await
        .unwrap();

    let cache = ready_node(&store).await;

    let repositories = cache.list_repository(Partition::Release);
    assert_eq!(
        repositories["repoA"],
        Some(RepositoryStat::from(json!({"owner": "ci"})))
    );
    let packages: Vec<String> = cache
        .list_packages(Partition::Release, "repoA", "five")
        .into_iter()
        .collect();
    assert_eq!(packages, vec!["five@0.0.1", "five@0.0.11"]);
    cache.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_package_lifecycle_round_trip() {
    enable_logger();
    let store = MemCoordinationStore::new();
    let cache = ready_node(&store).await;

    cache
        .add_repository(Partition::Release, "repoA", Some(RepositoryStat::from(json!({"a": 1}))))
        .await
        .unwrap();
    cache.add_package(Partition::Release, "repoA", "five@0.0.1").await.unwrap();
    cache.add_package(Partition::Release, "repoA", "five@0.0.11").await.unwrap();
    cache.add_package(Partition::Release, "repoA", "five@0.0.1").await.unwrap();
    cache.del_package(Partition::Release, "repoA", "five@0.0.1").await.unwrap();

    store.connect().await.unwrap();
    let five = module_path(RELEASE_USER, "repoA", "five");
    assert_eq!(store.get_data(&five).await.unwrap().as_deref(), Some("five@0.0.11"));
    assert!(
        wait_until(|| {
            let packages = cache.list_packages(Partition::Release, "repoA", "five");
            packages.len() == 1 && packages.contains("five@0.0.11")
        })
        .await
    );
    assert_eq!(
        cache.list_repository(Partition::Release)["repoA"],
        Some(RepositoryStat::from(json!({"a": 1})))
    );
    cache.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_diff_packages_prefers_release_and_platform_builds() {
    let store = MemCoordinationStore::new();
    let cache = ready_node(&store).await;
    cache.add_package(Partition::Snapshot, "repoA", "a@1.1").await.unwrap();
    cache.add_package(Partition::Release, "repoA", "a@1.1+linux").await.unwrap();
    cache.add_package(Partition::Snapshot, "repoA", "c@3.0.0-rc.1").await.unwrap();

    let hits = cache.diff_packages("repoA", &["a@1.1", "b@2.0", "c@3.0.0-rc.1"], "linux");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits["a@1.1"], "a@1.1+linux");
    assert_eq!(hits["c@3.0.0-rc.1"], "c@3.0.0-rc.1");
    cache.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deleted_repository_is_not_resurrected() {
    let store = MemCoordinationStore::new();
    let cache = ready_node(&store).await;
    cache.add_package(Partition::Snapshot, "repoS", "six@1.0.0").await.unwrap();
    // two user roots, repoS children and stat, module six
    assert!(wait_until(|| cache.watch_count() == 5).await);

    cache.del_repository(Partition::Snapshot, "repoS").await.unwrap();
    assert!(wait_until(|| cache.list_repository(Partition::Snapshot).is_empty()).await);

    // the node is gone; a stray write must not bring the repository back
    store.connect().await.unwrap();
    let six = module_path(SNAPSHOT_USER, "repoS", "six");
    assert!(store.set_data(&six, "six@1.0.1").await.is_err());
    assert!(cache.list_repository(Partition::Snapshot).is_empty());
    assert_eq!(cache.watch_count(), 2);
    cache.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_store_fails_ready() {
    let store = MemCoordinationStore::new();
    let session = store.session();
    session.set_reachable(false);
    let cache = MirrorCache::new(node_config(), Arc::new(session)).unwrap();

    assert!(cache.ready().await.is_err());
    assert!(!cache.is_ready());
}
