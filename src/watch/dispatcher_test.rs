use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::timeout;

use super::*;
use crate::coord::NotificationPayload;
use crate::coord::WatchKind;
use crate::coord::WatchNotification;
use crate::test_utils::connected_store;
use crate::test_utils::enable_logger;
use crate::test_utils::seed;
use crate::test_utils::test_resolver;
use crate::test_utils::wait_until;
use crate::CoordinationClient;
use crate::DispatcherConfig;
use crate::LocalMirror;
use crate::Partition;

#[tokio::test]
async fn test_dispatcher_applies_notifications_until_shutdown() {
    enable_logger();
    let store = connected_store().await;
    seed(&store, "/npm_cache_share/npm_cache/repoA/five", Some("five@0.0.1")).await;
    let mirror = Arc::new(RwLock::new(LocalMirror::new()));
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Arc::new(TreeWatchEngine::new(
        store.clone(),
        Arc::new(test_resolver()),
        mirror.clone(),
        tx,
        &DispatcherConfig {
            log_notifications: true,
        },
    ));
    engine.bootstrap(Partition::Release).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = tokio::spawn(WatchDispatcher::new(engine.clone(), rx, shutdown_rx).run());

    store
        .set_data("/npm_cache_share/npm_cache/repoA/five", "five@0.0.1,five@0.0.2")
        .await
        .unwrap();
    let applied = wait_until(Duration::from_secs(2), || {
        mirror
            .read()
            .list_packages(Partition::Release, "repoA", "five")
            .contains("five@0.0.2")
    })
    .await;
    assert!(applied);

    shutdown_tx.send(()).unwrap();
    let stopped = timeout(Duration::from_secs(2), handle).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn test_failed_notification_does_not_stop_dispatcher() {
    let store = connected_store().await;
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = tx.clone();
    let mirror = Arc::new(RwLock::new(LocalMirror::new()));
    let engine = Arc::new(TreeWatchEngine::new(
        store.clone(),
        Arc::new(test_resolver()),
        mirror.clone(),
        tx,
        &DispatcherConfig::default(),
    ));
    engine.bootstrap(Partition::Release).await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = tokio::spawn(WatchDispatcher::new(engine.clone(), rx, shutdown_rx).run());
    let user_root = "/npm_cache_share/npm_cache".to_string();

    // Watch installation fails while the store is offline
    store.set_reachable(false);
    sink.send(WatchNotification {
        kind: WatchKind::ChildrenChanged,
        path: user_root.clone(),
        payload: NotificationPayload::Children(vec!["repoX".to_string()]),
    })
    .unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || mirror
            .read()
            .contains_repository(Partition::Release, "repoX"))
        .await
    );

    store.set_reachable(true);
    store.connect().await.unwrap();
    sink.send(WatchNotification {
        kind: WatchKind::ChildrenChanged,
        path: user_root,
        payload: NotificationPayload::Children(vec!["repoX".to_string(), "repoY".to_string()]),
    })
    .unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || mirror
            .read()
            .contains_repository(Partition::Release, "repoY"))
        .await
    );

    shutdown_tx.send(()).unwrap();
    assert!(timeout(Duration::from_secs(2), handle).await.is_ok());
}
