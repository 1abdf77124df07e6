use repo_mirror::MemCoordinationStore;
use repo_mirror::Partition;

use crate::common::enable_logger;
use crate::common::ready_node;
use crate::common::wait_until;

#[tokio::test]
async fn test_package_published_by_one_node_reaches_the_other() {
    enable_logger();
    let store = MemCoordinationStore::new();
    let publisher = ready_node(&store).await;
    let reader = ready_node(&store).await;

    publisher
        .add_package(Partition::Release, "repoA", "@scope/pkg@2.0.0")
        .await
        .unwrap();

    assert!(
        wait_until(|| reader
            .list_packages(Partition::Release, "repoA", "@scope/pkg")
            .contains("@scope/pkg@2.0.0"))
        .await
    );
    publisher.shutdown().await.unwrap();
    reader.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_publishers_converge_without_duplicates() {
    let store = MemCoordinationStore::new();
    let first = ready_node(&store).await;
    let second = ready_node(&store).await;

    let (a, b) = tokio::join!(
        first.add_package(Partition::Release, "repoA", "five@0.0.1"),
        second.add_package(Partition::Release, "repoA", "five@0.0.1"),
    );
    a.unwrap();
    b.unwrap();
    second.add_package(Partition::Release, "repoA", "five@0.0.2").await.unwrap();

    for node in [&first, &second] {
        assert!(
            wait_until(|| node.list_packages(Partition::Release, "repoA", "five").len() == 2).await
        );
    }
    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repository_removed_by_one_node_leaves_every_mirror() {
    let store = MemCoordinationStore::new();
    let first = ready_node(&store).await;
    let second = ready_node(&store).await;
    first.add_package(Partition::Release, "repoA", "five@0.0.1").await.unwrap();
    assert!(wait_until(|| second.list_repository(Partition::Release).contains_key("repoA")).await);

    second.del_repository(Partition::Release, "repoA").await.unwrap();

    for node in [&first, &second] {
        assert!(wait_until(|| node.list_repository(Partition::Release).is_empty()).await);
    }
    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
}
