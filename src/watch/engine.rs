//! Tree Watch Engine
//!
//! Keeps one watch per node of interest and turns each notification into
//! mirror updates:
//!
//! ```text
//! USER root       children watch ─> repository added / removed
//!   └─> CONTAINER children watch ─> module added / removed
//!                 data watch     ─> repository stat
//!         └─> OBJECT data watch  ─> package tokens added / removed
//! ```
//!
//! Installation is a worklist: every step returns the watches it discovered,
//! so no step recurses into another. All entry points are serialized through
//! `gate`, which makes the engine the only writer of the watch registry.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ChildrenWatch;
use super::DataTarget;
use super::DataWatch;
use super::NodeLevel;
use super::WatchRegistry;
use crate::coord::ensure_node;
use crate::coord::is_no_node;
use crate::coord::CoordinationClient;
use crate::coord::NotificationPayload;
use crate::coord::NotificationSink;
use crate::coord::WatchKind;
use crate::coord::WatchNotification;
use crate::metrics::ACTIVE_WATCHES;
use crate::metrics::IGNORED_NOTIFICATIONS_TOTAL;
use crate::metrics::NOTIFICATIONS_TOTAL;
use crate::path::unescape_segment;
use crate::utils::package::parse_tokens;
use crate::DispatcherConfig;
use crate::LocalMirror;
use crate::Partition;
use crate::PathResolver;
use crate::RepositoryStat;
use crate::Result;

#[derive(Debug)]
enum InstallTask {
    Children {
        partition: Partition,
        path: String,
        level: NodeLevel,
        repository: Option<String>,
    },
    Repository {
        partition: Partition,
        path: String,
        name: String,
    },
    Data {
        partition: Partition,
        path: String,
        target: DataTarget,
    },
}

pub struct TreeWatchEngine {
    client: Arc<dyn CoordinationClient>,
    resolver: Arc<PathResolver>,
    mirror: Arc<RwLock<LocalMirror>>,
    registry: Mutex<WatchRegistry>,
    sink: NotificationSink,
    gate: tokio::sync::Mutex<()>,
    log_notifications: bool,
}

impl std::fmt::Debug for TreeWatchEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TreeWatchEngine")
            .field("resolver", &self.resolver)
            .field("watches", &self.registry.lock().len())
            .finish()
    }
}

impl TreeWatchEngine {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        resolver: Arc<PathResolver>,
        mirror: Arc<RwLock<LocalMirror>>,
        sink: NotificationSink,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            client,
            resolver,
            mirror,
            registry: Mutex::new(WatchRegistry::new()),
            sink,
            gate: tokio::sync::Mutex::new(()),
            log_notifications: config.log_notifications,
        }
    }

    /// Ensures the partition's USER root exists and watches the whole tree below it.
    pub async fn bootstrap(
        &self,
        partition: Partition,
    ) -> Result<()> {
        let _gate = self.gate.lock().await;

        let root = self.resolver.user_root(partition);
        if ensure_node(self.client.as_ref(), &root).await? {
            info!(%partition, path = %root, "created partition root");
        }

        self.drive(vec![InstallTask::Children {
            partition,
            path: root.clone(),
            level: NodeLevel::User,
            repository: None,
        }])
        .await?;

        info!(%partition, path = %root, watches = self.watch_count(), "partition watched");
        Ok(())
    }

    /// Applies one notification to the mirror.
    ///
    /// Notifications for paths without an installed watch are counted and
    /// dropped, so late deliveries for deleted repositories never resurrect them.
    pub async fn handle(
        &self,
        notification: WatchNotification,
    ) -> Result<()> {
        let _gate = self.gate.lock().await;

        let WatchNotification { kind, path, payload } = notification;
        NOTIFICATIONS_TOTAL.with_label_values(&[kind.as_str()]).inc();
        if self.log_notifications {
            debug!(kind = kind.as_str(), %path, ?payload, "notification");
        }

        match (kind, payload) {
            (WatchKind::ChildrenChanged, NotificationPayload::Children(children)) => {
                let follow_ups = self.reconcile_children(&path, &children).await;
                self.drive(follow_ups).await
            }
            (WatchKind::DataChanged, NotificationPayload::Data(value)) => {
                self.reconcile_data(&path, value.as_deref());
                Ok(())
            }
            (kind, payload) => {
                warn!(kind = kind.as_str(), %path, ?payload, "payload does not match watch kind");
                Ok(())
            }
        }
    }

    /// Unregisters every installed watch.
    pub async fn teardown(&self) {
        let _gate = self.gate.lock().await;

        let removed = self.registry.lock().drain();
        let count = removed.len();
        for (kind, path) in removed {
            self.release_watch(kind, &path).await;
        }
        info!(watches = count, "all watches removed");
    }

    pub fn watch_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_watching(
        &self,
        kind: WatchKind,
        path: &str,
    ) -> bool {
        self.registry.lock().contains(kind, path)
    }

    /// Runs installation tasks until none are left.
    ///
    /// A failing task does not stop its siblings; the first error is returned
    /// once the worklist is exhausted.
    async fn drive(
        &self,
        tasks: Vec<InstallTask>,
    ) -> Result<()> {
        let mut queue: VecDeque<InstallTask> = tasks.into();
        let mut first_error = None;

        while let Some(task) = queue.pop_front() {
            trace!(?task, "install");
            match self.install(task).await {
                Ok(follow_ups) => queue.extend(follow_ups),
                Err(e) => {
                    warn!("watch installation failed: {:?}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn install(
        &self,
        task: InstallTask,
    ) -> Result<Vec<InstallTask>> {
        match task {
            InstallTask::Children {
                partition,
                path,
                level,
                repository,
            } => self.install_children(partition, path, level, repository).await,
            InstallTask::Repository { partition, path, name } => {
                if self.mirror.write().add_repository(partition, &name, None) {
                    debug!(%partition, repository = %name, "repository discovered");
                }
                Ok(vec![
                    InstallTask::Children {
                        partition,
                        path: path.clone(),
                        level: NodeLevel::Container,
                        repository: Some(name.clone()),
                    },
                    InstallTask::Data {
                        partition,
                        path,
                        target: DataTarget::Stat { repository: name },
                    },
                ])
            }
            InstallTask::Data { partition, path, target } => {
                self.install_data(partition, path, target).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn install_children(
        &self,
        partition: Partition,
        path: String,
        level: NodeLevel,
        repository: Option<String>,
    ) -> Result<Vec<InstallTask>> {
        let watch = ChildrenWatch {
            partition,
            level,
            repository,
            known: Default::default(),
        };
        let inserted = self.registry.lock().insert_children(&path, watch);
        if !inserted {
            return Ok(Vec::new());
        }
        ACTIVE_WATCHES.with_label_values(&[WatchKind::ChildrenChanged.as_str()]).inc();

        // Registered before the read: a change in between shows up as a
        // notification instead of being lost.
        let listed = match self
            .client
            .register_watch(WatchKind::ChildrenChanged, &path, self.sink.clone())
            .await
        {
            Ok(()) => self.client.get_children(&path).await,
            Err(e) => Err(e),
        };

        match listed {
            Ok(children) => Ok(self.reconcile_children(&path, &children).await),
            Err(e) => {
                self.rollback(WatchKind::ChildrenChanged, &path).await;
                if is_no_node(&e) {
                    debug!(%path, "node vanished before its children were read");
                    return Ok(Vec::new());
                }
                Err(e)
            }
        }
    }

    async fn install_data(
        &self,
        partition: Partition,
        path: String,
        target: DataTarget,
    ) -> Result<()> {
        let watch = DataWatch {
            partition,
            target,
            known: None,
        };
        let inserted = self.registry.lock().insert_data(&path, watch);
        if !inserted {
            return Ok(());
        }
        ACTIVE_WATCHES.with_label_values(&[WatchKind::DataChanged.as_str()]).inc();

        let read = match self
            .client
            .register_watch(WatchKind::DataChanged, &path, self.sink.clone())
            .await
        {
            Ok(()) => self.client.get_data(&path).await,
            Err(e) => Err(e),
        };

        match read {
            Ok(value) => {
                self.reconcile_data(&path, value.as_deref());
                Ok(())
            }
            Err(e) => {
                self.rollback(WatchKind::DataChanged, &path).await;
                if is_no_node(&e) {
                    debug!(%path, "node vanished before its value was read");
                    return Ok(());
                }
                Err(e)
            }
        }
    }

    /// Diffs `children` against the last observation of `path`, tears down
    /// removed children and returns installation tasks for added ones.
    async fn reconcile_children(
        &self,
        path: &str,
        children: &[String],
    ) -> Vec<InstallTask> {
        let observed = self.registry.lock().diff_children(path, children);
        let Some((watch, diff)) = observed else {
            self.ignore(WatchKind::ChildrenChanged, path);
            return Vec::new();
        };
        if diff.is_empty() {
            return Vec::new();
        }
        debug!(
            path,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "children changed"
        );

        let ChildrenWatch {
            partition,
            level,
            repository,
            ..
        } = watch;

        for raw in &diff.removed {
            let child = format!("{path}/{raw}");
            let name = unescape_segment(raw);
            match (level, &repository) {
                (NodeLevel::User, _) => self.drop_repository(partition, &child, &name).await,
                (NodeLevel::Container, Some(repository)) => {
                    self.drop_module(partition, &child, repository, &name).await
                }
                (NodeLevel::Container, None) => {}
            }
        }

        diff.added
            .iter()
            .filter_map(|raw| {
                let child = format!("{path}/{raw}");
                let name = unescape_segment(raw);
                match (level, &repository) {
                    (NodeLevel::User, _) => Some(InstallTask::Repository {
                        partition,
                        path: child,
                        name,
                    }),
                    (NodeLevel::Container, Some(repository)) => Some(InstallTask::Data {
                        partition,
                        path: child,
                        target: DataTarget::Module {
                            repository: repository.clone(),
                            module: name,
                        },
                    }),
                    (NodeLevel::Container, None) => None,
                }
            })
            .collect()
    }

    fn reconcile_data(
        &self,
        path: &str,
        value: Option<&str>,
    ) {
        let watched = self.registry.lock().data_watch(path).map(|w| (w.partition, w.target.clone()));
        let Some((partition, target)) = watched else {
            self.ignore(WatchKind::DataChanged, path);
            return;
        };
        // Deleted nodes are handled by the parent's children watch
        let Some(value) = value else {
            return;
        };

        match target {
            DataTarget::Stat { repository } => {
                let stat = RepositoryStat::parse_optional(Some(value));
                if !self.mirror.write().set_stat(partition, &repository, stat) {
                    debug!(%partition, %repository, "stat for unknown repository dropped");
                }
            }
            DataTarget::Module { repository, module } => {
                let observed = self.registry.lock().diff_tokens(path, parse_tokens(value));
                let Some((_, diff)) = observed else {
                    return;
                };
                if diff.is_empty() {
                    return;
                }
                trace!(
                    %partition,
                    %repository,
                    %module,
                    added = ?diff.added,
                    removed = ?diff.removed,
                    "packages changed"
                );

                let mut mirror = self.mirror.write();
                for identifier in &diff.removed {
                    if let Err(e) = mirror.del_package(partition, &repository, identifier) {
                        warn!(path, "skipping malformed package token: {:?}", e);
                    }
                }
                for identifier in &diff.added {
                    if let Err(e) = mirror.add_package(partition, &repository, identifier) {
                        warn!(path, "skipping malformed package token: {:?}", e);
                    }
                }
            }
        }
    }

    /// Drops all watches beneath the repository before the repository itself
    /// leaves the mirror.
    async fn drop_repository(
        &self,
        partition: Partition,
        path: &str,
        name: &str,
    ) {
        let removed = self.registry.lock().remove_subtree(path);
        for (kind, watched) in &removed {
            self.release_watch(*kind, watched).await;
        }
        self.mirror.write().del_repository(partition, name);
        info!(%partition, repository = name, watches = removed.len(), "repository removed");
    }

    async fn drop_module(
        &self,
        partition: Partition,
        path: &str,
        repository: &str,
        module: &str,
    ) {
        let watched = self.registry.lock().remove(WatchKind::DataChanged, path);
        if watched {
            self.release_watch(WatchKind::DataChanged, path).await;
        }
        self.mirror.write().del_module(partition, repository, module);
        debug!(%partition, repository, module, "module removed");
    }

    async fn rollback(
        &self,
        kind: WatchKind,
        path: &str,
    ) {
        let watched = self.registry.lock().remove(kind, path);
        if watched {
            self.release_watch(kind, path).await;
        }
    }

    /// Remote half of dropping a watch; the registry entry is already gone.
    async fn release_watch(
        &self,
        kind: WatchKind,
        path: &str,
    ) {
        ACTIVE_WATCHES.with_label_values(&[kind.as_str()]).dec();
        if let Err(e) = self.client.unregister_watch(kind, path).await {
            debug!(path, kind = kind.as_str(), "unregister failed: {:?}", e);
        }
    }

    fn ignore(
        &self,
        kind: WatchKind,
        path: &str,
    ) {
        IGNORED_NOTIFICATIONS_TOTAL.with_label_values(&[kind.as_str()]).inc();
        debug!(path, kind = kind.as_str(), "notification for unwatched path ignored");
    }
}
