//! Mirror Cache facade
//!
//! Composes the local mirror, the tree watch engine and the write-back engine
//! behind one lifecycle:
//!
//! ```text
//! MirrorCache::ready()
//!   ├─> connect                      (retry.connect)
//!   ├─> TreeWatchEngine::bootstrap() release, then snapshot unless both
//!   │                                partitions share one user
//!   └─> spawn WatchDispatcher::run() [1 task]
//! ```
//!
//! Reads are served from the mirror at any time and return owned snapshots.
//! Writes go through the write-back engine and require `ready()`.


use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::coord::WatchNotification;
use crate::utils::async_task::spawn_task;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::watch::TreeWatchEngine;
use crate::watch::WatchDispatcher;
use crate::write_back::WriteBackEngine;
use crate::CoordinationClient;
use crate::Error;
use crate::LocalMirror;
use crate::MirrorConfig;
use crate::MirrorError;
use crate::ModuleMap;
use crate::PackageSet;
use crate::Partition;
use crate::PathResolver;
use crate::RepositoryEntry;
use crate::RepositoryStat;
use crate::Result;

pub struct MirrorCache {
    config: MirrorConfig,
    client: Arc<dyn CoordinationClient>,
    resolver: Arc<PathResolver>,
    mirror: Arc<RwLock<LocalMirror>>,
    engine: Arc<TreeWatchEngine>,
    write_back: WriteBackEngine,

    /// Taken by the dispatcher on the first successful `ready()`
    notifications: Mutex<Option<mpsc::UnboundedReceiver<WatchNotification>>>,
    shutdown_tx: watch::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,

    /// Serializes ready / resync / shutdown
    lifecycle: tokio::sync::Mutex<()>,
    ready: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for MirrorCache {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MirrorCache")
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .field("engine", &self.engine)
            .finish()
    }
}

impl MirrorCache {
    pub fn new(
        config: MirrorConfig,
        client: Arc<dyn CoordinationClient>,
    ) -> Result<Self> {
        let resolver = Arc::new(PathResolver::from_config(&config)?);
        let mirror = Arc::new(RwLock::new(LocalMirror::new()));
        let (sink, notifications) = mpsc::unbounded_channel();

        let engine = Arc::new(TreeWatchEngine::new(
            client.clone(),
            resolver.clone(),
            mirror.clone(),
            sink,
            &config.dispatcher,
        ));
        let write_back = WriteBackEngine::new(
            client.clone(),
            resolver.clone(),
            mirror.clone(),
            config.retry.write_back,
        );
        let (shutdown_tx, _) = watch::channel(());

        Ok(Self {
            config,
            client,
            resolver,
            mirror,
            engine,
            write_back,
            notifications: Mutex::new(Some(notifications)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Connects, installs the watch tree and starts the dispatcher.
    ///
    /// Succeeds only once the USER level watches are established and the
    /// initial tree has been mirrored. Calling it again after success is a no-op.
    pub async fn ready(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Fatal("mirror cache has been shut down".to_string()));
        }
        if self.is_ready() {
            return Ok(());
        }

        self.connect().await?;
        for partition in self.watched_partitions() {
            self.engine.bootstrap(partition).await?;
        }
        self.start_dispatcher()?;

        self.ready.store(true, Ordering::SeqCst);
        info!(
            root = %self.config.coordination.root,
            release = self.resolver.user(Partition::Release),
            snapshot = self.resolver.user(Partition::Snapshot),
            watches = self.engine.watch_count(),
            "mirror ready"
        );
        Ok(())
    }

    /// Stops the dispatcher and unregisters every watch. The cache cannot be
    /// made ready again afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.ready.store(false, Ordering::SeqCst);

        if let Err(e) = self.shutdown_tx.send(()) {
            debug!("no dispatcher listening for shutdown: {:?}", e);
        }
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("dispatcher task ended abnormally: {:?}", e);
            }
        }

        self.engine.teardown().await;
        info!("mirror shut down");
        Ok(())
    }

    /// Rebuilds the mirror from remote state, e.g. after the coordination
    /// session was lost.
    pub async fn resync(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_ready() {
            return Err(MirrorError::NotReady.into());
        }

        self.engine.teardown().await;
        self.mirror.write().clear();
        self.connect().await?;
        for partition in self.watched_partitions() {
            self.engine.bootstrap(partition).await?;
        }

        info!(watches = self.engine.watch_count(), "mirror resynchronized");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn watch_count(&self) -> usize {
        self.engine.watch_count()
    }

    /// Collapses the snapshot partition into release.
    pub fn same(&self) {
        self.mirror.write().same();
    }

    /// Drops all mirrored repositories. Watches stay installed.
    pub fn clear(&self) {
        self.mirror.write().clear();
    }

    pub fn set_storage(
        &self,
        storage: impl Into<String>,
    ) {
        self.mirror.write().set_storage(storage);
    }

    pub fn storage(&self) -> Option<String> {
        self.mirror.read().storage().map(str::to_string)
    }

    pub async fn add_repository(
        &self,
        partition: Partition,
        name: &str,
        stat: Option<RepositoryStat>,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.write_back.add_repository(partition, name, stat).await
    }

    pub async fn del_repository(
        &self,
        partition: Partition,
        name: &str,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.write_back.del_repository(partition, name).await
    }

    pub async fn add_package(
        &self,
        partition: Partition,
        repository: &str,
        identifier: &str,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.write_back.add_package(partition, repository, identifier).await
    }

    pub async fn del_package(
        &self,
        partition: Partition,
        repository: &str,
        identifier: &str,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.write_back.del_package(partition, repository, identifier).await
    }

    pub fn list_all(
        &self,
        partition: Partition,
    ) -> BTreeMap<String, RepositoryEntry> {
        self.mirror.read().list_all(partition)
    }

    pub fn list_repository(
        &self,
        partition: Partition,
    ) -> BTreeMap<String, Option<RepositoryStat>> {
        self.mirror.read().list_repository(partition)
    }

    pub fn list_modules(
        &self,
        partition: Partition,
        repository: &str,
    ) -> ModuleMap {
        self.mirror.read().list_modules(partition, repository)
    }

    pub fn list_packages(
        &self,
        partition: Partition,
        repository: &str,
        module: &str,
    ) -> PackageSet {
        self.mirror.read().list_packages(partition, repository, module)
    }

    /// Requested identifiers the mirror can serve, mapped to the cached identifier.
    pub fn diff_packages<S: AsRef<str>>(
        &self,
        repository: &str,
        requested: &[S],
        platform: &str,
    ) -> BTreeMap<String, String> {
        self.mirror.read().diff_packages(repository, requested, platform)
    }

    async fn connect(&self) -> Result<()> {
        let client = self.client.as_ref();
        let connected =
            task_with_timeout_and_exponential_backoff(move || client.connect(), self.config.retry.connect).await;
        if let Err(e) = connected {
            error!(
                connect_string = %self.config.coordination.connect_string,
                "coordination store unreachable: {:?}",
                e
            );
            return Err(e);
        }
        debug!(connect_string = %self.config.coordination.connect_string, "connected");
        Ok(())
    }

    /// One tree when both partitions resolve to the same user.
    fn watched_partitions(&self) -> Vec<Partition> {
        if self.resolver.is_same() {
            self.mirror.write().same();
            vec![Partition::Release]
        } else {
            Partition::ALL.to_vec()
        }
    }

    fn start_dispatcher(&self) -> Result<()> {
        let notifications = self
            .notifications
            .lock()
            .take()
            .ok_or_else(|| Error::Fatal("watch dispatcher already started".to_string()))?;
        let dispatcher = WatchDispatcher::new(self.engine.clone(), notifications, self.shutdown_tx.subscribe());

        let mut handles = self.handles.lock();
        spawn_task("watch_dispatcher", move || dispatcher.run(), Some(&mut *handles));
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.is_ready() {
            return Err(MirrorError::NotReady.into());
        }
        Ok(())
    }
}

impl Drop for MirrorCache {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}
