//! In-memory coordination store
//!
//! A single-process tree with persistent watches, used for embedded runs and
//! tests. Every [`MemCoordinationStore::session`] is a separate client of the
//! same tree with its own connection state and watches, the way several
//! proxy nodes share one ZooKeeper ensemble.
//!
//! Notifications are computed while the tree lock is held and sent after it is
//! released, so every payload reflects the tree right after the change that
//! triggered it.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use super::parent_path;
use super::validate_path;
use super::CoordinationClient;
use super::NotificationPayload;
use super::NotificationSink;
use super::WatchKind;
use super::WatchNotification;
use crate::CoordinationError;
use crate::Result;

type SessionId = u64;

/// State shared by all sessions
#[derive(Debug, Default)]
struct MemTree {
    /// Node path -> value
    nodes: RwLock<BTreeMap<String, Option<String>>>,
    /// Nodes that cannot hold children, like ZooKeeper ephemerals
    leaves: RwLock<BTreeSet<String>>,
    watchers: DashMap<(WatchKind, String), HashMap<SessionId, NotificationSink>>,
    next_session: AtomicU64,
}

#[derive(Debug)]
pub struct MemCoordinationStore {
    tree: Arc<MemTree>,
    session: SessionId,
    connected: AtomicBool,
    reachable: AtomicBool,
    connect_attempts: AtomicUsize,
}

impl Default for MemCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemCoordinationStore {
    pub fn new() -> Self {
        Self::with_tree(Arc::new(MemTree::default()))
    }

    fn with_tree(tree: Arc<MemTree>) -> Self {
        let session = tree.next_session.fetch_add(1, Ordering::SeqCst);
        Self {
            tree,
            session,
            connected: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            connect_attempts: AtomicUsize::new(0),
        }
    }

    /// Opens another, not yet connected, client on the same tree.
    pub fn session(&self) -> Self {
        Self::with_tree(self.tree.clone())
    }

    /// Simulates a network partition between this session and the store
    pub fn set_reachable(
        &self,
        reachable: bool,
    ) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Whether this session has a watch of `kind` on `path`
    pub fn has_watch(
        &self,
        kind: WatchKind,
        path: &str,
    ) -> bool {
        self.tree
            .watchers
            .get(&(kind, path.to_string()))
            .map(|sessions| sessions.contains_key(&self.session))
            .unwrap_or(false)
    }

    /// Watches held by this session
    pub fn watch_count(&self) -> usize {
        self.tree
            .watchers
            .iter()
            .filter(|entry| entry.value().contains_key(&self.session))
            .count()
    }

    /// Marks `path` as unable to hold children.
    pub fn make_leaf(
        &self,
        path: &str,
    ) {
        self.tree.leaves.write().insert(path.to_string());
    }

    pub fn node_count(&self) -> usize {
        self.tree.nodes.read().len()
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CoordinationError::NotConnected.into());
        }
        Ok(())
    }

    fn children_of(
        nodes: &BTreeMap<String, Option<String>>,
        path: &str,
    ) -> Vec<String> {
        let prefix = format!("{path}/");
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    fn children_notification(
        nodes: &BTreeMap<String, Option<String>>,
        parent: &str,
    ) -> WatchNotification {
        WatchNotification {
            kind: WatchKind::ChildrenChanged,
            path: parent.to_string(),
            payload: NotificationPayload::Children(Self::children_of(nodes, parent)),
        }
    }

    fn dispatch(
        &self,
        notifications: Vec<WatchNotification>,
    ) {
        let mut closed = Vec::new();
        for notification in notifications {
            let key = (notification.kind, notification.path.clone());
            let sinks: Vec<(SessionId, NotificationSink)> = match self.tree.watchers.get(&key) {
                Some(sessions) => sessions.iter().map(|(id, sink)| (*id, sink.clone())).collect(),
                None => continue,
            };
            for (session, sink) in sinks {
                trace!(path = %notification.path, kind = notification.kind.as_str(), session, "notify");
                if sink.send(notification.clone()).is_err() {
                    closed.push((key.clone(), session));
                }
            }
        }
        for (key, session) in closed {
            debug!(path = %key.1, session, "dropping watch with closed sink");
            self.drop_watch(&key, session);
        }
    }

    fn drop_watch(
        &self,
        key: &(WatchKind, String),
        session: SessionId,
    ) {
        if let Some(mut sessions) = self.tree.watchers.get_mut(key) {
            sessions.remove(&session);
        }
        self.tree.watchers.remove_if(key, |_, sessions| sessions.is_empty());
    }
}

#[async_trait]
impl CoordinationClient for MemCoordinationStore {
    async fn connect(&self) -> Result<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(CoordinationError::Unreachable("in-memory store is offline".to_string()).into());
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        self.ensure_connected()?;
        validate_path(path)?;
        Ok(self.tree.nodes.read().contains_key(path))
    }

    async fn mkdir_recursive(
        &self,
        path: &str,
    ) -> Result<()> {
        self.ensure_connected()?;
        validate_path(path)?;

        let notifications = {
            let mut nodes = self.tree.nodes.write();
            let mut chain = Vec::new();
            let mut end = 0;
            while end < path.len() {
                end = path[end + 1..].find('/').map(|i| i + end + 1).unwrap_or(path.len());
                chain.push(&path[..end]);
            }

            let leaves = self.tree.leaves.read();
            if let Some(leaf) = chain[..chain.len().saturating_sub(1)]
                .iter()
                .find(|node| nodes.contains_key(**node) && leaves.contains(**node))
            {
                return Err(CoordinationError::NodeConflict {
                    path: path.to_string(),
                    reason: format!("{leaf} cannot hold children"),
                }
                .into());
            }
            drop(leaves);

            let mut created = Vec::new();
            for node in chain {
                if !nodes.contains_key(node) {
                    nodes.insert(node.to_string(), None);
                    created.push(node.to_string());
                }
            }
            created
                .iter()
                .filter_map(|node| parent_path(node))
                .map(|parent| Self::children_notification(&nodes, parent))
                .collect::<Vec<_>>()
        };

        self.dispatch(notifications);
        Ok(())
    }

    async fn get_data(
        &self,
        path: &str,
    ) -> Result<Option<String>> {
        self.ensure_connected()?;
        validate_path(path)?;
        self.tree
            .nodes
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| CoordinationError::NoNode { path: path.to_string() }.into())
    }

    async fn set_data(
        &self,
        path: &str,
        value: &str,
    ) -> Result<()> {
        self.ensure_connected()?;
        validate_path(path)?;

        {
            let mut nodes = self.tree.nodes.write();
            let slot = nodes
                .get_mut(path)
                .ok_or_else(|| CoordinationError::NoNode { path: path.to_string() })?;
            *slot = Some(value.to_string());
        }

        self.dispatch(vec![WatchNotification {
            kind: WatchKind::DataChanged,
            path: path.to_string(),
            payload: NotificationPayload::Data(Some(value.to_string())),
        }]);
        Ok(())
    }

    async fn get_children(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        self.ensure_connected()?;
        validate_path(path)?;
        let nodes = self.tree.nodes.read();
        if !nodes.contains_key(path) {
            return Err(CoordinationError::NoNode { path: path.to_string() }.into());
        }
        Ok(Self::children_of(&nodes, path))
    }

    async fn remove(
        &self,
        path: &str,
    ) -> Result<()> {
        self.ensure_connected()?;
        validate_path(path)?;

        let notifications = {
            let mut nodes = self.tree.nodes.write();
            if !nodes.contains_key(path) {
                return Err(CoordinationError::NoNode { path: path.to_string() }.into());
            }
            let prefix = format!("{path}/");
            let doomed: Vec<String> = nodes
                .keys()
                .filter(|k| k.as_str() == path || k.starts_with(&prefix))
                .cloned()
                .collect();
            let mut leaves = self.tree.leaves.write();
            for node in &doomed {
                nodes.remove(node);
                leaves.remove(node);
            }
            drop(leaves);

            let mut notifications: Vec<WatchNotification> = doomed
                .into_iter()
                .map(|node| WatchNotification {
                    kind: WatchKind::DataChanged,
                    path: node,
                    payload: NotificationPayload::Data(None),
                })
                .collect();
            if let Some(parent) = parent_path(path) {
                notifications.push(Self::children_notification(&nodes, parent));
            }
            notifications
        };

        self.dispatch(notifications);
        Ok(())
    }

    async fn register_watch(
        &self,
        kind: WatchKind,
        path: &str,
        sink: NotificationSink,
    ) -> Result<()> {
        self.ensure_connected()?;
        validate_path(path)?;
        if sink.is_closed() {
            return Err(CoordinationError::SinkClosed { path: path.to_string() }.into());
        }
        self.tree
            .watchers
            .entry((kind, path.to_string()))
            .or_default()
            .insert(self.session, sink);
        trace!(path, kind = kind.as_str(), "watch registered");
        Ok(())
    }

    async fn unregister_watch(
        &self,
        kind: WatchKind,
        path: &str,
    ) -> Result<()> {
        self.ensure_connected()?;
        self.drop_watch(&(kind, path.to_string()), self.session);
        trace!(path, kind = kind.as_str(), "watch unregistered");
        Ok(())
    }
}
