//! Installed watches and the last state each one observed.
//!
//! The registry is the authority on whether a notification is still wanted:
//! a path that is not registered here is ignored by the engine, whatever the
//! coordination store still delivers.

use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::coord::WatchKind;
use crate::Partition;

/// Level of a node whose children are watched.
///
/// Module nodes (OBJECT level) only carry data watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLevel {
    /// Partition user root, children are repositories
    User,
    /// Repository node, children are modules, value is the stat
    Container,
}

#[derive(Debug, Clone)]
pub struct ChildrenWatch {
    pub partition: Partition,
    pub level: NodeLevel,
    /// Owning repository for CONTAINER watches
    pub repository: Option<String>,
    pub known: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTarget {
    Stat { repository: String },
    Module { repository: String, module: String },
}

#[derive(Debug, Clone)]
pub struct DataWatch {
    pub partition: Partition,
    pub target: DataTarget,
    /// Tokens seen on the last observation; `None` before the first one
    pub known: Option<BTreeSet<String>>,
}

/// Result of comparing an old and a new set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl SetDiff {
    pub fn between(
        known: &BTreeSet<String>,
        current: &BTreeSet<String>,
    ) -> Self {
        Self {
            added: current.difference(known).cloned().collect(),
            removed: known.difference(current).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct WatchRegistry {
    children: HashMap<String, ChildrenWatch>,
    data: HashMap<String, DataWatch>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if a children watch is already installed on `path`.
    pub fn insert_children(
        &mut self,
        path: &str,
        watch: ChildrenWatch,
    ) -> bool {
        if self.children.contains_key(path) {
            return false;
        }
        self.children.insert(path.to_string(), watch);
        true
    }

    /// Returns false if a data watch is already installed on `path`.
    pub fn insert_data(
        &mut self,
        path: &str,
        watch: DataWatch,
    ) -> bool {
        if self.data.contains_key(path) {
            return false;
        }
        self.data.insert(path.to_string(), watch);
        true
    }

    pub fn remove(
        &mut self,
        kind: WatchKind,
        path: &str,
    ) -> bool {
        match kind {
            WatchKind::ChildrenChanged => self.children.remove(path).is_some(),
            WatchKind::DataChanged => self.data.remove(path).is_some(),
        }
    }

    pub fn contains(
        &self,
        kind: WatchKind,
        path: &str,
    ) -> bool {
        match kind {
            WatchKind::ChildrenChanged => self.children.contains_key(path),
            WatchKind::DataChanged => self.data.contains_key(path),
        }
    }

    pub fn data_watch(
        &self,
        path: &str,
    ) -> Option<&DataWatch> {
        self.data.get(path)
    }

    /// Replaces the known children of `path` and returns what changed.
    ///
    /// `None` when no children watch is installed on `path`.
    pub fn diff_children(
        &mut self,
        path: &str,
        children: &[String],
    ) -> Option<(ChildrenWatch, SetDiff)> {
        let watch = self.children.get_mut(path)?;
        let current: BTreeSet<String> = children.iter().cloned().collect();
        let diff = SetDiff::between(&watch.known, &current);
        watch.known = current;
        Some((watch.clone(), diff))
    }

    /// Replaces the known tokens of `path` and returns what changed.
    ///
    /// The first observation reports every token as added.
    pub fn diff_tokens(
        &mut self,
        path: &str,
        tokens: BTreeSet<String>,
    ) -> Option<(DataWatch, SetDiff)> {
        let watch = self.data.get_mut(path)?;
        let diff = match &watch.known {
            Some(known) => SetDiff::between(known, &tokens),
            None => SetDiff {
                added: tokens.clone(),
                removed: BTreeSet::new(),
            },
        };
        watch.known = Some(tokens);
        Some((watch.clone(), diff))
    }

    /// Drops every watch on `path` and beneath it.
    ///
    /// Descendants come first in the returned list, `path` itself last.
    pub fn remove_subtree(
        &mut self,
        path: &str,
    ) -> Vec<(WatchKind, String)> {
        let prefix = format!("{path}/");
        let below = |p: &String| p.starts_with(&prefix);

        let mut removed: Vec<(WatchKind, String)> = Vec::new();
        let mut data: Vec<String> = self.data.keys().filter(|p| below(p)).cloned().collect();
        let mut children: Vec<String> = self.children.keys().filter(|p| below(p)).cloned().collect();
        data.sort();
        children.sort();

        for p in data {
            self.data.remove(&p);
            removed.push((WatchKind::DataChanged, p));
        }
        for p in children {
            self.children.remove(&p);
            removed.push((WatchKind::ChildrenChanged, p));
        }
        if self.data.remove(path).is_some() {
            removed.push((WatchKind::DataChanged, path.to_string()));
        }
        if self.children.remove(path).is_some() {
            removed.push((WatchKind::ChildrenChanged, path.to_string()));
        }
        removed
    }

    /// Drops everything, returning the watches that were installed.
    pub fn drain(&mut self) -> Vec<(WatchKind, String)> {
        let mut removed: Vec<(WatchKind, String)> = self
            .data
            .drain()
            .map(|(p, _)| (WatchKind::DataChanged, p))
            .collect();
        removed.extend(self.children.drain().map(|(p, _)| (WatchKind::ChildrenChanged, p)));
        removed
    }

    pub fn len(&self) -> usize {
        self.children.len() + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
