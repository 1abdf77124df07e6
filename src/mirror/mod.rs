//! Local Mirror Store
//!
//! In-memory replica of the remote repository tree:
//!
//! ```text
//! partition (release | snapshot)
//!   └─> repository name ─> { stat, module name ─> { package identifier } }
//! ```
//!
//! Pure data structure without I/O. It is not synchronized by itself; callers
//! share it behind a single lock and never hold that lock across an await.

mod partition;
mod stat;
pub use partition::*;
pub use stat::*;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use tracing::trace;

use crate::utils::package::split_module_name;
use crate::utils::package::with_platform;
use crate::Result;

/// Package identifiers of one module, ordered
pub type PackageSet = BTreeSet<String>;

/// Modules of one repository keyed by module name
pub type ModuleMap = BTreeMap<String, PackageSet>;

/// Cached state of one repository
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryEntry {
    pub stat: Option<RepositoryStat>,
    pub modules: ModuleMap,
}

type RepositoryMap = BTreeMap<String, RepositoryEntry>;

#[derive(Debug, Default)]
pub struct LocalMirror {
    release: RepositoryMap,
    snapshot: RepositoryMap,
    /// Release and snapshot share one remote user
    merged: bool,
    /// Backing storage description, display only
    storage: Option<String>,
}

impl LocalMirror {
    pub fn new() -> Self {
        Self::default()
    }

    fn repositories(
        &self,
        partition: Partition,
    ) -> &RepositoryMap {
        if self.merged || partition == Partition::Release {
            &self.release
        } else {
            &self.snapshot
        }
    }

    fn repositories_mut(
        &mut self,
        partition: Partition,
    ) -> &mut RepositoryMap {
        if self.merged || partition == Partition::Release {
            &mut self.release
        } else {
            &mut self.snapshot
        }
    }

    /// Registers a repository, replacing its stat only when one is supplied.
    ///
    /// Returns true if the repository was not known before.
    pub fn add_repository(
        &mut self,
        partition: Partition,
        name: &str,
        stat: Option<RepositoryStat>,
    ) -> bool {
        let repositories = self.repositories_mut(partition);
        let created = !repositories.contains_key(name);
        let entry = repositories.entry(name.to_string()).or_default();
        if stat.is_some() {
            entry.stat = stat;
        }
        trace!(%partition, repository = name, created, "add_repository");
        created
    }

    /// Overwrites the stat of a known repository wholesale.
    ///
    /// Returns false (and changes nothing) for unknown repositories.
    pub fn set_stat(
        &mut self,
        partition: Partition,
        name: &str,
        stat: Option<RepositoryStat>,
    ) -> bool {
        match self.repositories_mut(partition).get_mut(name) {
            Some(entry) => {
                entry.stat = stat;
                true
            }
            None => false,
        }
    }

    pub fn del_repository(
        &mut self,
        partition: Partition,
        name: &str,
    ) -> Option<RepositoryEntry> {
        trace!(%partition, repository = name, "del_repository");
        self.repositories_mut(partition).remove(name)
    }

    pub fn contains_repository(
        &self,
        partition: Partition,
        name: &str,
    ) -> bool {
        self.repositories(partition).contains_key(name)
    }

    /// Adds `identifier` to its module, creating repository and module lazily.
    ///
    /// Returns true if the identifier was not present.
    pub fn add_package(
        &mut self,
        partition: Partition,
        repository: &str,
        identifier: &str,
    ) -> Result<bool> {
        let module = split_module_name(identifier)?;
        let inserted = self
            .repositories_mut(partition)
            .entry(repository.to_string())
            .or_default()
            .modules
            .entry(module.to_string())
            .or_default()
            .insert(identifier.to_string());
        trace!(%partition, repository, identifier, inserted, "add_package");
        Ok(inserted)
    }

    /// Removes `identifier` from its module; the module itself is retained.
    pub fn del_package(
        &mut self,
        partition: Partition,
        repository: &str,
        identifier: &str,
    ) -> Result<bool> {
        let module = split_module_name(identifier)?;
        let removed = self
            .repositories_mut(partition)
            .get_mut(repository)
            .and_then(|entry| entry.modules.get_mut(module))
            .map(|packages| packages.remove(identifier))
            .unwrap_or(false);
        trace!(%partition, repository, identifier, removed, "del_package");
        Ok(removed)
    }

    pub fn del_module(
        &mut self,
        partition: Partition,
        repository: &str,
        module: &str,
    ) -> Option<PackageSet> {
        self.repositories_mut(partition)
            .get_mut(repository)
            .and_then(|entry| entry.modules.remove(module))
    }

    /// Borrowed view of one module's packages, `None` if the module is unknown.
    pub fn packages(
        &self,
        partition: Partition,
        repository: &str,
        module: &str,
    ) -> Option<&PackageSet> {
        self.repositories(partition)
            .get(repository)
            .and_then(|entry| entry.modules.get(module))
    }

    pub fn list_all(
        &self,
        partition: Partition,
    ) -> BTreeMap<String, RepositoryEntry> {
        self.repositories(partition).clone()
    }

    pub fn list_repository(
        &self,
        partition: Partition,
    ) -> BTreeMap<String, Option<RepositoryStat>> {
        self.repositories(partition)
            .iter()
            .map(|(name, entry)| (name.clone(), entry.stat.clone()))
            .collect()
    }

    pub fn list_modules(
        &self,
        partition: Partition,
        repository: &str,
    ) -> ModuleMap {
        self.repositories(partition)
            .get(repository)
            .map(|entry| entry.modules.clone())
            .unwrap_or_default()
    }

    pub fn list_packages(
        &self,
        partition: Partition,
        repository: &str,
        module: &str,
    ) -> PackageSet {
        self.packages(partition, repository, module).cloned().unwrap_or_default()
    }

    /// Maps every requested `name@version` that the mirror can serve to the
    /// cached identifier.
    ///
    /// Release is searched before snapshot. Within a module the identifier
    /// qualified with `platform` wins over the bare one. Malformed requests are
    /// skipped.
    pub fn diff_packages<S: AsRef<str>>(
        &self,
        repository: &str,
        requested: &[S],
        platform: &str,
    ) -> BTreeMap<String, String> {
        let partitions: &[Partition] = if self.merged {
            &[Partition::Release]
        } else {
            &Partition::ALL
        };

        let mut hits = BTreeMap::new();
        for wanted in requested.iter().map(AsRef::as_ref) {
            let Ok(module) = split_module_name(wanted) else {
                continue;
            };
            let qualified = (!platform.is_empty()).then(|| with_platform(wanted, platform));

            let found = partitions.iter().find_map(|p| {
                let packages = self.packages(*p, repository, module)?;
                match &qualified {
                    Some(q) if packages.contains(q) => Some(q.clone()),
                    _ if packages.contains(wanted) => Some(wanted.to_string()),
                    _ => None,
                }
            });

            if let Some(cached) = found {
                hits.insert(wanted.to_string(), cached);
            }
        }
        hits
    }

    pub fn set_storage(
        &mut self,
        storage: impl Into<String>,
    ) {
        self.storage = Some(storage.into());
    }

    pub fn storage(&self) -> Option<&str> {
        self.storage.as_deref()
    }

    /// Collapses snapshot into release; both partitions address one store afterwards.
    pub fn same(&mut self) {
        if self.merged {
            return;
        }
        for (name, entry) in std::mem::take(&mut self.snapshot) {
            let target = self.release.entry(name).or_default();
            if target.stat.is_none() {
                target.stat = entry.stat;
            }
            for (module, packages) in entry.modules {
                target.modules.entry(module).or_default().extend(packages);
            }
        }
        self.merged = true;
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    /// Drops all cached repositories. Partition layout and storage stay.
    pub fn clear(&mut self) {
        self.release.clear();
        self.snapshot.clear();
    }
}
