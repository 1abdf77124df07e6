//! Path Resolver
//!
//! Maps (partition, repository, module) onto coordination store paths:
//! `{root}/{partition user}/{repository}/{module}`.


use crate::constants::ESCAPED_SLASH;
use crate::storage_user;
use crate::MirrorConfig;
use crate::MirrorError;
use crate::Partition;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: String,
    release_user: String,
    snapshot_user: String,
}

impl PathResolver {
    pub fn new(
        root: impl Into<String>,
        release_user: impl Into<String>,
        snapshot_user: impl Into<String>,
    ) -> Result<Self> {
        let release_user = release_user.into();
        let snapshot_user = snapshot_user.into();
        for user in [&release_user, &snapshot_user] {
            if user.is_empty() || user.contains('/') {
                return Err(MirrorError::MalformedStorage(user.clone()).into());
            }
        }
        Ok(Self {
            root: root.into().trim_end_matches('/').to_string(),
            release_user,
            snapshot_user,
        })
    }

    pub fn from_config(config: &MirrorConfig) -> Result<Self> {
        Self::new(
            config.coordination.root.clone(),
            storage_user(&config.storage.release)?,
            storage_user(&config.storage.snapshot)?,
        )
    }

    pub fn user(
        &self,
        partition: Partition,
    ) -> &str {
        match partition {
            Partition::Release => &self.release_user,
            Partition::Snapshot => &self.snapshot_user,
        }
    }

    /// Both partitions resolve to the same remote user
    pub fn is_same(&self) -> bool {
        self.release_user == self.snapshot_user
    }

    pub fn user_root(
        &self,
        partition: Partition,
    ) -> String {
        format!("{}/{}", self.root, self.user(partition))
    }

    /// Joins the present segments; a module without a repository is ignored.
    pub fn resolve(
        &self,
        partition: Partition,
        repository: Option<&str>,
        module: Option<&str>,
    ) -> String {
        let mut path = self.user_root(partition);
        if let Some(repository) = repository {
            path = child_path(&path, repository);
            if let Some(module) = module {
                path = child_path(&path, module);
            }
        }
        path
    }

    pub fn repository_path(
        &self,
        partition: Partition,
        repository: &str,
    ) -> String {
        self.resolve(partition, Some(repository), None)
    }

    pub fn module_path(
        &self,
        partition: Partition,
        repository: &str,
        module: &str,
    ) -> String {
        self.resolve(partition, Some(repository), Some(module))
    }
}

/// Appends one node name to `parent`, escaping `/` inside the name.
pub fn child_path(
    parent: &str,
    name: &str,
) -> String {
    format!("{parent}/{}", escape_segment(name))
}

pub fn escape_segment(name: &str) -> String {
    name.replace('/', ESCAPED_SLASH)
}

pub fn unescape_segment(name: &str) -> String {
    name.replace(ESCAPED_SLASH, "/")
}
