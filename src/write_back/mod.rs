//! Write-Back Engine
//!
//! Mutations issued by this process. Each one is written to the coordination
//! store first; only when the remote write succeeded is the mirror updated, so
//! reads reflect the change before the watch notification arrives. The watch
//! path converges on the same state, and applying it twice is a no-op.
//!
//! Remote writes are retried with the `retry.write_back` policy. After the
//! last attempt the error is returned to the caller and the mirror is left
//! untouched.


use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use tracing::warn;

use crate::coord::ensure_node;
use crate::coord::is_no_node;
use crate::metrics::record_write_back;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::utils::package::append_token;
use crate::utils::package::contains_token;
use crate::utils::package::remove_token;
use crate::utils::package::split_module_name;
use crate::BackoffPolicy;
use crate::CoordinationClient;
use crate::LocalMirror;
use crate::Partition;
use crate::PathResolver;
use crate::RepositoryStat;
use crate::Result;

pub struct WriteBackEngine {
    client: Arc<dyn CoordinationClient>,
    resolver: Arc<PathResolver>,
    mirror: Arc<RwLock<LocalMirror>>,
    policy: BackoffPolicy,
}

impl std::fmt::Debug for WriteBackEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WriteBackEngine")
            .field("resolver", &self.resolver)
            .field("policy", &self.policy)
            .finish()
    }
}

impl WriteBackEngine {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        resolver: Arc<PathResolver>,
        mirror: Arc<RwLock<LocalMirror>>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            resolver,
            mirror,
            policy,
        }
    }

    /// Creates the repository node when it is unknown locally and writes
    /// `stat` to it when supplied.
    pub async fn add_repository(
        &self,
        partition: Partition,
        name: &str,
        stat: Option<RepositoryStat>,
    ) -> Result<()> {
        let result = self.write_repository(partition, name, stat.as_ref()).await;
        record_write_back("add_repository", &result);
        if let Err(e) = result {
            warn!(%partition, repository = name, "add_repository failed: {:?}", e);
            return Err(e);
        }

        self.mirror.write().add_repository(partition, name, stat);
        Ok(())
    }

    /// Removes the repository subtree remotely.
    ///
    /// The mirror is cleaned up by the watch on the USER root, which also
    /// releases the watches beneath the repository.
    pub async fn del_repository(
        &self,
        partition: Partition,
        name: &str,
    ) -> Result<()> {
        let path = self.resolver.repository_path(partition, name);
        let client = self.client.as_ref();
        let path_ref = path.as_str();

        let result = self
            .retry(move || async move {
                match client.remove(path_ref).await {
                    Err(e) if is_no_node(&e) => {
                        debug!(path = path_ref, "repository already gone");
                        Ok(())
                    }
                    other => other,
                }
            })
            .await;
        record_write_back("del_repository", &result);
        if let Err(e) = &result {
            warn!(%partition, repository = name, "del_repository failed: {:?}", e);
        }
        result
    }

    /// Adds `identifier` to its module node. Idempotent: a token that is
    /// already present is never written twice.
    pub async fn add_package(
        &self,
        partition: Partition,
        repository: &str,
        identifier: &str,
    ) -> Result<()> {
        let module = split_module_name(identifier)?;

        let cached = self
            .mirror
            .read()
            .packages(partition, repository, module)
            .map(|packages| packages.contains(identifier));
        if cached == Some(true) {
            debug!(%partition, repository, identifier, "package already mirrored");
            return Ok(());
        }

        let path = self.resolver.module_path(partition, repository, module);
        let result = self.append_remote(&path, identifier).await;
        record_write_back("add_package", &result);
        if let Err(e) = result {
            warn!(%partition, repository, identifier, "add_package failed: {:?}", e);
            return Err(e);
        }

        self.mirror.write().add_package(partition, repository, identifier)?;
        Ok(())
    }

    /// Removes the whole token `identifier` from its module node.
    ///
    /// `five@0.0.1` never matches `five@0.0.11`. Removing the last token
    /// leaves an empty value; the module node itself stays.
    pub async fn del_package(
        &self,
        partition: Partition,
        repository: &str,
        identifier: &str,
    ) -> Result<()> {
        let module = split_module_name(identifier)?;
        let path = self.resolver.module_path(partition, repository, module);

        let result = self.remove_remote(&path, identifier).await;
        record_write_back("del_package", &result);
        if let Err(e) = result {
            warn!(%partition, repository, identifier, "del_package failed: {:?}", e);
            return Err(e);
        }

        self.mirror.write().del_package(partition, repository, identifier)?;
        Ok(())
    }

    async fn write_repository(
        &self,
        partition: Partition,
        name: &str,
        stat: Option<&RepositoryStat>,
    ) -> Result<()> {
        let path = self.resolver.repository_path(partition, name);
        let client = self.client.as_ref();
        let path_ref = path.as_str();

        let known = self.mirror.read().contains_repository(partition, name);
        if !known {
            self.retry(move || ensure_node(client, path_ref)).await?;
        }

        if let Some(stat) = stat {
            let value = stat.to_wire();
            let value_ref = value.as_str();
            self.retry(move || client.set_data(path_ref, value_ref)).await?;
        }
        Ok(())
    }

    /// Read-modify-write of a module value, starting from the remote value so
    /// tokens written by other clients are kept.
    async fn append_remote(
        &self,
        path: &str,
        identifier: &str,
    ) -> Result<()> {
        let client = self.client.as_ref();

        self.retry(move || ensure_node(client, path)).await?;
        let current = self.retry(move || client.get_data(path)).await?.unwrap_or_default();

        match append_token(&current, identifier) {
            Some(next) => {
                let next_ref = next.as_str();
                self.retry(move || client.set_data(path, next_ref)).await
            }
            None => {
                debug!(path, identifier, "package already stored remotely");
                Ok(())
            }
        }
    }

    async fn remove_remote(
        &self,
        path: &str,
        identifier: &str,
    ) -> Result<()> {
        let client = self.client.as_ref();

        let current = match self.retry(move || client.get_data(path)).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) if is_no_node(&e) => {
                debug!(path, "module node missing, nothing to remove");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !contains_token(&current, identifier) {
            debug!(path, identifier, "package not stored remotely");
            return Ok(());
        }

        let next = remove_token(&current, identifier);
        let next_ref = next.as_str();
        self.retry(move || client.set_data(path, next_ref)).await
    }

    async fn retry<F, T, P>(
        &self,
        task: F,
    ) -> Result<P>
    where
        F: Fn() -> T,
        T: Future<Output = Result<P>>,
    {
        task_with_timeout_and_exponential_backoff(task, self.policy).await
    }
}
