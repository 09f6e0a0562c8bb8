//! Repository set and host-facing service
//!
//! `RepoSet` is everything built from one configuration. `RepositoryService`
//! holds the current set and swaps in a freshly built one on reload, so a
//! reload never mutates a repository (or its retrieval caches) in place.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{DepotError, DepotResult};
use crate::layout::LayoutRegistry;
use crate::metadata::MetadataRecalculator;
use crate::mover::RepoPathMover;
use crate::remote::TransportFactory;
use crate::repo::{LocalRepo, RealRepo, RemoteRepo, RepoDescriptor};
use crate::repo_path::RepoPath;
use crate::resolve::LatestVersionResolver;
use crate::resource::{Checksums, FileResource, RepoResource, ResourceHandle};
use crate::security::{AccessStatus, Authorizer};
use crate::store::{ContentStore, Properties};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// All repositories of one configuration, by key. Cache repositories are
/// registered under their own `<remote>-cache` key as well.
pub struct RepoSet {
    repos: BTreeMap<String, RealRepo>,
    layouts: LayoutRegistry,
}

impl RepoSet {
    pub fn build(
        config: &Config,
        store: Arc<dyn ContentStore>,
        transports: &dyn TransportFactory,
        clock: Arc<dyn Clock>,
    ) -> DepotResult<Self> {
        config.validate()?;
        let layouts = LayoutRegistry::from_config(&config.layouts)?;
        let mut repos = BTreeMap::new();

        for local in &config.local_repos {
            let descriptor = RepoDescriptor::from_config(&local.common, &layouts)?;
            let repo = LocalRepo::hosted(descriptor, store.clone(), clock.clone());
            repos.insert(local.common.key.clone(), RealRepo::Local(Arc::new(repo)));
        }

        for remote in &config.remote_repos {
            let descriptor = RepoDescriptor::from_config(&remote.common, &layouts)?;
            let repo = RemoteRepo::new(
                remote,
                descriptor,
                config.general.offline,
                transports.create(remote)?,
                store.clone(),
                clock.clone(),
            );
            if let Some(cache) = repo.cache_repo() {
                repos.insert(cache.key().to_string(), RealRepo::Local(cache.clone()));
            }
            repos.insert(remote.common.key.clone(), RealRepo::Remote(Arc::new(repo)));
        }

        Ok(Self { repos, layouts })
    }

    pub fn get(&self, key: &str) -> Option<&RealRepo> {
        self.repos.get(key)
    }

    pub fn require(&self, key: &str) -> DepotResult<&RealRepo> {
        self.get(key)
            .ok_or_else(|| DepotError::RepositoryNotFound(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.repos.keys().map(String::as_str)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &Arc<RemoteRepo>> {
        self.repos.values().filter_map(RealRepo::as_remote)
    }

    pub fn layouts(&self) -> &LayoutRegistry {
        &self.layouts
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

/// Entry point for hosts: resolution, downloads, cache control, latest
/// version lookup and move/copy over the current repository set
pub struct RepositoryService {
    store: Arc<dyn ContentStore>,
    transports: Arc<dyn TransportFactory>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    repos: RwLock<Arc<RepoSet>>,
}

impl RepositoryService {
    pub fn new(
        config: &Config,
        store: Arc<dyn ContentStore>,
        transports: Arc<dyn TransportFactory>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
    ) -> DepotResult<Self> {
        let repos = RepoSet::build(config, store.clone(), transports.as_ref(), clock.clone())?;
        info!("Loaded {} repositories", repos.len());
        Ok(Self {
            store,
            transports,
            authorizer,
            clock,
            repos: RwLock::new(Arc::new(repos)),
        })
    }

    /// Build a new repository set from `config` and replace the current one.
    /// On error the current set stays in place.
    pub fn reload(&self, config: &Config) -> DepotResult<()> {
        let repos = RepoSet::build(
            config,
            self.store.clone(),
            self.transports.as_ref(),
            self.clock.clone(),
        )?;
        info!("Reloaded configuration: {} repositories", repos.len());
        *self.repos.write() = Arc::new(repos);
        Ok(())
    }

    /// The current repository set. Holders keep using it across a reload.
    pub fn repositories(&self) -> Arc<RepoSet> {
        self.repos.read().clone()
    }

    pub fn repository(&self, key: &str) -> DepotResult<RealRepo> {
        self.repositories().require(key).cloned()
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.authorizer
    }

    /// Resolve `path` for a download request. Denied reads are rejected
    /// before the repository is consulted.
    pub async fn get_info(&self, path: &RepoPath) -> DepotResult<RepoResource> {
        if let AccessStatus::Denied(reason) = self.authorizer.can_download(path) {
            debug!("{} rejected: {}", path, reason);
            return Ok(RepoResource::rejected(path.clone(), reason));
        }
        self.repository(path.repo_key())?.get_info(path).await
    }

    /// Content of a resource returned by `get_info`
    pub async fn get_resource_stream(&self, resource: &FileResource) -> DepotResult<ResourceHandle> {
        let repo = self.repository(resource.path.repo_key())?;
        let owner = match &repo {
            RealRepo::Local(local) => match local.owner_key() {
                Some(owner) => self.repository(owner)?,
                None => repo.clone(),
            },
            RealRepo::Remote(_) => repo.clone(),
        };
        owner.get_resource_stream(resource).await
    }

    /// Resolve and read `path` in one step
    pub async fn download(&self, path: &RepoPath) -> DepotResult<ResourceHandle> {
        match self.get_info(path).await? {
            RepoResource::Found(resource) => self.get_resource_stream(&resource).await,
            _ => Err(DepotError::ItemNotFound(path.clone())),
        }
    }

    pub async fn get_checksums(&self, path: &RepoPath) -> DepotResult<Checksums> {
        self.repository(path.repo_key())?.get_checksums(path).await
    }

    /// Clear the retrieval caches of one remote, or of all when `key` is `None`
    pub fn clear_caches(&self, key: Option<&str>) -> DepotResult<()> {
        let repos = self.repositories();
        match key {
            Some(key) => remote_of(repos.require(key)?, key)?.clear_caches(),
            None => repos.remotes().for_each(|remote| remote.clear_caches()),
        }
        Ok(())
    }

    pub fn remove_from_caches(&self, path: &RepoPath, include_sub_paths: bool) -> DepotResult<usize> {
        let repos = self.repositories();
        let remote = remote_of(repos.require(path.repo_key())?, path.repo_key())?;
        Ok(remote.remove_from_caches(path.path(), include_sub_paths))
    }

    /// Zap through either the remote or its cache repository key
    pub async fn zap(&self, path: &RepoPath) -> DepotResult<usize> {
        let repo = self.repository(path.repo_key())?;
        let remote = match &repo {
            RealRepo::Remote(remote) => remote.clone(),
            RealRepo::Local(local) => match local.owner_key() {
                Some(owner) => remote_of(&self.repository(owner)?, owner)?.clone(),
                None => return Err(DepotError::NotCacheRepository(path.repo_key().to_string())),
            },
        };
        remote.zap(path.path()).await
    }

    /// Resolver bound to the current repository set
    pub fn latest_version_resolver(&self) -> LatestVersionResolver {
        LatestVersionResolver::new(self.repositories(), self.store.clone())
    }

    /// Rewrite a `[RELEASE]`/`[INTEGRATION]`/non-unique request to the
    /// latest matching artifact; the original path when nothing matches
    pub async fn rewrite_latest(
        &self,
        path: &RepoPath,
        request_properties: &Properties,
    ) -> DepotResult<RepoPath> {
        self.latest_version_resolver()
            .rewrite(path, request_properties)
            .await
    }

    /// Mover bound to the current repository set
    pub fn mover(&self, recalculator: Arc<dyn MetadataRecalculator>) -> RepoPathMover {
        RepoPathMover::new(
            self.repositories(),
            self.store.clone(),
            self.authorizer.clone(),
            recalculator,
        )
    }
}

fn remote_of<'a>(repo: &'a RealRepo, key: &str) -> DepotResult<&'a Arc<RemoteRepo>> {
    repo.as_remote().ok_or_else(|| {
        DepotError::RepositoryConfig(format!("{} is not a remote repository", key))
    })
}
