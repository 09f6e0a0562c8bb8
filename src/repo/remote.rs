//! Proxied repositories
//!
//! Resolution order for a remote path:
//! 1. blackout, handling and include/exclude policy (rejected, no I/O)
//! 2. the local cache repository: a fresh copy is served as-is
//! 3. offline: an expired cached copy is served, otherwise not found
//! 4. the failed/missed retrieval caches
//! 5. a remote probe, whose negative outcome is cached
//! 6. a negative or not-newer outcome un-expires the cached copy, if any

use crate::clock::Clock;
use crate::config::schema::{ChecksumPolicy, RemoteRepoConfig};
use crate::error::{DepotError, DepotResult};
use crate::remote::RemoteTransport;
use crate::repo::{LocalRepo, RepoDescriptor, RetrievalCaches};
use crate::repo_path::RepoPath;
use crate::resource::{
    is_checksum_path, split_checksum_path, ChecksumType, Checksums, ContentSource, FileResource,
    RepoResource, ResourceHandle, Unfound,
};
use crate::store::ContentStore;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct RemoteRepo {
    descriptor: RepoDescriptor,
    url: String,
    offline: bool,
    hard_fail: bool,
    checksum_policy: ChecksumPolicy,
    transport: Arc<dyn RemoteTransport>,
    cache_repo: Option<Arc<LocalRepo>>,
    caches: RetrievalCaches,
    clock: Arc<dyn Clock>,
}

impl RemoteRepo {
    /// Build a remote repository and, when it stores artifacts locally, its
    /// cache repository `<key>-cache`
    pub fn new(
        config: &RemoteRepoConfig,
        descriptor: RepoDescriptor,
        global_offline: bool,
        transport: Arc<dyn RemoteTransport>,
        store: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache_repo = config.store_artifacts_locally.then(|| {
            Arc::new(LocalRepo::cache(
                descriptor.with_key(config.cache_key()),
                &descriptor.key,
                config.retrieval_cache_period_secs,
                store,
                clock.clone(),
            ))
        });

        Self {
            url: config.url.clone(),
            offline: config.offline || global_offline,
            hard_fail: config.hard_fail,
            checksum_policy: config.checksum_policy,
            transport,
            cache_repo,
            caches: RetrievalCaches::new(config, clock.clone()),
            clock,
            descriptor,
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn descriptor(&self) -> &RepoDescriptor {
        &self.descriptor
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn is_hard_fail(&self) -> bool {
        self.hard_fail
    }

    pub fn is_store_artifacts_locally(&self) -> bool {
        self.cache_repo.is_some()
    }

    pub fn cache_repo(&self) -> Option<&Arc<LocalRepo>> {
        self.cache_repo.as_ref()
    }

    pub fn caches(&self) -> &RetrievalCaches {
        &self.caches
    }

    fn repo_path(&self, path: &str) -> RepoPath {
        RepoPath::new(self.key(), path)
    }

    /// Resolve `path` against the cache and the origin.
    ///
    /// Ordinary absence, policy refusals and (without hard fail) transport
    /// errors come back as values. Errors are a folder where a file was
    /// expected, store failures, and transport failures under hard fail.
    pub async fn get_info(&self, path: &str) -> DepotResult<RepoResource> {
        let repo_path = self.repo_path(path);

        if let Some((target, _)) = split_checksum_path(path) {
            if let Err(reason) = self.descriptor.check(target, false) {
                return Ok(RepoResource::rejected(repo_path, reason));
            }
            if let Some(cache) = &self.cache_repo {
                let cached = cache.get_info(path).await?;
                if cached.is_found() {
                    return Ok(cached);
                }
            }
            return Ok(RepoResource::not_found(
                repo_path,
                "checksums are not fetched from the remote",
            ));
        }

        if let Err(reason) = self.descriptor.check(path, false) {
            debug!("{} rejected: {}", repo_path, reason);
            return Ok(RepoResource::rejected(repo_path, reason));
        }

        let mut expired = None;
        if let Some(cache) = &self.cache_repo {
            if let RepoResource::Found(cached) = cache.get_info(path).await? {
                if !cache.is_expired(&cached) {
                    debug!("{} served from {}", repo_path, cache.key());
                    return Ok(RepoResource::Found(cached));
                }
                if self.offline {
                    debug!("{} is offline, serving expired {}", self.key(), cached.path);
                    return Ok(RepoResource::Found(cached));
                }
                expired = Some(cached);
            }
        }

        if self.offline {
            return Ok(RepoResource::not_found(
                repo_path,
                format!("{} is offline", self.key()),
            ));
        }

        let result = match self.caches.lookup(path) {
            Some((cache_name, unfound)) => {
                debug!("{} answered from the {} cache", repo_path, cache_name);
                RepoResource::NotFound(unfound)
            }
            None => self.probe(&repo_path).await?,
        };

        match (result, expired) {
            (RepoResource::Found(remote), Some(cached))
                if remote.last_modified <= cached.last_modified =>
            {
                debug!("{} not newer on remote, keeping cached copy", repo_path);
                self.unexpire_cached(cached).await
            }
            (RepoResource::NotFound(unfound), Some(cached)) => {
                debug!(
                    "{} unavailable on remote ({}), falling back to cached copy",
                    repo_path, unfound.reason
                );
                self.unexpire_cached(cached).await
            }
            (result, _) => Ok(result),
        }
    }

    async fn probe(&self, repo_path: &RepoPath) -> DepotResult<RepoResource> {
        match self.transport.probe(repo_path.path()).await {
            Ok(Some(meta)) => {
                let now = self.clock.now_millis();
                debug!("{} found on remote", repo_path);
                Ok(RepoResource::Found(FileResource {
                    path: repo_path.clone(),
                    size: meta.size,
                    last_modified: meta.last_modified.unwrap_or(now),
                    last_updated: now,
                    checksums: Checksums::new(),
                }))
            }
            Ok(None) => {
                debug!("{} not found on remote", repo_path);
                let unfound = Unfound::new(repo_path.clone(), "not found on remote");
                self.caches.missed.put(unfound.clone());
                Ok(RepoResource::NotFound(unfound))
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!("{}: {}", self.key(), e);
                } else {
                    error!(
                        "{}: failed to retrieve {} from {}: {:?}",
                        self.key(),
                        repo_path.path(),
                        self.url,
                        e
                    );
                }
                let unfound = Unfound::new(repo_path.clone(), e.to_string());
                self.caches.failed.put(unfound.clone());

                if self.hard_fail {
                    return Err(DepotError::RemoteHardFail {
                        repo: self.key().to_string(),
                        source: e,
                    });
                }
                Ok(RepoResource::NotFound(unfound))
            }
        }
    }

    async fn unexpire_cached(&self, cached: FileResource) -> DepotResult<RepoResource> {
        let Some(cache) = &self.cache_repo else {
            return Ok(RepoResource::Found(cached));
        };
        match cache.unexpire(cached.path.path()).await? {
            Some(resource) => Ok(RepoResource::Found(resource)),
            None => Ok(RepoResource::not_found(
                cached.path,
                "cached copy disappeared",
            )),
        }
    }

    /// Content of a resolved resource. Stored through the cache repository
    /// when storing locally, streamed straight from the origin otherwise.
    pub async fn get_resource_stream(&self, resource: &FileResource) -> DepotResult<ResourceHandle> {
        let path = resource.path.path();

        let Some(cache) = &self.cache_repo else {
            if self.offline || is_checksum_path(path) {
                return Err(DepotError::ItemNotFound(self.repo_path(path)));
            }
            let fetched = self.transport.fetch(path).await?;
            return Ok(ResourceHandle {
                resource: FileResource {
                    path: self.repo_path(path),
                    size: fetched.content.len() as i64,
                    last_modified: fetched.meta.last_modified.unwrap_or(resource.last_modified),
                    last_updated: self.clock.now_millis(),
                    checksums: Checksums::new(),
                },
                content: fetched.content,
                source: ContentSource::Remote,
            });
        };

        if self.offline || is_checksum_path(path) {
            return cache.read_handle(path).await;
        }

        match cache
            .download_and_save(self.transport.as_ref(), resource, self.checksum_policy)
            .await
        {
            Ok(handle) => {
                self.caches.remove(path, false);
                Ok(handle)
            }
            Err(DepotError::Remote(e)) => match cache.read_existing(path).await? {
                Some(handle) => {
                    warn!(
                        "{}: download of {} failed ({}), serving cached copy",
                        self.key(),
                        path,
                        e
                    );
                    Ok(handle)
                }
                None => Err(DepotError::Remote(e)),
            },
            Err(e) => Err(e),
        }
    }

    /// Checksums published by the origin, all algorithms fetched
    /// concurrently. A missing or failing algorithm is skipped. Offline
    /// repositories answer from the cache.
    pub async fn get_checksums(&self, path: &str) -> DepotResult<Checksums> {
        if self.offline {
            return match &self.cache_repo {
                Some(cache) => cache.get_checksums(path).await,
                None => Ok(Checksums::new()),
            };
        }

        let fetches = ChecksumType::all().iter().map(|&checksum_type| async move {
            (
                checksum_type,
                self.transport.fetch_checksum(path, checksum_type).await,
            )
        });

        let mut checksums = Checksums::new();
        for (checksum_type, result) in join_all(fetches).await {
            match result {
                Ok(Some(value)) => {
                    checksums.insert(checksum_type, value);
                }
                Ok(None) => debug!("{}: no {} published for {}", self.key(), checksum_type, path),
                Err(e) => debug!(
                    "{}: could not fetch {} for {}: {}",
                    self.key(),
                    checksum_type,
                    path,
                    e
                ),
            }
        }
        Ok(checksums)
    }

    /// Drop every failed/missed entry
    pub fn clear_caches(&self) {
        self.caches.clear();
        info!("Cleared retrieval caches of {}", self.key());
    }

    /// Drop failed/missed entries for `path` (and below it)
    pub fn remove_from_caches(&self, path: &str, include_sub_paths: bool) -> usize {
        self.caches.remove(path, include_sub_paths)
    }

    /// Force-expire cached copies under `path` and forget negative results
    /// for it, so the next request goes back to the origin
    pub async fn zap(&self, path: &str) -> DepotResult<usize> {
        self.remove_from_caches(path, true);
        match &self.cache_repo {
            Some(cache) => cache.zap(path).await,
            None => Ok(0),
        }
    }
}
