//! Hosted and cache repositories
//!
//! A `LocalRepo` reads and writes its items in the backing store. A cache
//! repository belongs to exactly one remote; its content can always be
//! fetched again, so it may be expired or purged freely.

use crate::clock::Clock;
use crate::config::schema::ChecksumPolicy;
use crate::error::{DepotError, DepotResult};
use crate::layout::VersionKind;
use crate::remote::RemoteTransport;
use crate::repo::RepoDescriptor;
use crate::repo_path::RepoPath;
use crate::resource::{
    split_checksum_path, ChecksumType, Checksums, ContentSource, FileResource, RepoResource,
    ResourceHandle,
};
use crate::store::{BrowseCriteria, ContentStore, LockMode, PutMeta};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct CacheSettings {
    owner_key: String,
    retrieval_cache_period_secs: u64,
}

pub struct LocalRepo {
    descriptor: RepoDescriptor,
    store: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
    cache: Option<CacheSettings>,
}

impl LocalRepo {
    /// Hosted repository
    pub fn hosted(
        descriptor: RepoDescriptor,
        store: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            descriptor,
            store,
            clock,
            cache: None,
        }
    }

    /// Cache repository of the remote `owner_key`
    pub fn cache(
        descriptor: RepoDescriptor,
        owner_key: &str,
        retrieval_cache_period_secs: u64,
        store: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            descriptor,
            store,
            clock,
            cache: Some(CacheSettings {
                owner_key: owner_key.to_string(),
                retrieval_cache_period_secs,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn descriptor(&self) -> &RepoDescriptor {
        &self.descriptor
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn is_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Key of the owning remote repository, for caches
    pub fn owner_key(&self) -> Option<&str> {
        self.cache.as_ref().map(|c| c.owner_key.as_str())
    }

    pub fn repo_path(&self, path: &str) -> RepoPath {
        RepoPath::new(self.key(), path)
    }

    /// Resolve a file. Checksum paths are answered from the stored
    /// checksums of their target file.
    pub async fn get_info(&self, path: &str) -> DepotResult<RepoResource> {
        let repo_path = self.repo_path(path);

        if let Some((target, checksum_type)) = split_checksum_path(path) {
            if let Err(reason) = self.descriptor.check(target, false) {
                return Ok(RepoResource::rejected(repo_path, reason));
            }
            return self.get_checksum_info(repo_path, target, checksum_type).await;
        }

        if let Err(reason) = self.descriptor.check(path, false) {
            debug!("{} rejected: {}", repo_path, reason);
            return Ok(RepoResource::rejected(repo_path, reason));
        }

        match self.store.get_info(&repo_path).await? {
            None => Ok(RepoResource::not_found(repo_path, "not found")),
            Some(info) if info.is_folder() => Err(DepotError::FileExpected(repo_path)),
            Some(info) => Ok(RepoResource::Found(info.to_file_resource())),
        }
    }

    async fn get_checksum_info(
        &self,
        repo_path: RepoPath,
        target: &str,
        checksum_type: ChecksumType,
    ) -> DepotResult<RepoResource> {
        let target_path = self.repo_path(target);
        let info = match self.store.get_info(&target_path).await? {
            Some(info) if info.is_file() => info,
            _ => return Ok(RepoResource::not_found(repo_path, "not found")),
        };
        match info.checksums.get(&checksum_type) {
            Some(value) => Ok(RepoResource::Found(FileResource {
                path: repo_path,
                size: value.len() as i64,
                last_modified: info.last_modified,
                last_updated: info.last_updated,
                checksums: Checksums::new(),
            })),
            None => Ok(RepoResource::not_found(
                repo_path,
                format!("no {} checksum stored", checksum_type),
            )),
        }
    }

    /// Stored checksums of a file, empty when it does not exist
    pub async fn get_checksums(&self, path: &str) -> DepotResult<Checksums> {
        Ok(self
            .store
            .get_info(&self.repo_path(path))
            .await?
            .filter(|info| info.is_file())
            .map(|info| info.checksums)
            .unwrap_or_default())
    }

    /// Stored value behind a checksum sidecar path such as `a.jar.sha1`
    pub async fn get_checksum(&self, path: &str) -> DepotResult<Option<String>> {
        let Some((target, checksum_type)) = split_checksum_path(path) else {
            return Ok(None);
        };
        Ok(self.get_checksums(target).await?.remove(&checksum_type))
    }

    /// Content of a stored file or checksum sidecar
    pub async fn read_handle(&self, path: &str) -> DepotResult<ResourceHandle> {
        let source = if self.is_cache() {
            ContentSource::Cache
        } else {
            ContentSource::Local
        };

        if let Some((target, checksum_type)) = split_checksum_path(path) {
            let target_path = self.repo_path(target);
            let info = self
                .store
                .get_info(&target_path)
                .await?
                .ok_or_else(|| DepotError::ItemNotFound(self.repo_path(path)))?;
            let value = info
                .checksums
                .get(&checksum_type)
                .cloned()
                .ok_or_else(|| DepotError::ItemNotFound(self.repo_path(path)))?;
            return Ok(ResourceHandle {
                resource: FileResource {
                    path: self.repo_path(path),
                    size: value.len() as i64,
                    last_modified: info.last_modified,
                    last_updated: info.last_updated,
                    checksums: Checksums::new(),
                },
                content: value.into_bytes(),
                source,
            });
        }

        let repo_path = self.repo_path(path);
        let _lock = self.store.lock(&repo_path, LockMode::Shared).await?;
        let info = self
            .store
            .get_info(&repo_path)
            .await?
            .ok_or_else(|| DepotError::ItemNotFound(repo_path.clone()))?;
        if info.is_folder() {
            return Err(DepotError::FileExpected(repo_path));
        }
        let content = self.store.read(&repo_path).await?;

        Ok(ResourceHandle {
            resource: info.to_file_resource(),
            content,
            source,
        })
    }

    /// Cached content of an existing file, `None` when absent
    pub async fn read_existing(&self, path: &str) -> DepotResult<Option<ResourceHandle>> {
        match self.store.get_info(&self.repo_path(path)).await? {
            Some(info) if info.is_file() => Ok(Some(self.read_handle(path).await?)),
            _ => Ok(None),
        }
    }

    /// Write a file under an exclusive lock
    pub async fn store_file(
        &self,
        path: &str,
        content: Vec<u8>,
        meta: PutMeta,
    ) -> DepotResult<FileResource> {
        let repo_path = self.repo_path(path);
        let _lock = self.store.lock(&repo_path, LockMode::Exclusive).await?;
        let info = self.store.put(&repo_path, content, meta).await?;
        Ok(info.to_file_resource())
    }

    /// Whether items at `path` can go stale. Only cache repositories
    /// expire, and never for release artifacts.
    pub fn is_expirable(&self, path: &str) -> bool {
        self.is_cache() && self.descriptor.layout.version_kind(path) != VersionKind::Release
    }

    /// Whether a cached copy is older than the retrieval cache period
    pub fn is_expired(&self, resource: &FileResource) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        self.is_expirable(resource.path.path())
            && resource.is_expired(self.clock.now_millis(), cache.retrieval_cache_period_secs)
    }

    /// Mark a stored file as current again, returning the refreshed
    /// resource, or `None` when nothing is stored at `path`
    pub async fn unexpire(&self, path: &str) -> DepotResult<Option<FileResource>> {
        let repo_path = self.repo_path(path);
        let _lock = self.store.lock(&repo_path, LockMode::Exclusive).await?;

        match self.store.get_info(&repo_path).await? {
            Some(info) if info.is_file() => {
                let now = self.clock.now_millis();
                self.store.set_last_updated(&repo_path, now).await?;
                debug!("Unexpired {}", repo_path);
                let mut resource = info.to_file_resource();
                resource.last_updated = now;
                Ok(Some(resource))
            }
            _ => Ok(None),
        }
    }

    /// Force-expire the expirable files at or below `path`, returning how
    /// many were zapped. Only cache repositories can be zapped.
    pub async fn zap(&self, path: &str) -> DepotResult<usize> {
        if !self.is_cache() {
            return Err(DepotError::NotCacheRepository(self.key().to_string()));
        }

        let root = self.repo_path(path);
        let files = match self.store.get_info(&root).await? {
            None => return Ok(0),
            Some(info) if info.is_file() => vec![info],
            Some(_) => {
                let criteria = BrowseCriteria {
                    files_only: true,
                    ..Default::default()
                };
                self.store.browse(&root, criteria).await?
            }
        };

        let mut zapped = 0;
        for file in files {
            if !self.is_expirable(file.path.path()) {
                continue;
            }
            let _lock = self.store.lock(&file.path, LockMode::Exclusive).await?;
            self.store.set_last_updated(&file.path, 0).await?;
            zapped += 1;
        }
        info!("Zapped {} item(s) under {}", zapped, root);
        Ok(zapped)
    }

    /// Serve `remote` from this cache, downloading it first when the cached
    /// copy is absent or older than the remote's last-modified time
    pub async fn download_and_save(
        &self,
        transport: &dyn RemoteTransport,
        remote: &FileResource,
        checksum_policy: ChecksumPolicy,
    ) -> DepotResult<ResourceHandle> {
        let path = remote.path.path();
        let repo_path = self.repo_path(path);
        let lock = self.store.lock(&repo_path, LockMode::Exclusive).await?;

        if let Some(cached) = self.store.get_info(&repo_path).await? {
            if cached.is_folder() {
                return Err(DepotError::FileExpected(repo_path));
            }
            if remote.last_modified <= cached.last_modified {
                debug!("{} is up to date, serving cached copy", repo_path);
                if self.is_expired(&cached.to_file_resource()) {
                    self.store
                        .set_last_updated(&repo_path, self.clock.now_millis())
                        .await?;
                }
                drop(lock);
                return self.read_handle(path).await;
            }
        }

        let downloaded = transport.fetch(path).await?;
        let published = match checksum_policy {
            ChecksumPolicy::Ignore => None,
            _ => self.published_sha256(transport, path).await,
        };
        if let Some(expected) = &published {
            let actual = hex::encode(Sha256::digest(&downloaded.content));
            if *expected != actual {
                match checksum_policy {
                    ChecksumPolicy::Fail => {
                        return Err(DepotError::ChecksumMismatch {
                            path: repo_path,
                            expected: expected.clone(),
                            actual,
                        })
                    }
                    _ => warn!(
                        "Checksum mismatch for {}: remote published {}, content is {}",
                        repo_path, expected, actual
                    ),
                }
            }
        }

        let meta = PutMeta {
            last_modified: downloaded.meta.last_modified.or(Some(remote.last_modified)),
            ..Default::default()
        };
        let info = self.store.put(&repo_path, downloaded.content.clone(), meta).await?;
        info!("Cached {} ({} bytes)", repo_path, info.size);

        Ok(ResourceHandle {
            resource: info.to_file_resource(),
            content: downloaded.content,
            source: ContentSource::Cache,
        })
    }

    async fn published_sha256(&self, transport: &dyn RemoteTransport, path: &str) -> Option<String> {
        match transport.fetch_checksum(path, ChecksumType::Sha256).await {
            Ok(value) => value,
            Err(e) => {
                debug!("No published sha256 for {}: {}", path, e);
                None
            }
        }
    }
}
