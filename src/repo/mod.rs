//! Repositories
//!
//! A repository is either:
//! - `LocalRepo`: hosted content, or the cache of exactly one remote
//! - `RemoteRepo`: a proxied origin, owning an optional cache `LocalRepo`
//!
//! `RealRepo` is the tagged union the rest of the engine dispatches on.
//! Repository objects are built once per configuration and replaced
//! wholesale on reload.

mod local;
mod policy;
mod remote;
mod retrieval_cache;
mod service;

pub use local::LocalRepo;
pub use policy::PathPolicy;
pub use remote::RemoteRepo;
pub use retrieval_cache::{RetrievalCache, RetrievalCaches};
pub use service::{RepoSet, RepositoryService};

use crate::config::schema::{RepoConfig, SnapshotVersionBehavior};
use crate::error::DepotResult;
use crate::layout::{is_metadata_name, LayoutRegistry, RepoLayout, VersionKind};
use crate::repo_path::RepoPath;
use crate::resource::{Checksums, FileResource, RepoResource, ResourceHandle};
use std::sync::Arc;

/// Immutable policy of one repository
#[derive(Debug, Clone)]
pub struct RepoDescriptor {
    pub key: String,
    pub description: String,
    pub handle_releases: bool,
    pub handle_snapshots: bool,
    pub blacked_out: bool,
    pub snapshot_version_behavior: SnapshotVersionBehavior,
    pub layout: Arc<RepoLayout>,
    pub policy: PathPolicy,
}

impl RepoDescriptor {
    pub fn from_config(config: &RepoConfig, layouts: &LayoutRegistry) -> DepotResult<Self> {
        Ok(Self {
            key: config.key.clone(),
            description: config.description.clone(),
            handle_releases: config.handle_releases,
            handle_snapshots: config.handle_snapshots,
            blacked_out: config.blacked_out,
            snapshot_version_behavior: config.snapshot_version_behavior,
            layout: layouts.get(&config.layout)?,
            policy: PathPolicy::new(&config.includes_pattern, &config.excludes_pattern)?,
        })
    }

    /// Copy of this descriptor under another key (cache repositories)
    pub fn with_key(&self, key: String) -> Self {
        Self {
            key,
            ..self.clone()
        }
    }

    /// Release/snapshot handling for a file path
    pub fn handles_file(&self, path: &str) -> bool {
        match self.layout.version_kind(path) {
            VersionKind::Integration => self.handle_snapshots,
            VersionKind::Release => self.handle_releases,
            VersionKind::Unknown => {
                let name = path.rsplit('/').next().unwrap_or(path);
                is_metadata_name(name) || self.handle_releases
            }
        }
    }

    /// Release/snapshot handling for a folder: only integration version
    /// folders can be refused
    pub fn handles_folder(&self, path: &str) -> bool {
        match self.layout.folder_kind(path) {
            VersionKind::Integration => self.handle_snapshots,
            _ => true,
        }
    }

    pub fn handles(&self, path: &str, is_folder: bool) -> bool {
        if is_folder {
            self.handles_folder(path)
        } else {
            self.handles_file(path)
        }
    }

    pub fn accepts(&self, path: &str, is_folder: bool) -> bool {
        self.policy.accepts(path, is_folder)
    }

    /// Blackout, handling and include/exclude checks, with the refusal reason
    pub fn check(&self, path: &str, is_folder: bool) -> Result<(), String> {
        if self.blacked_out {
            return Err(format!("repository {} is blacked out", self.key));
        }
        if !self.handles(path, is_folder) {
            let what = if is_folder || self.layout.version_kind(path) == VersionKind::Integration {
                "snapshots"
            } else {
                "releases"
            };
            return Err(format!("repository {} does not handle {}", self.key, what));
        }
        if !self.accepts(path, is_folder) {
            return Err(format!(
                "{} rejected by the include/exclude patterns of {}",
                path, self.key
            ));
        }
        Ok(())
    }
}

/// A configured repository
#[derive(Clone)]
pub enum RealRepo {
    Local(Arc<LocalRepo>),
    Remote(Arc<RemoteRepo>),
}

impl RealRepo {
    pub fn key(&self) -> &str {
        &self.descriptor().key
    }

    pub fn descriptor(&self) -> &RepoDescriptor {
        match self {
            Self::Local(repo) => repo.descriptor(),
            Self::Remote(repo) => repo.descriptor(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Local cache of a remote repository
    pub fn is_cache(&self) -> bool {
        matches!(self, Self::Local(repo) if repo.is_cache())
    }

    pub fn as_local(&self) -> Option<&Arc<LocalRepo>> {
        match self {
            Self::Local(repo) => Some(repo),
            Self::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&Arc<RemoteRepo>> {
        match self {
            Self::Remote(repo) => Some(repo),
            Self::Local(_) => None,
        }
    }

    /// The repository that physically stores this repository's items
    pub fn storing_repo(&self) -> Option<&Arc<LocalRepo>> {
        match self {
            Self::Local(repo) => Some(repo),
            Self::Remote(repo) => repo.cache_repo(),
        }
    }

    /// Resolve `path`, see `LocalRepo::get_info` and `RemoteRepo::get_info`
    pub async fn get_info(&self, path: &RepoPath) -> DepotResult<RepoResource> {
        match self {
            Self::Local(repo) => repo.get_info(path.path()).await,
            Self::Remote(repo) => repo.get_info(path.path()).await,
        }
    }

    pub async fn get_resource_stream(&self, resource: &FileResource) -> DepotResult<ResourceHandle> {
        match self {
            Self::Local(repo) => repo.read_handle(resource.path.path()).await,
            Self::Remote(repo) => repo.get_resource_stream(resource).await,
        }
    }

    pub async fn get_checksums(&self, path: &RepoPath) -> DepotResult<Checksums> {
        match self {
            Self::Local(repo) => repo.get_checksums(path.path()).await,
            Self::Remote(repo) => repo.get_checksums(path.path()).await,
        }
    }
}
