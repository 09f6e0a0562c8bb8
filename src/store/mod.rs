//! Backing content store abstraction
//!
//! The engine never owns artifact bytes itself. It talks to a hierarchical,
//! lockable store through the `ContentStore` trait:
//! - `MemoryStore`: in-process reference implementation
//! - anything else the host plugs in (database, object store, filesystem)
//!
//! Stores must support atomic rename of a single item and per-path
//! shared/exclusive locking via `lock`.

mod lock;
mod memory;

pub use lock::{lock_ordered, LockMode, LockTable, PathLock};
pub use memory::{properties, MemoryStore};

use crate::repo_path::RepoPath;
use crate::resource::{Checksums, FileResource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Multi-valued item properties
pub type Properties = BTreeMap<String, BTreeSet<String>>;

/// Errors reported by a backing store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No such item: {0}")]
    NotFound(RepoPath),

    #[error("Item already exists: {0}")]
    AlreadyExists(RepoPath),

    #[error("Not a folder: {0}")]
    NotAFolder(RepoPath),

    #[error("Not a file: {0}")]
    NotAFile(RepoPath),

    #[error("Store IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// File or folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

/// Stored item metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub path: RepoPath,
    pub kind: ItemKind,
    /// Content length in bytes (0 for folders)
    pub size: i64,
    pub created: i64,
    pub last_modified: i64,
    pub last_updated: i64,
    pub checksums: Checksums,
    pub properties: Properties,
    /// Named metadata documents attached to the item
    pub metadata: BTreeMap<String, String>,
}

impl ItemInfo {
    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    /// View of a file item as a resolution result
    pub fn to_file_resource(&self) -> FileResource {
        FileResource {
            path: self.path.clone(),
            size: self.size,
            last_modified: self.last_modified,
            last_updated: self.last_updated,
            checksums: self.checksums.clone(),
        }
    }
}

/// Attributes supplied when writing a file
#[derive(Debug, Clone, Default)]
pub struct PutMeta {
    /// Artifact modification time; the store's clock is used when absent
    pub last_modified: Option<i64>,
    /// Checksums published by the origin, kept alongside computed ones
    pub checksums: Checksums,
    pub properties: Properties,
}

/// Attributes supplied when creating a folder
#[derive(Debug, Clone, Default)]
pub struct FolderMeta {
    pub properties: Properties,
    pub metadata: BTreeMap<String, String>,
}

/// Filter for `ContentStore::browse`
#[derive(Debug, Clone, Copy)]
pub struct BrowseCriteria {
    /// Levels below the browse root to descend (1 = direct children)
    pub max_depth: usize,
    pub files_only: bool,
}

impl Default for BrowseCriteria {
    fn default() -> Self {
        Self {
            max_depth: usize::MAX,
            files_only: false,
        }
    }
}

/// Hierarchical, lockable content store
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Item metadata, `None` if nothing exists at `path`
    async fn get_info(&self, path: &RepoPath) -> StoreResult<Option<ItemInfo>>;

    /// Read file content
    async fn read(&self, path: &RepoPath) -> StoreResult<Vec<u8>>;

    /// Create or overwrite a file, creating missing parent folders
    async fn put(&self, path: &RepoPath, content: Vec<u8>, meta: PutMeta) -> StoreResult<ItemInfo>;

    /// Create a folder and its parents; an existing folder is returned as-is
    async fn create_folder(&self, path: &RepoPath, meta: FolderMeta) -> StoreResult<ItemInfo>;

    /// Atomically rename `src` to `dst`; `dst` must not exist
    async fn move_item(&self, src: &RepoPath, dst: &RepoPath) -> StoreResult<()>;

    /// Copy `src` to `dst`; `dst` must not exist
    async fn copy_item(&self, src: &RepoPath, dst: &RepoPath) -> StoreResult<()>;

    /// Permanently delete an item and everything below it.
    /// Returns whether anything was deleted.
    async fn delete(&self, path: &RepoPath) -> StoreResult<bool>;

    /// Direct children of a folder
    async fn list_children(&self, path: &RepoPath) -> StoreResult<Vec<ItemInfo>>;

    /// Update the "last updated" timestamp of a file
    async fn set_last_updated(&self, path: &RepoPath, millis: i64) -> StoreResult<()>;

    /// Acquire a per-path lock, released when the guard is dropped
    async fn lock(&self, path: &RepoPath, mode: LockMode) -> StoreResult<PathLock>;

    async fn exists(&self, path: &RepoPath) -> StoreResult<bool> {
        Ok(self.get_info(path).await?.is_some())
    }

    /// Walk the tree below `root` breadth-first
    async fn browse(&self, root: &RepoPath, criteria: BrowseCriteria) -> StoreResult<Vec<ItemInfo>> {
        let mut found = Vec::new();
        let mut frontier = vec![root.clone()];
        let mut depth = 0;

        while !frontier.is_empty() && depth < criteria.max_depth {
            let mut next = Vec::new();
            for folder in frontier {
                for child in self.list_children(&folder).await? {
                    if child.is_folder() {
                        next.push(child.path.clone());
                        if criteria.files_only {
                            continue;
                        }
                    }
                    found.push(child);
                }
            }
            frontier = next;
            depth += 1;
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_info_to_file_resource() {
        let info = ItemInfo {
            path: RepoPath::new("libs", "a.jar"),
            kind: ItemKind::File,
            size: 12,
            created: 1,
            last_modified: 2,
            last_updated: 3,
            checksums: Checksums::new(),
            properties: Properties::new(),
            metadata: BTreeMap::new(),
        };
        let res = info.to_file_resource();
        assert_eq!(res.size, 12);
        assert_eq!(res.last_modified, 2);
        assert_eq!(res.last_updated, 3);
        assert!(info.is_file());
    }
}
