//! In-memory content store
//!
//! Keeps the whole tree in a sorted map keyed by `(repo_key, path)`, so a
//! subtree is a contiguous key range. Used by tests and by hosts that want
//! a throwaway store.

use crate::clock::{Clock, SystemClock};
use crate::repo_path::RepoPath;
use crate::resource::ChecksumType;
use crate::store::{
    ContentStore, FolderMeta, ItemInfo, ItemKind, LockMode, LockTable, PathLock, Properties,
    PutMeta, StoreError, StoreResult,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

type Key = (String, String);

#[derive(Debug, Clone)]
struct Node {
    info: ItemInfo,
    content: Vec<u8>,
}

/// Content store held entirely in memory
pub struct MemoryStore {
    nodes: RwLock<BTreeMap<Key, Node>>,
    locks: LockTable,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            locks: LockTable::new(),
            clock,
        }
    }

    /// Total number of items across all repositories
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable dump of every item and its content, for before/after comparisons
    pub fn snapshot(&self) -> Vec<(RepoPath, ItemKind, Vec<u8>)> {
        self.nodes
            .read()
            .values()
            .map(|node| (node.info.path.clone(), node.info.kind, node.content.clone()))
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key(path: &RepoPath) -> Key {
    (path.repo_key().to_string(), path.path().to_string())
}

fn root_info(path: &RepoPath) -> ItemInfo {
    folder_info(path.clone(), 0, FolderMeta::default())
}

fn folder_info(path: RepoPath, now: i64, meta: FolderMeta) -> ItemInfo {
    ItemInfo {
        path,
        kind: ItemKind::Folder,
        size: 0,
        created: now,
        last_modified: now,
        last_updated: now,
        checksums: Default::default(),
        properties: meta.properties,
        metadata: meta.metadata,
    }
}

fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Keys of `path` and everything below it
fn subtree_keys(nodes: &BTreeMap<Key, Node>, path: &RepoPath) -> Vec<Key> {
    let repo = path.repo_key().to_string();
    if path.is_root() {
        return nodes
            .range((repo.clone(), String::new())..)
            .take_while(|((r, _), _)| *r == repo)
            .map(|(k, _)| k.clone())
            .collect();
    }

    let mut keys = Vec::new();
    if nodes.contains_key(&key(path)) {
        keys.push(key(path));
    }
    let prefix = format!("{}/", path.path());
    keys.extend(
        nodes
            .range((repo.clone(), prefix.clone())..)
            .take_while(|((r, p), _)| *r == repo && p.starts_with(&prefix))
            .map(|(k, _)| k.clone()),
    );
    keys
}

/// Create missing ancestor folders of `path`
fn ensure_parents(nodes: &mut BTreeMap<Key, Node>, path: &RepoPath, now: i64) -> StoreResult<()> {
    let mut ancestors = Vec::new();
    let mut current = path.parent();
    while let Some(parent) = current {
        if parent.is_root() {
            break;
        }
        current = parent.parent();
        ancestors.push(parent);
    }

    for ancestor in ancestors.into_iter().rev() {
        match nodes.get(&key(&ancestor)) {
            Some(node) if node.info.is_file() => return Err(StoreError::NotAFolder(ancestor)),
            Some(_) => {}
            None => {
                nodes.insert(
                    key(&ancestor),
                    Node {
                        info: folder_info(ancestor, now, FolderMeta::default()),
                        content: Vec::new(),
                    },
                );
            }
        }
    }
    Ok(())
}

/// Re-root the subtree at `src` under `dst`, removing the source when `remove_source`
fn transfer(
    nodes: &mut BTreeMap<Key, Node>,
    src: &RepoPath,
    dst: &RepoPath,
    remove_source: bool,
    now: i64,
) -> StoreResult<()> {
    if src.is_root() || dst.is_root() {
        return Err(StoreError::Backend(format!(
            "cannot transfer repository root {} -> {}",
            src, dst
        )));
    }
    if !nodes.contains_key(&key(src)) {
        return Err(StoreError::NotFound(src.clone()));
    }
    if nodes.contains_key(&key(dst)) {
        return Err(StoreError::AlreadyExists(dst.clone()));
    }
    if dst.is_under(src) {
        return Err(StoreError::Backend(format!("cannot move {} into itself", src)));
    }
    ensure_parents(nodes, dst, now)?;

    let src_prefix_len = src.path().len();
    for k in subtree_keys(nodes, src) {
        let node = if remove_source {
            nodes.remove(&k)
        } else {
            nodes.get(&k).cloned()
        };
        let Some(mut node) = node else { continue };

        let relative = &k.1[src_prefix_len..];
        let new_path = RepoPath::new(dst.repo_key(), format!("{}{}", dst.path(), relative));
        node.info.path = new_path.clone();
        if !remove_source {
            node.info.created = now;
        }
        nodes.insert(key(&new_path), node);
    }
    Ok(())
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_info(&self, path: &RepoPath) -> StoreResult<Option<ItemInfo>> {
        if path.is_root() {
            return Ok(Some(root_info(path)));
        }
        Ok(self.nodes.read().get(&key(path)).map(|node| node.info.clone()))
    }

    async fn read(&self, path: &RepoPath) -> StoreResult<Vec<u8>> {
        let nodes = self.nodes.read();
        let node = nodes
            .get(&key(path))
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        if node.info.is_folder() {
            return Err(StoreError::NotAFile(path.clone()));
        }
        Ok(node.content.clone())
    }

    async fn put(&self, path: &RepoPath, content: Vec<u8>, meta: PutMeta) -> StoreResult<ItemInfo> {
        if path.is_root() {
            return Err(StoreError::NotAFile(path.clone()));
        }
        let now = self.clock.now_millis();
        let mut nodes = self.nodes.write();

        let created = match nodes.get(&key(path)) {
            Some(existing) if existing.info.is_folder() => {
                return Err(StoreError::NotAFile(path.clone()))
            }
            Some(existing) => existing.info.created,
            None => now,
        };
        ensure_parents(&mut nodes, path, now)?;

        let mut checksums = meta.checksums;
        checksums.insert(ChecksumType::Sha256, sha256_hex(&content));

        let info = ItemInfo {
            path: path.clone(),
            kind: ItemKind::File,
            size: content.len() as i64,
            created,
            last_modified: meta.last_modified.unwrap_or(now),
            last_updated: now,
            checksums,
            properties: meta.properties,
            metadata: BTreeMap::new(),
        };
        nodes.insert(
            key(path),
            Node {
                info: info.clone(),
                content,
            },
        );
        Ok(info)
    }

    async fn create_folder(&self, path: &RepoPath, meta: FolderMeta) -> StoreResult<ItemInfo> {
        if path.is_root() {
            return Ok(root_info(path));
        }
        let now = self.clock.now_millis();
        let mut nodes = self.nodes.write();

        if let Some(existing) = nodes.get(&key(path)) {
            if existing.info.is_file() {
                return Err(StoreError::NotAFolder(path.clone()));
            }
            return Ok(existing.info.clone());
        }
        ensure_parents(&mut nodes, path, now)?;

        let info = folder_info(path.clone(), now, meta);
        nodes.insert(
            key(path),
            Node {
                info: info.clone(),
                content: Vec::new(),
            },
        );
        Ok(info)
    }

    async fn move_item(&self, src: &RepoPath, dst: &RepoPath) -> StoreResult<()> {
        let now = self.clock.now_millis();
        transfer(&mut self.nodes.write(), src, dst, true, now)
    }

    async fn copy_item(&self, src: &RepoPath, dst: &RepoPath) -> StoreResult<()> {
        let now = self.clock.now_millis();
        transfer(&mut self.nodes.write(), src, dst, false, now)
    }

    async fn delete(&self, path: &RepoPath) -> StoreResult<bool> {
        let mut nodes = self.nodes.write();
        let keys = subtree_keys(&nodes, path);
        for k in &keys {
            nodes.remove(k);
        }
        Ok(!keys.is_empty())
    }

    async fn list_children(&self, path: &RepoPath) -> StoreResult<Vec<ItemInfo>> {
        let nodes = self.nodes.read();
        if !path.is_root() {
            match nodes.get(&key(path)) {
                None => return Err(StoreError::NotFound(path.clone())),
                Some(node) if node.info.is_file() => {
                    return Err(StoreError::NotAFolder(path.clone()))
                }
                Some(_) => {}
            }
        }

        let prefix = if path.is_root() {
            String::new()
        } else {
            format!("{}/", path.path())
        };
        let repo = path.repo_key().to_string();
        Ok(nodes
            .range((repo.clone(), prefix.clone())..)
            .take_while(|((r, p), _)| *r == repo && p.starts_with(&prefix))
            .filter(|((_, p), _)| !p.is_empty() && !p[prefix.len()..].contains('/'))
            .map(|(_, node)| node.info.clone())
            .collect())
    }

    async fn set_last_updated(&self, path: &RepoPath, millis: i64) -> StoreResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&key(path))
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        node.info.last_updated = millis;
        Ok(())
    }

    async fn lock(&self, path: &RepoPath, mode: LockMode) -> StoreResult<PathLock> {
        Ok(self.locks.acquire(path, mode).await)
    }
}

/// Convenience for building properties in tests and hosts
pub fn properties<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Properties {
    let mut props = Properties::new();
    for (k, v) in pairs {
        props.entry(k.to_string()).or_default().insert(v.to_string());
    }
    props
}
