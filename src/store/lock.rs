//! Per-path async locks
//!
//! Guards release on drop, so every exit path (including `?` returns and
//! panics) unlocks.

use crate::repo_path::RepoPath;
use crate::store::{ContentStore, StoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

/// Idle lock entries are pruned once the table grows past this size
const PRUNE_THRESHOLD: usize = 1024;

/// Lock flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
enum Guard {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

/// A held lock on one path
#[derive(Debug)]
pub struct PathLock {
    path: RepoPath,
    guard: Guard,
}

impl PathLock {
    pub fn path(&self) -> &RepoPath {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        match self.guard {
            Guard::Shared(_) => LockMode::Shared,
            Guard::Exclusive(_) => LockMode::Exclusive,
        }
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        trace!("Released {:?} lock on {}", self.mode(), self.path);
    }
}

/// Table of per-path reader/writer locks for store implementations
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<RepoPath, Arc<RwLock<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock on `path`
    pub async fn acquire(&self, path: &RepoPath, mode: LockMode) -> PathLock {
        let lock = {
            let mut locks = self.locks.lock();
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(path.clone()).or_default().clone()
        };

        let guard = match mode {
            LockMode::Shared => Guard::Shared(lock.read_owned().await),
            LockMode::Exclusive => Guard::Exclusive(lock.write_owned().await),
        };
        trace!("Acquired {:?} lock on {}", mode, path);

        PathLock {
            path: path.clone(),
            guard,
        }
    }

    /// Number of tracked paths (held or idle)
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock several paths in the global `(repo_key, path)` order.
///
/// Two operations locking overlapping path sets always acquire them in the
/// same sequence, so they cannot deadlock on each other. Duplicates are
/// locked once.
pub async fn lock_ordered(
    store: &dyn ContentStore,
    paths: &[&RepoPath],
    mode: LockMode,
) -> StoreResult<Vec<PathLock>> {
    let mut ordered: Vec<&RepoPath> = paths.to_vec();
    ordered.sort();
    ordered.dedup();

    let mut held = Vec::with_capacity(ordered.len());
    for path in ordered {
        held.push(store.lock(path, mode).await?);
    }
    Ok(held)
}
