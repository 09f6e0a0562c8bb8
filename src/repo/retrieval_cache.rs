//! Negative retrieval caches of a remote repository
//!
//! "failed" remembers transport errors, "missed" remembers confirmed
//! absence. Both store `Unfound`, so a found resource can never land here.
//! Entries expire independently after their own period; a period of zero
//! disables the cache.

use crate::clock::Clock;
use crate::config::schema::RemoteRepoConfig;
use crate::repo_path::is_sub_path;
use crate::resource::Unfound;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Expired entries are swept on insert once a map grows past this size
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
struct Entry {
    unfound: Unfound,
    cached_at: i64,
}

/// One expiring map of negative results, keyed by repository-relative path
pub struct RetrievalCache {
    name: &'static str,
    period_millis: i64,
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl RetrievalCache {
    pub fn new(name: &'static str, period_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            period_millis: (period_secs as i64).saturating_mul(1000),
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.period_millis > 0
    }

    /// Live entry for `path`; an expired entry is dropped and reported absent
    pub fn get(&self, path: &str) -> Option<Unfound> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now_millis();
        {
            let entries = self.entries.read();
            match entries.get(path) {
                None => return None,
                Some(entry) if now - entry.cached_at <= self.period_millis => {
                    return Some(entry.unfound.clone())
                }
                Some(_) => {}
            }
        }

        trace!("{} cache entry for {} expired", self.name, path);
        let mut entries = self.entries.write();
        if entries
            .get(path)
            .is_some_and(|entry| now - entry.cached_at > self.period_millis)
        {
            entries.remove(path);
        }
        None
    }

    pub fn put(&self, unfound: Unfound) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now_millis();
        let key = unfound.path.path().to_string();
        let entry = Entry {
            unfound,
            cached_at: now,
        };

        let mut entries = self.entries.write();
        if entries.len() > SWEEP_THRESHOLD {
            let before = entries.len();
            entries.retain(|_, entry| now - entry.cached_at <= self.period_millis);
            trace!("{} cache swept {} expired entries", self.name, before - entries.len());
        }
        entries.insert(key, entry);
    }

    /// Remove `path`, and everything below it when `include_sub_paths`.
    /// Returns the number of entries removed.
    pub fn remove(&self, path: &str, include_sub_paths: bool) -> usize {
        let mut entries = self.entries.write();
        if include_sub_paths {
            let before = entries.len();
            entries.retain(|key, _| !is_sub_path(key, path));
            before - entries.len()
        } else {
            usize::from(entries.remove(path).is_some())
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Entries held, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The failed/missed pair owned by one remote repository
pub struct RetrievalCaches {
    pub failed: RetrievalCache,
    pub missed: RetrievalCache,
}

impl RetrievalCaches {
    pub fn new(config: &RemoteRepoConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            failed: RetrievalCache::new(
                "failed",
                config.failed_retrieval_cache_period_secs,
                clock.clone(),
            ),
            missed: RetrievalCache::new("missed", config.missed_retrieval_cache_period_secs, clock),
        }
    }

    /// Live negative entry from either cache, "failed" first
    pub fn lookup(&self, path: &str) -> Option<(&'static str, Unfound)> {
        [&self.failed, &self.missed]
            .into_iter()
            .find_map(|cache| cache.get(path).map(|unfound| (cache.name(), unfound)))
    }

    pub fn remove(&self, path: &str, include_sub_paths: bool) -> usize {
        self.failed.remove(path, include_sub_paths) + self.missed.remove(path, include_sub_paths)
    }

    pub fn clear(&self) {
        self.failed.clear();
        self.missed.clear();
    }
}
