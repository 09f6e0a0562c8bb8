//! Shared fixtures: an in-memory origin, a manual clock and a service wired
//! to both

use async_trait::async_trait;
use depot::clock::{Clock, ManualClock};
use depot::config::{Config, LocalRepoConfig, RemoteRepoConfig};
use depot::remote::{RemoteContent, RemoteError, RemoteMeta, RemoteTransport, TransportFactory};
use depot::security::{AllowAll, Authorizer};
use depot::store::{ContentStore, MemoryStore, PutMeta};
use depot::{DepotResult, RepoPath, RepositoryService};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const START_MILLIS: i64 = 1_700_000_000_000;

/// Origin that serves a fixed set of files and counts probes
#[derive(Default)]
pub struct FakeOrigin {
    files: Mutex<HashMap<String, (Vec<u8>, i64)>>,
    down: AtomicBool,
    probes: AtomicUsize,
}

impl FakeOrigin {
    pub fn serve(&self, path: &str, content: &[u8], last_modified: i64) {
        self.files
            .lock()
            .insert(path.to_string(), (content.to_vec(), last_modified));
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTransport for FakeOrigin {
    async fn probe(&self, path: &str) -> Result<Option<RemoteMeta>, RemoteError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(RemoteError::Connection("connection refused".to_string()));
        }
        Ok(self.files.lock().get(path).map(|(content, last_modified)| RemoteMeta {
            size: content.len() as i64,
            last_modified: Some(*last_modified),
        }))
    }

    async fn fetch(&self, path: &str) -> Result<RemoteContent, RemoteError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RemoteError::Connection("connection refused".to_string()));
        }
        let files = self.files.lock();
        let (content, last_modified) = files
            .get(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        Ok(RemoteContent {
            meta: RemoteMeta {
                size: content.len() as i64,
                last_modified: Some(*last_modified),
            },
            content: content.clone(),
        })
    }
}

/// Hands the same origin to every remote repository
pub struct FakeFactory(pub Arc<FakeOrigin>);

impl TransportFactory for FakeFactory {
    fn create(&self, _config: &RemoteRepoConfig) -> DepotResult<Arc<dyn RemoteTransport>> {
        Ok(self.0.clone() as Arc<dyn RemoteTransport>)
    }
}

pub fn local(key: &str) -> LocalRepoConfig {
    let mut local = LocalRepoConfig::default();
    local.common.key = key.to_string();
    local
}

pub fn remote(key: &str) -> RemoteRepoConfig {
    let mut remote = RemoteRepoConfig {
        url: format!("https://{}.example.com/maven2", key),
        retrieval_cache_period_secs: 3600,
        failed_retrieval_cache_period_secs: 30,
        missed_retrieval_cache_period_secs: 60,
        ..Default::default()
    };
    remote.common.key = key.to_string();
    remote
}

/// Two hosted repositories and one proxied origin
pub fn config() -> Config {
    let mut config = Config::default();
    config.local_repos.push(local("libs-release"));
    config.local_repos.push(local("libs-other"));
    config.remote_repos.push(remote("central"));
    config
}

pub struct Harness {
    pub service: RepositoryService,
    pub store: Arc<MemoryStore>,
    pub origin: Arc<FakeOrigin>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: &Config) -> Self {
        Self::with_authorizer(config, Arc::new(AllowAll))
    }

    pub fn with_authorizer(config: &Config, authorizer: Arc<dyn Authorizer>) -> Self {
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let origin = Arc::new(FakeOrigin::default());
        let service = RepositoryService::new(
            config,
            store.clone(),
            Arc::new(FakeFactory(origin.clone())),
            authorizer,
            clock.clone(),
        )
        .unwrap();
        Self {
            service,
            store,
            origin,
            clock,
        }
    }

    pub fn clock_now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub async fn put(&self, repo: &str, path: &str, content: &[u8]) {
        self.store
            .put(&RepoPath::new(repo, path), content.to_vec(), PutMeta::default())
            .await
            .unwrap();
    }

    pub async fn read(&self, repo: &str, path: &str) -> Option<Vec<u8>> {
        let path = RepoPath::new(repo, path);
        if !self.store.exists(&path).await.unwrap() {
            return None;
        }
        Some(self.store.read(&path).await.unwrap())
    }
}
