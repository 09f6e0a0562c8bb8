//! Configuration schema for depot
//!
//! Configuration is stored at `~/.config/depot/depot.toml`

use serde::{Deserialize, Serialize};

/// Suffix appended to a remote repository key to name its local cache
pub const CACHE_REPO_SUFFIX: &str = "-cache";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Custom repository layouts (in addition to the built-ins)
    pub layouts: Vec<LayoutConfig>,

    /// Hosted repositories
    #[serde(rename = "local")]
    pub local_repos: Vec<LocalRepoConfig>,

    /// Proxied repositories
    #[serde(rename = "remote")]
    pub remote_repos: Vec<RemoteRepoConfig>,
}

/// General engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Default log level when RUST_LOG is not set
    pub log_level: String,

    /// Global offline mode: no remote repository is contacted
    pub offline: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            log_level: "info".to_string(),
            offline: false,
        }
    }
}

/// Custom layout definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub name: String,

    /// Token pattern for artifact paths, e.g.
    /// `[orgPath]/[module]/[baseRev](-[folderItegRev])/[module]-[baseRev](-[fileItegRev])(-[classifier]).[ext]`
    pub artifact_path_pattern: String,

    /// Token pattern for descriptor paths when they differ from artifacts
    pub descriptor_path_pattern: Option<String>,

    /// Regex for the folder integration revision token
    pub folder_integration_revision_regexp: String,

    /// Regex for the file integration revision token
    pub file_integration_revision_regexp: String,
}

/// How snapshot/integration versions are named and resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotVersionBehavior {
    /// Timestamped file names; latest picked by version ordering
    #[default]
    Unique,
    /// One shared file name per snapshot
    NonUnique,
    /// Keep what the deployer sent; latest picked by last-modified time
    Deployer,
}

/// What to do when a downloaded file does not match its published checksum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Reject the download
    Fail,
    /// Keep the download and log a warning
    #[default]
    Warn,
    /// Do not verify
    Ignore,
}

/// Settings shared by every repository type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Unique repository key
    pub key: String,

    pub description: String,

    /// Layout name (built-in or from `[[layouts]]`)
    pub layout: String,

    pub handle_releases: bool,

    pub handle_snapshots: bool,

    /// Makes every path of the repository unavailable
    pub blacked_out: bool,

    /// Unique snapshots to keep per version (0 = unlimited). Not enforced
    /// here; snapshot cleanup belongs to the embedding host.
    pub max_unique_snapshots: u32,

    /// Comma-separated Ant-style include globs
    pub includes_pattern: String,

    /// Comma-separated Ant-style exclude globs
    pub excludes_pattern: String,

    pub snapshot_version_behavior: SnapshotVersionBehavior,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            description: String::new(),
            layout: "maven-2-default".to_string(),
            handle_releases: true,
            handle_snapshots: true,
            blacked_out: false,
            max_unique_snapshots: 0,
            includes_pattern: "**/*".to_string(),
            excludes_pattern: String::new(),
            snapshot_version_behavior: SnapshotVersionBehavior::default(),
        }
    }
}

/// Hosted repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalRepoConfig {
    #[serde(flatten)]
    pub common: RepoConfig,
}

/// Proxied repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRepoConfig {
    #[serde(flatten)]
    pub common: RepoConfig,

    /// Origin base URL
    pub url: String,

    /// Never contact the origin
    pub offline: bool,

    /// Abort resolution on transport errors instead of degrading to not-found
    pub hard_fail: bool,

    /// Keep downloaded artifacts in the local cache repository
    pub store_artifacts_locally: bool,

    /// Age after which cached expirable items are revalidated
    pub retrieval_cache_period_secs: u64,

    /// How long transport failures are remembered (0 = not at all)
    pub failed_retrieval_cache_period_secs: u64,

    /// How long confirmed absences are remembered (0 = not at all)
    pub missed_retrieval_cache_period_secs: u64,

    /// Socket read timeout for the origin
    pub socket_timeout_ms: u64,

    pub checksum_policy: ChecksumPolicy,
}

impl Default for RemoteRepoConfig {
    fn default() -> Self {
        Self {
            common: RepoConfig::default(),
            url: String::new(),
            offline: false,
            hard_fail: false,
            store_artifacts_locally: true,
            retrieval_cache_period_secs: 7200,
            failed_retrieval_cache_period_secs: 30,
            missed_retrieval_cache_period_secs: 7200,
            socket_timeout_ms: 15_000,
            checksum_policy: ChecksumPolicy::default(),
        }
    }
}

impl RemoteRepoConfig {
    /// Key of the local cache repository owned by this remote
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.common.key, CACHE_REPO_SUFFIX)
    }
}
