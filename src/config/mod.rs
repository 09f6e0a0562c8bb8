//! Configuration management for depot

pub mod schema;

pub use schema::{
    ChecksumPolicy, Config, GeneralConfig, LayoutConfig, LocalRepoConfig, RemoteRepoConfig,
    RepoConfig, SnapshotVersionBehavior,
};

use crate::error::{DepotError, DepotResult};
use crate::layout::LayoutRegistry;
use crate::repo::PathPolicy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depot")
            .join("depot.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> DepotResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load and validate configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> DepotResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| DepotError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| DepotError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate().map_err(|e| DepotError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!(
            "Loaded {} local and {} remote repositories from {}",
            config.local_repos.len(),
            config.remote_repos.len(),
            path.display()
        );
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> DepotResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            DepotError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> DepotResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DepotError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Check everything that would otherwise fail while building repositories
    pub fn validate(&self) -> DepotResult<()> {
        match self.general.log_format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(DepotError::RepositoryConfig(format!(
                    "unknown log_format {:?} (expected \"text\" or \"json\")",
                    other
                )))
            }
        }

        let layouts = LayoutRegistry::from_config(&self.layouts)?;
        let mut keys = HashSet::new();

        let commons = self
            .local_repos
            .iter()
            .map(|r| &r.common)
            .chain(self.remote_repos.iter().map(|r| &r.common));
        for common in commons {
            if common.key.trim().is_empty() {
                return Err(DepotError::RepositoryConfig(
                    "repository key must not be empty".to_string(),
                ));
            }
            if common.key.contains('/') || common.key.contains(crate::repo_path::REPO_PATH_SEP) {
                return Err(DepotError::RepositoryConfig(format!(
                    "repository key {:?} must not contain '/' or ':'",
                    common.key
                )));
            }
            if !keys.insert(common.key.clone()) {
                return Err(DepotError::RepositoryConfig(format!(
                    "duplicate repository key {:?}",
                    common.key
                )));
            }
            layouts.get(&common.layout)?;
            PathPolicy::new(&common.includes_pattern, &common.excludes_pattern)?;
        }

        for remote in &self.remote_repos {
            if remote.url.trim().is_empty() {
                return Err(DepotError::RepositoryConfig(format!(
                    "remote repository {} has no url",
                    remote.common.key
                )));
            }
            if !keys.insert(remote.cache_key()) {
                return Err(DepotError::RepositoryConfig(format!(
                    "repository key {:?} collides with the cache of remote {}",
                    remote.cache_key(),
                    remote.common.key
                )));
            }
        }

        Ok(())
    }
}
