//! Error types for depot
//!
//! All modules use `DepotResult<T>` as their return type. Ordinary negative
//! lookups are not errors: they come back as `RepoResource::NotFound` or
//! `RepoResource::Rejected`.

use crate::remote::RemoteError;
use crate::repo_path::RepoPath;
use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for depot operations
pub type DepotResult<T> = Result<T, DepotError>;

/// All errors that can occur in depot
#[derive(Error, Debug)]
pub enum DepotError {
    // Repository lookup errors
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(RepoPath),

    #[error("Repository {0} is not a cache repository")]
    NotCacheRepository(String),

    #[error("Expected a file but found a folder: {0}")]
    FileExpected(RepoPath),

    #[error("Expected a folder but found a file: {0}")]
    FolderExpected(RepoPath),

    // Move/copy preconditions
    #[error("Cannot move or copy within the same repository: {key}")]
    SameRepository { key: String },

    #[error("Invalid move/copy target {key}: {reason}")]
    InvalidMoveTarget { key: String, reason: String },

    #[error("Mutation attempted during dry run: {0}")]
    DryRunMutation(String),

    // Remote errors
    #[error("Remote repository {repo} failed (hard fail): {source}")]
    RemoteHardFail {
        repo: String,
        #[source]
        source: RemoteError,
    },

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Checksum mismatch for {path}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        path: RepoPath,
        expected: String,
        actual: String,
    },

    // Backing store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid repository configuration: {0}")]
    RepositoryConfig(String),

    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown repository layout: {0}")]
    UnknownLayout(String),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DepotError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteHardFail { source, .. } | Self::Remote(source) => source.is_transient(),
            Self::Store(StoreError::Io { .. }) => true,
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::SameRepository { .. } => Some("Choose a different target repository"),
            Self::InvalidMoveTarget { .. } => {
                Some("Move or copy into a local repository, not a remote cache")
            }
            Self::RemoteHardFail { .. } => {
                Some("Disable hard_fail on the remote repository to degrade to not-found")
            }
            Self::UnknownLayout(_) => {
                Some("Use a built-in layout (maven-2-default, ivy-default, gradle-default) or declare it under [[layouts]]")
            }
            _ => None,
        }
    }
}
