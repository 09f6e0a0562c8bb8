//! Remote origin transport
//!
//! Provides a trait for talking to the upstream of a remote repository:
//! - `HttpTransport`: plain HTTP(S) origins via `ureq`
//! - test doubles and alternative protocols implement the same trait
//!
//! Transports never cache; caching and failure policy live in `RemoteRepo`.

mod http;

pub use http::{HttpTransport, HttpTransportFactory};

use crate::config::schema::RemoteRepoConfig;
use crate::error::DepotResult;
use crate::resource::ChecksumType;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Transport-level failures
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("not found on remote: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Timeout-class failures are logged tersely
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::Transport(_) => false,
        }
    }
}

/// Metadata reported by the origin for an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMeta {
    /// Content length, -1 when the origin did not say
    pub size: i64,
    pub last_modified: Option<i64>,
}

/// Downloaded file
#[derive(Debug, Clone)]
pub struct RemoteContent {
    pub meta: RemoteMeta,
    pub content: Vec<u8>,
}

/// Access to one remote origin
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Existence/metadata probe. `Ok(None)` means the origin confirmed absence.
    async fn probe(&self, path: &str) -> Result<Option<RemoteMeta>, RemoteError>;

    /// Download a file. Absence is `RemoteError::NotFound`.
    async fn fetch(&self, path: &str) -> Result<RemoteContent, RemoteError>;

    /// Fetch the published checksum of `path`, `Ok(None)` when there is none
    async fn fetch_checksum(
        &self,
        path: &str,
        checksum_type: ChecksumType,
    ) -> Result<Option<String>, RemoteError> {
        let sidecar = format!("{}.{}", path, checksum_type.ext());
        match self.fetch(&sidecar).await {
            Ok(content) => Ok(parse_checksum(&content.content, checksum_type)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Builds the transport for a configured remote repository
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &RemoteRepoConfig) -> DepotResult<Arc<dyn RemoteTransport>>;
}

/// Extract a checksum value from a sidecar file body.
///
/// Sidecars are either the bare digest or `digest  filename` as written by
/// the `*sum` tools.
pub fn parse_checksum(body: &[u8], checksum_type: ChecksumType) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let value = text.split_whitespace().next()?.to_ascii_lowercase();
    checksum_type.is_valid(&value).then_some(value)
}
