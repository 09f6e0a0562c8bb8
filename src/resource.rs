//! Resolution results
//!
//! A resolution attempt yields a `RepoResource`: found (with size,
//! timestamps and checksums), not found, or rejected by policy. Negative
//! outcomes are values, not errors.

use crate::repo_path::RepoPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Checksum algorithms known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    Sha1,
    Md5,
    Sha256,
}

impl ChecksumType {
    /// All checksum types, in fetch order
    pub fn all() -> &'static [Self] {
        &[Self::Sha1, Self::Md5, Self::Sha256]
    }

    /// File extension of the checksum sidecar, without the dot
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }

    /// Expected length of the hex digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    /// Detect a checksum sidecar path such as `a.jar.sha1`
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, ext) = path.rsplit_once('.')?;
        Self::all()
            .iter()
            .copied()
            .find(|ty| ty.ext().eq_ignore_ascii_case(ext))
    }

    /// Whether a hex value is plausible for this algorithm
    pub fn is_valid(&self, value: &str) -> bool {
        value.len() == self.hex_len() && value.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ext())
    }
}

/// Whether a path addresses a checksum sidecar file
pub fn is_checksum_path(path: &str) -> bool {
    ChecksumType::from_path(path).is_some()
}

/// Strip a checksum extension, returning the artifact path and checksum type
pub fn split_checksum_path(path: &str) -> Option<(&str, ChecksumType)> {
    let ty = ChecksumType::from_path(path)?;
    let artifact = &path[..path.len() - ty.ext().len() - 1];
    Some((artifact, ty))
}

/// Checksum values by algorithm
pub type Checksums = BTreeMap<ChecksumType, String>;

/// A resolved file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResource {
    pub path: RepoPath,
    pub size: i64,
    /// Modification time of the artifact itself
    pub last_modified: i64,
    /// When this copy was last fetched or revalidated
    pub last_updated: i64,
    pub checksums: Checksums,
}

impl FileResource {
    /// Whether this copy is older than the retrieval cache period
    pub fn is_expired(&self, now_millis: i64, period_secs: u64) -> bool {
        now_millis - self.last_updated > (period_secs as i64).saturating_mul(1000)
    }
}

/// Why a resource could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unfound {
    pub path: RepoPath,
    pub reason: String,
}

impl Unfound {
    pub fn new(path: RepoPath, reason: impl Into<String>) -> Self {
        Self {
            path,
            reason: reason.into(),
        }
    }
}

/// Outcome of a resolution attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RepoResource {
    Found(FileResource),
    /// Absent, offline, or remote failure
    NotFound(Unfound),
    /// Refused by repository policy or authorization
    Rejected(Unfound),
}

impl RepoResource {
    pub fn not_found(path: RepoPath, reason: impl Into<String>) -> Self {
        Self::NotFound(Unfound::new(path, reason))
    }

    pub fn rejected(path: RepoPath, reason: impl Into<String>) -> Self {
        Self::Rejected(Unfound::new(path, reason))
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn path(&self) -> &RepoPath {
        match self {
            Self::Found(res) => &res.path,
            Self::NotFound(unfound) | Self::Rejected(unfound) => &unfound.path,
        }
    }

    pub fn as_found(&self) -> Option<&FileResource> {
        match self {
            Self::Found(res) => Some(res),
            _ => None,
        }
    }

    pub fn into_found(self) -> Option<FileResource> {
        match self {
            Self::Found(res) => Some(res),
            _ => None,
        }
    }

    /// Reason text for negative outcomes
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Found(_) => None,
            Self::NotFound(unfound) | Self::Rejected(unfound) => Some(&unfound.reason),
        }
    }
}

/// Where streamed content was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    /// A hosted local repository
    Local,
    /// The local cache of a remote repository
    Cache,
    /// Straight from the remote, not stored
    Remote,
}

/// Resource content ready to be written to a client
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    pub resource: FileResource,
    pub content: Vec<u8>,
    pub source: ContentSource,
}
