//! Repository-qualified paths
//!
//! A `RepoPath` is the addressing unit for everything the engine touches:
//! a repository key plus a relative path inside that repository.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the repository key and the path in display form
pub const REPO_PATH_SEP: char = ':';

/// Repository key + relative path.
///
/// The path never starts or ends with `/`; an empty path is the repository
/// root. Ordering is by repository key, then path, which is also the global
/// lock acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoPath {
    repo_key: String,
    path: String,
}

impl RepoPath {
    /// Create a path, normalizing slashes
    pub fn new(repo_key: impl Into<String>, path: impl AsRef<str>) -> Self {
        Self {
            repo_key: repo_key.into(),
            path: normalize(path.as_ref()),
        }
    }

    /// The root of a repository
    pub fn root(repo_key: impl Into<String>) -> Self {
        Self {
            repo_key: repo_key.into(),
            path: String::new(),
        }
    }

    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path segment (empty for the root)
    pub fn name(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Parent path, `None` for the repository root
    pub fn parent(&self) -> Option<RepoPath> {
        if self.is_root() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        };
        Some(Self {
            repo_key: self.repo_key.clone(),
            path: parent.to_string(),
        })
    }

    /// Child path with the given name (may itself contain slashes)
    pub fn child(&self, name: &str) -> RepoPath {
        let name = normalize(name);
        let path = if self.is_root() {
            name
        } else if name.is_empty() {
            self.path.clone()
        } else {
            format!("{}/{}", self.path, name)
        };
        Self {
            repo_key: self.repo_key.clone(),
            path,
        }
    }

    /// Same relative path in another repository
    pub fn with_repo(&self, repo_key: &str) -> RepoPath {
        Self {
            repo_key: repo_key.to_string(),
            path: self.path.clone(),
        }
    }

    /// Whether `self` is `ancestor` or lies below it in the same repository
    pub fn is_under(&self, ancestor: &RepoPath) -> bool {
        if self.repo_key != ancestor.repo_key {
            return false;
        }
        is_sub_path(&self.path, &ancestor.path)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.repo_key, REPO_PATH_SEP, self.path)
    }
}

/// Whether relative `path` equals `prefix` or lies below it
pub fn is_sub_path(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
