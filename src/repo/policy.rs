//! Include/exclude path policy
//!
//! Patterns are comma-separated Ant-style globs (`org/acme/**`, `**/*.jar`).
//! `*` never crosses a `/`; a trailing `/` means "everything below".

use crate::error::{DepotError, DepotResult};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

#[derive(Debug, Clone)]
pub struct PathPolicy {
    includes: GlobSet,
    excludes: GlobSet,
}

impl PathPolicy {
    pub fn new(includes: &str, excludes: &str) -> DepotResult<Self> {
        Ok(Self {
            includes: build(includes)?,
            excludes: build(excludes)?,
        })
    }

    /// Everything allowed
    pub fn permissive() -> Self {
        Self {
            includes: GlobSet::empty(),
            excludes: GlobSet::empty(),
        }
    }

    /// Files must match an include (when any are configured) and no exclude
    pub fn accepts_file(&self, path: &str) -> bool {
        (self.includes.is_empty() || self.includes.is_match(path)) && !self.excludes.is_match(path)
    }

    /// Folders are only checked against excludes, since includes usually
    /// name files deeper down
    pub fn accepts_folder(&self, path: &str) -> bool {
        path.is_empty() || !self.excludes.is_match(path)
    }

    pub fn accepts(&self, path: &str, is_folder: bool) -> bool {
        if is_folder {
            self.accepts_folder(path)
        } else {
            self.accepts_file(path)
        }
    }
}

fn build(patterns: &str) -> DepotResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let pattern = if pattern.ends_with('/') {
            format!("{}**", pattern)
        } else {
            pattern.to_string()
        };
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| DepotError::InvalidPattern {
                pattern: pattern.clone(),
                reason: err.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|err| DepotError::InvalidPattern {
        pattern: patterns.to_string(),
        reason: err.to_string(),
    })
}
