//! Move/copy report

use crate::error::DepotResult;
use crate::repo_path::RepoPath;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

/// One moved or copied file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedItem {
    pub from: RepoPath,
    pub to: RepoPath,
}

/// A warning or error about one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub path: RepoPath,
    pub message: String,
}

/// Outcome of one move/copy invocation
#[derive(Debug, Clone, Serialize)]
pub struct MoveStatus {
    /// Unique operation ID
    pub id: Uuid,

    pub copy: bool,

    pub dry_run: bool,

    pub started_at: DateTime<Utc>,

    /// Files moved, or that would be moved in a dry run
    pub moved: Vec<MovedItem>,

    /// Items skipped by policy or permissions
    pub warnings: Vec<StatusEntry>,

    /// Items that failed
    pub errors: Vec<StatusEntry>,
}

impl MoveStatus {
    pub fn new(copy: bool, dry_run: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            copy,
            dry_run,
            started_at: Utc::now(),
            moved: vec![],
            warnings: vec![],
            errors: vec![],
        }
    }

    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    pub fn add_moved(&mut self, from: RepoPath, to: RepoPath) {
        self.moved.push(MovedItem { from, to });
    }

    pub fn warn(&mut self, path: &RepoPath, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}: {}", self.id, path, message);
        self.warnings.push(StatusEntry {
            path: path.clone(),
            message,
        });
    }

    pub fn error(&mut self, path: &RepoPath, message: impl Into<String>) {
        let message = message.into();
        error!("[{}] {}: {}", self.id, path, message);
        self.errors.push(StatusEntry {
            path: path.clone(),
            message,
        });
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn to_json(&self) -> DepotResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_serializes() {
        let mut status = MoveStatus::new(false, true);
        status.add_moved(RepoPath::new("a", "x.jar"), RepoPath::new("b", "x.jar"));
        status.warn(&RepoPath::new("a", "y.jar"), "no delete permission");

        assert_eq!(status.moved_count(), 1);
        assert!(status.has_warnings());
        assert!(!status.has_errors());

        let json = status.to_json().unwrap();
        assert!(json.contains("\"dry_run\": true"));
        assert!(json.contains("no delete permission"));
    }
}
