//! Authorization seam
//!
//! The engine only asks yes/no questions per path and action. Hosts with a
//! real security service implement `Authorizer`; `PermissionTable` covers
//! simple rule-based setups.

use crate::repo_path::{is_sub_path, RepoPath};
use std::fmt;

/// Actions the engine asks permission for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Deploy,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Deploy => "deploy",
            Self::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a download permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    Denied(String),
}

impl AccessStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Per-path permission decisions
pub trait Authorizer: Send + Sync {
    fn is_permitted(&self, path: &RepoPath, action: Action) -> bool;

    fn can_read(&self, path: &RepoPath) -> bool {
        self.is_permitted(path, Action::Read)
    }

    fn can_deploy(&self, path: &RepoPath) -> bool {
        self.is_permitted(path, Action::Deploy)
    }

    fn can_delete(&self, path: &RepoPath) -> bool {
        self.is_permitted(path, Action::Delete)
    }

    fn can_download(&self, path: &RepoPath) -> AccessStatus {
        if self.can_read(path) {
            AccessStatus::Granted
        } else {
            AccessStatus::Denied(format!("read permission required for {}", path))
        }
    }
}

/// Grants everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn is_permitted(&self, _path: &RepoPath, _action: Action) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
struct Rule {
    repo_key: Option<String>,
    path_prefix: String,
    action: Action,
    allow: bool,
}

impl Rule {
    fn matches(&self, path: &RepoPath, action: Action) -> bool {
        self.action == action
            && self
                .repo_key
                .as_deref()
                .is_none_or(|key| key == path.repo_key())
            && is_sub_path(path.path(), &self.path_prefix)
    }

    fn specificity(&self) -> (bool, usize) {
        (self.repo_key.is_some(), self.path_prefix.len())
    }
}

/// Rule-based authorizer.
///
/// The most specific matching rule wins (a repository-scoped rule beats a
/// global one, then the longer path prefix). With no matching rule the
/// default applies.
#[derive(Debug, Clone)]
pub struct PermissionTable {
    default_allow: bool,
    rules: Vec<Rule>,
}

impl PermissionTable {
    pub fn allow_by_default() -> Self {
        Self {
            default_allow: true,
            rules: Vec::new(),
        }
    }

    pub fn deny_by_default() -> Self {
        Self {
            default_allow: false,
            rules: Vec::new(),
        }
    }

    /// Allow `action` under `path_prefix` (empty for the whole repository)
    pub fn allow(self, action: Action, repo_key: Option<&str>, path_prefix: &str) -> Self {
        self.rule(action, repo_key, path_prefix, true)
    }

    /// Deny `action` under `path_prefix` (empty for the whole repository)
    pub fn deny(self, action: Action, repo_key: Option<&str>, path_prefix: &str) -> Self {
        self.rule(action, repo_key, path_prefix, false)
    }

    fn rule(mut self, action: Action, repo_key: Option<&str>, path_prefix: &str, allow: bool) -> Self {
        self.rules.push(Rule {
            repo_key: repo_key.map(str::to_string),
            path_prefix: RepoPath::new("", path_prefix).path().to_string(),
            action,
            allow,
        });
        self
    }
}

impl Authorizer for PermissionTable {
    fn is_permitted(&self, path: &RepoPath, action: Action) -> bool {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path, action))
            .max_by_key(|rule| rule.specificity())
            .map(|rule| rule.allow)
            .unwrap_or(self.default_allow)
    }
}
