//! Latest-version resolution
//!
//! Rewrites requests such as
//! - `org/acme/lib/[RELEASE]/lib-[RELEASE].jar`
//! - `org/acme/lib/[INTEGRATION]/lib-[INTEGRATION].jar`
//! - `org/acme/lib/1.0-SNAPSHOT/lib-1.0-SNAPSHOT.jar` (non-unique request
//!   against a repository storing unique snapshots)
//!
//! to the path of the newest matching artifact stored in the repository.
//! When nothing matches, the request is returned unchanged.

use crate::config::schema::SnapshotVersionBehavior;
use crate::error::DepotResult;
use crate::layout::{
    compare_versions, is_metadata_name, ModuleInfo, RepoLayout, INTEGRATION_PLACEHOLDER,
    RELEASE_PLACEHOLDER,
};
use crate::repo::RepoSet;
use crate::repo_path::RepoPath;
use crate::resource::is_checksum_path;
use crate::store::{BrowseCriteria, ContentStore, ItemInfo, Properties};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Levels browsed below the search root. Enough for
/// `<version>/<type>s/<file>` under an Ivy module.
const MAX_SEARCH_DEPTH: usize = 3;

/// Separator of a metadata suffix on a request path (`a.jar:properties`)
const METADATA_SUFFIX_SEP: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
struct Query {
    integration: bool,
    /// Required base revision of candidates
    base_revision: Option<String>,
    /// Only timestamped candidates (non-unique request)
    unique_only: bool,
    search_root: String,
}

pub struct LatestVersionResolver {
    repos: Arc<RepoSet>,
    store: Arc<dyn ContentStore>,
}

impl LatestVersionResolver {
    pub fn new(repos: Arc<RepoSet>, store: Arc<dyn ContentStore>) -> Self {
        Self { repos, store }
    }

    /// Rewrite `path` to the latest matching artifact, or return it as-is.
    ///
    /// Candidates whose properties contradict `request_properties` (same
    /// key, no common value) are skipped; missing keys do not disqualify.
    pub async fn rewrite(
        &self,
        path: &RepoPath,
        request_properties: &Properties,
    ) -> DepotResult<RepoPath> {
        let repo = self.repos.require(path.repo_key())?;
        let Some(storing) = repo.storing_repo() else {
            return Ok(path.clone());
        };
        let descriptor = repo.descriptor();

        let (artifact_path, suffix) = match path.path().split_once(METADATA_SUFFIX_SEP) {
            Some((artifact, metadata)) => (artifact, Some(metadata)),
            None => (path.path(), None),
        };
        let Some(request) = descriptor.layout.parse(artifact_path) else {
            return Ok(path.clone());
        };
        let Some(query) = build_query(artifact_path, &request, descriptor.snapshot_version_behavior)
        else {
            return Ok(path.clone());
        };

        let root = RepoPath::new(storing.key(), &query.search_root);
        if !self.store.exists(&root).await? {
            debug!("No search root {} for {}", root, path);
            return Ok(path.clone());
        }

        let criteria = BrowseCriteria {
            max_depth: MAX_SEARCH_DEPTH,
            files_only: true,
        };
        let candidates: Vec<(ItemInfo, ModuleInfo)> = self
            .store
            .browse(&root, criteria)
            .await?
            .into_iter()
            .filter_map(|item| {
                let info = candidate_info(&item, &descriptor.layout)?;
                let keep = is_candidate(&info, &request, &query)
                    && !conflicts(&item.properties, request_properties);
                keep.then_some((item, info))
            })
            .collect();

        let best = match descriptor.snapshot_version_behavior {
            SnapshotVersionBehavior::Deployer => candidates.into_iter().max_by(|a, b| {
                a.0.last_modified
                    .cmp(&b.0.last_modified)
                    .then_with(|| by_version(&a.1, &b.1))
            }),
            _ => candidates.into_iter().max_by(|a, b| by_version(&a.1, &b.1)),
        };

        let Some((item, info)) = best else {
            debug!("No candidate for {}", path);
            return Ok(path.clone());
        };

        let mut resolved = item.path.path().to_string();
        if let Some(metadata) = suffix {
            resolved.push(METADATA_SUFFIX_SEP);
            resolved.push_str(metadata);
        }
        debug!("Resolved {} to version {}: {}", path, info.version_string(), resolved);
        Ok(RepoPath::new(path.repo_key(), resolved))
    }
}

fn build_query(
    artifact_path: &str,
    request: &ModuleInfo,
    behavior: SnapshotVersionBehavior,
) -> Option<Query> {
    if request.has_placeholder() {
        let integration = [
            &request.base_revision,
            &request.folder_integration_revision,
            &request.file_integration_revision,
        ]
        .iter()
        .any(|v| v.contains(INTEGRATION_PLACEHOLDER));

        // `1.0-[INTEGRATION]` pins the base revision
        let base_revision = request
            .base_revision
            .split_once(['[', ']'])
            .map(|(before, _)| before.trim_end_matches('-').to_string())
            .filter(|base| !base.is_empty());

        let search_root = artifact_path
            .split('/')
            .take_while(|segment| {
                !segment.contains(RELEASE_PLACEHOLDER) && !segment.contains(INTEGRATION_PLACEHOLDER)
            })
            .collect::<Vec<_>>()
            .join("/");

        return Some(Query {
            integration,
            base_revision,
            unique_only: false,
            search_root,
        });
    }

    if request.is_non_unique() && behavior != SnapshotVersionBehavior::NonUnique {
        let search_root = artifact_path
            .rsplit_once('/')
            .map_or(String::new(), |(dir, _)| dir.to_string());
        return Some(Query {
            integration: true,
            base_revision: Some(request.base_revision.clone()),
            unique_only: true,
            search_root,
        });
    }

    None
}

fn candidate_info(item: &ItemInfo, layout: &RepoLayout) -> Option<ModuleInfo> {
    let path = item.path.path();
    if is_checksum_path(path) || is_metadata_name(item.path.name()) {
        return None;
    }
    layout.parse(path).filter(|info| !info.has_placeholder())
}

fn is_candidate(candidate: &ModuleInfo, request: &ModuleInfo, query: &Query) -> bool {
    candidate.same_artifact(request)
        && candidate.is_integration() == query.integration
        && query
            .base_revision
            .as_ref()
            .is_none_or(|base| candidate.base_revision == *base)
        && !(query.unique_only && candidate.is_non_unique())
}

/// A request key present on the candidate with no value in common
fn conflicts(candidate: &Properties, request: &Properties) -> bool {
    request.iter().any(|(key, wanted)| {
        candidate
            .get(key)
            .is_some_and(|have| !have.is_empty() && have.is_disjoint(wanted))
    })
}

fn by_version(a: &ModuleInfo, b: &ModuleInfo) -> Ordering {
    compare_versions(&a.version_string(), &b.version_string())
}
