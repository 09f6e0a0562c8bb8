//! Derived metadata recalculation seam
//!
//! The engine only schedules recalculation (for example of build-tool
//! metadata after a move); computing the metadata is the host's job.

use crate::error::{DepotError, DepotResult};
use crate::repo_path::RepoPath;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Name of the recalculable metadata document on folders.
/// Never copied by move/copy; it is rebuilt at the destination instead.
pub const DERIVED_METADATA_NAME: &str = "maven-metadata";

/// Whether a metadata document is derived and must be recalculated, not copied
pub fn is_derived_metadata(name: &str) -> bool {
    name == DERIVED_METADATA_NAME
}

/// Schedules derived metadata recalculation
#[async_trait]
pub trait MetadataRecalculator: Send + Sync {
    /// Mark `path` as the root of a subtree whose metadata is stale
    async fn mark_base_for_recalculation(&self, path: &RepoPath) -> DepotResult<()>;

    /// Request recalculation of the subtree rooted at `path`
    async fn calculate_metadata(&self, path: &RepoPath) -> DepotResult<()>;
}

/// A scheduled recalculation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalcRequest {
    MarkBase(RepoPath),
    Calculate(RepoPath),
}

/// Forwards requests to a channel drained by the host's metadata worker
#[derive(Debug, Clone)]
pub struct QueuedRecalculator {
    tx: mpsc::UnboundedSender<RecalcRequest>,
}

impl QueuedRecalculator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RecalcRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, request: RecalcRequest) -> DepotResult<()> {
        debug!("Scheduling metadata recalculation: {:?}", request);
        self.tx
            .send(request)
            .map_err(|_| DepotError::Internal("metadata recalculation queue closed".to_string()))
    }
}

#[async_trait]
impl MetadataRecalculator for QueuedRecalculator {
    async fn mark_base_for_recalculation(&self, path: &RepoPath) -> DepotResult<()> {
        self.send(RecalcRequest::MarkBase(path.clone()))
    }

    async fn calculate_metadata(&self, path: &RepoPath) -> DepotResult<()> {
        self.send(RecalcRequest::Calculate(path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_requests_arrive_in_order() {
        let (recalc, mut rx) = QueuedRecalculator::new();
        let path = RepoPath::new("libs", "org/acme");

        recalc.mark_base_for_recalculation(&path).await.unwrap();
        recalc.calculate_metadata(&path).await.unwrap();

        assert_eq!(rx.recv().await, Some(RecalcRequest::MarkBase(path.clone())));
        assert_eq!(rx.recv().await, Some(RecalcRequest::Calculate(path)));
    }

    #[tokio::test]
    async fn closed_queue_is_an_error() {
        let (recalc, rx) = QueuedRecalculator::new();
        drop(rx);
        let err = recalc
            .calculate_metadata(&RepoPath::root("libs"))
            .await
            .unwrap_err();
        assert!(matches!(err, DepotError::Internal(_)));
    }

    #[test]
    fn derived_metadata_detection() {
        assert!(is_derived_metadata("maven-metadata"));
        assert!(!is_derived_metadata("build-info"));
    }
}
