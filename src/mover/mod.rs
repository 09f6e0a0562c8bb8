//! Cross-repository move and copy
//!
//! Walks the source tree depth-first, pre-order. Every folder and file is
//! checked against the target's policy and the caller's permissions;
//! refusals become warnings on the `MoveStatus` and the walk carries on
//! with sibling subtrees. Only precondition violations abort the call.

mod status;

pub use status::{MoveStatus, MovedItem, StatusEntry};

use crate::error::{DepotError, DepotResult};
use crate::metadata::{is_derived_metadata, MetadataRecalculator};
use crate::repo::{LocalRepo, RealRepo, RepoSet};
use crate::repo_path::RepoPath;
use crate::security::Authorizer;
use crate::store::{lock_ordered, ContentStore, FolderMeta, ItemInfo, LockMode};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info};

/// Options of one move/copy call
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveOptions {
    /// Copy instead of move
    pub copy: bool,
    /// Check and count only, never mutate
    pub dry_run: bool,
    /// Triggered from a search result: prune emptied ancestors of the source
    pub search_result: bool,
    /// Schedule derived metadata recalculation afterwards
    pub run_metadata_recalc: bool,
}

struct MoveContext<'a> {
    source: &'a Arc<LocalRepo>,
    target: &'a Arc<LocalRepo>,
    options: MoveOptions,
}

pub struct RepoPathMover {
    repos: Arc<RepoSet>,
    store: Arc<dyn ContentStore>,
    authorizer: Arc<dyn Authorizer>,
    recalculator: Arc<dyn MetadataRecalculator>,
}

impl RepoPathMover {
    pub fn new(
        repos: Arc<RepoSet>,
        store: Arc<dyn ContentStore>,
        authorizer: Arc<dyn Authorizer>,
        recalculator: Arc<dyn MetadataRecalculator>,
    ) -> Self {
        Self {
            repos,
            store,
            authorizer,
            recalculator,
        }
    }

    /// Move or copy `from` (a file or a whole folder) into `target_key`
    /// under the same relative path.
    ///
    /// Fails without touching anything when source and target are the same
    /// repository, when the target is a remote or cache repository, or when
    /// `from` does not exist.
    pub async fn move_or_copy(
        &self,
        from: &RepoPath,
        target_key: &str,
        options: MoveOptions,
    ) -> DepotResult<MoveStatus> {
        if from.repo_key() == target_key {
            return Err(DepotError::SameRepository {
                key: target_key.to_string(),
            });
        }

        let source = self
            .repos
            .require(from.repo_key())?
            .storing_repo()
            .ok_or_else(|| {
                DepotError::RepositoryConfig(format!(
                    "{} does not store artifacts locally",
                    from.repo_key()
                ))
            })?;
        let target = match self.repos.require(target_key)? {
            RealRepo::Remote(_) => {
                return Err(DepotError::InvalidMoveTarget {
                    key: target_key.to_string(),
                    reason: "remote repositories cannot be written to".to_string(),
                })
            }
            RealRepo::Local(local) if local.is_cache() => {
                return Err(DepotError::InvalidMoveTarget {
                    key: target_key.to_string(),
                    reason: "cache repositories cannot be move or copy targets".to_string(),
                })
            }
            RealRepo::Local(local) => local,
        };
        if source.key() == target.key() {
            return Err(DepotError::SameRepository {
                key: target_key.to_string(),
            });
        }

        let from = from.with_repo(source.key());
        let item = self
            .store
            .get_info(&from)
            .await?
            .ok_or_else(|| DepotError::ItemNotFound(from.clone()))?;

        let ctx = MoveContext {
            source,
            target,
            options,
        };
        let mut status = MoveStatus::new(options.copy, options.dry_run);
        info!(
            "[{}] {} {} -> {}{}",
            status.id,
            if options.copy { "Copying" } else { "Moving" },
            from,
            target.key(),
            if options.dry_run { " (dry run)" } else { "" }
        );

        let moved_file = !item.is_folder();
        self.process(&ctx, item, &mut status).await?;

        if !options.dry_run && status.moved_count() > 0 {
            let mut source_root = from.parent().unwrap_or_else(|| from.clone());
            if options.search_result && !options.copy {
                source_root = self.prune_empty_ancestors(&ctx, &from).await?;
            } else if moved_file && !options.copy && !source_root.is_root() {
                // The file's own folder goes when it was the last child
                if self.delete_if_empty(&ctx, &source_root).await? {
                    source_root = source_root.parent().unwrap_or(source_root);
                }
            }
            if options.run_metadata_recalc {
                self.recalculate(&ctx, &from, &source_root, &mut status).await;
            }
        }

        info!(
            "[{}] Done: {} moved, {} warnings, {} errors",
            status.id,
            status.moved_count(),
            status.warnings.len(),
            status.errors.len()
        );
        Ok(status)
    }

    fn process<'a>(
        &'a self,
        ctx: &'a MoveContext<'a>,
        item: ItemInfo,
        status: &'a mut MoveStatus,
    ) -> BoxFuture<'a, DepotResult<()>> {
        Box::pin(async move {
            if item.is_folder() {
                self.move_folder(ctx, &item, status).await
            } else {
                self.move_file(ctx, &item, status).await
            }
        })
    }

    async fn move_folder(
        &self,
        ctx: &MoveContext<'_>,
        folder: &ItemInfo,
        status: &mut MoveStatus,
    ) -> DepotResult<()> {
        let source_path = &folder.path;
        let target_path = source_path.with_repo(ctx.target.key());

        if let Err(reason) = self.can_move(ctx, source_path, &target_path, true).await? {
            status.warn(source_path, reason);
            return Ok(());
        }

        let mut created = false;
        if !ctx.options.dry_run {
            let _lock = self.store.lock(&target_path, LockMode::Exclusive).await?;
            if !self.store.exists(&target_path).await? {
                self.ensure_mutable(ctx, "create folder", &target_path)?;
                let meta = FolderMeta {
                    properties: folder.properties.clone(),
                    metadata: folder
                        .metadata
                        .iter()
                        .filter(|(name, _)| !is_derived_metadata(name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect(),
                };
                self.store.create_folder(&target_path, meta).await?;
                created = true;
            }
        }

        for child in self.store.list_children(source_path).await? {
            self.process(ctx, child, status).await?;
        }

        if ctx.options.dry_run {
            return Ok(());
        }
        if !ctx.options.copy && status.moved_count() > 0 && !source_path.is_root() {
            self.delete_if_empty(ctx, source_path).await?;
        }
        if created {
            self.delete_if_empty(ctx, &target_path).await?;
        }
        Ok(())
    }

    async fn move_file(
        &self,
        ctx: &MoveContext<'_>,
        file: &ItemInfo,
        status: &mut MoveStatus,
    ) -> DepotResult<()> {
        let source_path = &file.path;
        let target_path = source_path.with_repo(ctx.target.key());

        if let Err(reason) = self.can_move(ctx, source_path, &target_path, false).await? {
            status.warn(source_path, reason);
            return Ok(());
        }
        if ctx.options.dry_run {
            status.add_moved(source_path.clone(), target_path);
            return Ok(());
        }

        let _locks = lock_ordered(
            self.store.as_ref(),
            &[source_path, &target_path],
            LockMode::Exclusive,
        )
        .await?;

        if !self.store.exists(source_path).await? {
            status.error(source_path, "source disappeared before it could be moved");
            return Ok(());
        }
        if let Some(existing) = self.store.get_info(&target_path).await? {
            if existing.is_folder() {
                // Created between the check and the lock
                status.error(&target_path, "a folder exists at the target path");
                return Ok(());
            }
            self.ensure_mutable(ctx, "overwrite", &target_path)?;
            self.store.delete(&target_path).await?;
            debug!("Overwriting {}", target_path);
        }

        if ctx.options.copy {
            self.ensure_mutable(ctx, "copy", source_path)?;
            self.store.copy_item(source_path, &target_path).await?;
        } else {
            self.ensure_mutable(ctx, "move", source_path)?;
            self.store.move_item(source_path, &target_path).await?;
        }
        debug!("{} -> {}", source_path, target_path);
        status.add_moved(source_path.clone(), target_path);
        Ok(())
    }

    /// Target policy and caller permissions for one item. `Ok(Err(reason))`
    /// is a refusal, `Err` a store failure.
    async fn can_move(
        &self,
        ctx: &MoveContext<'_>,
        source: &RepoPath,
        target: &RepoPath,
        is_folder: bool,
    ) -> DepotResult<Result<(), String>> {
        if let Err(reason) = ctx.target.descriptor().check(target.path(), is_folder) {
            return Ok(Err(reason));
        }

        if ctx.options.copy {
            if !self.authorizer.can_read(source) {
                return Ok(Err(format!("no read permission on {}", source)));
            }
        } else if !self.authorizer.can_delete(source) {
            return Ok(Err(format!("no delete permission on {}", source)));
        }

        match self.store.get_info(target).await? {
            Some(existing) if existing.is_folder() != is_folder => {
                let kind = if existing.is_folder() { "folder" } else { "file" };
                return Ok(Err(format!("a {} exists at {}", kind, target)));
            }
            // Merging into an existing folder deletes nothing
            Some(existing) if existing.is_folder() => {
                if !self.authorizer.can_deploy(target) {
                    return Ok(Err(format!("no deploy permission on {}", target)));
                }
            }
            Some(_) => {
                if !self.authorizer.can_delete(target) {
                    return Ok(Err(format!(
                        "no delete permission to overwrite {}",
                        target
                    )));
                }
            }
            None => {
                if !self.authorizer.can_deploy(target) {
                    return Ok(Err(format!("no deploy permission on {}", target)));
                }
            }
        }
        Ok(Ok(()))
    }

    fn ensure_mutable(&self, ctx: &MoveContext<'_>, action: &str, path: &RepoPath) -> DepotResult<()> {
        if ctx.options.dry_run {
            return Err(DepotError::DryRunMutation(format!("{} {}", action, path)));
        }
        Ok(())
    }

    /// Delete a folder if it has no children left. The delete is permanent,
    /// no trash or events.
    async fn delete_if_empty(&self, ctx: &MoveContext<'_>, folder: &RepoPath) -> DepotResult<bool> {
        let _lock = self.store.lock(folder, LockMode::Exclusive).await?;
        match self.store.get_info(folder).await? {
            Some(info) if info.is_folder() => {}
            _ => return Ok(false),
        }
        if !self.store.list_children(folder).await?.is_empty() {
            return Ok(false);
        }
        self.ensure_mutable(ctx, "delete empty folder", folder)?;
        self.store.delete(folder).await?;
        debug!("Pruned empty folder {}", folder);
        Ok(true)
    }

    /// Delete emptied ancestors of `moved` bottom-up, stopping at a folder
    /// that still has children or at the repository root. Returns the parent
    /// of the last pruned folder.
    async fn prune_empty_ancestors(
        &self,
        ctx: &MoveContext<'_>,
        moved: &RepoPath,
    ) -> DepotResult<RepoPath> {
        let mut root = moved.parent().unwrap_or_else(|| moved.clone());
        let mut current = moved.parent();

        while let Some(folder) = current {
            if folder.is_root() {
                break;
            }
            let gone = !self.store.exists(&folder).await?;
            if !gone && !self.delete_if_empty(ctx, &folder).await? {
                break;
            }
            current = folder.parent();
            if let Some(parent) = &current {
                root = parent.clone();
            }
        }
        Ok(root)
    }

    /// Schedule metadata recalculation for the target root and, for moves
    /// out of non-cache repositories, the source root. Failures are
    /// reported on the status.
    async fn recalculate(
        &self,
        ctx: &MoveContext<'_>,
        from: &RepoPath,
        source_root: &RepoPath,
        status: &mut MoveStatus,
    ) {
        let moved = from.with_repo(ctx.target.key());
        let target_root = moved.parent().unwrap_or(moved);

        let mut roots = vec![target_root];
        if !ctx.options.copy && !ctx.source.is_cache() {
            roots.push(source_root.clone());
        }

        for root in roots {
            let scheduled = match self.recalculator.mark_base_for_recalculation(&root).await {
                Ok(()) => self.recalculator.calculate_metadata(&root).await,
                Err(e) => Err(e),
            };
            if let Err(e) = scheduled {
                status.error(&root, format!("metadata recalculation not scheduled: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{Config, LocalRepoConfig, RemoteRepoConfig};
    use crate::metadata::{QueuedRecalculator, RecalcRequest};
    use crate::remote::HttpTransportFactory;
    use crate::security::AllowAll;
    use crate::store::{MemoryStore, PutMeta};

    fn repos(store: Arc<MemoryStore>) -> Arc<RepoSet> {
        let mut config = Config::default();
        for key in ["libs-a", "libs-b"] {
            let mut local = LocalRepoConfig::default();
            local.common.key = key.to_string();
            config.local_repos.push(local);
        }
        let mut remote = RemoteRepoConfig {
            url: "https://repo.example.com".to_string(),
            ..Default::default()
        };
        remote.common.key = "central".to_string();
        config.remote_repos.push(remote);

        let clock = Arc::new(ManualClock::new(0));
        Arc::new(RepoSet::build(&config, store, &HttpTransportFactory, clock).unwrap())
    }

    fn mover(store: Arc<MemoryStore>) -> (RepoPathMover, tokio::sync::mpsc::UnboundedReceiver<RecalcRequest>) {
        let (recalculator, rx) = QueuedRecalculator::new();
        let mover = RepoPathMover::new(
            repos(store.clone()),
            store,
            Arc::new(AllowAll),
            Arc::new(recalculator),
        );
        (mover, rx)
    }

    #[tokio::test]
    async fn preconditions_fail_fast() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&RepoPath::new("libs-a", "a.txt"), b"a".to_vec(), PutMeta::default())
            .await
            .unwrap();
        let (mover, _rx) = mover(store.clone());
        let from = RepoPath::new("libs-a", "a.txt");

        assert!(matches!(
            mover.move_or_copy(&from, "libs-a", MoveOptions::default()).await,
            Err(DepotError::SameRepository { .. })
        ));
        assert!(matches!(
            mover.move_or_copy(&from, "central-cache", MoveOptions::default()).await,
            Err(DepotError::InvalidMoveTarget { .. })
        ));
        assert!(matches!(
            mover.move_or_copy(&from, "central", MoveOptions::default()).await,
            Err(DepotError::InvalidMoveTarget { .. })
        ));
        assert!(matches!(
            mover
                .move_or_copy(&RepoPath::new("libs-a", "none"), "libs-b", MoveOptions::default())
                .await,
            Err(DepotError::ItemNotFound(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn folder_move_prunes_source_and_skips_derived_metadata() {
        let store = Arc::new(MemoryStore::new());
        let mut meta = FolderMeta::default();
        meta.metadata
            .insert("maven-metadata".to_string(), "<metadata/>".to_string());
        meta.metadata.insert("notes".to_string(), "keep".to_string());
        store
            .create_folder(&RepoPath::new("libs-a", "org/a"), meta)
            .await
            .unwrap();
        store
            .put(
                &RepoPath::new("libs-a", "org/a/1.0/a-1.0.jar"),
                b"jar".to_vec(),
                PutMeta::default(),
            )
            .await
            .unwrap();

        let (mover, mut rx) = mover(store.clone());
        let options = MoveOptions {
            run_metadata_recalc: true,
            ..Default::default()
        };
        let status = mover
            .move_or_copy(&RepoPath::new("libs-a", "org/a"), "libs-b", options)
            .await
            .unwrap();

        assert_eq!(status.moved_count(), 1);
        assert!(!store.exists(&RepoPath::new("libs-a", "org/a")).await.unwrap());
        let folder = store
            .get_info(&RepoPath::new("libs-b", "org/a"))
            .await
            .unwrap()
            .unwrap();
        assert!(folder.metadata.contains_key("notes"));
        assert!(!folder.metadata.contains_key("maven-metadata"));

        assert_eq!(
            rx.recv().await,
            Some(RecalcRequest::MarkBase(RepoPath::new("libs-b", "org")))
        );
        assert_eq!(
            rx.recv().await,
            Some(RecalcRequest::Calculate(RepoPath::new("libs-b", "org")))
        );
        assert_eq!(
            rx.recv().await,
            Some(RecalcRequest::MarkBase(RepoPath::new("libs-a", "org")))
        );
    }

    #[tokio::test]
    async fn file_over_folder_is_refused_in_both_modes() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&RepoPath::new("libs-a", "org/a/x"), b"x".to_vec(), PutMeta::default())
            .await
            .unwrap();
        store
            .put(
                &RepoPath::new("libs-b", "org/a/x/inner.txt"),
                b"inner".to_vec(),
                PutMeta::default(),
            )
            .await
            .unwrap();
        let (mover, _rx) = mover(store.clone());
        let from = RepoPath::new("libs-a", "org/a");

        let dry = mover
            .move_or_copy(&from, "libs-b", MoveOptions { dry_run: true, ..Default::default() })
            .await
            .unwrap();
        let real = mover
            .move_or_copy(&from, "libs-b", MoveOptions::default())
            .await
            .unwrap();

        assert_eq!(dry.moved_count(), 0);
        assert_eq!(real.moved_count(), dry.moved_count());
        assert_eq!(real.warnings.len(), 1);
        assert!(real.errors.is_empty());
        assert!(store.exists(&RepoPath::new("libs-a", "org/a/x")).await.unwrap());
        assert!(store
            .exists(&RepoPath::new("libs-b", "org/a/x/inner.txt"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn single_file_move_removes_emptied_leaf() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                &RepoPath::new("libs-a", "org/a/1.0/a-1.0.jar"),
                b"jar".to_vec(),
                PutMeta::default(),
            )
            .await
            .unwrap();
        let (mover, mut rx) = mover(store.clone());
        let options = MoveOptions {
            run_metadata_recalc: true,
            ..Default::default()
        };

        let status = mover
            .move_or_copy(&RepoPath::new("libs-a", "org/a/1.0/a-1.0.jar"), "libs-b", options)
            .await
            .unwrap();
        assert_eq!(status.moved_count(), 1);
        assert!(!store.exists(&RepoPath::new("libs-a", "org/a/1.0")).await.unwrap());
        // Only the leaf goes; ancestors are pruned for search results alone
        assert!(store.exists(&RepoPath::new("libs-a", "org/a")).await.unwrap());

        let mut requests = Vec::new();
        while let Ok(request) = rx.try_recv() {
            requests.push(request);
        }
        assert!(requests.contains(&RecalcRequest::MarkBase(RepoPath::new("libs-a", "org/a"))));
    }

    #[tokio::test]
    async fn single_file_copy_keeps_source_folder() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&RepoPath::new("libs-a", "org/b/b.jar"), b"b".to_vec(), PutMeta::default())
            .await
            .unwrap();
        let (mover, _rx) = mover(store.clone());
        let options = MoveOptions {
            copy: true,
            ..Default::default()
        };

        mover
            .move_or_copy(&RepoPath::new("libs-a", "org/b/b.jar"), "libs-b", options)
            .await
            .unwrap();
        assert!(store.exists(&RepoPath::new("libs-a", "org/b/b.jar")).await.unwrap());
        assert!(store.exists(&RepoPath::new("libs-b", "org/b/b.jar")).await.unwrap());
    }

    #[tokio::test]
    async fn dry_run_never_mutates() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&RepoPath::new("libs-a", "x/a.txt"), b"a".to_vec(), PutMeta::default())
            .await
            .unwrap();
        let before = store.snapshot();

        let (mover, mut rx) = mover(store.clone());
        let options = MoveOptions {
            dry_run: true,
            run_metadata_recalc: true,
            ..Default::default()
        };
        let status = mover
            .move_or_copy(&RepoPath::new("libs-a", "x"), "libs-b", options)
            .await
            .unwrap();

        assert_eq!(status.moved_count(), 1);
        assert_eq!(store.snapshot(), before);
        assert!(rx.try_recv().is_err());
    }
}
