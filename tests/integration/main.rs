//! Integration tests for depot

mod support;

use depot::config::ConfigManager;
use depot::metadata::{QueuedRecalculator, RecalcRequest};
use depot::mover::MoveOptions;
use depot::resource::{ContentSource, RepoResource};
use depot::security::{Action, PermissionTable};
use depot::store::{properties, ContentStore, Properties};
use depot::{DepotError, RepoPath};
use std::sync::Arc;
use std::time::Duration;
use support::{config, local, Harness, START_MILLIS};

const SNAPSHOT: &str = "org/acme/lib/1.0-SNAPSHOT/lib-1.0-SNAPSHOT.jar";
const RELEASE: &str = "org/acme/lib/1.0/lib-1.0.jar";

fn central(path: &str) -> RepoPath {
    RepoPath::new("central", path)
}

mod resolution {
    use super::*;

    #[tokio::test]
    async fn missed_entry_short_circuits_until_expiry() {
        let h = Harness::new(&config());

        let res = h.service.get_info(&central(RELEASE)).await.unwrap();
        assert!(matches!(res, RepoResource::NotFound(_)));
        assert_eq!(h.origin.probes(), 1);

        // Appears upstream, but the miss is remembered
        h.origin.serve(RELEASE, b"jar", START_MILLIS);
        let res = h.service.get_info(&central(RELEASE)).await.unwrap();
        assert!(matches!(res, RepoResource::NotFound(_)));
        assert_eq!(h.origin.probes(), 1);

        h.clock.advance(Duration::from_secs(61));
        let res = h.service.get_info(&central(RELEASE)).await.unwrap();
        assert!(res.is_found());
        assert_eq!(h.origin.probes(), 2);
    }

    #[tokio::test]
    async fn failed_entry_short_circuits_until_expiry() {
        let h = Harness::new(&config());
        h.origin.serve(RELEASE, b"jar", START_MILLIS);
        h.origin.set_down(true);

        let res = h.service.get_info(&central(RELEASE)).await.unwrap();
        assert!(matches!(res, RepoResource::NotFound(_)));
        h.origin.set_down(false);
        let res = h.service.get_info(&central(RELEASE)).await.unwrap();
        assert!(matches!(res, RepoResource::NotFound(_)));
        assert_eq!(h.origin.probes(), 1);

        h.clock.advance(Duration::from_secs(31));
        assert!(h.service.get_info(&central(RELEASE)).await.unwrap().is_found());
        assert_eq!(h.origin.probes(), 2);
    }

    #[tokio::test]
    async fn clear_caches_forces_reprobe() {
        let h = Harness::new(&config());
        h.service.get_info(&central(RELEASE)).await.unwrap();
        h.origin.serve(RELEASE, b"jar", START_MILLIS);

        h.service.clear_caches(Some("central")).unwrap();
        assert!(h.service.get_info(&central(RELEASE)).await.unwrap().is_found());
        assert_eq!(h.origin.probes(), 2);
    }

    #[tokio::test]
    async fn remove_from_caches_counts_sub_paths() {
        let h = Harness::new(&config());
        h.service.get_info(&central(RELEASE)).await.unwrap();
        h.service.get_info(&central(SNAPSHOT)).await.unwrap();

        let removed = h
            .service
            .remove_from_caches(&central("org/acme/lib/1.0"), true)
            .unwrap();
        assert_eq!(removed, 1);
        let removed = h.service.remove_from_caches(&central("org"), true).unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn offline_remote_is_idempotent() {
        let mut config = config();
        config.remote_repos[0].offline = true;
        let h = Harness::new(&config);
        h.origin.serve(RELEASE, b"jar", START_MILLIS);

        for _ in 0..2 {
            let res = h.service.get_info(&central(RELEASE)).await.unwrap();
            assert!(matches!(res, RepoResource::NotFound(_)));
        }
        assert_eq!(h.origin.probes(), 0);

        let repos = h.service.repositories();
        let caches = repos.get("central").unwrap().as_remote().unwrap().caches();
        assert!(caches.failed.is_empty());
        assert!(caches.missed.is_empty());
    }

    #[tokio::test]
    async fn global_offline_overrides_remote() {
        let mut config = config();
        config.general.offline = true;
        let h = Harness::new(&config);
        h.origin.serve(RELEASE, b"jar", START_MILLIS);

        let res = h.service.get_info(&central(RELEASE)).await.unwrap();
        assert!(matches!(res, RepoResource::NotFound(_)));
        assert_eq!(h.origin.probes(), 0);
    }

    #[tokio::test]
    async fn hard_fail_surfaces_transport_errors() {
        let mut config = config();
        config.remote_repos[0].hard_fail = true;
        let h = Harness::new(&config);
        h.origin.set_down(true);

        let err = h.service.get_info(&central(RELEASE)).await.unwrap_err();
        assert!(matches!(err, DepotError::RemoteHardFail { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn checksum_requests_never_probe() {
        let h = Harness::new(&config());
        let path = format!("{}.sha1", RELEASE);
        let res = h.service.get_info(&central(&path)).await.unwrap();
        assert!(matches!(res, RepoResource::NotFound(_)));
        assert_eq!(h.origin.probes(), 0);
    }

    #[tokio::test]
    async fn excluded_path_is_rejected_without_probe() {
        let mut config = config();
        config.remote_repos[0].common.excludes_pattern = "org/internal/**".to_string();
        let h = Harness::new(&config);

        let res = h
            .service
            .get_info(&central("org/internal/x/1.0/x-1.0.jar"))
            .await
            .unwrap();
        assert!(matches!(res, RepoResource::Rejected(_)));
        assert_eq!(h.origin.probes(), 0);
    }
}

mod caching {
    use super::*;

    #[tokio::test]
    async fn download_stores_in_cache_repository() {
        let h = Harness::new(&config());
        h.origin.serve(SNAPSHOT, b"snap-1", START_MILLIS - 1000);

        let handle = h.service.download(&central(SNAPSHOT)).await.unwrap();
        assert_eq!(handle.content, b"snap-1");
        assert_eq!(handle.source, ContentSource::Cache);
        assert_eq!(h.read("central-cache", SNAPSHOT).await.unwrap(), b"snap-1");

        // Fresh cached copy answers without the origin
        assert!(h.service.get_info(&central(SNAPSHOT)).await.unwrap().is_found());
        assert_eq!(h.origin.probes(), 1);
    }

    #[tokio::test]
    async fn expired_snapshot_is_revalidated() {
        let h = Harness::new(&config());
        h.origin.serve(SNAPSHOT, b"snap-1", START_MILLIS - 1000);
        h.service.download(&central(SNAPSHOT)).await.unwrap();

        // Not newer upstream: cached copy is unexpired
        h.clock.advance(Duration::from_secs(3601));
        let res = h.service.get_info(&central(SNAPSHOT)).await.unwrap();
        assert_eq!(res.as_found().unwrap().last_updated, h.clock_now());
        assert_eq!(h.origin.probes(), 2);
        assert!(h.service.get_info(&central(SNAPSHOT)).await.unwrap().is_found());
        assert_eq!(h.origin.probes(), 2);

        // Newer upstream: downloaded again
        h.origin.serve(SNAPSHOT, b"snap-2", h.clock_now());
        h.clock.advance(Duration::from_secs(3601));
        let handle = h.service.download(&central(SNAPSHOT)).await.unwrap();
        assert_eq!(handle.content, b"snap-2");
        assert_eq!(h.origin.probes(), 3);
    }

    #[tokio::test]
    async fn expired_copy_survives_origin_outage() {
        let h = Harness::new(&config());
        h.origin.serve(SNAPSHOT, b"snap-1", START_MILLIS - 1000);
        h.service.download(&central(SNAPSHOT)).await.unwrap();

        h.clock.advance(Duration::from_secs(3601));
        h.origin.set_down(true);
        let handle = h.service.download(&central(SNAPSHOT)).await.unwrap();
        assert_eq!(handle.content, b"snap-1");
    }

    #[tokio::test]
    async fn releases_never_expire() {
        let h = Harness::new(&config());
        h.origin.serve(RELEASE, b"jar", START_MILLIS);
        h.service.download(&central(RELEASE)).await.unwrap();

        h.clock.advance(Duration::from_secs(10 * 3600));
        assert!(h.service.get_info(&central(RELEASE)).await.unwrap().is_found());
        assert_eq!(h.origin.probes(), 1);
    }

    #[tokio::test]
    async fn zap_forces_revalidation() {
        let h = Harness::new(&config());
        h.origin.serve(SNAPSHOT, b"snap-1", START_MILLIS);
        h.origin.serve(RELEASE, b"jar", START_MILLIS);
        h.service.download(&central(SNAPSHOT)).await.unwrap();
        h.service.download(&central(RELEASE)).await.unwrap();

        // Only the snapshot is expirable
        assert_eq!(h.service.zap(&central("org/acme")).await.unwrap(), 1);
        h.service.get_info(&central(SNAPSHOT)).await.unwrap();
        assert_eq!(h.origin.probes(), 3);

        assert!(matches!(
            h.service.zap(&RepoPath::new("libs-release", "org")).await,
            Err(DepotError::NotCacheRepository(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_downloads_agree() {
        let h = Harness::new(&config());
        h.origin.serve(RELEASE, b"jar", START_MILLIS);

        let path = central(RELEASE);
        let (a, b) = tokio::join!(h.service.download(&path), h.service.download(&path));
        assert_eq!(a.unwrap().content, b"jar");
        assert_eq!(b.unwrap().content, b"jar");
        assert_eq!(h.read("central-cache", RELEASE).await.unwrap(), b"jar");
    }
}

mod latest_version {
    use super::*;

    #[tokio::test]
    async fn release_placeholder_picks_highest_version() {
        let h = Harness::new(&config());
        h.put("libs-release", "org/acme/lib/1.2/lib-1.2.jar", b"a").await;
        h.put("libs-release", "org/acme/lib/1.10/lib-1.10.jar", b"b").await;
        h.put("libs-release", "org/acme/lib/1.10/lib-1.10.pom", b"c").await;
        h.put("libs-release", "org/acme/lib/2.0-SNAPSHOT/lib-2.0-SNAPSHOT.jar", b"d")
            .await;

        let resolved = h
            .service
            .rewrite_latest(
                &RepoPath::new("libs-release", "org/acme/lib/[RELEASE]/lib-[RELEASE].jar"),
                &Properties::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            resolved,
            RepoPath::new("libs-release", "org/acme/lib/1.10/lib-1.10.jar")
        );
    }

    #[tokio::test]
    async fn non_unique_request_resolves_to_latest_timestamp() {
        let h = Harness::new(&config());
        let folder = "org/acme/lib/1.0-SNAPSHOT";
        h.put("libs-release", &format!("{}/lib-1.0-20240101.120000-1.jar", folder), b"1")
            .await;
        h.put("libs-release", &format!("{}/lib-1.0-20240102.090000-2.jar", folder), b"2")
            .await;
        h.put("libs-release", &format!("{}/maven-metadata.xml", folder), b"<m/>")
            .await;

        let resolved = h
            .service
            .rewrite_latest(&RepoPath::new("libs-release", SNAPSHOT), &Properties::new())
            .await
            .unwrap();
        assert_eq!(
            resolved,
            RepoPath::new("libs-release", format!("{}/lib-1.0-20240102.090000-2.jar", folder))
        );
    }

    #[tokio::test]
    async fn conflicting_properties_skip_candidates() {
        let h = Harness::new(&config());
        h.put("libs-release", "org/acme/lib/1.0/lib-1.0.jar", b"a").await;
        h.store
            .put(
                &RepoPath::new("libs-release", "org/acme/lib/2.0/lib-2.0.jar"),
                b"b".to_vec(),
                depot::store::PutMeta {
                    properties: properties([("qa", "failed")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let resolved = h
            .service
            .rewrite_latest(
                &RepoPath::new("libs-release", "org/acme/lib/[RELEASE]/lib-[RELEASE].jar"),
                &properties([("qa", "passed")]),
            )
            .await
            .unwrap();
        assert_eq!(resolved.path(), "org/acme/lib/1.0/lib-1.0.jar");
    }

    #[tokio::test]
    async fn no_candidate_returns_request() {
        let h = Harness::new(&config());
        let request = RepoPath::new("libs-release", "org/none/x/[RELEASE]/x-[RELEASE].jar");
        let resolved = h
            .service
            .rewrite_latest(&request, &Properties::new())
            .await
            .unwrap();
        assert_eq!(resolved, request);
    }
}

mod moving {
    use super::*;

    const JAR: &str = "org/a/1.0/a-1.0.jar";

    fn options(copy: bool, dry_run: bool) -> MoveOptions {
        MoveOptions {
            copy,
            dry_run,
            ..Default::default()
        }
    }

    fn mover(h: &Harness) -> depot::mover::RepoPathMover {
        let (recalculator, _rx) = QueuedRecalculator::new();
        h.service.mover(Arc::new(recalculator))
    }

    #[tokio::test]
    async fn move_overwrites_with_delete_permission() {
        let h = Harness::new(&config());
        h.put("libs-release", JAR, b"new").await;
        h.put("libs-other", JAR, b"old").await;

        let status = mover(&h)
            .move_or_copy(&RepoPath::new("libs-release", JAR), "libs-other", options(false, false))
            .await
            .unwrap();
        assert_eq!(status.moved_count(), 1);
        assert_eq!(h.read("libs-other", JAR).await.unwrap(), b"new");
        assert!(h.read("libs-release", JAR).await.is_none());
    }

    #[tokio::test]
    async fn overwrite_without_delete_permission_is_a_warning() {
        let authorizer = PermissionTable::allow_by_default().deny(Action::Delete, Some("libs-other"), "");
        let h = Harness::with_authorizer(&config(), Arc::new(authorizer));
        h.put("libs-release", JAR, b"new").await;
        h.put("libs-other", JAR, b"old").await;

        let status = mover(&h)
            .move_or_copy(&RepoPath::new("libs-release", JAR), "libs-other", options(false, false))
            .await
            .unwrap();
        assert_eq!(status.moved_count(), 0);
        assert_eq!(status.warnings.len(), 1);
        assert_eq!(h.read("libs-other", JAR).await.unwrap(), b"old");
        assert_eq!(h.read("libs-release", JAR).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn copy_keeps_source_move_removes_it() {
        let h = Harness::new(&config());
        h.put("libs-release", JAR, b"jar").await;
        let from = RepoPath::new("libs-release", "org/a");

        let status = mover(&h)
            .move_or_copy(&from, "libs-other", options(true, false))
            .await
            .unwrap();
        assert_eq!(status.moved_count(), 1);
        assert!(h.read("libs-release", JAR).await.is_some());
        assert!(h.read("libs-other", JAR).await.is_some());

        h.store.delete(&RepoPath::new("libs-other", "org")).await.unwrap();
        let status = mover(&h)
            .move_or_copy(&from, "libs-other", options(false, false))
            .await
            .unwrap();
        assert_eq!(status.moved_count(), 1);
        assert!(!h.store.exists(&from).await.unwrap());
        assert!(h.read("libs-other", JAR).await.is_some());
    }

    #[tokio::test]
    async fn dry_run_reports_the_same_count_without_mutating() {
        let mut config = config();
        config.local_repos[1].common.excludes_pattern = "**/*.tmp".to_string();
        let h = Harness::new(&config);
        h.put("libs-release", JAR, b"jar").await;
        h.put("libs-release", "org/a/1.0/a-1.0.pom", b"pom").await;
        h.put("libs-release", "org/a/notes.tmp", b"tmp").await;
        let from = RepoPath::new("libs-release", "org/a");

        let before = h.store.snapshot();
        let dry = mover(&h)
            .move_or_copy(&from, "libs-other", options(false, true))
            .await
            .unwrap();
        assert_eq!(h.store.snapshot(), before);

        let real = mover(&h)
            .move_or_copy(&from, "libs-other", options(false, false))
            .await
            .unwrap();
        assert_eq!(dry.moved_count(), 2);
        assert_eq!(real.moved_count(), dry.moved_count());
        assert_eq!(real.warnings.len(), 1);

        // The excluded file keeps its folder alive, the emptied version folder is gone
        assert!(h.read("libs-release", "org/a/notes.tmp").await.is_some());
        assert!(!h
            .store
            .exists(&RepoPath::new("libs-release", "org/a/1.0"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn plain_file_move_removes_emptied_leaf() {
        let h = Harness::new(&config());
        h.put("libs-release", JAR, b"jar").await;

        let status = mover(&h)
            .move_or_copy(&RepoPath::new("libs-release", JAR), "libs-other", MoveOptions::default())
            .await
            .unwrap();
        assert_eq!(status.moved_count(), 1);
        assert!(!h
            .store
            .exists(&RepoPath::new("libs-release", "org/a/1.0"))
            .await
            .unwrap());
        assert!(h.read("libs-other", JAR).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn opposite_moves_over_same_paths_both_finish() {
        for _ in 0..20 {
            let h = Harness::new(&config());
            h.put("libs-release", "org/shared/a.jar", b"a").await;
            h.put("libs-release", "org/shared/c.jar", b"release").await;
            h.put("libs-other", "org/shared/b.jar", b"b").await;
            h.put("libs-other", "org/shared/c.jar", b"other").await;

            let forward = Arc::new(mover(&h));
            let backward = forward.clone();
            let there = tokio::spawn(async move {
                forward
                    .move_or_copy(
                        &RepoPath::new("libs-release", "org/shared"),
                        "libs-other",
                        MoveOptions::default(),
                    )
                    .await
            });
            let back = tokio::spawn(async move {
                backward
                    .move_or_copy(
                        &RepoPath::new("libs-other", "org/shared"),
                        "libs-release",
                        MoveOptions::default(),
                    )
                    .await
            });

            let (there, back) = tokio::time::timeout(Duration::from_secs(10), async {
                (there.await.unwrap(), back.await.unwrap())
            })
            .await
            .expect("opposite moves deadlocked");
            assert!(there.is_ok());
            assert!(back.is_ok());
        }
    }

    #[tokio::test]
    async fn cache_repository_is_not_a_target() {
        let h = Harness::new(&config());
        h.put("libs-release", JAR, b"jar").await;
        let err = mover(&h)
            .move_or_copy(&RepoPath::new("libs-release", JAR), "central-cache", options(true, false))
            .await
            .unwrap_err();
        assert!(matches!(err, DepotError::InvalidMoveTarget { .. }));
    }

    #[tokio::test]
    async fn search_result_move_prunes_emptied_folders() {
        let h = Harness::new(&config());
        h.put("libs-release", "org/b/1.0/b-1.0.jar", b"b").await;
        h.put("libs-release", "org/keep.txt", b"k").await;
        let (recalculator, mut rx) = QueuedRecalculator::new();
        let mover = h.service.mover(Arc::new(recalculator));

        let options = MoveOptions {
            search_result: true,
            run_metadata_recalc: true,
            ..Default::default()
        };
        let status = mover
            .move_or_copy(
                &RepoPath::new("libs-release", "org/b/1.0/b-1.0.jar"),
                "libs-other",
                options,
            )
            .await
            .unwrap();
        assert_eq!(status.moved_count(), 1);
        assert!(!h.store.exists(&RepoPath::new("libs-release", "org/b")).await.unwrap());
        assert!(h.store.exists(&RepoPath::new("libs-release", "org")).await.unwrap());

        let mut requests = Vec::new();
        while let Ok(request) = rx.try_recv() {
            requests.push(request);
        }
        assert!(requests.contains(&RecalcRequest::MarkBase(RepoPath::new("libs-other", "org/b/1.0"))));
        assert!(requests.contains(&RecalcRequest::Calculate(RepoPath::new("libs-release", "org"))));
    }

    #[tokio::test]
    async fn search_result_move_keeps_folder_with_siblings() {
        let h = Harness::new(&config());
        h.put("libs-release", "org/c/1.0/c-1.0.jar", b"jar").await;
        h.put("libs-release", "org/c/1.0/c-1.0.pom", b"pom").await;

        let options = MoveOptions {
            search_result: true,
            ..Default::default()
        };
        mover(&h)
            .move_or_copy(
                &RepoPath::new("libs-release", "org/c/1.0/c-1.0.jar"),
                "libs-other",
                options,
            )
            .await
            .unwrap();
        assert!(h.store.exists(&RepoPath::new("libs-release", "org/c/1.0")).await.unwrap());
        assert!(h.read("libs-release", "org/c/1.0/c-1.0.pom").await.is_some());
    }
}

mod configuration {
    use super::*;

    #[tokio::test]
    async fn service_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.toml");
        std::fs::write(
            &path,
            r#"
                [general]
                log_format = "json"

                [[local]]
                key = "libs-release"
                excludes_pattern = "**/*.tmp"

                [[remote]]
                key = "central"
                url = "https://repo1.maven.org/maven2"
                hard_fail = true
            "#,
        )
        .unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert_eq!(config.general.log_format, "json");
        assert!(config.remote_repos[0].hard_fail);

        let h = Harness::new(&config);
        assert_eq!(
            h.service.repositories().keys().collect::<Vec<_>>(),
            vec!["central", "central-cache", "libs-release"]
        );
    }

    #[tokio::test]
    async fn unknown_layout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.toml");
        std::fs::write(&path, "[[local]]\nkey = \"libs\"\nlayout = \"nope\"\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, DepotError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn reload_swaps_repositories_and_caches() {
        let h = Harness::new(&config());
        h.service.get_info(&central(RELEASE)).await.unwrap();
        let before = h.service.repositories();

        let mut config = config();
        config.local_repos.push(local("libs-new"));
        h.service.reload(&config).unwrap();

        assert!(h.service.repository("libs-new").is_ok());
        assert!(before.get("libs-new").is_none());

        // Fresh remote, fresh retrieval caches
        h.service.get_info(&central(RELEASE)).await.unwrap();
        assert_eq!(h.origin.probes(), 2);
        let old_remote = before.get("central").unwrap().as_remote().unwrap().clone();
        assert_eq!(old_remote.caches().missed.len(), 1);
    }
}
