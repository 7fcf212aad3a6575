//! Integration tests for the crawl engine
//!
//! These tests drive full phase runs against a scripted upstream and an
//! in-memory SQLite database.

use crate::support::*;
use chrono::{Duration, Utc};
use issue_harvest::engine::EngineSettings;
use issue_harvest::storage::{JobTracker, RepoStore, RunLog, RunStatus};
use issue_harvest::upstream::UpstreamError;
use issue_harvest::{HarvestError, Phase, PhaseOutcome};

#[tokio::test]
async fn test_ingest_stores_only_dominant_repos_with_qualifying_issues() {
    let (engine, upstream, languages) = setup(&["Go", "Rust"], EngineSettings::default());
    let (go, rust) = (&languages[0], &languages[1]);

    upstream.set_search(
        "Go",
        Ok(vec![repo_handle(1, "acme/gopher"), repo_handle(2, "acme/mostly-c")]),
    );
    upstream.set_shares(1, Ok(shares(&[("Go", 9000), ("Shell", 120)])));
    upstream.set_issues(
        1,
        Ok(vec![
            issue_handle(101, 1),
            locked_issue(102, 2),
            pull_request(103, 3),
        ]),
    );
    upstream.set_shares(2, Ok(shares(&[("C", 9000), ("Go", 10)])));
    upstream.set_issues(2, Ok(vec![issue_handle(201, 1)]));

    let archived = issue_harvest::upstream::RepoHandle {
        archived: true,
        ..repo_handle(3, "acme/old-rust")
    };
    upstream.set_search(
        "Rust",
        Ok(vec![archived, repo_handle(4, "acme/quiet-rust")]),
    );
    upstream.set_shares(3, Ok(shares(&[("Rust", 100)])));
    upstream.set_shares(4, Ok(shares(&[("Rust", 100)])));
    upstream.set_issues(4, Ok(vec![closed_issue(401, 1)]));

    let outcome = engine.run_phase(Phase::Ingest).await.unwrap();

    let report = match outcome {
        PhaseOutcome::Completed(report) => report,
        other => panic!("Expected a completed run, got {:?}", other),
    };
    assert_eq!(report.languages_completed, 2);
    assert_eq!(report.repos_stored, 1);
    assert_eq!(report.repos_skipped, 3);
    assert_eq!(report.issues_stored, 1);
    assert!(report.cycle_reset);

    let storage = engine.storage().lock().unwrap();
    let stored = storage.get_repo(1).unwrap().expect("repo 1 stored");
    assert_eq!(stored.language_id, go.id);
    assert_eq!(stored.issues.keys().copied().collect::<Vec<_>>(), vec![101]);
    for repo_id in [2, 3, 4] {
        assert!(storage.get_repo(repo_id).unwrap().is_none());
    }
    assert_eq!(storage.count_repos(rust.id).unwrap(), 0);

    // The finished cycle cleared every checkpoint
    assert_eq!(storage.get_job(Phase::Ingest, go.id).unwrap(), None);
    assert_eq!(storage.get_job(Phase::Ingest, rust.id).unwrap(), None);
}

#[tokio::test]
async fn test_go_scenario_marks_go_complete_and_reaches_rust() {
    let (engine, upstream, languages) = setup(&["Go", "Rust"], EngineSettings::default());
    let (go, rust) = (&languages[0], &languages[1]);

    let archived = issue_harvest::upstream::RepoHandle {
        archived: true,
        ..repo_handle(1, "acme/archived")
    };
    upstream.set_search(
        "Go",
        Ok(vec![
            archived,
            repo_handle(2, "acme/silent"),
            repo_handle(3, "acme/busy"),
        ]),
    );
    for repo_id in [1, 2, 3] {
        upstream.set_shares(repo_id, Ok(shares(&[("Go", 1000)])));
    }
    upstream.set_issues(3, Ok(vec![issue_handle(301, 1), issue_handle(302, 2)]));
    // Stop the run inside Rust so the Go checkpoint survives the run
    upstream.set_search("Rust", Err(rate_limited()));

    engine.run_phase(Phase::Ingest).await.unwrap();

    assert_eq!(upstream.search_calls(), vec!["Go", "Rust"]);

    let storage = engine.storage().lock().unwrap();
    assert_eq!(storage.count_repos(go.id).unwrap(), 1);
    assert_eq!(storage.count_issues(go.id).unwrap(), 2);
    assert!(storage.get_repo(3).unwrap().is_some());
    assert!(storage.get_job(Phase::Ingest, go.id).unwrap().is_some());
    assert!(storage.get_job(Phase::Ingest, rust.id).unwrap().is_none());
}

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let (engine, upstream, languages) = setup(&["Go"], EngineSettings::default());

    upstream.set_search("Go", Ok(vec![repo_handle(1, "acme/gopher")]));
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));
    upstream.set_issues(1, Ok(vec![issue_handle(101, 1), issue_handle(102, 2)]));

    engine.run_phase(Phase::Ingest).await.unwrap();
    engine.run_phase(Phase::Ingest).await.unwrap();

    let storage = engine.storage().lock().unwrap();
    assert_eq!(storage.count_repos(languages[0].id).unwrap(), 1);
    assert_eq!(storage.count_issues(languages[0].id).unwrap(), 2);
}

#[tokio::test]
async fn test_rate_limit_aborts_run_and_next_run_resumes() {
    let (engine, upstream, languages) = setup(&["Go", "Rust"], EngineSettings::default());
    let (go, rust) = (&languages[0], &languages[1]);

    upstream.set_search("Go", Ok(vec![repo_handle(1, "acme/gopher")]));
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));
    upstream.set_issues(1, Ok(vec![issue_handle(101, 1)]));
    upstream.set_search("Rust", Err(rate_limited()));

    let outcome = engine.run_phase(Phase::Ingest).await.unwrap();
    assert!(matches!(outcome, PhaseOutcome::RateLimited(_)));

    {
        let storage = engine.storage().lock().unwrap();
        assert!(storage.get_job(Phase::Ingest, go.id).unwrap().is_some());
        assert!(storage.get_job(Phase::Ingest, rust.id).unwrap().is_none());
        assert!(storage.get_repo(1).unwrap().is_some());

        let runs = storage.recent_runs(1).unwrap();
        assert_eq!(runs[0].status, RunStatus::RateLimited);
    }

    upstream.set_search("Rust", Ok(vec![repo_handle(2, "acme/crab")]));
    upstream.set_shares(2, Ok(shares(&[("Rust", 10)])));
    upstream.set_issues(2, Ok(vec![issue_handle(201, 1)]));

    let outcome = engine.run_phase(Phase::Ingest).await.unwrap();
    let report = outcome.report().cloned().unwrap();
    assert!(matches!(outcome, PhaseOutcome::Completed(_)));
    assert_eq!(report.languages_skipped, 1);
    assert_eq!(report.languages_completed, 1);

    // Go was not searched again on the resumed run
    assert_eq!(upstream.search_calls(), vec!["Go", "Rust", "Rust"]);

    let storage = engine.storage().lock().unwrap();
    assert!(storage.get_repo(2).unwrap().is_some());
    assert!(storage.get_job(Phase::Ingest, go.id).unwrap().is_none());
    assert!(storage.get_job(Phase::Ingest, rust.id).unwrap().is_none());
}

#[tokio::test]
async fn test_rate_limit_mid_language_keeps_stored_repos() {
    let (engine, upstream, languages) = setup(&["Go"], EngineSettings::default());

    upstream.set_search(
        "Go",
        Ok(vec![repo_handle(1, "acme/first"), repo_handle(2, "acme/second")]),
    );
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));
    upstream.set_issues(1, Ok(vec![issue_handle(101, 1)]));
    upstream.set_shares(2, Err(rate_limited()));

    let outcome = engine.run_phase(Phase::Ingest).await.unwrap();
    assert!(matches!(outcome, PhaseOutcome::RateLimited(_)));

    let storage = engine.storage().lock().unwrap();
    assert!(storage.get_repo(1).unwrap().is_some());
    assert!(storage.get_repo(2).unwrap().is_none());
    assert!(storage
        .get_job(Phase::Ingest, languages[0].id)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failed_search_defers_language_without_aborting() {
    let (engine, upstream, _languages) = setup(&["Go", "Rust"], EngineSettings::default());

    upstream.set_search("Go", Err(transient()));
    upstream.set_search("Rust", Ok(vec![]));

    let outcome = engine.run_phase(Phase::Ingest).await.unwrap();

    let report = outcome.report().cloned().unwrap();
    assert!(matches!(outcome, PhaseOutcome::Completed(_)));
    assert_eq!(report.languages_deferred, 1);
    assert_eq!(report.languages_completed, 1);
    assert_eq!(upstream.search_calls(), vec!["Go", "Rust"]);
}

#[tokio::test]
async fn test_unavailable_language_shares_skip_candidate() {
    let (engine, upstream, _languages) = setup(&["Go"], EngineSettings::default());

    upstream.set_search(
        "Go",
        Ok(vec![repo_handle(1, "acme/first"), repo_handle(2, "acme/second")]),
    );
    upstream.set_shares(1, Err(transient()));
    upstream.set_shares(2, Ok(shares(&[("Go", 10)])));
    upstream.set_issues(2, Ok(vec![issue_handle(201, 1)]));

    let outcome = engine.run_phase(Phase::Ingest).await.unwrap();
    assert!(matches!(outcome, PhaseOutcome::Completed(_)));

    let storage = engine.storage().lock().unwrap();
    assert!(storage.get_repo(1).unwrap().is_none());
    assert!(storage.get_repo(2).unwrap().is_some());
}

#[tokio::test]
async fn test_unreadable_timestamp_fails_run() {
    let (engine, upstream, _languages) = setup(&["Go"], EngineSettings::default());

    let broken = issue_harvest::upstream::RepoHandle {
        created_at: None,
        ..repo_handle(1, "acme/broken")
    };
    upstream.set_search("Go", Ok(vec![broken]));
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));
    upstream.set_issues(1, Ok(vec![issue_handle(101, 1)]));

    let result = engine.run_phase(Phase::Ingest).await;
    assert!(matches!(result, Err(HarvestError::TemporalData { .. })));

    let storage = engine.storage().lock().unwrap();
    let runs = storage.recent_runs(1).unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].finished_at.is_some());
}

#[tokio::test]
async fn test_runs_record_config_hash() {
    let (engine, _upstream, _languages) = setup(&["Go"], refresh_everything());

    engine.run_phase(Phase::Prune).await.unwrap();

    let storage = engine.storage().lock().unwrap();
    let runs = storage.recent_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].phase, Phase::Prune);
    assert_eq!(runs[0].config_hash, "test-hash");
    assert_eq!(runs[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn test_refresh_updates_repo_and_filters_issues() {
    let (engine, upstream, languages) = setup(&["Go"], refresh_everything());
    let go = &languages[0];

    let handle = repo_handle(1, "acme/gopher");
    let previous = stored_repo(
        &handle,
        go,
        &[
            issue_handle(101, 1),
            issue_handle(102, 2),
            issue_handle(103, 3),
            issue_handle(104, 4),
            issue_handle(105, 5),
        ],
        hours_ago(3),
    );
    engine
        .storage()
        .lock()
        .unwrap()
        .upsert_repo(&previous)
        .unwrap();

    let renamed = issue_harvest::upstream::RepoHandle {
        stargazers_count: 500,
        ..handle.clone()
    };
    upstream.set_repo(1, Ok(renamed));
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));

    let retitled = issue_harvest::upstream::IssueHandle {
        title: "Crash on startup".to_string(),
        comments: 4,
        ..issue_handle(101, 1)
    };
    upstream.set_issue(1, 1, Ok(Some(retitled)));
    upstream.set_issue(1, 2, Ok(Some(closed_issue(102, 2))));
    upstream.set_issue(1, 3, Ok(Some(locked_issue(103, 3))));
    // #4 is unscripted and therefore not found
    upstream.set_issue(1, 5, Err(transient()));

    let outcome = engine.run_phase(Phase::Refresh).await.unwrap();
    let report = outcome.report().cloned().unwrap();
    assert_eq!(report.repos_updated, 1);
    assert_eq!(report.issues_dropped, 3);
    assert_eq!(report.issues_preserved, 1);

    let storage = engine.storage().lock().unwrap();
    let refreshed = storage.get_repo(1).unwrap().unwrap();
    assert_eq!(refreshed.stargazers_count, 500);
    assert!(refreshed.refreshed_at > previous.refreshed_at);
    assert_eq!(
        refreshed.issues.keys().copied().collect::<Vec<_>>(),
        vec![101, 105]
    );
    assert_eq!(refreshed.issues[&101].title, "Crash on startup");
    assert_eq!(refreshed.issues[&101].comments_count, 4);
    assert_eq!(refreshed.issues[&105], previous.issues[&105]);
}

#[tokio::test]
async fn test_refresh_deletes_repos_that_no_longer_qualify() {
    let (engine, upstream, languages) = setup(&["Go"], refresh_everything());
    let go = &languages[0];
    let an_hour_ago = hours_ago(1);

    {
        let mut storage = engine.storage().lock().unwrap();
        for (id, name) in [(1, "acme/gone"), (2, "acme/archived"), (3, "acme/ported")] {
            let repo = stored_repo(
                &repo_handle(id, name),
                go,
                &[issue_handle(id * 100, 1)],
                an_hour_ago,
            );
            storage.upsert_repo(&repo).unwrap();
        }
    }

    // Repo 1 is unscripted and therefore not found
    upstream.set_repo(
        2,
        Ok(issue_harvest::upstream::RepoHandle {
            archived: true,
            ..repo_handle(2, "acme/archived")
        }),
    );
    upstream.set_repo(3, Ok(repo_handle(3, "acme/ported")));
    upstream.set_shares(3, Ok(shares(&[("Go", 10), ("Rust", 5000)])));

    let outcome = engine.run_phase(Phase::Refresh).await.unwrap();
    assert_eq!(outcome.report().unwrap().repos_deleted, 3);

    let storage = engine.storage().lock().unwrap();
    assert_eq!(storage.count_repos(go.id).unwrap(), 0);
    assert_eq!(storage.count_issues(go.id).unwrap(), 0);
}

#[tokio::test]
async fn test_refresh_leaves_repo_untouched_on_transient_lookup_failure() {
    let (engine, upstream, languages) = setup(&["Go"], refresh_everything());

    let previous = stored_repo(
        &repo_handle(1, "acme/gopher"),
        &languages[0],
        &[issue_handle(101, 1)],
        hours_ago(3),
    );
    engine
        .storage()
        .lock()
        .unwrap()
        .upsert_repo(&previous)
        .unwrap();
    upstream.set_repo(1, Err(transient()));

    let outcome = engine.run_phase(Phase::Refresh).await.unwrap();
    assert_eq!(outcome.report().unwrap().repos_skipped, 1);

    let storage = engine.storage().lock().unwrap();
    assert_eq!(storage.get_repo(1).unwrap().unwrap(), previous);
}

#[tokio::test]
async fn test_refresh_rate_limit_leaves_repo_unsaved() {
    let (engine, upstream, languages) = setup(&["Go"], refresh_everything());

    let previous = stored_repo(
        &repo_handle(1, "acme/gopher"),
        &languages[0],
        &[issue_handle(101, 1), issue_handle(102, 2)],
        hours_ago(3),
    );
    engine
        .storage()
        .lock()
        .unwrap()
        .upsert_repo(&previous)
        .unwrap();

    upstream.set_repo(1, Ok(repo_handle(1, "acme/gopher")));
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));
    upstream.set_issue(1, 1, Ok(Some(closed_issue(101, 1))));
    upstream.set_issue(1, 2, Err(rate_limited()));

    let outcome = engine.run_phase(Phase::Refresh).await.unwrap();
    assert!(matches!(outcome, PhaseOutcome::RateLimited(_)));

    let storage = engine.storage().lock().unwrap();
    assert_eq!(storage.get_repo(1).unwrap().unwrap(), previous);
    assert!(storage
        .get_job(Phase::Refresh, languages[0].id)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_refresh_skips_recently_refreshed_repos() {
    let (engine, upstream, languages) = setup(&["Go"], EngineSettings::default());

    let fresh = stored_repo(
        &repo_handle(1, "acme/gopher"),
        &languages[0],
        &[issue_handle(101, 1)],
        Utc::now() - Duration::minutes(5),
    );
    engine.storage().lock().unwrap().upsert_repo(&fresh).unwrap();

    let outcome = engine.run_phase(Phase::Refresh).await.unwrap();

    assert_eq!(outcome.report().unwrap().repos_updated, 0);
    assert!(upstream.issue_lookups().is_empty());
}

#[tokio::test]
async fn test_prune_deletes_stale_and_empty_repos() {
    let (engine, _upstream, languages) = setup(&["Go"], EngineSettings::default());
    let go = &languages[0];

    {
        let mut storage = engine.storage().lock().unwrap();
        let stale = stored_repo(
            &repo_handle(1, "acme/stale"),
            go,
            &[issue_handle(101, 1)],
            hours_ago(100),
        );
        let healthy = stored_repo(
            &repo_handle(2, "acme/healthy"),
            go,
            &[issue_handle(201, 1)],
            hours_ago(1),
        );
        let empty = stored_repo(
            &repo_handle(3, "acme/empty"),
            go,
            &[],
            hours_ago(1),
        );
        for repo in [&stale, &healthy, &empty] {
            storage.upsert_repo(repo).unwrap();
        }
    }

    let outcome = engine.run_phase(Phase::Prune).await.unwrap();
    assert_eq!(outcome.report().unwrap().repos_deleted, 2);

    let storage = engine.storage().lock().unwrap();
    assert!(storage.get_repo(1).unwrap().is_none());
    assert!(storage.get_repo(2).unwrap().is_some());
    assert!(storage.get_repo(3).unwrap().is_none());
    assert!(storage.list_jobs().unwrap().is_empty());
}

#[tokio::test]
async fn test_same_phase_overlap_is_skipped() {
    let (engine, upstream, _languages) = setup(&["Go"], EngineSettings::default());
    let gate = upstream.gate_search();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_phase(Phase::Ingest).await })
    };

    while !engine.is_running(Phase::Ingest) {
        tokio::task::yield_now().await;
    }

    let second = engine.run_phase(Phase::Ingest).await.unwrap();
    assert_eq!(second, PhaseOutcome::Skipped);

    // Other phases are not blocked
    let prune = engine.run_phase(Phase::Prune).await.unwrap();
    assert!(matches!(prune, PhaseOutcome::Completed(_)));

    gate.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, PhaseOutcome::Completed(_)));
    assert!(!engine.is_running(Phase::Ingest));
}

#[tokio::test]
async fn test_refresh_rate_limit_resumes_at_unfinished_language() {
    let (engine, upstream, languages) = setup(&["Go", "Rust"], refresh_everything());
    let (go, rust) = (&languages[0], &languages[1]);

    {
        let mut storage = engine.storage().lock().unwrap();
        for (id, name, language) in [(1, "acme/gopher", go), (2, "acme/crab", rust)] {
            let repo = stored_repo(
                &repo_handle(id, name),
                language,
                &[issue_handle(id * 100 + 1, 1)],
                hours_ago(3),
            );
            storage.upsert_repo(&repo).unwrap();
        }
    }

    upstream.set_repo(1, Ok(repo_handle(1, "acme/gopher")));
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));
    upstream.set_issue(1, 1, Ok(Some(issue_handle(101, 1))));
    upstream.set_repo(2, Ok(repo_handle(2, "acme/crab")));
    upstream.set_shares(2, Ok(shares(&[("Rust", 10)])));
    upstream.set_issue(2, 1, Err(rate_limited()));

    let outcome = engine.run_phase(Phase::Refresh).await.unwrap();
    assert!(matches!(outcome, PhaseOutcome::RateLimited(_)));
    assert!(!outcome.report().unwrap().cycle_reset);

    {
        let storage = engine.storage().lock().unwrap();
        assert!(storage.get_job(Phase::Refresh, go.id).unwrap().is_some());
        assert!(storage.get_job(Phase::Refresh, rust.id).unwrap().is_none());
    }

    upstream.set_issue(2, 1, Ok(Some(issue_handle(201, 1))));

    let outcome = engine.run_phase(Phase::Refresh).await.unwrap();
    let report = outcome.report().cloned().unwrap();
    assert!(matches!(outcome, PhaseOutcome::Completed(_)));
    assert_eq!(report.languages_skipped, 1);
    assert_eq!(report.languages_completed, 1);
    assert_eq!(report.repos_updated, 1);

    // Go was not re-checked on the resumed run
    assert_eq!(upstream.issue_lookups(), vec![(1, 1), (2, 1), (2, 1)]);

    let storage = engine.storage().lock().unwrap();
    assert!(storage.list_jobs().unwrap().is_empty());
    assert_eq!(storage.count_issues(rust.id).unwrap(), 1);
}

#[tokio::test]
async fn test_refresh_cycle_resets_after_clean_run() {
    let (engine, upstream, languages) = setup(&["Go"], refresh_everything());

    let gopher = stored_repo(
        &repo_handle(1, "acme/gopher"),
        &languages[0],
        &[issue_handle(101, 1)],
        hours_ago(3),
    );
    engine.storage().lock().unwrap().upsert_repo(&gopher).unwrap();
    upstream.set_repo(1, Ok(repo_handle(1, "acme/gopher")));
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));
    upstream.set_issue(1, 1, Ok(Some(issue_handle(101, 1))));

    let first = engine.run_phase(Phase::Refresh).await.unwrap();
    assert!(first.report().unwrap().cycle_reset);
    assert!(engine.storage().lock().unwrap().list_jobs().unwrap().is_empty());

    // The next run starts a fresh cycle and checks Go again
    let second = engine.run_phase(Phase::Refresh).await.unwrap();
    let report = second.report().cloned().unwrap();
    assert_eq!(report.languages_skipped, 0);
    assert_eq!(report.languages_completed, 1);
    assert!(report.cycle_reset);
    assert_eq!(upstream.issue_lookups(), vec![(1, 1), (1, 1)]);
}

#[tokio::test]
async fn test_refresh_drops_deleted_issues() {
    let (engine, upstream, languages) = setup(&["Go"], refresh_everything());

    let gopher = stored_repo(
        &repo_handle(1, "acme/gopher"),
        &languages[0],
        &[issue_handle(101, 1), issue_handle(102, 2)],
        hours_ago(3),
    );
    engine.storage().lock().unwrap().upsert_repo(&gopher).unwrap();
    upstream.set_repo(1, Ok(repo_handle(1, "acme/gopher")));
    upstream.set_shares(1, Ok(shares(&[("Go", 10)])));
    upstream.set_issue(1, 1, Err(UpstreamError::Gone("issue 1".to_string())));
    upstream.set_issue(1, 2, Ok(Some(issue_handle(102, 2))));

    let outcome = engine.run_phase(Phase::Refresh).await.unwrap();
    let report = outcome.report().cloned().unwrap();
    assert_eq!(report.issues_dropped, 1);
    assert_eq!(report.issues_preserved, 0);
    assert_eq!(report.repos_updated, 1);

    let storage = engine.storage().lock().unwrap();
    let refreshed = storage.get_repo(1).unwrap().unwrap();
    assert_eq!(refreshed.issues.keys().copied().collect::<Vec<_>>(), vec![102]);
}

#[tokio::test]
async fn test_prune_failure_in_one_language_does_not_stop_others() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.db");
    let (engine, _upstream, languages) =
        setup_on_disk(&path, &["Rust", "Go"], EngineSettings::default());
    let (rust, go) = (&languages[0], &languages[1]);

    {
        let mut storage = engine.storage().lock().unwrap();
        let crab = stored_repo(&repo_handle(1, "acme/crab"), rust, &[], hours_ago(100));
        let gopher = stored_repo(&repo_handle(2, "acme/gopher"), go, &[], hours_ago(100));
        storage.upsert_repo(&crab).unwrap();
        storage.upsert_repo(&gopher).unwrap();
    }

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER keep_rust_repos BEFORE DELETE ON repos
         WHEN OLD.language_id = {}
         BEGIN SELECT RAISE(ABORT, 'repository is locked'); END;",
        rust.id
    ))
    .unwrap();

    let outcome = engine.run_phase(Phase::Prune).await.unwrap();
    let report = outcome.report().cloned().unwrap();
    assert!(matches!(outcome, PhaseOutcome::Completed(_)));
    assert_eq!(report.languages_deferred, 1);
    assert_eq!(report.languages_completed, 1);
    assert_eq!(report.repos_deleted, 1);

    let storage = engine.storage().lock().unwrap();
    assert!(storage.get_repo(1).unwrap().is_some());
    assert!(storage.get_repo(2).unwrap().is_none());
    assert_eq!(storage.recent_runs(1).unwrap()[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn test_prune_with_unrepresentable_threshold_keeps_repos() {
    let settings = EngineSettings {
        prune_after: Duration::MAX,
        ..EngineSettings::default()
    };
    let (engine, _upstream, languages) = setup(&["Go"], settings);

    let ancient = stored_repo(
        &repo_handle(1, "acme/ancient"),
        &languages[0],
        &[issue_handle(101, 1)],
        hours_ago(24 * 365 * 20),
    );
    engine.storage().lock().unwrap().upsert_repo(&ancient).unwrap();

    let outcome = engine.run_phase(Phase::Prune).await.unwrap();
    assert_eq!(outcome.report().unwrap().repos_deleted, 0);
    assert!(engine.storage().lock().unwrap().get_repo(1).unwrap().is_some());
}
