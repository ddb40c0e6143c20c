//! Integration tests for home-census
//!
//! The remote namespaces are replaced by scripted in-memory listers, so
//! these tests exercise the full coordinator, checkpoint and report path
//! without network access.

use home_census::checkpoint::{open_store, CheckpointStore, JsonStore, SqliteStore};
use home_census::error::{CensusError, ListError};
use home_census::listing::{ListEntry, MemoryLister, Namespace};
use home_census::report::{FinalReport, CSV_HEADER};
use home_census::retry::{RetryConfig, RetryPolicy};
use home_census::scanner::{
    partition, Coordinator, CoordinatorOptions, FileSource, NamespaceScanner, ScanResult,
    ScanStatus, UserScanner,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn instant_retry() -> RetryConfig {
    RetryConfig {
        base_delay: Duration::ZERO,
        min_pacing: Duration::ZERO,
        max_pacing: Duration::ZERO,
        ..RetryConfig::default()
    }
}

fn factory(
    dbfs: MemoryLister,
    workspace: MemoryLister,
    shutdown: Arc<AtomicBool>,
) -> impl FnMut(usize) -> home_census::Result<UserScanner> {
    move |_| {
        let policy = || RetryPolicy::new(instant_retry()).with_cancel(Arc::clone(&shutdown));
        Ok(UserScanner::new(
            NamespaceScanner::new(Namespace::Dbfs, Box::new(dbfs.clone()), policy(), 10),
            NamespaceScanner::new(Namespace::Workspace, Box::new(workspace.clone()), policy(), 10),
        ))
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn options(workers: usize, resume: bool) -> CoordinatorOptions {
    CoordinatorOptions {
        workers,
        resume,
        ..CoordinatorOptions::default()
    }
}

/// u1: DBFS 5 x 100 bytes, no Workspace home
/// u2: nothing anywhere
/// u3: DBFS times out on every attempt, Workspace has 2 notebooks
fn scenario() -> (MemoryLister, MemoryLister) {
    let dbfs = MemoryLister::new("dbfs").with_files("/Users/u1", 5, 100).fail_always(
        "/Users/u3",
        ListError::Network {
            path: "/Users/u3".into(),
            reason: "operation timed out".into(),
        },
    );
    let workspace = MemoryLister::new("workspace").with_files("/Users/u3", 2, 0);
    (dbfs, workspace)
}

fn run(
    path: &Path,
    usernames: &[String],
    workers: usize,
    resume: bool,
    listers: (MemoryLister, MemoryLister),
) -> home_census::RunOutcome {
    let store = open_store(path).unwrap();
    let mut coordinator = Coordinator::new(options(workers, resume), store);
    let shutdown = coordinator.shutdown_flag();
    coordinator
        .run(usernames, factory(listers.0, listers.1, shutdown))
        .unwrap()
}

fn csv(report: &FinalReport) -> String {
    let mut out = Vec::new();
    report.write_csv(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_end_to_end_scenario() {
    let dir = tempdir().unwrap();
    let outcome = run(
        &dir.path().join("census.json"),
        &names(&["u1", "u2", "u3"]),
        3,
        false,
        scenario(),
    );

    assert!(outcome.is_complete());
    let text = csv(&outcome.report);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            CSV_HEADER,
            "u1,5,500,0.00,success,source_a,",
            "u2,0,0,0.00,empty,none,",
            "u3,2,20480,0.00,success,source_b,",
        ]
    );
}

#[test]
fn test_both_namespaces_failing_is_an_error_row() {
    let dir = tempdir().unwrap();
    let dbfs = MemoryLister::new("dbfs").fail_always(
        "/Users/x",
        ListError::Server {
            path: "/Users/x".into(),
            status: 503,
        },
    );
    let workspace = MemoryLister::new("workspace")
        .fail_always("/Users/x", ListError::RateLimited { path: "/Users/x".into() });

    let outcome = run(&dir.path().join("c.json"), &names(&["x"]), 1, false, (dbfs, workspace));

    let row = &outcome.report.rows()[0];
    assert_eq!(row.status, ScanStatus::Error);
    assert_eq!(row.file_count, 0);
    assert_eq!(row.source, FileSource::None);
    assert!(row.error.as_deref().unwrap().contains("Server error 503"));
}

#[test]
fn test_disabled_dbfs_root_reports_empty_users() {
    let dir = tempdir().unwrap();
    let users: Vec<String> = (0..60).map(|i| format!("u{i}")).collect();

    let mut dbfs = MemoryLister::new("dbfs");
    for user in &users {
        let root = format!("/Users/{user}");
        dbfs = dbfs.fail_always(&root, ListError::PermissionDenied { path: root.clone() });
    }
    let workspace = MemoryLister::new("workspace").with_files("/Users/u7", 3, 0);

    let outcome = run(&dir.path().join("c.json"), &users, 4, false, (dbfs, workspace));

    assert!(outcome.is_complete());
    let summary = outcome.report.summary();
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.empty, 59);
    assert_eq!(summary.success, 1);
    assert_eq!(outcome.report.rows()[7], ScanResult::success("u7", 3, 30720, FileSource::SourceB));
}

#[test]
fn test_idempotent_resume_matches_uninterrupted_run() {
    let all = names(&["u1", "u2", "u3", "u4"]);
    let listers = || {
        let (dbfs, workspace) = scenario();
        (dbfs.with_files("/Users/u4", 1, 7), workspace)
    };

    let dir = tempdir().unwrap();
    let reference = run(&dir.path().join("reference.json"), &all, 2, false, listers());

    let path = dir.path().join("resumed.json");
    run(&path, &names(&["u1", "u2"]), 2, false, listers());

    let (dbfs, workspace) = listers();
    let resumed = run(&path, &all, 2, true, (dbfs.clone(), workspace.clone()));

    assert_eq!(resumed.resumed, 2);
    assert_eq!(resumed.newly_scanned, 2);
    assert_eq!(resumed.report, reference.report);

    // u1 and u2 were never listed again: u3 (5 failing attempts) + u4
    assert_eq!(dbfs.calls(), 6);
    assert_eq!(workspace.calls(), 2);
}

#[test]
fn test_resume_with_nothing_left_scans_nobody() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("c.db");
    let users = names(&["u1", "u2"]);
    run(&path, &users, 1, false, scenario());

    let (dbfs, workspace) = scenario();
    let outcome = run(&path, &users, 4, true, (dbfs.clone(), workspace));
    assert_eq!(outcome.newly_scanned, 0);
    assert_eq!(outcome.report.len(), 2);
    assert_eq!(dbfs.calls(), 0);
}

#[test]
fn test_report_follows_input_order() {
    let dir = tempdir().unwrap();
    let dbfs = MemoryLister::new("dbfs")
        .with_files("/Users/u3", 1, 1)
        .with_latency("/Users/u3", Duration::from_millis(80))
        .with_files("/Users/u1", 1, 1)
        .with_latency("/Users/u1", Duration::from_millis(40))
        .with_files("/Users/u2", 1, 1);

    let store = open_store(&dir.path().join("c.json")).unwrap();
    let mut coordinator = Coordinator::new(options(3, false), store);
    let shutdown = coordinator.shutdown_flag();
    let mut completion_order = Vec::new();
    let outcome = coordinator
        .run_with_progress(
            &names(&["u3", "u1", "u2"]),
            factory(dbfs, MemoryLister::new("workspace"), shutdown),
            |event| completion_order.push(event.username.clone()),
        )
        .unwrap();

    let rows: Vec<&str> = outcome.report.rows().iter().map(|r| r.username.as_str()).collect();
    assert_eq!(rows, vec!["u3", "u1", "u2"]);
    assert_eq!(completion_order.len(), 3);
}

#[test]
fn test_interrupted_run_checkpoints_completed_users_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("c.json");
    let users: Vec<String> = (0..10).map(|i| format!("user{i}")).collect();

    let mut dbfs = MemoryLister::new("dbfs");
    for user in &users {
        let root = format!("/Users/{user}");
        dbfs = dbfs
            .with_files(&root, 2, 10)
            .with_latency(&root, Duration::from_millis(20));
    }

    let store = open_store(&path).unwrap();
    let mut coordinator = Coordinator::new(options(1, false), store);
    let shutdown = coordinator.shutdown_flag();
    let trigger = Arc::clone(&shutdown);
    let outcome = coordinator
        .run_with_progress(
            &users,
            factory(dbfs.clone(), MemoryLister::new("workspace"), shutdown),
            |event| {
                if event.sequence_index == 2 {
                    trigger.store(true, Ordering::SeqCst);
                }
            },
        )
        .unwrap();

    let interruption = outcome.interruption.clone().expect("run should be interrupted");
    assert_eq!(interruption.total, 10);
    assert!(interruption.completed >= 2 && interruption.completed < 10);
    assert!(interruption.last_username.is_some());

    let saved = JsonStore::open(&path).unwrap().load().unwrap();
    assert_eq!(saved.completed(), interruption.completed);
    for row in outcome.report.rows() {
        assert_eq!(saved.get(&row.username), Some(row));
    }

    // Resume finishes the rest without rescanning anyone
    let resumed = run(&path, &users, 2, true, (dbfs, MemoryLister::new("workspace")));
    assert!(resumed.is_complete());
    assert_eq!(resumed.resumed, interruption.completed);
    assert_eq!(resumed.report.len(), 10);
    assert!(resumed
        .report
        .rows()
        .iter()
        .all(|r| *r == ScanResult::success(&r.username, 2, 20, FileSource::SourceA)));
}

#[test]
fn test_sqlite_checkpoint_end_to_end() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("census.sqlite");
    let outcome = run(&path, &names(&["u1", "u2", "u3"]), 2, false, scenario());
    assert_eq!(outcome.completed, 3);

    let mut store = SqliteStore::open(&path).unwrap();
    let checkpoint = store.load().unwrap();
    assert_eq!(checkpoint.completed(), 3);
    assert_eq!(checkpoint.get("u3").unwrap().source, FileSource::SourceB);
}

#[test]
fn test_deep_trees_are_truncated_not_failed() {
    let dir = tempdir().unwrap();
    let mut dbfs = MemoryLister::new("dbfs");
    let mut path = "/Users/deep".to_string();
    for level in 0..15 {
        let child = format!("{path}/d{level}");
        dbfs = dbfs.with_dir(
            &path,
            vec![ListEntry::directory(child.clone()), ListEntry::file(format!("{path}/f"), Some(1))],
        );
        path = child;
    }

    let outcome = run(&dir.path().join("c.json"), &names(&["deep"]), 1, false, (dbfs, MemoryLister::new("ws")));
    let row = &outcome.report.rows()[0];
    assert_eq!(row.status, ScanStatus::Success);
    // Root plus ten levels below it
    assert_eq!(row.file_count, 11);
}

#[test]
fn test_partition_completeness_large_input() {
    let users: Vec<String> = (0..1234).map(|i| format!("u{i}")).collect();
    let units = partition(&users, 200);
    assert_eq!(units.len(), 200);

    let mut seen = HashSet::new();
    for unit in &units {
        assert!(!unit.is_empty());
        for u in &unit.usernames {
            assert!(seen.insert(u.clone()), "duplicate {u}");
        }
    }
    assert_eq!(seen.len(), users.len());
}

#[test]
fn test_missing_strategy_aborts_before_any_scan() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("c.json");
    let store = open_store(&path).unwrap();
    let mut coordinator = Coordinator::new(options(2, false), store);

    let err = coordinator
        .run(&names(&["u1"]), |_| {
            Err(home_census::error::WorkerError::NoStrategy {
                namespace: Namespace::Workspace.to_string(),
            }
            .into())
        })
        .unwrap_err();

    assert!(matches!(err, CensusError::Worker(_)));
    assert!(!path.exists());
}
