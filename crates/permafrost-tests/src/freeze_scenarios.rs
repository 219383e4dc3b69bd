//! Freeze eviction end to end: staleness, excludes, and the
//! remote-presence gate, against real access times.

use crate::harness::{set_file_age, TestMirror};
use permafrost_core::{freeze_path, LocalBackend};
use std::fs;
use std::path::Path;

#[tokio::test]
async fn stale_backed_file_is_evicted() {
    let rig = TestMirror::with_policy(None, Some(2));
    rig.pull_and_wait("subdir").await;

    set_file_age(Path::new(&rig.local("subdir/subfile.txt")), 3);

    let outcome = freeze_path(rig.root(), &LocalBackend, &rig.local("subdir"), false, false)
        .await
        .unwrap();
    assert_eq!(outcome.files, vec![rig.local("subdir/subfile.txt")]);
    assert!(!Path::new(&rig.local("subdir/subfile.txt")).exists());
    // Recently accessed sibling stays.
    assert!(Path::new(&rig.local("subdir/subsubdir/subsubfile.txt")).exists());
}

#[tokio::test]
async fn file_exactly_at_freeze_age_is_kept() {
    let rig = TestMirror::with_policy(None, Some(2));
    rig.pull_and_wait("subdir").await;

    set_file_age(Path::new(&rig.local("subdir/subfile.txt")), 2);

    let outcome = freeze_path(rig.root(), &LocalBackend, &rig.local("subdir"), false, true)
        .await
        .unwrap();
    assert!(outcome.files.is_empty());
}

#[tokio::test]
async fn force_ignores_staleness_not_the_manifest() {
    let rig = TestMirror::with_policy(None, Some(2));
    rig.pull_and_wait("subdir").await;
    fs::write(rig.local("subdir/local_only.txt"), b"mine\n").unwrap();
    set_file_age(Path::new(&rig.local("subdir/local_only.txt")), 30);

    let outcome = freeze_path(rig.root(), &LocalBackend, &rig.local("subdir"), true, false)
        .await
        .unwrap();
    assert_eq!(outcome.files.len(), 2);
    assert!(!Path::new(&rig.local("subdir/subfile.txt")).exists());
    // Stale but not backed remotely: untouchable.
    assert!(Path::new(&rig.local("subdir/local_only.txt")).exists());
}

#[tokio::test]
async fn excluded_file_survives_forced_freeze() {
    let rig = TestMirror::with_policy(Some("*subfile.txt"), Some(2));
    rig.pull_and_wait("subdir").await;

    let outcome = freeze_path(rig.root(), &LocalBackend, &rig.local("subdir"), true, false)
        .await
        .unwrap();
    assert!(outcome.files.is_empty());
    assert!(Path::new(&rig.local("subdir/subfile.txt")).exists());
    assert!(Path::new(&rig.local("subdir/subsubdir/subsubfile.txt")).exists());
}

#[tokio::test]
async fn dry_run_reports_without_removing() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    let outcome = freeze_path(rig.root(), &LocalBackend, &rig.local("subdir"), true, true)
        .await
        .unwrap();
    assert_eq!(outcome.files.len(), 2);
    assert!(outcome.dry_run);
    assert!(Path::new(&rig.local("subdir/subfile.txt")).exists());
}

#[tokio::test]
async fn frozen_file_can_be_pulled_back() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    freeze_path(rig.root(), &LocalBackend, &rig.local("subdir"), true, false)
        .await
        .unwrap();
    assert!(!Path::new(&rig.local("subdir/subfile.txt")).exists());

    rig.pull_and_wait("subdir").await;
    assert_eq!(
        fs::read_to_string(rig.local("subdir/subfile.txt")).unwrap(),
        "subfile content\n"
    );
}

#[tokio::test]
async fn web_role_process_never_evicts() {
    let rig = TestMirror::web_role(Some(2));

    // Seed the root directly; the web runner will not pull either.
    fs::create_dir_all(rig.local("subdir")).unwrap();
    fs::write(rig.local("subdir/subfile.txt"), b"subfile content\n").unwrap();
    set_file_age(Path::new(&rig.local("subdir/subfile.txt")), 5);

    let id = rig.submit_freeze("subdir", false, false);
    let record = rig.wait(id).await;

    // Unprobed roots: the stale-looking file stays and the task errors.
    let error = record.error.expect("web role must not execute tasks");
    assert!(error.contains("worker role"), "got: {}", error);
    assert!(Path::new(&rig.local("subdir/subfile.txt")).exists());
}

#[tokio::test]
async fn freeze_task_through_the_runner() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    let id = rig.submit_freeze("subdir", true, false);
    let record = rig.wait(id).await;
    assert!(record.error.is_none());
    assert!(!Path::new(&rig.local("subdir/subfile.txt")).exists());
}
