//! Hierarchical coordination over the shared sqlite ledger.

use crate::harness::TestMirror;
use permafrost_core::TaskKind;
use std::path::Path;

#[tokio::test]
async fn identical_requests_share_one_task() {
    let rig = TestMirror::new();
    let first = rig.submit_pull("subdir");
    let second = rig.submit_pull("subdir");

    assert_eq!(first, second);
    assert_eq!(rig.unfinished_count(), 1);
    rig.wait(first).await;
}

#[tokio::test]
async fn narrower_request_folds_into_running_ancestor() {
    let rig = TestMirror::new();
    let parent = rig.submit_pull("subdir");
    let child = rig.submit_pull("subdir/subsubdir");

    assert_eq!(parent, child);
    let record = rig.wait(parent).await;
    assert!(record.error.is_none());
    assert!(Path::new(&rig.local("subdir/subsubdir/subsubfile.txt")).exists());
}

#[tokio::test]
async fn broader_request_defers_to_running_descendant() {
    let rig = TestMirror::new();
    let child = rig.submit_pull("subdir/subsubdir");
    let parent = rig.submit_pull("subdir");

    assert_ne!(child, parent);
    let child_record = rig.wait(child).await;
    let parent_record = rig.wait(parent).await;

    // The broader task may not complete before the narrower one it spans.
    assert!(child_record.finished.unwrap() <= parent_record.finished.unwrap());
    assert!(Path::new(&rig.local("subdir/subfile.txt")).exists());
    assert!(Path::new(&rig.local("subdir/subsubdir/subsubfile.txt")).exists());
}

#[tokio::test]
async fn disjoint_scopes_run_independently() {
    let rig = TestMirror::new();
    let a = rig.submit_pull("subdir/subsubdir");
    let b = rig.submit_pull("rootfile.txt");

    assert_ne!(a, b);
    rig.wait(a).await;
    rig.wait(b).await;
}

#[tokio::test]
async fn dedup_predicate_spans_kinds() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    // A freeze in flight over an ancestor covers a pull of a descendant.
    let freeze = rig.submit_freeze("subdir", false, true);
    let pull = rig.submit_pull("subdir/subsubdir");
    assert_eq!(freeze, pull);
    rig.wait(freeze).await;
}

#[tokio::test]
async fn foreign_unfinished_record_wins_dedup() {
    let rig = TestMirror::new();
    // Another process claimed the path through the shared ledger.
    let foreign = rig.plant_record("subdir", TaskKind::Pull);

    let id = rig.submit_pull("subdir/subsubdir");
    assert_eq!(id, foreign);
    assert_eq!(rig.unfinished_count(), 1);
}

#[tokio::test]
async fn finished_tasks_stop_coordinating() {
    let rig = TestMirror::new();
    let first = rig.submit_pull("subdir");
    rig.wait(first).await;

    let second = rig.submit_pull("subdir");
    assert_ne!(first, second);
    rig.wait(second).await;
}
