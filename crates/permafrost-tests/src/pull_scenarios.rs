//! Pull semantics end to end: additive, overwriting, never deleting.

use crate::harness::TestMirror;
use std::fs;
use std::path::Path;

#[tokio::test]
async fn pull_mirrors_requested_subtree() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    assert!(Path::new(&rig.local("subdir/subfile.txt")).exists());
    assert!(Path::new(&rig.local("subdir/subsubdir")).is_dir());
    assert!(Path::new(&rig.local("subdir/subsubdir/subsubfile.txt")).exists());
    // Siblings outside the requested subtree stay remote-only.
    assert!(!Path::new(&rig.local("rootfile.txt")).exists());
}

#[tokio::test]
async fn pull_twice_is_idempotent() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;
    rig.pull_and_wait("subdir/subsubdir").await;

    assert_eq!(
        fs::read_to_string(rig.local("subdir/subfile.txt")).unwrap(),
        "subfile content\n"
    );
    assert_eq!(rig.unfinished_count(), 0);
}

#[tokio::test]
async fn local_only_file_survives_repull() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    fs::write(rig.local("subdir/local_new_file.txt"), b"mine\n").unwrap();
    rig.pull_and_wait("subdir").await;

    assert!(Path::new(&rig.local("subdir/local_new_file.txt")).exists());
    assert_eq!(
        fs::read_to_string(rig.local("subdir/local_new_file.txt")).unwrap(),
        "mine\n"
    );
}

#[tokio::test]
async fn local_drift_restored_to_remote_content() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    // Drift to a shorter string, the nastier overwrite case.
    fs::write(rig.local("subdir/subfile.txt"), b"This\n").unwrap();
    rig.pull_and_wait("subdir").await;

    assert_eq!(
        fs::read_to_string(rig.local("subdir/subfile.txt")).unwrap(),
        "subfile content\n"
    );
}

#[tokio::test]
async fn drift_restored_by_ancestor_pull() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir/subsubdir").await;

    fs::write(rig.local("subdir/subsubdir/subsubfile.txt"), b"drifted\n").unwrap();
    rig.pull_and_wait("subdir").await;

    assert_eq!(
        fs::read_to_string(rig.local("subdir/subsubdir/subsubfile.txt")).unwrap(),
        "subsub content\n"
    );
}

#[tokio::test]
async fn deleted_file_restored_on_repull() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    fs::remove_file(rig.local("subdir/subfile.txt")).unwrap();
    rig.pull_and_wait("subdir").await;

    assert_eq!(
        fs::read_to_string(rig.local("subdir/subfile.txt")).unwrap(),
        "subfile content\n"
    );
}

#[tokio::test]
async fn new_remote_file_appears_on_repull() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir").await;

    fs::write(rig.remote("subdir/added_later.txt"), b"late arrival\n").unwrap();
    rig.pull_and_wait("subdir").await;

    assert_eq!(
        fs::read_to_string(rig.local("subdir/added_later.txt")).unwrap(),
        "late arrival\n"
    );
}

#[tokio::test]
async fn pull_of_missing_remote_path_finishes_with_error() {
    let rig = TestMirror::new();
    let id = rig.submit_pull("no_such_dir");
    let record = rig.wait(id).await;

    assert!(record.error.is_some());
    assert_eq!(rig.unfinished_count(), 0);
}

#[tokio::test]
async fn pull_single_file() {
    let rig = TestMirror::new();
    rig.pull_and_wait("subdir/subfile.txt").await;

    assert_eq!(
        fs::read_to_string(rig.local("subdir/subfile.txt")).unwrap(),
        "subfile content\n"
    );
    assert!(!Path::new(&rig.local("subdir/subsubdir")).exists());
}
