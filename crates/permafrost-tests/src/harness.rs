//! Shared scenario rig: a seeded remote tree, an empty local root, a sqlite
//! ledger, and a live runner wired through the coordinator, the same way
//! `permafrostd` wires them.

use permafrost_core::{
    BackendRegistry, Coordinator, Ledger, Role, RootConfig, RootEntry, RootRegistry,
    RootsDocument, SqliteLedger, SubmitRequest, TaskId, TaskKind, TaskRecord,
};
use permafrost_server::TaskRunner;
use std::collections::HashMap;
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Remote files every rig starts with, relative path and content.
pub const SEED_FILES: &[(&str, &str)] = &[
    ("rootfile.txt", "root content\n"),
    ("subdir/subfile.txt", "subfile content\n"),
    ("subdir/subsubdir/subsubfile.txt", "subsub content\n"),
];

pub struct TestMirror {
    _remote: tempfile::TempDir,
    _local: tempfile::TempDir,
    _ledger_dir: tempfile::TempDir,
    remote_path: String,
    root_path: String,
    pub ledger: Arc<dyn Ledger>,
    pub runner: TaskRunner,
    pub coordinator: Coordinator,
    registry: Arc<RootRegistry>,
}

impl TestMirror {
    pub fn new() -> Self {
        Self::with_policy(None, None)
    }

    /// A rig whose root carries an exclude list and/or a freeze age.
    pub fn with_policy(exclude: Option<&str>, freeze_age: Option<u64>) -> Self {
        Self::build(exclude, freeze_age, Role::Worker)
    }

    /// A rig whose runner holds the web role and must refuse to execute.
    pub fn web_role(freeze_age: Option<u64>) -> Self {
        Self::build(None, freeze_age, Role::Web)
    }

    fn build(exclude: Option<&str>, freeze_age: Option<u64>, runner_role: Role) -> Self {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let ledger_dir = tempfile::tempdir().unwrap();

        for (rel, content) in SEED_FILES {
            let path = remote.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let mut options = HashMap::new();
        options.insert(
            "source".to_string(),
            remote.path().to_string_lossy().to_string(),
        );
        let doc = RootsDocument {
            roots: vec![RootEntry {
                path: local.path().to_string_lossy().to_string(),
                backend: Some("local".to_string()),
                options,
                exclude: exclude.map(|e| e.to_string()),
                freeze_age,
            }],
        };
        // Registry in the web role: skip probing, scenario hosts may mount
        // noatime. Whether jobs execute is decided by the runner's role.
        let registry = Arc::new(RootRegistry::load(&doc, Role::Web).unwrap());
        let root_path = registry.roots()[0].local_path.clone();

        let ledger: Arc<dyn Ledger> =
            Arc::new(SqliteLedger::open(&ledger_dir.path().join("tasks.db")).unwrap());
        let runner = TaskRunner::new(
            ledger.clone(),
            registry.clone(),
            Arc::new(BackendRegistry::with_defaults()),
            runner_role,
            Duration::from_millis(20),
        );
        let coordinator = Coordinator::new(ledger.clone(), Arc::new(runner.clone()));

        Self {
            remote_path: remote.path().to_string_lossy().to_string(),
            _remote: remote,
            _local: local,
            _ledger_dir: ledger_dir,
            root_path,
            ledger,
            runner,
            coordinator,
            registry,
        }
    }

    /// The validated root under test.
    pub fn root(&self) -> &RootConfig {
        &self.registry.roots()[0]
    }

    /// Absolute path inside the local root.
    pub fn local(&self, rel: &str) -> String {
        if rel.is_empty() {
            self.root_path.clone()
        } else {
            format!("{}/{}", self.root_path, rel)
        }
    }

    /// Absolute path inside the seeded remote tree.
    pub fn remote(&self, rel: &str) -> String {
        format!("{}/{}", self.remote_path, rel)
    }

    pub fn submit_pull(&self, rel: &str) -> TaskId {
        self.coordinator
            .submit(SubmitRequest::pull(&self.local(rel)))
            .unwrap()
    }

    pub fn submit_freeze(&self, rel: &str, force: bool, dry_run: bool) -> TaskId {
        self.coordinator
            .submit(SubmitRequest::freeze(&self.local(rel), force, dry_run))
            .unwrap()
    }

    /// Polls the ledger until the task reports completion.
    pub async fn wait(&self, id: TaskId) -> TaskRecord {
        for _ in 0..500 {
            if let Some(record) = self.ledger.get(id).unwrap() {
                if !record.is_unfinished() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never finished", id);
    }

    pub async fn pull_and_wait(&self, rel: &str) {
        let id = self.submit_pull(rel);
        let record = self.wait(id).await;
        assert!(
            record.error.is_none(),
            "pull of {:?} failed: {:?}",
            rel,
            record.error
        );
    }

    /// How many unfinished records the ledger holds right now.
    pub fn unfinished_count(&self) -> usize {
        self.ledger.query_unfinished().unwrap().len()
    }

    /// Records another process's task directly in the ledger.
    pub fn plant_record(&self, rel: &str, kind: TaskKind) -> TaskId {
        let id = uuid::Uuid::new_v4();
        self.ledger.insert(id, &self.local(rel), kind).unwrap();
        id
    }
}

impl Default for TestMirror {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewinds a file's access and modification times `days` into the past.
pub fn set_file_age(path: &Path, days: i64) {
    let when = chrono::Local::now() - chrono::Duration::days(days);
    let tv = libc::timeval {
        tv_sec: when.timestamp(),
        tv_usec: 0,
    };
    let times = [tv, tv];
    let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
    let rc = unsafe { libc::utimes(c_path.as_ptr(), times.as_ptr()) };
    assert_eq!(rc, 0, "utimes({}) failed", path.display());
}
