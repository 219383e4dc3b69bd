//! The task execution substrate.
//!
//! The coordinator only decides and enqueues; the runner owns the long-lived
//! work. Each dispatched job runs on its own tokio task. A job with locking
//! dependencies (unfinished narrower tasks it would overlap) polls the
//! ledger until they finish before starting its own transfer; the narrower
//! tasks are never blocked or altered. There is no cancellation.
//!
//! Only the worker role executes: its roots were probed for write and atime
//! support at load time. A web-role runner records every dispatched job as
//! failed without touching the filesystem, since on its unprobed roots a
//! suppressed atime would make every file look stale.

use permafrost_core::{
    freeze_path, BackendRegistry, CoreError, CoreResult, Dispatcher, Job, Ledger, Role,
    RootRegistry, TaskId, TaskKind,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

struct RunnerInner {
    ledger: Arc<dyn Ledger>,
    registry: Arc<RootRegistry>,
    backends: Arc<BackendRegistry>,
    role: Role,
    poll_interval: Duration,
    /// Task ids this process is actively running; the zombie sweep spares
    /// them and reaps everything else left unfinished in the ledger.
    live: Mutex<HashSet<TaskId>>,
}

/// Runs dispatched jobs on the tokio runtime and records their outcome in
/// the ledger.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

impl TaskRunner {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        registry: Arc<RootRegistry>,
        backends: Arc<BackendRegistry>,
        role: Role,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                ledger,
                registry,
                backends,
                role,
                poll_interval,
                live: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// True while this process is actively running the task.
    pub fn is_live(&self, id: TaskId) -> bool {
        self.inner.live.lock().unwrap().contains(&id)
    }

    async fn wait_for_locks(&self, id: TaskId, locks: &[TaskId]) -> CoreResult<()> {
        loop {
            let unfinished: HashSet<TaskId> = self
                .inner
                .ledger
                .query_unfinished()?
                .into_iter()
                .map(|r| r.id)
                .collect();
            let pending: Vec<&TaskId> =
                locks.iter().filter(|l| unfinished.contains(l)).collect();
            if pending.is_empty() {
                return Ok(());
            }
            tracing::debug!(
                "Task {} deferring transfer, waiting on {} narrower tasks",
                id,
                pending.len()
            );
            tokio::time::sleep(self.inner.poll_interval).await;
        }
    }

    async fn execute(&self, job: &Job) -> CoreResult<()> {
        if self.inner.role == Role::Web {
            return Err(CoreError::WrongRole);
        }
        if !job.locks.is_empty() {
            self.wait_for_locks(job.id, &job.locks).await?;
        }

        let root = self.inner.registry.resolve(&job.path)?;
        let backend = self.inner.backends.for_root(root)?;
        match job.kind {
            TaskKind::Pull => {
                backend.pull(root, &job.path).await?;
            }
            TaskKind::Freeze => {
                freeze_path(root, backend.as_ref(), &job.path, job.force, job.dry_run).await?;
            }
        }
        Ok(())
    }

    async fn run_job(self, job: Job) {
        tracing::info!(
            "Running {} task {} for \"{}\"",
            job.kind.as_str(),
            job.id,
            job.path
        );

        let error = match self.execute(&job).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!("Task {} failed: {}", job.id, e);
                Some(e.to_string())
            }
        };

        if let Err(e) = self
            .inner
            .ledger
            .mark_finished(job.id, error.as_deref())
        {
            tracing::error!("Could not record completion of task {}: {}", job.id, e);
        }
        self.inner.live.lock().unwrap().remove(&job.id);

        if let Some(email) = &job.email {
            match &error {
                None => tracing::info!(
                    "Notifying {}: {} of \"{}\" finished",
                    email,
                    job.kind.as_str(),
                    job.path
                ),
                Some(reason) => tracing::info!(
                    "Notifying {}: {} of \"{}\" failed: {}",
                    email,
                    job.kind.as_str(),
                    job.path,
                    reason
                ),
            }
        }
    }

    /// Marks every unfinished ledger record not live in this process as
    /// finished with an error. Run only while no other worker shares the
    /// ledger; a record owned by a crashed sibling is indistinguishable
    /// from one owned by a healthy one.
    pub fn cleanup_zombies(&self) -> CoreResult<usize> {
        let mut reaped = 0;
        for record in self.inner.ledger.query_unfinished()? {
            if !self.is_live(record.id) {
                tracing::warn!(
                    "Reaping zombie task {} for \"{}\"",
                    record.id,
                    record.path
                );
                self.inner
                    .ledger
                    .mark_finished(record.id, Some("zombie task"))?;
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    /// Runs the zombie sweep in the background, returning an identifier for
    /// the sweep itself. The sweep is not a ledger task; its id is only a
    /// handle for log correlation.
    pub fn spawn_zombie_sweep(&self) -> TaskId {
        let sweep_id = Uuid::new_v4();
        let runner = self.clone();
        tokio::spawn(async move {
            match runner.cleanup_zombies() {
                Ok(reaped) => tracing::info!("Zombie sweep {} reaped {} tasks", sweep_id, reaped),
                Err(e) => tracing::error!("Zombie sweep {} failed: {}", sweep_id, e),
            }
        });
        sweep_id
    }
}

impl Dispatcher for TaskRunner {
    fn dispatch(&self, job: Job) {
        // Mark live before the job is spawned so a concurrent zombie sweep
        // cannot reap a task that has not started yet.
        self.inner.live.lock().unwrap().insert(job.id);
        let runner = self.clone();
        tokio::spawn(runner.run_job(job));
    }
}
