//! Hierarchical task coordination.
//!
//! Given a requested path and the set of unfinished ledger records, decide
//! whether to fold the request into an in-flight task or start a new one:
//!
//! - An unfinished task whose scope contains the request (equal or ancestor)
//!   wins: the request reuses its id and no new task is created. A broader
//!   in-flight transfer will cover the narrower path anyway, and a second
//!   transfer could write the same files concurrently.
//! - Unfinished tasks strictly below the request keep running untouched, but
//!   their ids are handed to the new broader task as soft dependencies: the
//!   broader task defers its own transfer until they finish. There is no
//!   cancellation, so the asymmetry is deliberate.
//!
//! The check-then-insert window is closed by the ledger's uniqueness
//! constraint on unfinished paths; an insert conflict is replayed as a
//! dedup hit.

use crate::error::{CoreError, CoreResult, LedgerError};
use crate::ledger::Ledger;
use crate::path;
use crate::task::{TaskId, TaskKind, TaskRecord};
use std::sync::Arc;
use uuid::Uuid;

/// Coordination decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Fold into this in-flight task; create nothing.
    Reuse(TaskId),
    /// Start a new task, deferring its transfer until `locks` finish.
    Start {
        /// Unfinished strict-descendant task ids the new task must outlive.
        locks: Vec<TaskId>,
    },
}

/// Pure coordination rule over a snapshot of unfinished records.
pub fn plan(requested_path: &str, unfinished: &[TaskRecord]) -> Plan {
    for record in unfinished {
        if path::contains(&record.path, requested_path) {
            return Plan::Reuse(record.id);
        }
    }

    let locks = unfinished
        .iter()
        .filter(|record| path::strictly_contains(requested_path, &record.path))
        .map(|record| record.id)
        .collect();
    Plan::Start { locks }
}

/// A task to hand to the execution substrate.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Absolute normalized path the job scopes over.
    pub path: String,
    /// Ids the job waits out before transferring (advisory, polled).
    pub locks: Vec<TaskId>,
    /// Address to notify on completion, already validated.
    pub email: Option<String>,
    /// Freeze only: evict regardless of staleness.
    pub force: bool,
    /// Freeze only: report candidates without deleting.
    pub dry_run: bool,
}

/// Execution substrate seam. The coordinator only ever submits; it never
/// runs or waits for the work.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// One inbound pull or freeze request.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub path: String,
    pub kind: TaskKind,
    pub email: Option<String>,
    pub force: bool,
    pub dry_run: bool,
}

impl SubmitRequest {
    /// A plain pull of `path`.
    pub fn pull(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: TaskKind::Pull,
            email: None,
            force: false,
            dry_run: false,
        }
    }

    /// A freeze of `path`.
    pub fn freeze(path: &str, force: bool, dry_run: bool) -> Self {
        Self {
            path: path.to_string(),
            kind: TaskKind::Freeze,
            email: None,
            force,
            dry_run,
        }
    }
}

// An insert conflict means another request claimed the path between our
// query and our insert; one re-query then observes it. The bound only
// guards against a pathological finish-and-reclaim loop.
const SUBMIT_ATTEMPTS: usize = 3;

/// Applies the coordination rule against the live ledger and dispatches
/// newly created tasks.
pub struct Coordinator {
    ledger: Arc<dyn Ledger>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Coordinator {
    pub fn new(ledger: Arc<dyn Ledger>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { ledger, dispatcher }
    }

    /// Decides and, when needed, creates and dispatches a task for the
    /// request. Returns the id the caller should poll, which may belong to
    /// an already in-flight task.
    pub fn submit(&self, request: SubmitRequest) -> CoreResult<TaskId> {
        for _ in 0..SUBMIT_ATTEMPTS {
            let unfinished = self.ledger.query_unfinished()?;
            match plan(&request.path, &unfinished) {
                Plan::Reuse(id) => {
                    tracing::info!(
                        "Already touching \"{}\" in task {}, no new task",
                        request.path,
                        id
                    );
                    return Ok(id);
                }
                Plan::Start { locks } => {
                    let id = Uuid::new_v4();
                    match self.ledger.insert(id, &request.path, request.kind) {
                        Ok(()) => {
                            tracing::info!(
                                "Created {} task {} for \"{}\" ({} locking dependencies)",
                                request.kind.as_str(),
                                id,
                                request.path,
                                locks.len()
                            );
                            self.dispatcher.dispatch(Job {
                                id,
                                kind: request.kind,
                                path: request.path.clone(),
                                locks,
                                email: request.email.clone(),
                                force: request.force,
                                dry_run: request.dry_run,
                            });
                            return Ok(id);
                        }
                        Err(LedgerError::DuplicateUnfinished(_)) => {
                            tracing::debug!(
                                "Lost the insert race for \"{}\", re-querying",
                                request.path
                            );
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Err(CoreError::Ledger(LedgerError::Corrupt(format!(
            "could not claim or observe a task for \"{}\" after {} attempts",
            request.path, SUBMIT_ATTEMPTS
        ))))
    }
}
