//! The task ledger: persisted record of in-flight and completed operations.
//!
//! The ledger is the only synchronization primitive in the system. The
//! coordinator's check-then-insert flow is racy on its own, so the ledger
//! enforces uniqueness of (path, unfinished): a second insert for a path
//! that already has an unfinished task fails with
//! [`LedgerError::DuplicateUnfinished`], which callers treat as a dedup hit.

use crate::error::LedgerError;
use crate::task::{TaskId, TaskKind, TaskRecord};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// How long a connection waits out another process's write lock before
/// surfacing SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Query and update contract the coordinator and runner work against.
pub trait Ledger: Send + Sync {
    /// All records with no finished timestamp, the live coordination state.
    fn query_unfinished(&self) -> Result<Vec<TaskRecord>, LedgerError>;

    /// Records a new unfinished task. Fails with
    /// [`LedgerError::DuplicateUnfinished`] when an unfinished task already
    /// scopes the exact same path.
    fn insert(&self, id: TaskId, path: &str, kind: TaskKind) -> Result<(), LedgerError>;

    /// Stamps a task finished, with an error string when it failed.
    fn mark_finished(&self, id: TaskId, error: Option<&str>) -> Result<(), LedgerError>;

    /// Looks a task up by id.
    fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, LedgerError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id       TEXT PRIMARY KEY,
    path     TEXT NOT NULL,
    kind     TEXT NOT NULL,
    created  TEXT NOT NULL,
    finished TEXT,
    error    TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS tasks_unfinished_path
    ON tasks(path) WHERE finished IS NULL;
";

/// Sqlite-backed ledger shared by every process coordinating over the same
/// roots. The partial unique index on unfinished paths makes the
/// check-then-insert flow atomic across processes.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Opens (creating if needed) a ledger database file.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A private in-memory ledger, for tests and single-process setups.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
        let id: String = row.get(0)?;
        let path: String = row.get(1)?;
        let kind: String = row.get(2)?;
        let created: String = row.get(3)?;
        let finished: Option<String> = row.get(4)?;
        let error: Option<String> = row.get(5)?;

        let invalid = |msg: String| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                msg.into(),
            )
        };

        Ok(TaskRecord {
            id: id.parse().map_err(|e| invalid(format!("bad task id: {}", e)))?,
            path,
            kind: TaskKind::parse(&kind).map_err(|e| invalid(e.to_string()))?,
            created: parse_timestamp(&created).map_err(|e| invalid(e.to_string()))?,
            finished: finished
                .map(|f| parse_timestamp(&f).map_err(|e| invalid(e.to_string())))
                .transpose()?,
            error,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt(format!("bad timestamp \"{}\": {}", raw, e)))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Ledger for SqliteLedger {
    fn query_unfinished(&self) -> Result<Vec<TaskRecord>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, path, kind, created, finished, error FROM tasks WHERE finished IS NULL",
        )?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn insert(&self, id: TaskId, path: &str, kind: TaskKind) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO tasks (id, path, kind, created) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                id.to_string(),
                path,
                kind.as_str(),
                Utc::now().to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(LedgerError::DuplicateUnfinished(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn mark_finished(&self, id: TaskId, error: Option<&str>) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tasks SET finished = ?1, error = ?2 WHERE id = ?3",
            rusqlite::params![Utc::now().to_rfc3339(), error, id.to_string()],
        )?;
        Ok(())
    }

    fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, path, kind, created, finished, error FROM tasks WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id.to_string()], Self::row_to_record)?;
        rows.next().transpose().map_err(Into::into)
    }
}

/// In-process ledger with the same contract, for unit tests.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<TaskRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn query_unfinished(&self) -> Result<Vec<TaskRecord>, LedgerError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.is_unfinished())
            .cloned()
            .collect())
    }

    fn insert(&self, id: TaskId, path: &str, kind: TaskKind) -> Result<(), LedgerError> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.is_unfinished() && r.path == path) {
            return Err(LedgerError::DuplicateUnfinished(path.to_string()));
        }
        records.push(TaskRecord {
            id,
            path: path.to_string(),
            kind,
            created: Utc::now(),
            finished: None,
            error: None,
        });
        Ok(())
    }

    fn mark_finished(&self, id: TaskId, error: Option<&str>) -> Result<(), LedgerError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            record.finished = Some(Utc::now());
            record.error = error.map(|e| e.to_string());
        }
        Ok(())
    }

    fn get(&self, id: TaskId) -> Result<Option<TaskRecord>, LedgerError> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().find(|r| r.id == id).cloned())
    }
}
