//! Task records: the ledger rows the coordinator reasons over.

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque task identifier.
pub type TaskId = Uuid;

/// What a task does to its path scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Pull,
    Freeze,
}

impl TaskKind {
    /// Stable string form, used for ledger storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Pull => "pull",
            TaskKind::Freeze => "freeze",
        }
    }

    /// Parses the stored string form back.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "pull" => Ok(TaskKind::Pull),
            "freeze" => Ok(TaskKind::Freeze),
            other => Err(LedgerError::Corrupt(format!("unknown task kind \"{}\"", other))),
        }
    }
}

/// One ledger row. `finished == None` means the task is still in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    /// Absolute normalized path the task scopes over.
    pub path: String,
    pub kind: TaskKind,
    pub created: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskRecord {
    /// True while the task has not reported completion or failure.
    pub fn is_unfinished(&self) -> bool {
        self.finished.is_none()
    }
}
