//! Error types for the permafrost engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error variants for engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Fatal configuration problem detected at load time.
    #[error("Malformed configuration: {0}")]
    Config(String),

    /// The path is not owned by any configured root.
    #[error("Could not find a configured root for path \"{0}\"")]
    RootNotFound(String),

    /// The caller supplied a path the engine cannot work with.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Task execution attempted by a role that never mutates roots.
    #[error("Task execution requires the worker role")]
    WrongRole,

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend transfer or listing failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A ledger query or update failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Error variants for remote backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No backend registered under this name.
    #[error("Unknown backend: {0}")]
    Unknown(String),

    /// The backend is missing a required option for this root.
    #[error("Backend misconfigured: {0}")]
    Misconfigured(String),

    /// A transfer into local storage failed.
    #[error("Transfer failed for {path}: {reason}")]
    Transfer {
        /// Path the transfer was scoped to.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// A remote listing failed.
    #[error("Listing failed for {path}: {reason}")]
    Listing {
        /// Path the listing was scoped to.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error variants for the task ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An unfinished task already scopes this exact path. Callers treat this
    /// as a dedup hit, not a failure.
    #[error("An unfinished task already exists for path \"{0}\"")]
    DuplicateUnfinished(String),

    /// The stored record is not in the shape the engine expects.
    #[error("Corrupt ledger record: {0}")]
    Corrupt(String),

    /// Underlying sqlite failure.
    #[error("Ledger storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
