//! Permafrost engine: on-demand mirroring of remote data stores onto local
//! roots ("pull") and eviction of stale, remotely-backed local files
//! ("freeze"), coordinated across concurrent callers through a persistent
//! task ledger with hierarchical path-containment dedup.

pub mod backend;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod freeze;
pub mod ledger;
pub mod path;
pub mod probe;
pub mod registry;
pub mod task;

pub use backend::{Backend, BackendRegistry, ListOptions, LocalBackend};
pub use config::{Role, RootConfig, RootEntry, RootsDocument};
pub use coordinate::{plan, Coordinator, Dispatcher, Job, Plan, SubmitRequest};
pub use error::{BackendError, CoreError, CoreResult, LedgerError};
pub use freeze::{evaluate, freeze_path, FreezeOutcome};
pub use ledger::{Ledger, MemoryLedger, SqliteLedger};
pub use registry::RootRegistry;
pub use task::{TaskId, TaskKind, TaskRecord};
