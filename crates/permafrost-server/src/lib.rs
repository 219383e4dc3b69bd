//! Permafrost service: HTTP surface, task execution substrate, and process
//! wiring around the `permafrost-core` engine.

pub mod api;
pub mod cli;
pub mod config;
pub mod email;
pub mod runner;

pub use api::{router, AppState};
pub use config::ServerConfig;
pub use runner::TaskRunner;
