//! Service configuration.

use permafrost_core::Role;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API listens on.
    pub bind_addr: SocketAddr,
    /// Roots document (TOML or JSON) the registry is built from.
    pub roots_file: PathBuf,
    /// Sqlite task ledger shared by every coordinating process.
    pub ledger_path: PathBuf,
    /// Web serves requests only; worker probes roots and executes tasks.
    pub role: Role,
    /// How often a deferred task re-checks its locking dependencies, and
    /// how often pollers should expect ledger state to move.
    pub poll_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9100)),
            roots_file: PathBuf::from("/etc/permafrost/roots.toml"),
            ledger_path: PathBuf::from("/var/lib/permafrost/tasks.db"),
            role: Role::Worker,
            poll_interval_secs: 2,
        }
    }
}

impl ServerConfig {
    /// Loads the service configuration from a TOML or JSON file, dispatching
    /// on the file extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ServerConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ServerConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }
}
