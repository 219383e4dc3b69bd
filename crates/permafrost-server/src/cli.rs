//! Command-line interface for `permafrostd`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "permafrostd", about = "On-demand remote mirror with freeze eviction")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API and, in the worker role, the task runner.
    Serve {
        /// Service configuration file (TOML or JSON).
        #[arg(long, default_value = "/etc/permafrost/server.toml")]
        config: PathBuf,
    },
    /// Validate the service and roots configuration, then exit.
    CheckConfig {
        /// Service configuration file (TOML or JSON).
        #[arg(long, default_value = "/etc/permafrost/server.toml")]
        config: PathBuf,
    },
}
