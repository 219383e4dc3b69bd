//! Root configuration: the on-disk roots document and the validated
//! per-root structure the engine works with.

use crate::error::{CoreError, CoreResult};
use crate::path;
use crate::probe::Permissions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Smallest accepted freeze age, in days.
pub const FREEZE_AGE_MIN: u64 = 2;
/// Largest accepted freeze age, in days.
pub const FREEZE_AGE_MAX: u64 = 10000;
/// Freeze age applied when a root does not configure one.
pub const FREEZE_AGE_DEFAULT: u64 = 180;

/// Which role this process plays. The web role never mutates root
/// filesystems and skips capability probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Web,
    Worker,
}

/// One raw entry of the roots document, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootEntry {
    /// Absolute local directory this root mirrors into.
    pub path: String,
    /// Backend name; required, validated in [`RootConfig::from_entry`].
    pub backend: Option<String>,
    /// Backend-specific options.
    #[serde(default)]
    pub options: HashMap<String, String>,
    /// Comma-separated glob patterns excluded from freezing.
    pub exclude: Option<String>,
    /// Staleness threshold in days, within [2, 10000].
    pub freeze_age: Option<u64>,
}

/// The parsed roots document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootsDocument {
    /// Root entries in document order.
    #[serde(default)]
    pub roots: Vec<RootEntry>,
}

impl RootsDocument {
    /// Loads a roots document from a TOML or JSON file, dispatching on the
    /// file extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let doc: RootsDocument = toml::from_str(&contents)?;
                Ok(doc)
            }
            "json" => {
                let doc: RootsDocument = serde_json::from_str(&contents)?;
                Ok(doc)
            }
            _ => anyhow::bail!("Unsupported roots file extension: {}", ext),
        }
    }

    /// Parses a roots document from TOML text.
    pub fn from_toml_str(contents: &str) -> CoreResult<Self> {
        toml::from_str(contents).map_err(|e| CoreError::Config(e.to_string()))
    }
}

/// A validated, immutable root. Built once at load time by the registry.
#[derive(Debug, Clone)]
pub struct RootConfig {
    /// Absolute local root path, no trailing separator.
    pub local_path: String,
    /// Backend name this root transfers through.
    pub backend: String,
    /// Backend-specific options.
    pub options: HashMap<String, String>,
    /// Exclude glob patterns, whitespace-trimmed, empty entries dropped.
    pub exclude: Vec<String>,
    /// Staleness threshold in days.
    pub freeze_age: u64,
    /// Whether this process can write inside the root.
    pub writable: bool,
    /// Whether the root's filesystem records access times.
    pub freezable: bool,
}

impl RootConfig {
    /// Validates a raw entry into a root bound to the probed permissions.
    /// The caller (the registry) decides whether the permissions are
    /// acceptable for its role.
    pub fn from_entry(local_path: &str, entry: &RootEntry, perms: Permissions) -> CoreResult<Self> {
        let backend = entry.backend.clone().ok_or_else(|| {
            CoreError::Config(format!(
                "missing backend for root \"{}\"",
                local_path
            ))
        })?;

        let freeze_age = entry.freeze_age.unwrap_or(FREEZE_AGE_DEFAULT);
        if !(FREEZE_AGE_MIN..=FREEZE_AGE_MAX).contains(&freeze_age) {
            return Err(CoreError::Config(format!(
                "freeze_age must be an integer >1 and <10000 for root \"{}\", got {}",
                local_path, freeze_age
            )));
        }

        let exclude: Vec<String> = entry
            .exclude
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        for pattern in &exclude {
            glob::Pattern::new(pattern).map_err(|e| {
                CoreError::Config(format!(
                    "invalid exclude pattern \"{}\" for root \"{}\": {}",
                    pattern, local_path, e
                ))
            })?;
        }

        Ok(Self {
            local_path: local_path.trim_end_matches('/').to_string(),
            backend,
            options: entry.options.clone(),
            exclude,
            freeze_age,
            writable: perms.writable,
            freezable: perms.freezable,
        })
    }

    /// True if this root owns `path` under the containment relation.
    pub fn contains(&self, path: &str) -> bool {
        path::contains(&self.local_path, path)
    }

    /// `path` relative to this root, `None` when the root does not own it.
    pub fn relative_path(&self, path: &str) -> Option<String> {
        path::relative_to(&self.local_path, path)
    }
}
