//! The root registry: loads and validates the set of mirrored roots and
//! resolves arbitrary paths to their owning root.
//!
//! The registry is built once at process start and read-only afterwards; a
//! reload builds a whole new registry and swaps it in, never patching the
//! live one.

use crate::config::{Role, RootConfig, RootsDocument};
use crate::error::{CoreError, CoreResult};
use crate::path;
use crate::probe::{self, Permissions};
use std::fs;
use std::path::Path;

/// Immutable mapping from local root paths to their validated configuration.
#[derive(Debug)]
pub struct RootRegistry {
    roots: Vec<RootConfig>,
}

impl RootRegistry {
    /// Builds a registry from a parsed roots document.
    ///
    /// Missing root directories are created (logged at warn level), symlinks
    /// are resolved, and duplicate or nested roots are a fatal configuration
    /// error naming both offending paths. Worker-role roots are probed for
    /// write and atime support; the web role assumes both.
    pub fn load(doc: &RootsDocument, role: Role) -> CoreResult<Self> {
        if doc.roots.is_empty() {
            return Err(CoreError::Config("no roots configured".to_string()));
        }

        let mut roots: Vec<RootConfig> = Vec::with_capacity(doc.roots.len());
        for entry in &doc.roots {
            let normalized = path::normalize_absolute(&entry.path)
                .map_err(|e| CoreError::Config(e.to_string()))?;
            let root_path = Path::new(&normalized);
            if !root_path.exists() {
                tracing::warn!("Directory \"{}\" does not exist, creating it", normalized);
                fs::create_dir_all(root_path)?;
            }
            // Resolve symlinks so ownership checks compare real locations.
            let real = fs::canonicalize(root_path)?;
            let real = real.to_string_lossy().to_string();

            for known in &roots {
                if path::contains(&real, &known.local_path)
                    || path::contains(&known.local_path, &real)
                {
                    return Err(CoreError::Config(format!(
                        "could not load root for path \"{}\", conflicting with \"{}\"",
                        real, known.local_path
                    )));
                }
            }

            let perms = match role {
                Role::Web => Permissions::all(),
                Role::Worker => probe::probe_root(Path::new(&real)),
            };
            if !perms.writable {
                return Err(CoreError::Config(format!(
                    "root path \"{}\" is not writable",
                    real
                )));
            }
            if !perms.freezable {
                return Err(CoreError::Config(format!(
                    "root path \"{}\" does not support access time updates",
                    real
                )));
            }

            roots.push(RootConfig::from_entry(&real, entry, perms)?);
        }

        Ok(Self { roots })
    }

    /// Resolves a path to its owning root. Roots never nest, so at most one
    /// match exists.
    pub fn resolve(&self, path: &str) -> CoreResult<&RootConfig> {
        self.roots
            .iter()
            .find(|root| root.contains(path))
            .ok_or_else(|| CoreError::RootNotFound(path.to_string()))
    }

    /// All loaded roots, in document order.
    pub fn roots(&self) -> &[RootConfig] {
        &self.roots
    }
}
