//! The eviction evaluator: decides which locally cached files are safe to
//! remove, then removes them.
//!
//! A file is only ever evicted when its root-relative path appears in the
//! remote manifest. Exclude patterns are checked before anything else and
//! cannot be overridden by `force`; `force` only bypasses the staleness
//! check. Staleness is strict calendar days: a file last accessed exactly
//! `freeze_age` days ago is kept.

use crate::backend::{Backend, ListOptions};
use crate::config::RootConfig;
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Local, NaiveDate};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Result of one freeze invocation.
#[derive(Debug, Clone)]
pub struct FreezeOutcome {
    /// Absolute paths selected for eviction (and removed unless `dry_run`).
    pub files: Vec<String>,
    /// True when nothing was actually deleted.
    pub dry_run: bool,
}

/// Strict day-granularity staleness rule.
pub fn is_stale_on(last_access: NaiveDate, today: NaiveDate, freeze_age: u64) -> bool {
    (today - last_access).num_days() > freeze_age as i64
}

fn last_access_date(path: &Path) -> std::io::Result<NaiveDate> {
    let accessed = fs::metadata(path)?.accessed()?;
    Ok(DateTime::<Local>::from(accessed).date_naive())
}

fn is_stale(path: &Path, freeze_age: u64) -> std::io::Result<bool> {
    let last_access = last_access_date(path)?;
    let today = Local::now().date_naive();
    Ok(is_stale_on(last_access, today, freeze_age))
}

fn is_excluded(candidate: &str, patterns: &[glob::Pattern]) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.matches(candidate) {
            tracing::info!(
                "Excluded path {} matched expression {}",
                candidate,
                pattern.as_str()
            );
            return true;
        }
        false
    })
}

/// Computes the evictable files at or under `path`.
///
/// `remote_manifest` is the full recursive remote listing of the root,
/// paths relative to the root. Files absent from it are never selected,
/// regardless of staleness or `force`.
pub fn evaluate(
    root: &RootConfig,
    path: &str,
    remote_manifest: &HashSet<String>,
    force: bool,
) -> CoreResult<Vec<String>> {
    // Patterns were validated at config load.
    let patterns: Vec<glob::Pattern> = root
        .exclude
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let target = Path::new(path);
    let mut candidates: Vec<String> = Vec::new();
    if target.is_file() {
        candidates.push(path.trim_end_matches('/').to_string());
    } else {
        for entry in WalkDir::new(target).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                candidates.push(entry.path().to_string_lossy().to_string());
            }
        }
    }

    let mut freezable = Vec::new();
    for candidate in candidates {
        if is_excluded(&candidate, &patterns) {
            continue;
        }
        let eligible = force
            || match is_stale(Path::new(&candidate), root.freeze_age) {
                Ok(stale) => stale,
                Err(e) => {
                    tracing::warn!("Could not stat freeze candidate {}: {}", candidate, e);
                    continue;
                }
            };
        if !eligible {
            continue;
        }
        let relative = match root.relative_path(&candidate) {
            Some(rel) => rel,
            None => {
                return Err(CoreError::InvalidPath(format!(
                    "freeze candidate \"{}\" escapes root \"{}\"",
                    candidate, root.local_path
                )))
            }
        };
        if remote_manifest.contains(&relative) {
            freezable.push(candidate);
        }
    }

    freezable.sort();
    Ok(freezable)
}

/// Full freeze pass: lists the remote side, evaluates candidates, and
/// unlinks them unless `dry_run`.
pub async fn freeze_path(
    root: &RootConfig,
    backend: &dyn Backend,
    path: &str,
    force: bool,
    dry_run: bool,
) -> CoreResult<FreezeOutcome> {
    tracing::info!("Asked to freeze \"{}\"", path);

    let manifest: HashSet<String> = backend
        .list(
            root,
            path,
            ListOptions {
                missing_only: false,
                max_depth: 0,
                from_root: true,
            },
        )
        .await?
        .into_iter()
        .collect();

    let files = evaluate(root, path, &manifest, force)?;
    tracing::info!("Freezable files under \"{}\": {}", path, files.len());

    for file in &files {
        if dry_run {
            tracing::info!("Would freeze \"{}\" (dry-run mode)", file);
        } else {
            tracing::info!("Freezing \"{}\"", file);
            fs::remove_file(file)?;
        }
    }

    Ok(FreezeOutcome { files, dry_run })
}
