//! Path normalization and the containment relation.
//!
//! Containment is segment-aware: `/data/set1` contains `/data/set1/a` and
//! itself, but not `/data/set10`. All coordination and root-resolution
//! decisions go through these functions rather than raw prefix tests.

use crate::error::{CoreError, CoreResult};

/// Appends a trailing separator, collapsing the root path to itself.
fn with_trailing_sep(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    format!("{}/", path.trim_end_matches('/'))
}

/// True if `ancestor` is equal to `descendant` or a path ancestor of it,
/// comparing whole path segments.
pub fn contains(ancestor: &str, descendant: &str) -> bool {
    with_trailing_sep(descendant).starts_with(&with_trailing_sep(ancestor))
}

/// True if `descendant` is strictly below `ancestor` (containment without
/// equality).
pub fn strictly_contains(ancestor: &str, descendant: &str) -> bool {
    contains(ancestor, descendant) && with_trailing_sep(ancestor) != with_trailing_sep(descendant)
}

/// Strips `root` from `path`, returning the root-relative remainder without
/// a leading separator. Returns `None` when `path` is not contained in
/// `root`, and an empty string when they are equal.
pub fn relative_to(root: &str, path: &str) -> Option<String> {
    if !contains(root, path) {
        return None;
    }
    let root_sep = with_trailing_sep(root);
    let path_sep = with_trailing_sep(path);
    Some(path_sep[root_sep.len()..].trim_end_matches('/').to_string())
}

/// Lexically normalizes an absolute path: collapses duplicate separators and
/// `.`/`..` segments, strips any trailing separator. Relative paths are
/// rejected; `..` above the root is clamped at `/`.
pub fn normalize_absolute(path: &str) -> CoreResult<String> {
    if !path.starts_with('/') {
        return Err(CoreError::InvalidPath(format!(
            "\"{}\" is not an absolute path",
            path
        )));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}
