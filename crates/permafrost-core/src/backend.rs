//! Remote backends: the capability seam that actually moves bytes.
//!
//! Pull is additive and overwriting: every remote file at or under the
//! requested path is written into local storage, parents created as needed,
//! and nothing local is ever deleted. Local-only files survive; locally
//! drifted files are restored to remote content.

use crate::config::RootConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Knobs for [`Backend::list`].
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    /// Only report files absent from local storage.
    pub missing_only: bool,
    /// Depth limit below the listed path; 0 means unlimited.
    pub max_depth: u32,
    /// Report paths relative to the root instead of the listed path.
    pub from_root: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            missing_only: false,
            max_depth: 1,
            from_root: false,
        }
    }
}

/// A remote store a root mirrors from.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Name roots reference this backend by.
    fn name(&self) -> &'static str;

    /// Fetches all remote content at or under `path` into local storage.
    async fn pull(&self, root: &RootConfig, path: &str) -> Result<(), BackendError>;

    /// Lists remote files at or under `path`.
    async fn list(
        &self,
        root: &RootConfig,
        path: &str,
        opts: ListOptions,
    ) -> Result<Vec<String>, BackendError>;
}

/// Backends available to roots, keyed by name.
pub struct BackendRegistry {
    backends: HashMap<&'static str, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Registry with the built-in backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            backends: HashMap::new(),
        };
        registry.register(Arc::new(LocalBackend));
        registry
    }

    /// Adds a backend under its own name.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name(), backend);
    }

    /// Looks a backend up by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Backend>, BackendError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::Unknown(name.to_string()))
    }

    /// The backend a root is configured for.
    pub fn for_root(&self, root: &RootConfig) -> Result<Arc<dyn Backend>, BackendError> {
        self.get(&root.backend)
    }
}

/// Mirrors from another locally mounted directory tree, configured through
/// the `source` root option. This is the adapter used by the test rigs and
/// by deployments where the remote store is a network mount.
#[derive(Debug)]
pub struct LocalBackend;

impl LocalBackend {
    fn source_dir(root: &RootConfig) -> Result<PathBuf, BackendError> {
        root.options
            .get("source")
            .map(PathBuf::from)
            .ok_or_else(|| {
                BackendError::Misconfigured(format!(
                    "local backend for root \"{}\" needs a \"source\" option",
                    root.local_path
                ))
            })
    }

    /// Remote counterpart of an absolute local path inside the root.
    fn remote_for(root: &RootConfig, local: &str) -> Result<PathBuf, BackendError> {
        let source = Self::source_dir(root)?;
        let relative = root.relative_path(local).ok_or_else(|| {
            BackendError::Misconfigured(format!(
                "path \"{}\" is outside root \"{}\"",
                local, root.local_path
            ))
        })?;
        if relative.is_empty() {
            Ok(source)
        } else {
            Ok(source.join(relative))
        }
    }

    fn copy_file(remote: &Path, local: &Path) -> Result<(), BackendError> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        // Unconditional copy: remote wins over local drift.
        fs::copy(remote, local).map_err(|e| BackendError::Transfer {
            path: local.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Remote files under `remote_base`, as paths relative to it. A single
    /// file lists as the empty relative path.
    fn enumerate(
        remote_base: &Path,
        max_depth: u32,
    ) -> Result<Vec<String>, BackendError> {
        if !remote_base.exists() {
            return Err(BackendError::Listing {
                path: remote_base.to_string_lossy().to_string(),
                reason: "remote path does not exist".to_string(),
            });
        }
        if remote_base.is_file() {
            return Ok(vec![String::new()]);
        }

        let mut walker = WalkDir::new(remote_base);
        if max_depth > 0 {
            walker = walker.max_depth(max_depth as usize);
        }
        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| BackendError::Listing {
                path: remote_base.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
            if entry.file_type().is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(remote_base)
                    .expect("walked entry is under its base")
                    .to_string_lossy()
                    .to_string();
                files.push(relative);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn pull(&self, root: &RootConfig, path: &str) -> Result<(), BackendError> {
        let remote_base = Self::remote_for(root, path)?;
        if !remote_base.exists() {
            return Err(BackendError::Transfer {
                path: path.to_string(),
                reason: "remote path does not exist".to_string(),
            });
        }

        let local_base = PathBuf::from(path.trim_end_matches('/'));
        if remote_base.is_file() {
            return Self::copy_file(&remote_base, &local_base);
        }

        for relative in Self::enumerate(&remote_base, 0)? {
            Self::copy_file(&remote_base.join(&relative), &local_base.join(&relative))?;
        }
        Ok(())
    }

    async fn list(
        &self,
        root: &RootConfig,
        path: &str,
        opts: ListOptions,
    ) -> Result<Vec<String>, BackendError> {
        let remote_base = Self::remote_for(root, path)?;
        let base_relative = root.relative_path(path).unwrap_or_default();

        let mut files = Vec::new();
        for relative in Self::enumerate(&remote_base, opts.max_depth)? {
            // A single-file listing reports the file itself.
            let from_path = if relative.is_empty() {
                Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            } else {
                relative.clone()
            };

            let root_relative = if relative.is_empty() {
                base_relative.clone()
            } else if base_relative.is_empty() {
                relative.clone()
            } else {
                format!("{}/{}", base_relative, relative)
            };

            if opts.missing_only {
                let local = format!("{}/{}", root.local_path, root_relative);
                if Path::new(&local).exists() {
                    continue;
                }
            }

            files.push(if opts.from_root { root_relative } else { from_path });
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Permissions;

    fn fixture() -> (tempfile::TempDir, tempfile::TempDir, RootConfig) {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();

        fs::create_dir_all(remote.path().join("subdir/subsubdir")).unwrap();
        fs::write(remote.path().join("rootfile.txt"), b"root content\n").unwrap();
        fs::write(remote.path().join("subdir/subfile.txt"), b"subfile content\n").unwrap();
        fs::write(
            remote.path().join("subdir/subsubdir/subsubfile.txt"),
            b"subsub content\n",
        )
        .unwrap();

        let mut options = HashMap::new();
        options.insert(
            "source".to_string(),
            remote.path().to_string_lossy().to_string(),
        );
        let root = RootConfig::from_entry(
            local.path().to_str().unwrap(),
            &crate::config::RootEntry {
                path: local.path().to_string_lossy().to_string(),
                backend: Some("local".to_string()),
                options,
                exclude: None,
                freeze_age: None,
            },
            Permissions::all(),
        )
        .unwrap();
        (remote, local, root)
    }

    fn local_path(root: &RootConfig, rel: &str) -> String {
        format!("{}/{}", root.local_path, rel)
    }

    #[tokio::test]
    async fn test_pull_directory_recursively() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;

        backend
            .pull(&root, &local_path(&root, "subdir"))
            .await
            .unwrap();

        assert!(Path::new(&local_path(&root, "subdir/subfile.txt")).exists());
        assert!(Path::new(&local_path(&root, "subdir/subsubdir/subsubfile.txt")).exists());
        // Only the requested subtree is fetched.
        assert!(!Path::new(&local_path(&root, "rootfile.txt")).exists());
    }

    #[tokio::test]
    async fn test_pull_single_file() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;

        let target = local_path(&root, "subdir/subfile.txt");
        backend.pull(&root, &target).await.unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"subfile content\n");
    }

    #[tokio::test]
    async fn test_pull_keeps_local_only_files() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;
        let subdir = local_path(&root, "subdir");

        backend.pull(&root, &subdir).await.unwrap();
        fs::write(local_path(&root, "subdir/local_new_file.txt"), b"mine\n").unwrap();

        backend.pull(&root, &subdir).await.unwrap();
        assert!(Path::new(&local_path(&root, "subdir/local_new_file.txt")).exists());
    }

    #[tokio::test]
    async fn test_pull_restores_local_drift() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;
        let subdir = local_path(&root, "subdir");
        let file = local_path(&root, "subdir/subfile.txt");

        backend.pull(&root, &subdir).await.unwrap();
        // Drift, including to a shorter string.
        fs::write(&file, b"This\n").unwrap();

        backend.pull(&root, &subdir).await.unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"subfile content\n");
    }

    #[tokio::test]
    async fn test_pull_restores_deleted_file() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;
        let subdir = local_path(&root, "subdir");
        let file = local_path(&root, "subdir/subfile.txt");

        backend.pull(&root, &subdir).await.unwrap();
        fs::remove_file(&file).unwrap();

        backend.pull(&root, &subdir).await.unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"subfile content\n");
    }

    #[tokio::test]
    async fn test_pull_missing_remote_fails() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;

        let err = backend
            .pull(&root, &local_path(&root, "no_such_dir"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transfer { .. }));
    }

    #[tokio::test]
    async fn test_list_relative_to_path() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;

        let files = backend
            .list(
                &root,
                &local_path(&root, "subdir"),
                ListOptions {
                    max_depth: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            files,
            vec!["subfile.txt".to_string(), "subsubdir/subsubfile.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_from_root() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;

        let files = backend
            .list(
                &root,
                &local_path(&root, "subdir"),
                ListOptions {
                    max_depth: 0,
                    from_root: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            files,
            vec![
                "subdir/subfile.txt".to_string(),
                "subdir/subsubdir/subsubfile.txt".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_list_depth_limited() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;

        let files = backend
            .list(
                &root,
                &local_path(&root, "subdir"),
                ListOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(files, vec!["subfile.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_list_missing_only() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;
        let subdir = local_path(&root, "subdir");

        backend.pull(&root, &local_path(&root, "subdir/subfile.txt")).await.unwrap();

        let files = backend
            .list(
                &root,
                &subdir,
                ListOptions {
                    max_depth: 0,
                    missing_only: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(files, vec!["subsubdir/subsubfile.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_list_single_file() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;

        let files = backend
            .list(
                &root,
                &local_path(&root, "subdir/subfile.txt"),
                ListOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(files, vec!["subfile.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = BackendRegistry::with_defaults();
        assert!(registry.get("local").is_ok());
        let err = registry.get("sftp").unwrap_err();
        assert!(matches!(err, BackendError::Unknown(_)));
    }

    #[tokio::test]
    async fn test_missing_source_option() {
        let (_remote, _local, mut root) = fixture();
        root.options.clear();
        let backend = LocalBackend;
        let err = backend
            .pull(&root, &format!("{}/subdir", root.local_path))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn test_freeze_path_dry_run_keeps_files() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;
        let subdir = local_path(&root, "subdir");
        backend.pull(&root, &subdir).await.unwrap();

        let outcome = crate::freeze::freeze_path(&root, &backend, &subdir, true, true)
            .await
            .unwrap();
        assert_eq!(outcome.files.len(), 2);
        assert!(Path::new(&local_path(&root, "subdir/subfile.txt")).exists());
    }

    #[tokio::test]
    async fn test_freeze_path_force_removes_backed_files() {
        let (_remote, _local, root) = fixture();
        let backend = LocalBackend;
        let subdir = local_path(&root, "subdir");
        backend.pull(&root, &subdir).await.unwrap();
        fs::write(local_path(&root, "subdir/local_only.txt"), b"mine\n").unwrap();

        let outcome = crate::freeze::freeze_path(&root, &backend, &subdir, true, false)
            .await
            .unwrap();
        assert_eq!(outcome.files.len(), 2);
        assert!(!Path::new(&local_path(&root, "subdir/subfile.txt")).exists());
        assert!(!Path::new(&local_path(&root, "subdir/subsubdir/subsubfile.txt")).exists());
        // Never evict what the remote cannot restore.
        assert!(Path::new(&local_path(&root, "subdir/local_only.txt")).exists());
    }
}
