//! Filesystem capability probe.
//!
//! A worker must be able to write inside a root (pull) and observe access
//! time updates (freeze staleness). A filesystem mounted with atime
//! suppressed cannot distinguish hot files from cold ones, so the probe
//! reports `freezable = false` and root construction fails instead of
//! silently evicting everything.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Minimum delay before a second atime sample can be trusted; coarser
/// filesystems do not register sub-half-second access time changes.
pub const ATIME_SETTLE: Duration = Duration::from_millis(500);

/// Probed root capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub writable: bool,
    pub freezable: bool,
}

impl Permissions {
    /// Both capabilities granted; what the web role assumes without probing.
    pub fn all() -> Self {
        Self {
            writable: true,
            freezable: true,
        }
    }
}

/// Probes a root directory: writes a temporary file, samples its access
/// time, waits out the atime granularity, reads it back and compares.
pub fn probe_root(root: &Path) -> Permissions {
    let mut perms = Permissions {
        writable: true,
        freezable: false,
    };

    let probe_path = root.join(format!(".permafrost-probe-{}", uuid::Uuid::new_v4()));
    let outcome = (|| -> std::io::Result<bool> {
        fs::write(&probe_path, b"permafrost atime probe")?;
        let starting_atime = fs::metadata(&probe_path)?.accessed()?;

        std::thread::sleep(ATIME_SETTLE);

        let mut contents = Vec::new();
        fs::File::open(&probe_path)?.read_to_end(&mut contents)?;
        let atime = fs::metadata(&probe_path)?.accessed()?;
        Ok(atime != starting_atime)
    })();
    let _ = fs::remove_file(&probe_path);

    match outcome {
        Ok(atime_moved) => perms.freezable = atime_moved,
        Err(e) => {
            tracing::debug!("Probe failed in {}: {}", root.display(), e);
            perms.writable = false;
        }
    }

    tracing::info!(
        "Probed root {}: writable={} freezable={}",
        root.display(),
        perms.writable,
        perms.freezable
    );
    perms
}
