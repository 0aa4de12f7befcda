//! On-disk layout of the application-support directory.
//!
//! ```text
//! <app-support>/loqui/
//!   config.yaml        startup configuration
//!   state.json         tray/UI mode mirror
//!   hardware_id        cached installation UUID (opaque text)
//!   screenshots/       shot_<ms>.jpg, reaped after 24 h
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory name under the platform data dir.
const APP_DIR_NAME: &str = "loqui";

/// Screenshot cache entries older than this are deleted.
pub const SCREENSHOT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Path resolution failed.
#[derive(Debug, Error)]
pub enum PathsError {
    /// The platform reports no data directory.
    #[error("no application-support directory on this platform")]
    NoDataDir,
    /// Creating the layout failed.
    #[error("failed to prepare application directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// Resolve against the platform data directory, creating the layout.
    pub fn resolve() -> Result<Self, PathsError> {
        let base = dirs::data_dir().ok_or(PathsError::NoDataDir)?;
        Self::with_root(base.join(APP_DIR_NAME))
    }

    /// Use an explicit root (tests, portable installs).
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self, PathsError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join("screenshots"))?;
        Ok(Self { root })
    }

    /// The root directory itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The YAML configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// The tray/UI state mirror.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// The hardware-id cache file.
    #[must_use]
    pub fn hardware_id_file(&self) -> PathBuf {
        self.root.join("hardware_id")
    }

    /// The screenshot cache directory.
    #[must_use]
    pub fn screenshot_dir(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    /// Cache path for a screenshot captured at `millis`.
    #[must_use]
    pub fn screenshot_file(&self, millis: u64) -> PathBuf {
        self.screenshot_dir().join(format!("shot_{millis}.jpg"))
    }

    /// Delete cache entries older than `max_age`. Returns how many were
    /// removed; unreadable entries are skipped rather than fatal.
    pub fn reap_screenshots(&self, max_age: Duration) -> std::io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in std::fs::read_dir(self.screenshot_dir())? {
            let Ok(entry) = entry else { continue };
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };

            let stale = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if stale && std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "reaped stale screenshots");
        }
        Ok(removed)
    }
}

/// Contents of the tray/UI state mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrayState {
    /// Current mode label.
    pub state: String,
    /// Write time, epoch seconds.
    pub ts: u64,
}

impl TrayState {
    /// Build a state entry stamped now.
    #[must_use]
    pub fn now(state: &str) -> Self {
        Self {
            state: state.to_string(),
            ts: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Write this entry to `path` atomically (write-then-rename).
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)
    }
}
