//! Scoped temporary directories for archive decoding

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Name prefix of every workspace directory
pub const WORKSPACE_PREFIX: &str = "comicshelf-ws-";

/// Workspaces untouched for this long belong to no running extraction
pub const STALE_WORKSPACE_AGE: Duration = Duration::from_secs(60 * 60);

/// A uniquely-named temporary directory owned by a single extraction call
///
/// The directory and everything in it is removed when the workspace is
/// dropped, including on error returns and unwinding panics. Call
/// [`TempWorkspace::close`] to observe removal failures instead of having
/// them swallowed by `Drop`.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    /// Create a fresh workspace under `parent`, creating `parent` if needed
    pub fn create(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to create workspace parent '{}': {}",
                    parent.display(),
                    e
                ),
            ))
        })?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to create workspace in '{}': {}", parent.display(), e),
                ))
            })?;

        debug!(workspace = ?dir.path(), "created extraction workspace");
        Ok(Self { dir })
    }

    /// Location of the workspace directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file inside the workspace
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the workspace now, reporting any failure
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            warn!(workspace = ?path, error = %e, "failed to remove extraction workspace");
            Error::Io(e)
        })
    }
}

/// Remove workspace directories left behind by a previous process
///
/// Only prefixed directories last modified at least `older_than` ago are
/// removed, so workspaces of other processes sharing `parent` survive
/// while they are in use. Returns the number of directories removed.
pub fn sweep_stale_workspaces(parent: &Path, older_than: Duration) -> Result<usize> {
    let entries = match std::fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let is_workspace = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(WORKSPACE_PREFIX));
        if !is_workspace || !entry.path().is_dir() {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                debug!(workspace = ?entry.path(), error = %e, "skipping unreadable workspace");
                continue;
            }
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age < older_than {
            debug!(workspace = ?entry.path(), ?age, "workspace still fresh, keeping");
            continue;
        }
        match std::fs::remove_dir_all(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(
                workspace = ?entry.path(),
                error = %e,
                "failed to remove stale workspace"
            ),
        }
    }

    if removed > 0 {
        debug!(?parent, removed, "removed stale extraction workspaces");
    }
    Ok(removed)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let ws = TempWorkspace::create(parent.path()).unwrap();
            std::fs::write(ws.file("00001.jpg"), b"data").unwrap();
            assert!(ws.path().exists());
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn workspace_is_removed_when_a_panic_unwinds() {
        let parent = tempfile::tempdir().unwrap();
        let parent_path = parent.path().to_path_buf();
        let result = std::panic::catch_unwind(move || {
            let ws = TempWorkspace::create(&parent_path).unwrap();
            std::fs::write(ws.file("x"), b"data").unwrap();
            panic!("decoder blew up");
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn close_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let ws = TempWorkspace::create(parent.path()).unwrap();
        let path = ws.path().to_path_buf();
        ws.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn workspaces_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let a = TempWorkspace::create(parent.path()).unwrap();
        let b = TempWorkspace::create(parent.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn create_makes_missing_parent() {
        let root = tempfile::tempdir().unwrap();
        let parent = root.path().join("nested").join("tmp");
        let ws = TempWorkspace::create(&parent).unwrap();
        assert!(ws.path().starts_with(&parent));
    }

    #[test]
    fn sweep_removes_only_prefixed_directories() {
        let parent = tempfile::tempdir().unwrap();
        std::fs::create_dir(parent.path().join(format!("{}leftover", WORKSPACE_PREFIX))).unwrap();
        std::fs::create_dir(parent.path().join("unrelated")).unwrap();

        let removed = sweep_stale_workspaces(parent.path(), Duration::ZERO).unwrap();
        assert_eq!(removed, 1);
        assert!(parent.path().join("unrelated").exists());
    }

    #[test]
    fn sweep_keeps_workspaces_in_use_by_another_process() {
        let parent = tempfile::tempdir().unwrap();
        let live = TempWorkspace::create(parent.path()).unwrap();
        std::fs::write(live.file("00001.png"), b"data").unwrap();

        let abandoned = parent.path().join(format!("{}abandoned", WORKSPACE_PREFIX));
        std::fs::create_dir(&abandoned).unwrap();
        let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 60 * 60);
        std::fs::File::open(&abandoned)
            .unwrap()
            .set_modified(two_hours_ago)
            .unwrap();

        let removed = sweep_stale_workspaces(parent.path(), STALE_WORKSPACE_AGE).unwrap();
        assert_eq!(removed, 1);
        assert!(!abandoned.exists());
        assert!(live.file("00001.png").exists());
    }

    #[test]
    fn sweep_of_missing_parent_is_noop() {
        let parent = tempfile::tempdir().unwrap();
        let missing = parent.path().join("does-not-exist");
        assert_eq!(sweep_stale_workspaces(&missing, Duration::ZERO).unwrap(), 0);
    }
}
