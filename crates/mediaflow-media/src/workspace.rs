//! Per-job scratch directories.
//!
//! A [`TempWorkspace`] owns `{root}/{id}` for the lifetime of one job. The
//! normal path releases it with [`TempWorkspace::cleanup`]; any early return
//! or panic falls through to `Drop`, which removes the directory
//! synchronously.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Scoped temporary directory removed on release.
#[derive(Debug)]
pub struct TempWorkspace {
    path: PathBuf,
    released: bool,
}

impl TempWorkspace {
    /// Create `{root}/{id}`. The id must be a single path component.
    pub async fn create(root: impl AsRef<Path>, id: &str) -> MediaResult<Self> {
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains('/')
            || id.contains('\\')
        {
            return Err(MediaError::InvalidWorkspaceId(id.to_string()));
        }

        let path = root.as_ref().join(id);
        fs::create_dir_all(&path).await?;
        debug!("Created workspace {}", path.display());

        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory. Failures are logged, never returned.
    pub async fn cleanup(mut self) {
        self.released = true;
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!("Removed workspace {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed workspace {} on drop", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", self.path.display(), e),
        }
    }
}
