use crate::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FILE_NAME: &str = "urls.json";

/// A snapshot file path inside a temporary directory.
///
/// The file itself is not created; the directory and everything in it is
/// removed when the fixture is dropped.
pub struct TempSnapshot {
    _dir: TempDir,
    path: PathBuf,
}

impl TempSnapshot {
    /// A path directly inside a fresh temporary directory.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(FILE_NAME);
        Ok(Self { _dir: dir, path })
    }

    /// A path whose parent directories do not exist yet.
    pub fn nested() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data").join("snapshots").join(FILE_NAME);
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the snapshot's parent directory with a regular file, so every
    /// later write to the snapshot fails.
    pub fn block_parent(&self) -> Result<()> {
        let Some(parent) = self.path.parent() else {
            return Ok(());
        };
        if parent.is_dir() {
            std::fs::remove_dir_all(parent)?;
        } else if let Some(grandparent) = parent.parent() {
            std::fs::create_dir_all(grandparent)?;
        }
        std::fs::write(parent, b"not a directory")?;
        Ok(())
    }
}
