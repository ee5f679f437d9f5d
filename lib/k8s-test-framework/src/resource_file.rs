use std::path::{Path, PathBuf};

use tempfile::{tempdir, TempDir};

use crate::Result;

/// A manifest written to a temporary file, removed when dropped.
#[derive(Debug)]
pub struct ResourceFile {
    dir: TempDir,
    path: PathBuf,
}

impl ResourceFile {
    /// Write `data` to a fresh temporary `resource.yaml`.
    pub fn new(data: &str) -> Result<Self> {
        let dir = tempdir()?;
        let path = dir.path().join("resource.yaml");
        std::fs::write(&path, data)?;
        Ok(Self { dir, path })
    }

    /// The path of the written manifest.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// The directory holding the manifest.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}
