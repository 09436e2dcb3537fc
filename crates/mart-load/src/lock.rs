//! Exclusive per-warehouse run lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{LoadError, Result};

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// `<warehouse>.lock` next to the warehouse file.
    pub fn path_for(warehouse: &Path) -> PathBuf {
        let mut name = warehouse
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".lock");
        warehouse.with_file_name(name)
    }

    /// Takes the lock without waiting. Fails with [`LoadError::Busy`] when
    /// another run holds it.
    pub fn acquire(warehouse: &Path) -> Result<Self> {
        let path = Self::path_for(warehouse);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LoadError::LockFile {
                path: path.clone(),
                source,
            })?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "acquired run lock");
                Ok(Self { file, path })
            }
            Err(error) if error.kind() == fs2::lock_contended_error().kind() => {
                Err(LoadError::Busy { path })
            }
            Err(source) => Err(LoadError::LockFile { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), %error, "failed to release run lock");
        }
    }
}
