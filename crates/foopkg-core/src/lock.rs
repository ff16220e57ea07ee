//! Per-package advisory lock.
//!
//! Two runs building the same package would trample each other's archive,
//! source tree and log. The orchestrator holds an exclusive advisory lock (`flock(2)` on Unix) on
//! `<build>/<name>/.lock` for the whole pipeline; the kernel drops it when
//! the descriptor is closed, including when the process dies.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("another foopkg run is already building here (lock held on {0})")]
    Busy(PathBuf),

    #[error("failed to lock {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// An exclusive lock, released on drop.
#[derive(Debug)]
pub struct PackageLock {
    _file: File,
    path: PathBuf,
}

impl PackageLock {
    /// Take the lock at `path` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Busy`] if another process holds the lock.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(io_err)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(LockError::Busy(path.to_path_buf())),
            Err(TryLockError::Error(err)) => return Err(io_err(err)),
        }

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
