//! Exclusive pipeline lock.
//!
//! Zone stores are not safe under concurrent writers, so a run holds an
//! advisory lock on a file in the data root until it is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

/// Errors acquiring the pipeline lock
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Another pipeline run holds the lock at {0}")]
    Held(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Guard holding the lock; released on drop
#[derive(Debug)]
pub struct PipelineLock {
    file: File,
    path: PathBuf,
}

impl PipelineLock {
    /// Take the lock without waiting
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "Acquired pipeline lock");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(LockError::Held(path.to_path_buf()))
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PipelineLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
