//! Scope lock
//!
//! An advisory exclusive lock on a file. Acquisition retries with
//! exponential backoff until the timeout, then gives up with
//! [`StoreError::ScopeLocked`].

use super::StoreError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// First retry delay; doubles on every attempt
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Exclusive lock, released on drop
#[derive(Debug)]
pub struct ScopeLock {
    file: File,
    path: PathBuf,
}

impl ScopeLock {
    /// Acquire the lock at `path`, waiting at most `timeout`
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(path = %path.display(), "acquired scope lock");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_contended(&e) => {
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        return Err(StoreError::ScopeLocked(path.to_path_buf()));
                    }
                    let wait = backoff.min(timeout - elapsed);
                    debug!(path = %path.display(), ?wait, "scope lock busy, retrying");
                    thread::sleep(wait);
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopeLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), "failed to release lock: {}", e);
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
