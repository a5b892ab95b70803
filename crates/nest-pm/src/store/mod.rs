//! Durable installer state
//!
//! - [`RecordSet`]/[`RecordStore`]: the per-scope install records
//! - [`ScopeLock`]: exclusive lock held while a scope is mutated
//! - [`PackageStore`]: the shared versioned extraction store and its refs

mod lock;
mod package_store;
mod records;

pub use lock::ScopeLock;
pub use package_store::{PackageStore, StoreRefs};
pub use records::{InstallRecord, RecordSet, RecordStore, RECORDS_VERSION};

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while reading or writing installer state
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the scope lock
    #[error("Scope is locked by another process: {0}")]
    ScopeLocked(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Failed to serialize TOML
    #[error("Failed to serialize {0}")]
    Serialize(String),

    /// Validation error
    #[error("Invalid state file: {0}")]
    Validation(String),
}

/// Replace `path` with `content` via a temp file in the same directory
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Validation(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
