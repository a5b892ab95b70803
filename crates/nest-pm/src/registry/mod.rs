//! Package registry capability
//!
//! The resolver and installer only see [`PackageRegistry`]. [`HttpRegistry`]
//! talks to a remote registry; [`MemoryRegistry`] serves tests and offline
//! resolution.

mod api;
mod client;
mod memory;

pub use api::{PackageMetadata, VersionDownload, VersionInfo};
pub use client::{HttpRegistry, DEFAULT_REGISTRY};
pub use memory::MemoryRegistry;

use crate::manifest::PackageManifest;
use crate::semver::Version;
use sha2::{Digest, Sha256};
use std::io;
use thiserror::Error;

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Package not found
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Download target not found
    #[error("Download not found: {0}")]
    DownloadNotFound(String),

    /// Checksum mismatch
    #[error("Checksum mismatch for {package}@{version}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        package: String,
        version: String,
        expected: String,
        actual: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Registry returned metadata that does not describe a usable release
    #[error("Invalid metadata for {package}: {reason}")]
    InvalidMetadata { package: String, reason: String },

    /// Registry unavailable
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// One published version of a package
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub version: Version,
    pub manifest: PackageManifest,
    pub download_url: String,
    /// Hex-encoded SHA-256 of the archive, when the registry publishes one
    pub checksum: Option<String>,
}

/// Source of package metadata and archives
pub trait PackageRegistry: Send + Sync {
    /// All known releases of a package
    fn fetch_metadata(&self, name: &str) -> Result<Vec<Release>, RegistryError>;

    /// Raw archive bytes
    fn download(&self, url: &str) -> Result<Vec<u8>, RegistryError>;
}

/// SHA-256 of a byte slice, hex-encoded
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Check downloaded bytes against a release checksum
pub fn verify_checksum(release: &Release, bytes: &[u8]) -> Result<(), RegistryError> {
    let Some(expected) = &release.checksum else {
        return Ok(());
    };

    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(RegistryError::ChecksumMismatch {
            package: release.manifest.package.name.clone(),
            version: release.version.to_string(),
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}
