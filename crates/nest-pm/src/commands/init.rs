//! Project initialization command
//!
//! Writes a fresh nest.toml.

use crate::manifest::{PackageManifest, MANIFEST_FILE};
use crate::specifier::is_valid_package_name;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during project initialization
#[derive(Debug, Error)]
pub enum InitError {
    /// Project already exists
    #[error("Project already exists: nest.toml found in {0}")]
    AlreadyExists(PathBuf),

    /// Name derived from the directory is not a package name
    #[error("Cannot use '{0}' as a package name; pass --name")]
    InvalidName(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Manifest error
    #[error("Manifest error: {0}")]
    ManifestError(#[from] crate::manifest::ManifestError),
}

/// Initialize a project in `dir`
///
/// The package name defaults to the directory name.
pub fn init_project(
    dir: &Path,
    name: Option<&str>,
    version: Option<&str>,
) -> Result<PackageManifest, InitError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        return Err(InitError::AlreadyExists(dir.to_path_buf()));
    }

    let package_name = match name {
        Some(name) => name.to_string(),
        None => dir
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase().replace(' ', "-"))
            .unwrap_or_else(|| "my-package".to_string()),
    };
    if !is_valid_package_name(&package_name) {
        return Err(InitError::InvalidName(package_name));
    }

    let mut manifest = PackageManifest::new(package_name, version.unwrap_or("0.1.0"));
    manifest.package.license = Some("MIT".to_string());
    manifest.validate()?;

    fs::create_dir_all(dir)?;
    manifest.to_file(&manifest_path)?;

    println!("Created {} in {}", MANIFEST_FILE, dir.display());
    Ok(manifest)
}
