//! Package sources
//!
//! Turns user input and manifest dependencies into a [`PackageSource`], and
//! reads the manifest a source refers to without installing anything.

use crate::archive::{self, ArchiveError};
use crate::manifest::{Dependency, ManifestError, PackageManifest, MANIFEST_FILE};
use crate::registry::{PackageRegistry, RegistryError, Release};
use crate::scope::normalize;
use crate::semver::{select_best, Range, SemverError};
use crate::specifier::{PackageSpecifier, SpecifierError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while resolving a source
#[derive(Debug, Error)]
pub enum SourceError {
    /// A filesystem entry exists but is neither a directory nor a file
    #[error("'{0}' exists but is neither a directory nor a regular file")]
    AmbiguousSource(PathBuf),

    #[error(transparent)]
    InvalidSpecifier(#[from] SpecifierError),

    #[error("Invalid version range '{range}' for {name}: {error}")]
    InvalidRange {
        name: String,
        range: String,
        error: SemverError,
    },

    #[error("No version of {name} matches {range}")]
    NoMatchingVersion { name: String, range: String },

    #[error("No nest.toml in {0}")]
    MissingManifest(PathBuf),

    #[error("Invalid manifest at {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Registry error for {name}: {source}")]
    Registry {
        name: String,
        #[source]
        source: RegistryError,
    },
}

/// Where a package comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackageSource {
    Registry { name: String, range: String },
    Directory { path: PathBuf },
    Archive { path: PathBuf },
}

impl PackageSource {
    /// Build a source from a manifest dependency
    ///
    /// Path dependencies are relative to `manifest_dir`.
    pub fn from_dependency(name: &str, dep: &Dependency, manifest_dir: &Path) -> Self {
        match dep.path() {
            Some(path) => {
                let path = normalize(&manifest_dir.join(path));
                if path.is_file() {
                    PackageSource::Archive { path }
                } else {
                    PackageSource::Directory { path }
                }
            }
            None => PackageSource::Registry {
                name: name.to_string(),
                range: dep.version().unwrap_or("*").to_string(),
            },
        }
    }

    /// Local filesystem path of a directory or archive source
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            PackageSource::Registry { .. } => None,
            PackageSource::Directory { path } | PackageSource::Archive { path } => Some(path),
        }
    }

    pub fn is_registry(&self) -> bool {
        matches!(self, PackageSource::Registry { .. })
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSource::Registry { name, range } => write!(f, "{}@{}", name, range),
            PackageSource::Directory { path } => write!(f, "dir:{}", path.display()),
            PackageSource::Archive { path } => write!(f, "archive:{}", path.display()),
        }
    }
}

/// A manifest together with the registry release it came from, if any
#[derive(Debug, Clone)]
pub struct SourceManifest {
    pub manifest: PackageManifest,
    pub release: Option<Release>,
}

/// Resolves textual input and sources against the filesystem and a registry
#[derive(Clone)]
pub struct SourceResolver {
    base_dir: PathBuf,
    registry: Arc<dyn PackageRegistry>,
}

impl SourceResolver {
    pub fn new(base_dir: impl Into<PathBuf>, registry: Arc<dyn PackageRegistry>) -> Self {
        Self {
            base_dir: base_dir.into(),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<dyn PackageRegistry> {
        &self.registry
    }

    /// Classify an install target
    ///
    /// Existing directories and regular files win over specifier parsing.
    pub fn resolve(&self, input: &str) -> Result<PackageSource, SourceError> {
        let path = self.base_dir.join(input);

        match path.metadata() {
            Ok(meta) if meta.is_dir() => return Ok(PackageSource::Directory { path }),
            Ok(meta) if meta.is_file() => return Ok(PackageSource::Archive { path }),
            Ok(_) => return Err(SourceError::AmbiguousSource(path)),
            Err(_) => {
                // Dangling symlinks and similar entries
                if path.symlink_metadata().is_ok() {
                    return Err(SourceError::AmbiguousSource(path));
                }
            }
        }

        let spec = PackageSpecifier::parse(input)?;
        Ok(PackageSource::Registry {
            name: spec.full_name(),
            range: spec.range,
        })
    }

    /// Read the manifest a source refers to
    ///
    /// Registry sources pick the highest release satisfying the range.
    pub fn manifest(&self, source: &PackageSource) -> Result<SourceManifest, SourceError> {
        match source {
            PackageSource::Directory { path } => {
                let manifest_path = path.join(MANIFEST_FILE);
                if !manifest_path.is_file() {
                    return Err(SourceError::MissingManifest(path.clone()));
                }
                let manifest = PackageManifest::from_file(&manifest_path).map_err(|source| {
                    SourceError::Manifest {
                        path: manifest_path,
                        source,
                    }
                })?;
                Ok(SourceManifest {
                    manifest,
                    release: None,
                })
            }
            PackageSource::Archive { path } => Ok(SourceManifest {
                manifest: archive::read_manifest(path)?,
                release: None,
            }),
            PackageSource::Registry { name, range } => {
                let parsed = Range::parse(range).map_err(|error| SourceError::InvalidRange {
                    name: name.clone(),
                    range: range.clone(),
                    error,
                })?;
                let release = self.best_release(name, &parsed)?;
                Ok(SourceManifest {
                    manifest: release.manifest.clone(),
                    release: Some(release),
                })
            }
        }
    }

    /// Highest release of `name` satisfying `range`
    pub fn best_release(&self, name: &str, range: &Range) -> Result<Release, SourceError> {
        let releases = self
            .registry
            .fetch_metadata(name)
            .map_err(|source| SourceError::Registry {
                name: name.to_string(),
                source,
            })?;

        let best = select_best(releases.iter().map(|r| &r.version), range).map_err(|_| {
            SourceError::NoMatchingVersion {
                name: name.to_string(),
                range: range.to_string(),
            }
        })?;

        releases
            .into_iter()
            .find(|r| r.version == best)
            .ok_or_else(|| SourceError::NoMatchingVersion {
                name: name.to_string(),
                range: range.to_string(),
            })
    }
}

impl fmt::Debug for SourceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceResolver")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}
