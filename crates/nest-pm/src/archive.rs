//! Package archives (tar + gzip)
//!
//! Archives hold the package tree at their root: `nest.toml` is a top-level
//! entry. The same exclude list applies to packing and to copying a
//! directory source into the store.

use crate::manifest::{ManifestError, PackageManifest, MANIFEST_FILE};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Entries never packed or copied
pub const EXCLUDE_PATTERNS: &[&str] = &[".git*", "nest_modules", "dist", ".DS_Store"];

/// Errors that can occur while packing or unpacking archives
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to walk {path}: {source}")]
    WalkError {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Archive {0} does not contain nest.toml")]
    MissingManifest(PathBuf),

    #[error("Invalid manifest in {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },
}

/// Whether a file name matches one of the exclude patterns
pub fn is_excluded(name: &str) -> bool {
    EXCLUDE_PATTERNS.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == *pattern,
    })
}

/// Archive file name for a package: `<name>-<version>.tar.gz`
///
/// The `/` of a scoped name becomes `-` (`@org-pkg-1.0.0.tar.gz`).
pub fn archive_file_name(name: &str, version: &str) -> String {
    format!("{}-{}.tar.gz", name.replace('/', "-"), version)
}

/// Pack a package directory into `out_dir/<archive name>`
///
/// The directory must contain a valid `nest.toml`.
pub fn pack(dir: &Path, out_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = PackageManifest::from_file(&manifest_path).map_err(|source| {
        ArchiveError::Manifest {
            path: manifest_path.clone(),
            source,
        }
    })?;

    fs::create_dir_all(out_dir)?;
    let target = out_dir.join(archive_file_name(
        &manifest.package.name,
        &manifest.package.version,
    ));

    // Write next to the target, then move into place
    let mut tmp = tempfile::NamedTempFile::new_in(out_dir)?;
    {
        let encoder = GzEncoder::new(tmp.as_file_mut(), Compression::default());
        let mut builder = Builder::new(encoder);
        append_tree(&mut builder, dir)?;
        builder.into_inner()?.finish()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| e.error)?;

    debug!(archive = %target.display(), "packed {}", manifest.identifier());
    Ok(target)
}

/// Build an archive in memory from a manifest and extra files
pub fn pack_manifest(
    manifest: &PackageManifest,
    files: &[(&str, &[u8])],
) -> Result<Vec<u8>, ArchiveError> {
    let content = toml::to_string_pretty(manifest).map_err(|e| ArchiveError::Manifest {
        path: PathBuf::from(MANIFEST_FILE),
        source: ManifestError::SerializeError(e.to_string()),
    })?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    append_bytes(&mut builder, MANIFEST_FILE, content.as_bytes(), 0o644)?;
    for (path, data) in files {
        append_bytes(&mut builder, path, data, 0o755)?;
    }

    Ok(builder.into_inner()?.finish()?)
}

/// Unpack an archive file into `dest`
pub fn unpack(path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(path)?;
    unpack_reader(file, dest)
}

/// Unpack archive bytes into `dest`
pub fn unpack_bytes(bytes: &[u8], dest: &Path) -> Result<(), ArchiveError> {
    unpack_reader(bytes, dest)
}

fn unpack_reader<R: Read>(reader: R, dest: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dest)?;
    let mut archive = Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);
    // tar refuses entries that would escape `dest`
    archive.unpack(dest)?;
    Ok(())
}

/// Read `nest.toml` out of an archive without extracting it
pub fn read_manifest(path: &Path) -> Result<PackageManifest, ArchiveError> {
    let file = File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let is_manifest = entry_path
            .components()
            .filter(|c| !matches!(c, std::path::Component::CurDir))
            .eq(Path::new(MANIFEST_FILE).components());

        if is_manifest {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return PackageManifest::from_str(&content).map_err(|source| ArchiveError::Manifest {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    Err(ArchiveError::MissingManifest(path.to_path_buf()))
}

/// Copy a package directory, skipping excluded entries
pub fn copy_tree(src: &Path, dest: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dest)?;

    for entry in walk(src) {
        let entry = entry.map_err(|source| ArchiveError::WalkError {
            path: src.to_path_buf(),
            source,
        })?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
        }
    }

    Ok(())
}

fn walk(dir: &Path) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(&e.file_name().to_string_lossy()))
}

fn append_tree<W: Write>(builder: &mut Builder<W>, dir: &Path) -> Result<(), ArchiveError> {
    for entry in walk(dir) {
        let entry = entry.map_err(|source| ArchiveError::WalkError {
            path: dir.to_path_buf(),
            source,
        })?;
        let rel = match entry.path().strip_prefix(dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => continue,
        };

        if entry.file_type().is_dir() {
            builder.append_dir(&rel, entry.path())?;
        } else if entry.file_type().is_file() {
            builder.append_path_with_name(entry.path(), &rel)?;
        }
    }
    Ok(())
}

fn append_bytes<W: Write>(
    builder: &mut Builder<W>,
    path: &str,
    data: &[u8],
    mode: u32,
) -> Result<(), ArchiveError> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    builder.append_data(&mut header, path, data)?;
    Ok(())
}
