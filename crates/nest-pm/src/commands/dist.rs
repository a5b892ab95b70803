//! `nest dist`: pack the project into `dist/`

use crate::archive;
use anyhow::{bail, Context};
use std::path::{Path, PathBuf};

/// Output directory, relative to the project root
pub const DIST_DIR: &str = "dist";

/// Pack the project at `root` into `root/dist/<archive name>`
pub fn dist_project(root: &Path) -> anyhow::Result<PathBuf> {
    let manifest = crate::manifest::PackageManifest::from_dir(root)
        .with_context(|| format!("No valid nest.toml in {}", root.display()))?;
    if manifest.package.private {
        bail!("{} is private and cannot be packed", manifest.identifier());
    }

    let archive = archive::pack(root, &root.join(DIST_DIR))
        .with_context(|| format!("Failed to pack {}", manifest.identifier()))?;

    println!("Packed {} -> {}", manifest.identifier(), archive.display());
    Ok(archive)
}
