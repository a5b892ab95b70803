//! In-memory registry

use super::{sha256_hex, PackageRegistry, RegistryError, Release};
use crate::archive::{self, ArchiveError};
use crate::manifest::PackageManifest;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Registry backed by a map of releases and archive blobs
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    releases: RwLock<HashMap<String, Vec<Release>>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a package whose archive holds only its manifest plus `files`
    pub fn publish(
        &self,
        manifest: PackageManifest,
        files: &[(&str, &[u8])],
    ) -> Result<Release, ArchiveError> {
        let bytes = archive::pack_manifest(&manifest, files)?;
        Ok(self.publish_archive(manifest, bytes))
    }

    /// Publish prebuilt archive bytes for a manifest
    pub fn publish_archive(&self, manifest: PackageManifest, bytes: Vec<u8>) -> Release {
        let url = format!("memory://{}/{}", manifest.package.name, manifest.package.version);
        let release = Release {
            version: manifest.version(),
            download_url: url,
            checksum: Some(sha256_hex(&bytes)),
            manifest,
        };
        self.insert(release.clone(), bytes);
        release
    }

    /// Insert a release verbatim, e.g. one with a deliberately wrong checksum
    pub fn insert(&self, release: Release, bytes: Vec<u8>) {
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.insert(release.download_url.clone(), bytes);
        }
        if let Ok(mut releases) = self.releases.write() {
            let entry = releases
                .entry(release.manifest.package.name.clone())
                .or_default();
            entry.retain(|r| r.version != release.version);
            entry.push(release);
        }
    }

    /// Number of successful downloads served
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl PackageRegistry for MemoryRegistry {
    fn fetch_metadata(&self, name: &str) -> Result<Vec<Release>, RegistryError> {
        let releases = self
            .releases
            .read()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))?;
        releases
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::PackageNotFound(name.to_string()))
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, RegistryError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))?;
        let bytes = blobs
            .get(url)
            .cloned()
            .ok_or_else(|| RegistryError::DownloadNotFound(url.to_string()))?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(bytes)
    }
}
