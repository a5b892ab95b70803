//! Registry API types
//!
//! Response types for the package registry API.

use super::{RegistryError, Release};
use crate::manifest::PackageManifest;
use crate::semver::Version;
use serde::{Deserialize, Serialize};

/// Package metadata from registry
///
/// Response from GET /packages/{name}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package name
    pub name: String,

    /// Package description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Published versions
    pub versions: Vec<VersionInfo>,
}

/// Version information from registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Version number
    pub version: String,

    /// SHA-256 checksum of the package archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Download information
    pub download: VersionDownload,

    /// The package descriptor published with this version
    pub manifest: PackageManifest,

    /// Whether this version is yanked
    #[serde(default)]
    pub yanked: bool,
}

/// Download information for a package version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDownload {
    /// Download URL for the package archive (absolute, or relative to the registry)
    pub url: String,
}

impl PackageMetadata {
    /// Convert into releases, skipping yanked versions
    ///
    /// `resolve_url` turns the published download URL into an absolute one.
    pub fn into_releases(
        self,
        resolve_url: impl Fn(&str) -> Result<String, RegistryError>,
    ) -> Result<Vec<Release>, RegistryError> {
        let mut releases = Vec::with_capacity(self.versions.len());

        for info in self.versions.into_iter().filter(|v| !v.yanked) {
            let version = Version::parse(&info.version).map_err(|e| {
                RegistryError::InvalidMetadata {
                    package: self.name.clone(),
                    reason: e.to_string(),
                }
            })?;

            if info.manifest.package.name != self.name
                || info.manifest.version() != version
            {
                return Err(RegistryError::InvalidMetadata {
                    package: self.name.clone(),
                    reason: format!(
                        "manifest {} does not match release {}@{}",
                        info.manifest.identifier(),
                        self.name,
                        version
                    ),
                });
            }

            releases.push(Release {
                version,
                manifest: info.manifest,
                download_url: resolve_url(&info.download.url)?,
                checksum: info.checksum,
            });
        }

        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"{
        "name": "logging",
        "description": "A logging library",
        "versions": [
            {
                "version": "1.0.0",
                "checksum": "abc123",
                "download": { "url": "/files/logging-1.0.0.tar.gz" },
                "manifest": { "package": { "name": "logging", "version": "1.0.0" } }
            },
            {
                "version": "1.1.0",
                "download": { "url": "https://cdn.example.com/logging-1.1.0.tar.gz" },
                "manifest": {
                    "package": { "name": "logging", "version": "1.1.0" },
                    "dependencies": { "utils": "^1.0.0" }
                }
            },
            {
                "version": "2.0.0",
                "yanked": true,
                "download": { "url": "/files/logging-2.0.0.tar.gz" },
                "manifest": { "package": { "name": "logging", "version": "2.0.0" } }
            }
        ]
    }"#;

    #[test]
    fn test_deserialize_package_metadata() {
        let metadata: PackageMetadata = serde_json::from_str(METADATA).unwrap();
        assert_eq!(metadata.name, "logging");
        assert_eq!(metadata.versions.len(), 3);
        assert!(metadata.versions[2].yanked);
        assert_eq!(
            metadata.versions[1].manifest.dependencies["utils"].version(),
            Some("^1.0.0")
        );
    }

    #[test]
    fn test_into_releases_skips_yanked() {
        let metadata: PackageMetadata = serde_json::from_str(METADATA).unwrap();
        let releases = metadata.into_releases(|u| Ok(u.to_string())).unwrap();

        let versions: Vec<String> = releases.iter().map(|r| r.version.to_string()).collect();
        assert_eq!(versions, vec!["1.0.0", "1.1.0"]);
        assert_eq!(releases[0].checksum.as_deref(), Some("abc123"));
        assert_eq!(releases[1].checksum, None);
    }

    #[test]
    fn test_mismatched_manifest_rejected() {
        let json = r#"{
            "name": "logging",
            "versions": [{
                "version": "1.0.0",
                "download": { "url": "/x.tar.gz" },
                "manifest": { "package": { "name": "other", "version": "1.0.0" } }
            }]
        }"#;
        let metadata: PackageMetadata = serde_json::from_str(json).unwrap();
        assert!(matches!(
            metadata.into_releases(|u| Ok(u.to_string())),
            Err(RegistryError::InvalidMetadata { .. })
        ));
    }
}
