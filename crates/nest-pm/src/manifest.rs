//! Package manifest parsing (nest.toml)
//!
//! Provides structures and parsing for nest package manifests.

use crate::semver::{Range, Version};
use crate::specifier::is_valid_package_name;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// File name of the package descriptor
pub const MANIFEST_FILE: &str = "nest.toml";

/// Errors that can occur during manifest parsing
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("Failed to serialize manifest: {0}")]
    SerializeError(String),

    /// Validation error
    #[error("Invalid manifest: {0}")]
    ValidationError(String),
}

/// Package manifest (nest.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageManifest {
    /// Package metadata
    pub package: PackageInfo,

    /// Executable entry points (command name → path inside the package)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub bin: IndexMap<String, String>,

    /// Lifecycle scripts (event → shell command)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scripts: IndexMap<String, String>,

    /// Runtime dependencies, in declaration order
    #[serde(default)]
    pub dependencies: IndexMap<String, Dependency>,

    /// Development-only dependencies
    #[serde(default, rename = "dev-dependencies", skip_serializing_if = "IndexMap::is_empty")]
    pub dev_dependencies: IndexMap<String, Dependency>,

    /// Registry override for this project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryConfig>,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Registry base URL
    pub url: String,
}

/// Package information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageInfo {
    /// Package name (must be unique)
    pub name: String,

    /// Semver version
    pub version: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Authors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    /// License identifier (SPDX)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Main module entry point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    /// Private packages are never packed for distribution
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,
}

/// Dependency specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Dependency {
    /// Simple version range: "^1.2.0"
    Simple(String),

    /// Detailed dependency specification
    Detailed {
        /// Version range (for registry packages)
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,

        /// Local path dependency, relative to the declaring manifest
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl PackageManifest {
    /// Create a minimal manifest
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: PackageInfo {
                name: name.into(),
                version: version.into(),
                description: None,
                authors: Vec::new(),
                license: None,
                main: None,
                private: false,
            },
            bin: IndexMap::new(),
            scripts: IndexMap::new(),
            dependencies: IndexMap::new(),
            dev_dependencies: IndexMap::new(),
            registry: None,
        }
    }

    /// Parse a manifest from a file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load the manifest of a package directory
    pub fn from_dir(dir: &Path) -> Result<Self, ManifestError> {
        Self::from_file(&dir.join(MANIFEST_FILE))
    }

    /// Parse a manifest from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: PackageManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.package.name.is_empty() {
            return Err(ManifestError::ValidationError(
                "Package name cannot be empty".to_string(),
            ));
        }

        if !is_valid_package_name(&self.package.name) {
            return Err(ManifestError::ValidationError(format!(
                "Invalid package name: {}. Must contain only alphanumeric characters, hyphens, underscores, dots, and an optional @scope/ prefix",
                self.package.name
            )));
        }

        if !is_valid_version(&self.package.version) {
            return Err(ManifestError::ValidationError(format!(
                "Invalid version: {}. Must be valid semver (e.g., 1.2.3)",
                self.package.version
            )));
        }

        for (name, dep) in self.dependencies.iter().chain(&self.dev_dependencies) {
            validate_dependency(name, dep)?;
        }

        for (command, target) in &self.bin {
            if command.is_empty() || command.contains(['/', '\\']) {
                return Err(ManifestError::ValidationError(format!(
                    "Invalid bin name '{}'",
                    command
                )));
            }
            if !is_contained_path(target) {
                return Err(ManifestError::ValidationError(format!(
                    "bin '{}' must point inside the package, got '{}'",
                    command, target
                )));
            }
        }

        for event in self.scripts.keys() {
            if event.trim().is_empty() {
                return Err(ManifestError::ValidationError(
                    "Script event name cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Write manifest to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ManifestError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ManifestError::SerializeError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Package name
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// Parsed package version
    pub fn version(&self) -> Version {
        // validate() guarantees the version parses; fall back to 0.0.0 for
        // manifests built by hand without validation.
        Version::parse(&self.package.version).unwrap_or_else(|_| Version::new(0, 0, 0))
    }

    /// `name@version`
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.package.name, self.package.version)
    }

    /// Lifecycle script for an event, if declared
    pub fn script(&self, event: &str) -> Option<&str> {
        self.scripts.get(event).map(String::as_str)
    }

    /// Dependencies in declaration order, runtime first, then dev if requested
    ///
    /// A name declared in both tables is only yielded once (runtime wins).
    pub fn dependencies_in_order(&self, include_dev: bool) -> Vec<(&str, &Dependency)> {
        let mut deps: Vec<(&str, &Dependency)> = self
            .dependencies
            .iter()
            .map(|(name, dep)| (name.as_str(), dep))
            .collect();
        if include_dev {
            deps.extend(
                self.dev_dependencies
                    .iter()
                    .filter(|(name, _)| !self.dependencies.contains_key(*name))
                    .map(|(name, dep)| (name.as_str(), dep)),
            );
        }
        deps
    }
}

impl Dependency {
    /// Get the version range (if any)
    pub fn version(&self) -> Option<&str> {
        match self {
            Dependency::Simple(v) => Some(v.as_str()),
            Dependency::Detailed { version, .. } => version.as_deref(),
        }
    }

    /// Get the path (if this is a path dependency)
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            Dependency::Detailed { path: Some(p), .. } => Some(PathBuf::from(p)),
            _ => None,
        }
    }

    /// Check if this is a path dependency
    pub fn is_path(&self) -> bool {
        matches!(self, Dependency::Detailed { path: Some(_), .. })
    }

    /// Check if this is a registry dependency
    pub fn is_registry(&self) -> bool {
        matches!(
            self,
            Dependency::Simple(_) | Dependency::Detailed { version: Some(_), path: None }
        )
    }
}

/// Strict semver validation (MAJOR.MINOR.PATCH with optional suffixes)
fn is_valid_version(version: &str) -> bool {
    let core = version.split(['-', '+']).next().unwrap_or_default();
    core.split('.').count() == 3
        && !version.starts_with('v')
        && Version::parse(version).is_ok()
}

/// Relative path that cannot escape the package root
fn is_contained_path(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Validate a dependency specification
fn validate_dependency(name: &str, dep: &Dependency) -> Result<(), ManifestError> {
    if !is_valid_package_name(name) {
        return Err(ManifestError::ValidationError(format!(
            "Invalid dependency name '{}'",
            name
        )));
    }

    match dep {
        Dependency::Simple(version) => validate_range(name, version),
        Dependency::Detailed { version, path } => match (version, path) {
            (None, None) => Err(ManifestError::ValidationError(format!(
                "Dependency '{}' must specify version or path",
                name
            ))),
            (Some(_), Some(_)) => Err(ManifestError::ValidationError(format!(
                "Dependency '{}' cannot specify both version and path",
                name
            ))),
            (Some(version), None) => validate_range(name, version),
            (None, Some(path)) if path.trim().is_empty() => Err(ManifestError::ValidationError(
                format!("Dependency '{}' has empty path", name),
            )),
            (None, Some(_)) => Ok(()),
        },
    }
}

fn validate_range(name: &str, range: &str) -> Result<(), ManifestError> {
    Range::parse(range).map(|_| ()).map_err(|e| {
        ManifestError::ValidationError(format!("Dependency '{}': {}", name, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_manifest() {
        let toml = r#"
[package]
name = "my-package"
version = "1.0.0"
description = "A test package"
authors = ["Alice <alice@example.com>"]
license = "MIT"

[dependencies]
logging = "^1.2.0"
http = "~2.1.0"
"#;

        let manifest = PackageManifest::from_str(toml).unwrap();
        assert_eq!(manifest.package.name, "my-package");
        assert_eq!(manifest.version(), Version::new(1, 0, 0));
        assert_eq!(manifest.identifier(), "my-package@1.0.0");
        assert_eq!(manifest.dependencies.len(), 2);
    }

    #[test]
    fn test_dependencies_keep_declaration_order() {
        let toml = r#"
[package]
name = "app"
version = "1.0.0"

[dependencies]
zeta = "^1.0.0"
alpha = "^1.0.0"
mid = { path = "../mid" }

[dev-dependencies]
bench = "*"
alpha = "^2.0.0"
"#;

        let manifest = PackageManifest::from_str(toml).unwrap();
        let names: Vec<&str> = manifest
            .dependencies_in_order(true)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid", "bench"]);

        let runtime: Vec<&str> = manifest
            .dependencies_in_order(false)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(runtime, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_scripts_and_bin() {
        let toml = r#"
[package]
name = "cli-tool"
version = "0.3.0"
main = "index.nest"

[bin]
tool = "bin/tool.nest"

[scripts]
postinstall = "echo done"
"#;

        let manifest = PackageManifest::from_str(toml).unwrap();
        assert_eq!(manifest.bin["tool"], "bin/tool.nest");
        assert_eq!(manifest.script("postinstall"), Some("echo done"));
        assert_eq!(manifest.script("install"), None);
    }

    #[test]
    fn test_parse_scoped_package() {
        let toml = r#"
[package]
name = "@org/my-package"
version = "2.3.4"
"#;

        let manifest = PackageManifest::from_str(toml).unwrap();
        assert_eq!(manifest.package.name, "@org/my-package");
    }

    #[test]
    fn test_parse_path_dependency() {
        let toml = r#"
[package]
name = "main"
version = "1.0.0"

[dependencies]
utils = { path = "../utils" }
"#;

        let manifest = PackageManifest::from_str(toml).unwrap();
        let utils_dep = &manifest.dependencies["utils"];
        assert!(utils_dep.is_path());
        assert!(!utils_dep.is_registry());
        assert_eq!(utils_dep.path(), Some(PathBuf::from("../utils")));
    }

    #[test]
    fn test_validate_version() {
        assert!(is_valid_version("1.0.0"));
        assert!(is_valid_version("10.20.30"));
        assert!(is_valid_version("1.0.0-rc.1+build.5"));

        assert!(!is_valid_version("1.0"));
        assert!(!is_valid_version("1"));
        assert!(!is_valid_version("1.0.0.0"));
        assert!(!is_valid_version("v1.0.0"));
        assert!(!is_valid_version(""));
    }

    #[test]
    fn test_invalid_manifest_empty_name() {
        let toml = r#"
[package]
name = ""
version = "1.0.0"
"#;

        assert!(PackageManifest::from_str(toml).is_err());
    }

    #[test]
    fn test_invalid_manifest_bad_version() {
        let toml = r#"
[package]
name = "pkg"
version = "1.0"
"#;

        assert!(PackageManifest::from_str(toml).is_err());
    }

    #[test]
    fn test_invalid_dependency_range() {
        let toml = r#"
[package]
name = "pkg"
version = "1.0.0"

[dependencies]
bad = "^x.y"
"#;

        let result = PackageManifest::from_str(toml);
        assert!(matches!(result, Err(ManifestError::ValidationError(_))));
    }

    #[test]
    fn test_dependency_multiple_sources_error() {
        let toml = r#"
[package]
name = "pkg"
version = "1.0.0"

[dependencies]
bad = { version = "^1.0.0", path = "../local" }
"#;

        assert!(PackageManifest::from_str(toml).is_err());
    }

    #[test]
    fn test_bin_cannot_escape_package() {
        let toml = r#"
[package]
name = "pkg"
version = "1.0.0"

[bin]
evil = "../../etc/passwd"
"#;

        assert!(PackageManifest::from_str(toml).is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = PackageManifest::new("round", "1.2.3");
        manifest
            .dependencies
            .insert("b".to_string(), Dependency::Simple("^1.0.0".to_string()));
        manifest
            .dependencies
            .insert("a".to_string(), Dependency::Simple("~2.0.0".to_string()));
        manifest
            .scripts
            .insert("install".to_string(), "echo hi".to_string());

        let path = dir.path().join(MANIFEST_FILE);
        manifest.to_file(&path).unwrap();
        let loaded = PackageManifest::from_dir(dir.path()).unwrap();

        assert_eq!(loaded, manifest);
        let order: Vec<&String> = loaded.dependencies.keys().collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}
