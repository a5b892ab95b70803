//! Install records (.nest-installed.toml)
//!
//! One record per installed package per scope. The installer is the only
//! writer.

use super::{write_atomic, StoreError};
use crate::scope::ScopeLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Record file format version
pub const RECORDS_VERSION: u32 = 1;

/// An activated package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallRecord {
    /// Package name
    pub name: String,

    /// Exact version
    pub version: String,

    /// Link location inside the scope's module directory
    pub install_path: PathBuf,

    /// Versioned store directory (or the linked source for develop links)
    pub store_path: PathBuf,

    /// Whether the record belongs to the global scope
    #[serde(default)]
    pub is_global: bool,

    /// Source directory of a development link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_from: Option<PathBuf>,

    /// Executable links created for this package
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bins: Vec<PathBuf>,
}

impl InstallRecord {
    /// `name@version`
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn is_linked(&self) -> bool {
        self.linked_from.is_some()
    }
}

/// All records of one scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordSet {
    /// Record file format version
    pub version: u32,

    /// Installed packages
    #[serde(default)]
    pub packages: Vec<InstallRecord>,
}

impl Default for RecordSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSet {
    /// Create a new empty record set
    pub fn new() -> Self {
        Self {
            version: RECORDS_VERSION,
            packages: Vec::new(),
        }
    }

    /// Parse a record set from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str, path: &Path) -> Result<Self, StoreError> {
        let records: RecordSet = toml::from_str(content).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        records.validate()?;
        Ok(records)
    }

    /// Validate the record set
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.version != RECORDS_VERSION {
            return Err(StoreError::Validation(format!(
                "Unsupported record file version: {} (expected {})",
                self.version, RECORDS_VERSION
            )));
        }

        for (i, record) in self.packages.iter().enumerate() {
            if record.name.is_empty() || record.version.is_empty() {
                return Err(StoreError::Validation(format!(
                    "Record #{} is missing a name or version",
                    i + 1
                )));
            }
            if self.packages[..i].iter().any(|r| r.name == record.name) {
                return Err(StoreError::Validation(format!(
                    "Package '{}' is recorded twice",
                    record.name
                )));
            }
        }

        Ok(())
    }

    /// Record by package name
    pub fn get(&self, name: &str) -> Option<&InstallRecord> {
        self.packages.iter().find(|r| r.name == name)
    }

    /// Whether exactly `name@version` is recorded
    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.get(name).is_some_and(|r| r.version == version)
    }

    /// Add a record, replacing any record with the same name
    pub fn insert(&mut self, record: InstallRecord) {
        self.packages.retain(|r| r.name != record.name);
        self.packages.push(record);
    }

    /// Remove and return the record for `name`
    pub fn remove(&mut self, name: &str) -> Option<InstallRecord> {
        let index = self.packages.iter().position(|r| r.name == name)?;
        Some(self.packages.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstallRecord> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Sort packages by name (for deterministic output)
    pub fn sort_packages(&mut self) {
        self.packages.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// Reads and writes the record file of a scope
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_scope(scope: &ScopeLayout) -> Self {
        Self::new(scope.record_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the records; a missing file is an empty set
    pub fn load(&self) -> Result<RecordSet, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => RecordSet::from_str(&content, &self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecordSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace the record file
    pub fn save(&self, records: &RecordSet) -> Result<(), StoreError> {
        let mut sorted = records.clone();
        sorted.sort_packages();
        let content = toml::to_string_pretty(&sorted)
            .map_err(|e| StoreError::Serialize(format!("{}: {}", self.path.display(), e)))?;
        write_atomic(&self.path, content.as_bytes())?;
        debug!(path = %self.path.display(), packages = sorted.len(), "saved install records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str) -> InstallRecord {
        InstallRecord {
            name: name.to_string(),
            version: version.to_string(),
            install_path: PathBuf::from(format!("/p/nest_modules/{name}")),
            store_path: PathBuf::from(format!("/h/store/{name}@{version}")),
            is_global: false,
            linked_from: None,
            bins: Vec::new(),
        }
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut set = RecordSet::new();
        set.insert(record("a", "1.0.0"));
        set.insert(record("a", "2.0.0"));

        assert_eq!(set.len(), 1);
        assert!(set.contains("a", "2.0.0"));
        assert!(!set.contains("a", "1.0.0"));
    }

    #[test]
    fn test_remove() {
        let mut set = RecordSet::new();
        set.insert(record("a", "1.0.0"));
        assert_eq!(set.remove("a").map(|r| r.version), Some("1.0.0".to_string()));
        assert!(set.remove("a").is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join(".nest-installed.toml"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("nest_modules/.nest-installed.toml"));

        let mut set = RecordSet::new();
        set.insert(record("zeta", "1.0.0"));
        let mut linked = record("alpha", "0.1.0");
        linked.linked_from = Some(PathBuf::from("/src/alpha"));
        linked.bins.push(PathBuf::from("/p/nest_modules/.bin/alpha"));
        set.insert(linked.clone());
        store.save(&set).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("version = 1"));
        assert!(content.contains("[[packages]]"));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.packages[0], linked);
        assert_eq!(loaded.packages[1].name, "zeta");
    }

    #[test]
    fn test_rejects_unknown_version() {
        let result = RecordSet::from_str("version = 2\n", Path::new("x"));
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut set = RecordSet::new();
        set.packages.push(record("a", "1.0.0"));
        set.packages.push(record("a", "2.0.0"));
        assert!(set.validate().is_err());
    }
}
