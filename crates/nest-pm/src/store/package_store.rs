//! Versioned extraction store
//!
//! Every package version is extracted once under `<home>/store/<key>` and
//! linked into any number of scopes. `refs.toml` tracks which scopes use
//! which key so the directory can be removed when the last one leaves.
//!
//! Directory structure:
//! ```text
//! ~/.nest/store/
//! ├── json@2.0.0/
//! ├── @acme+utils@1.4.1/
//! ├── .tmp/
//! ├── .refs.lock
//! └── refs.toml
//! ```

use super::{write_atomic, ScopeLock, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::manifest::MANIFEST_FILE;

const REFS_FILE: &str = "refs.toml";
const REFS_LOCK: &str = ".refs.lock";
const TMP_DIR: &str = ".tmp";

/// Consumers of each store key
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreRefs {
    #[serde(default)]
    pub refs: BTreeMap<String, BTreeSet<PathBuf>>,
}

/// Shared package store under the nest home
#[derive(Debug, Clone)]
pub struct PackageStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl PackageStore {
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            lock_timeout,
        }
    }

    /// `<home>/store`
    pub fn for_home(home: &Path, lock_timeout: Duration) -> Self {
        Self::new(home.join("store"), lock_timeout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store key of a package version (`@org/pkg` becomes `@org+pkg`)
    pub fn key(name: &str, version: &str) -> String {
        format!("{}@{}", name.replace('/', "+"), version)
    }

    pub fn package_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Whether `key` has a completed extraction
    pub fn contains(&self, key: &str) -> bool {
        self.package_dir(key).join(MANIFEST_FILE).is_file()
    }

    /// Scratch directory for downloads and in-progress extractions
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// Fresh staging directory for one extraction of `key`
    pub fn staging_dir(&self, key: &str) -> Result<PathBuf, StoreError> {
        let dir = self
            .tmp_dir()
            .join(format!("{}-{}", key, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Register `consumer` on a completed extraction of `key`
    ///
    /// Returns `None` when the store has no completed extraction. The check
    /// and the new ref happen under the refs lock, so a concurrent
    /// [`release`](Self::release) cannot delete the directory in between.
    pub fn claim(&self, key: &str, consumer: &Path) -> Result<Option<PathBuf>, StoreError> {
        let _lock = self.refs_lock()?;
        if !self.contains(key) {
            return Ok(None);
        }
        self.modify_refs(|refs| add_consumer(refs, key, consumer))?;
        Ok(Some(self.package_dir(key)))
    }

    /// Move a finished staging directory into place and register `consumer`
    ///
    /// If another extraction completed first, the staging copy is dropped
    /// and the existing one is used.
    pub fn commit(&self, staging: &Path, key: &str, consumer: &Path) -> Result<PathBuf, StoreError> {
        let _lock = self.refs_lock()?;
        let target = self.package_dir(key);

        if self.contains(key) {
            fs::remove_dir_all(staging)?;
        } else {
            if target.exists() {
                // Leftover from an interrupted extraction
                fs::remove_dir_all(&target)?;
            }
            fs::rename(staging, &target)?;
            debug!(key, "committed to store");
        }

        self.modify_refs(|refs| add_consumer(refs, key, consumer))?;
        Ok(target)
    }

    /// Drop `consumer` from `key` and delete the extraction once nobody
    /// uses it
    ///
    /// Returns how many consumers remain.
    pub fn release(&self, key: &str, consumer: &Path) -> Result<usize, StoreError> {
        let _lock = self.refs_lock()?;
        let remaining = self.modify_refs(|refs| {
            let remaining = match refs.refs.get_mut(key) {
                Some(consumers) => {
                    consumers.remove(consumer);
                    consumers.len()
                }
                None => 0,
            };
            if remaining == 0 {
                refs.refs.remove(key);
            }
            remaining
        })?;

        if remaining == 0 {
            let dir = self.package_dir(key);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
                debug!(key, "removed from store");
            }
        }
        Ok(remaining)
    }

    /// Current refs
    pub fn refs(&self) -> Result<StoreRefs, StoreError> {
        let path = self.root.join(REFS_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|source| StoreError::Parse { path, source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreRefs::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Consumers of one key
    pub fn consumers(&self, key: &str) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self
            .refs()?
            .refs
            .get(key)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Serializes every ref change and every store directory create/delete
    fn refs_lock(&self) -> Result<ScopeLock, StoreError> {
        ScopeLock::acquire(&self.root.join(REFS_LOCK), self.lock_timeout)
    }

    /// Read-modify-write of refs.toml; the caller holds the refs lock
    fn modify_refs<T>(&self, f: impl FnOnce(&mut StoreRefs) -> T) -> Result<T, StoreError> {
        let mut refs = self.refs()?;
        let result = f(&mut refs);

        let content =
            toml::to_string_pretty(&refs).map_err(|e| StoreError::Serialize(e.to_string()))?;
        write_atomic(&self.root.join(REFS_FILE), content.as_bytes())?;
        Ok(result)
    }
}

fn add_consumer(refs: &mut StoreRefs, key: &str, consumer: &Path) {
    refs.refs
        .entry(key.to_string())
        .or_default()
        .insert(consumer.to_path_buf());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PackageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::for_home(dir.path(), Duration::from_secs(1));
        (dir, store)
    }

    #[test]
    fn test_key() {
        assert_eq!(PackageStore::key("json", "2.0.0"), "json@2.0.0");
        assert_eq!(PackageStore::key("@acme/utils", "1.4.1"), "@acme+utils@1.4.1");
    }

    #[test]
    fn test_commit_moves_staging() {
        let (_dir, store) = store();
        let key = PackageStore::key("json", "2.0.0");

        let staging = store.staging_dir(&key).unwrap();
        fs::write(staging.join(MANIFEST_FILE), "x").unwrap();
        let target = store.commit(&staging, &key, Path::new("/project/a")).unwrap();

        assert!(store.contains(&key));
        assert_eq!(target, store.package_dir(&key));
        assert!(!staging.exists());
        assert_eq!(store.consumers(&key).unwrap(), vec![PathBuf::from("/project/a")]);
    }

    #[test]
    fn test_commit_keeps_existing_extraction() {
        let (_dir, store) = store();
        let key = PackageStore::key("json", "2.0.0");

        let first = store.staging_dir(&key).unwrap();
        fs::write(first.join(MANIFEST_FILE), "first").unwrap();
        store.commit(&first, &key, Path::new("/project/a")).unwrap();

        let second = store.staging_dir(&key).unwrap();
        fs::write(second.join(MANIFEST_FILE), "second").unwrap();
        store.commit(&second, &key, Path::new("/project/b")).unwrap();

        let content = fs::read_to_string(store.package_dir(&key).join(MANIFEST_FILE)).unwrap();
        assert_eq!(content, "first");
        assert!(!second.exists());
        assert_eq!(store.consumers(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_commit_replaces_incomplete_leftover() {
        let (_dir, store) = store();
        let key = PackageStore::key("json", "2.0.0");
        fs::create_dir_all(store.package_dir(&key).join("lib")).unwrap();

        let staging = store.staging_dir(&key).unwrap();
        fs::write(staging.join(MANIFEST_FILE), "fresh").unwrap();
        store.commit(&staging, &key, Path::new("/project/a")).unwrap();

        assert!(store.contains(&key));
        assert!(!store.package_dir(&key).join("lib").exists());
    }

    #[test]
    fn test_claim_requires_completed_extraction() {
        let (_dir, store) = store();
        let key = "json@2.0.0";
        assert_eq!(store.claim(key, Path::new("/project/a")).unwrap(), None);
        assert!(store.consumers(key).unwrap().is_empty());

        fs::create_dir_all(store.package_dir(key)).unwrap();
        fs::write(store.package_dir(key).join(MANIFEST_FILE), "x").unwrap();
        assert_eq!(
            store.claim(key, Path::new("/project/a")).unwrap(),
            Some(store.package_dir(key))
        );
        assert_eq!(store.consumers(key).unwrap().len(), 1);
    }

    #[test]
    fn test_release_deletes_after_last_consumer() {
        let (_dir, store) = store();
        let key = PackageStore::key("json", "2.0.0");

        let staging = store.staging_dir(&key).unwrap();
        fs::write(staging.join(MANIFEST_FILE), "x").unwrap();
        store.commit(&staging, &key, Path::new("/project/a")).unwrap();
        store.claim(&key, Path::new("/project/b")).unwrap();
        store.claim(&key, Path::new("/project/a")).unwrap();
        assert_eq!(store.consumers(&key).unwrap().len(), 2);

        assert_eq!(store.release(&key, Path::new("/project/a")).unwrap(), 1);
        assert!(store.contains(&key));
        assert_eq!(store.release(&key, Path::new("/project/b")).unwrap(), 0);
        assert!(!store.package_dir(&key).exists());
        assert!(store.refs().unwrap().refs.is_empty());
    }
}
