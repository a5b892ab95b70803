//! Plan execution, uninstall and verification
//!
//! Fetch and extract run in parallel into the shared store. Links, records
//! and scripts then run one at a time in plan order, so a package is only
//! activated after everything it depends on.

use crate::archive::{self, ArchiveError};
use crate::manifest::{PackageManifest, MANIFEST_FILE};
use crate::planner::{InstallAction, InstallPlan, PackageIndex, PlannedPackage};
use crate::registry::{verify_checksum, PackageRegistry, RegistryError};
use crate::scope::{ScopeLayout, LOCK_FILE, RECORD_FILE};
use crate::script::{run_script, ScriptContext, ScriptError, PREUNINSTALL};
use crate::source::PackageSource;
use crate::store::{InstallRecord, PackageStore, RecordSet, RecordStore, ScopeLock, StoreError};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of parallel fetch/extract jobs
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default scope lock timeout
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// Installer step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    Fetch,
    Extract,
    Link,
    Remove,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            InstallStep::Fetch => "fetch",
            InstallStep::Extract => "extract",
            InstallStep::Link => "link",
            InstallStep::Remove => "remove",
        };
        f.write_str(step)
    }
}

/// Underlying cause of a failed step
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no registry release attached")]
    MissingRelease,
}

/// Errors that can occur while installing or uninstalling
#[derive(Debug, Error)]
pub enum InstallError {
    /// A fetch, extract, link or remove step failed
    #[error("Failed to {step} {package}@{version}: {source}")]
    Step {
        package: String,
        version: String,
        step: InstallStep,
        #[source]
        source: StepError,
    },

    /// A lifecycle script of a requested package failed
    #[error(transparent)]
    ScriptFailed(ScriptError),

    /// Nothing recorded under this name in the scope
    #[error("{name} is not installed in the {scope} scope")]
    NotInstalled { name: String, scope: String },

    /// The plan was made for another scope
    #[error("Plan targets {plan} but the installer manages {installer}")]
    ScopeMismatch { plan: String, installer: String },

    /// The scope changed between planning and execution
    #[error("Plan is out of date: {package} changed in the {scope} scope since it was planned")]
    StalePlan { package: String, scope: String },

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InstallError {
    fn step(package: &str, version: &str, step: InstallStep) -> impl FnOnce(StepError) -> Self {
        let package = package.to_string();
        let version = version.to_string();
        move |source| InstallError::Step {
            package,
            version,
            step,
            source,
        }
    }
}

/// Outcome of [`Installer::execute`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Activated packages (`name@version`)
    pub installed: Vec<String>,
    /// Deactivated previous versions
    pub removed: Vec<String>,
    /// Already installed at the wanted version
    pub skipped: Vec<String>,
    pub scripts_run: usize,
    /// Non-fatal script failures (`name@version: event`)
    pub script_failures: Vec<String>,
}

/// Problems found by [`Installer::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Records whose module link is gone
    pub missing_links: Vec<String>,
    /// Records whose store directory is gone or incomplete
    pub missing_store: Vec<String>,
    /// Module entries that no record accounts for
    pub dangling: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing_links.is_empty() && self.missing_store.is_empty() && self.dangling.is_empty()
    }
}

/// Executes plans against one scope
pub struct Installer {
    scope: ScopeLayout,
    store: PackageStore,
    registry: Arc<dyn PackageRegistry>,
    concurrency: usize,
    lock_timeout: Duration,
}

impl Installer {
    pub fn new(scope: ScopeLayout, store: PackageStore, registry: Arc<dyn PackageRegistry>) -> Self {
        Self {
            scope,
            store,
            registry,
            concurrency: DEFAULT_CONCURRENCY,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn scope(&self) -> &ScopeLayout {
        &self.scope
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    fn records_store(&self) -> RecordStore {
        RecordStore::for_scope(&self.scope)
    }

    /// Current records of the scope
    pub fn records(&self) -> Result<RecordSet, InstallError> {
        Ok(self.records_store().load()?)
    }

    fn lock(&self) -> Result<ScopeLock, InstallError> {
        Ok(ScopeLock::acquire(&self.scope.lock_file(), self.lock_timeout)?)
    }

    /// Execute a plan
    ///
    /// Failures abort the remaining actions; completed links stay in place
    /// and are recorded.
    pub fn execute(&self, plan: &InstallPlan) -> Result<InstallReport, InstallError> {
        if plan.scope != self.scope {
            return Err(InstallError::ScopeMismatch {
                plan: plan.scope.to_string(),
                installer: self.scope.to_string(),
            });
        }

        let mut report = InstallReport {
            skipped: plan.skipped.clone(),
            ..InstallReport::default()
        };
        if plan.is_empty() {
            return Ok(report);
        }

        self.scope.ensure_dirs().map_err(StoreError::from)?;
        let _lock = self.lock()?;
        let records_store = self.records_store();
        let mut records = records_store.load()?;
        self.check_current(plan, &records)?;

        for record in plan.removals() {
            info!(package = %record.identifier(), "removing previous version");
            self.deactivate(record, &records)
                .map_err(InstallError::step(&record.name, &record.version, InstallStep::Remove))?;
            records.remove(&record.name);
            records_store.save(&records)?;
            report.removed.push(record.identifier());
        }

        let mut materialized = self.materialize_all(plan)?;
        let result = self.activate(plan, &mut materialized, &mut records, &mut report);

        // Store refs taken for packages that never got linked
        self.release_unlinked(plan, materialized.into_keys());

        result.map(|()| report)
    }

    fn release_unlinked(&self, plan: &InstallPlan, unlinked: impl Iterator<Item = PackageIndex>) {
        for index in unlinked {
            let package = plan.package(index);
            let key = PackageStore::key(&package.name, &package.version.to_string());
            if let Err(e) = self.store.release(&key, self.scope.root()) {
                warn!(key, "failed to release store entry: {}", e);
            }
        }
    }

    /// Refuse a plan whose view of the scope no longer matches the records
    fn check_current(&self, plan: &InstallPlan, records: &RecordSet) -> Result<(), InstallError> {
        let stale = |package: String| InstallError::StalePlan {
            package,
            scope: self.scope.to_string(),
        };

        let removals: HashMap<&str, &InstallRecord> =
            plan.removals().map(|r| (r.name.as_str(), r)).collect();
        for package in &plan.packages {
            let expected = removals.get(package.name.as_str()).map(|r| r.identifier());
            let actual = records.get(&package.name).map(|r| r.identifier());
            if expected != actual {
                return Err(stale(package.name.clone()));
            }
        }
        for skipped in &plan.skipped {
            if !records.iter().any(|r| &r.identifier() == skipped) {
                return Err(stale(skipped.clone()));
            }
        }
        Ok(())
    }

    /// Link, record and run scripts in plan order
    fn activate(
        &self,
        plan: &InstallPlan,
        materialized: &mut HashMap<PackageIndex, PathBuf>,
        records: &mut RecordSet,
        report: &mut InstallReport,
    ) -> Result<(), InstallError> {
        let records_store = self.records_store();

        for action in &plan.actions {
            match action {
                InstallAction::Remove(_) | InstallAction::Fetch(_) | InstallAction::Extract(_) => {}
                InstallAction::Link(index) => {
                    let package = plan.package(*index);
                    let target = match materialized.get(index) {
                        Some(dir) => dir.clone(),
                        None => develop_dir(package).ok_or_else(|| InstallError::Step {
                            package: package.name.clone(),
                            version: package.version.to_string(),
                            step: InstallStep::Link,
                            source: StepError::Io(io::Error::new(
                                io::ErrorKind::NotFound,
                                "package was not extracted",
                            )),
                        })?,
                    };

                    let version = package.version.to_string();
                    let record = self
                        .link(package, &target, records)
                        .map_err(InstallError::step(&package.name, &version, InstallStep::Link))?;
                    // The store ref now belongs to the record
                    materialized.remove(index);
                    records.insert(record);
                    records_store.save(records)?;

                    info!(package = %package.identifier(), scope = %self.scope, "installed");
                    report.installed.push(package.identifier());
                }
                InstallAction::RunScript(index, event) => {
                    let package = plan.package(*index);
                    let Some(command) = package.manifest.script(event) else {
                        continue;
                    };
                    let package_dir = self.scope.module_path(&package.name);
                    let version = package.version.to_string();
                    let ctx = ScriptContext {
                        name: &package.name,
                        version: &version,
                        package_dir: &package_dir,
                        scope: &self.scope,
                    };

                    report.scripts_run += 1;
                    if let Err(e) = run_script(event, command, &ctx) {
                        if package.is_root {
                            return Err(InstallError::ScriptFailed(e));
                        }
                        warn!("{}", e);
                        report
                            .script_failures
                            .push(format!("{}: {}", package.identifier(), event));
                    }
                }
            }
        }

        Ok(())
    }

    /// Fetch and extract every package that needs it, in parallel
    fn materialize_all(
        &self,
        plan: &InstallPlan,
    ) -> Result<HashMap<PackageIndex, PathBuf>, InstallError> {
        let jobs: Vec<PackageIndex> = plan
            .actions
            .iter()
            .filter_map(|action| match action {
                InstallAction::Extract(index) => Some(*index),
                _ => None,
            })
            .collect();

        if jobs.is_empty() {
            return Ok(HashMap::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency.min(jobs.len()))
            .build()
            .map_err(|e| InstallError::ThreadPool(e.to_string()))?;

        let results: Vec<(PackageIndex, Result<PathBuf, InstallError>)> = pool.install(|| {
            jobs.par_iter()
                .map(|&index| (index, self.materialize(plan.package(index))))
                .collect()
        });

        let mut materialized = HashMap::new();
        let mut first_error = None;
        for (index, result) in results {
            match result {
                Ok(dir) => {
                    materialized.insert(index, dir);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(materialized),
            Some(e) => {
                self.release_unlinked(plan, materialized.into_keys());
                Err(e)
            }
        }
    }

    /// Make sure the store holds an extraction of `package`, referenced by
    /// this scope
    fn materialize(&self, package: &PlannedPackage) -> Result<PathBuf, InstallError> {
        let version = package.version.to_string();
        let key = PackageStore::key(&package.name, &version);
        let claimed = self
            .store
            .claim(&key, self.scope.root())
            .map_err(StepError::from)
            .map_err(InstallError::step(&package.name, &version, InstallStep::Extract))?;
        if let Some(dir) = claimed {
            debug!(key, "already in store");
            return Ok(dir);
        }

        let archive = self
            .fetch(package, &key)
            .map_err(InstallError::step(&package.name, &version, InstallStep::Fetch))?;
        self.extract(package, &key, archive.as_deref())
            .map_err(InstallError::step(&package.name, &version, InstallStep::Extract))
    }

    /// Obtain the archive for a package, if it has one
    fn fetch(&self, package: &PlannedPackage, key: &str) -> Result<Option<PathBuf>, StepError> {
        match &package.source {
            PackageSource::Registry { .. } => {
                let release = package.release.as_ref().ok_or(StepError::MissingRelease)?;
                debug!(package = %package.identifier(), url = %release.download_url, "fetching");
                let bytes = self.registry.download(&release.download_url)?;
                verify_checksum(release, &bytes)?;

                let tmp = self.store.tmp_dir();
                fs::create_dir_all(&tmp)?;
                let path = tmp.join(format!("{}-{}.tar.gz", key, std::process::id()));
                fs::write(&path, &bytes)?;
                Ok(Some(path))
            }
            PackageSource::Archive { path } => Ok(Some(path.clone())),
            PackageSource::Directory { .. } => Ok(None),
        }
    }

    /// Unpack or copy into a staging directory, then move it into the store
    fn extract(
        &self,
        package: &PlannedPackage,
        key: &str,
        archive_path: Option<&Path>,
    ) -> Result<PathBuf, StepError> {
        // Downloads live in the store's scratch dir and are not kept
        let download = archive_path.filter(|_| package.source.is_registry());
        let staging = match self.store.staging_dir(key) {
            Ok(staging) => staging,
            Err(e) => {
                discard(download);
                return Err(e.into());
            }
        };

        let unpacked = self.fill_staging(package, key, archive_path, &staging);
        discard(download);
        if let Err(e) = unpacked {
            discard(Some(&staging));
            return Err(e);
        }

        debug!(package = %package.identifier(), "extracted");
        self.store
            .commit(&staging, key, self.scope.root())
            .map_err(|e| {
                discard(Some(&staging));
                e.into()
            })
    }

    fn fill_staging(
        &self,
        package: &PlannedPackage,
        key: &str,
        archive_path: Option<&Path>,
        staging: &Path,
    ) -> Result<(), StepError> {
        match (&package.source, archive_path) {
            (PackageSource::Directory { path }, _) => archive::copy_tree(path, staging)?,
            (_, Some(archive_path)) => archive::unpack(archive_path, staging)?,
            (_, None) => return Err(StepError::MissingRelease),
        }
        if !staging.join(MANIFEST_FILE).is_file() {
            return Err(ArchiveError::MissingManifest(self.store.package_dir(key)).into());
        }
        Ok(())
    }

    /// Activate a package: module link, bin links and the record to save
    ///
    /// A command already exposed by another installed package keeps its
    /// owner and is left out of this package's record.
    fn link(
        &self,
        package: &PlannedPackage,
        target: &Path,
        records: &RecordSet,
    ) -> Result<InstallRecord, StepError> {
        let module_path = self.scope.module_path(&package.name);
        if let Some(parent) = module_path.parent() {
            fs::create_dir_all(parent)?;
        }
        remove_entry(&module_path)?;
        symlink_dir(target, &module_path)?;

        let mut bins = Vec::new();
        if !package.manifest.bin.is_empty() {
            fs::create_dir_all(self.scope.bin_dir())?;
        }
        for (command, relative) in &package.manifest.bin {
            let executable = target.join(relative);
            if !executable.is_file() {
                warn!(
                    package = %package.identifier(),
                    "bin '{}' points to missing file {}",
                    command,
                    relative
                );
                continue;
            }
            let bin_path = self.scope.bin_path(command);
            let owner = records
                .iter()
                .find(|r| r.name != package.name && r.bins.contains(&bin_path));
            if let Some(owner) = owner {
                warn!(
                    package = %package.identifier(),
                    "bin '{}' is already provided by {}, not replacing it",
                    command,
                    owner.identifier()
                );
                continue;
            }

            make_executable(&executable)?;
            remove_entry(&bin_path)?;
            symlink_file(&module_path.join(relative), &bin_path)?;
            bins.push(bin_path);
        }

        Ok(InstallRecord {
            name: package.name.clone(),
            version: package.version.to_string(),
            install_path: module_path,
            store_path: target.to_path_buf(),
            is_global: self.scope.is_global(),
            linked_from: package.develop.then(|| target.to_path_buf()),
            bins,
        })
    }

    /// Undo a link: bins, module link, store ref and unreferenced store dir
    ///
    /// Bins are only removed while they still point into this package and
    /// no other record claims them.
    fn deactivate(&self, record: &InstallRecord, records: &RecordSet) -> Result<(), StepError> {
        for bin in &record.bins {
            let shared = records
                .iter()
                .any(|r| r.name != record.name && r.bins.contains(bin));
            let ours = fs::read_link(bin)
                .map(|dest| dest.starts_with(&record.install_path))
                .unwrap_or(false);
            if ours && !shared {
                remove_entry(bin)?;
            } else if bin.symlink_metadata().is_ok() {
                debug!(bin = %bin.display(), "bin belongs to another package, keeping it");
            }
        }
        remove_entry(&record.install_path)?;
        if record.name.starts_with('@') {
            if let Some(scope_dir) = record.install_path.parent() {
                // Only succeeds once the @scope directory is empty
                let _ = fs::remove_dir(scope_dir);
            }
        }

        if record.linked_from.is_none() {
            let key = PackageStore::key(&record.name, &record.version);
            let remaining = self.store.release(&key, self.scope.root())?;
            if remaining > 0 {
                debug!(key, remaining, "store entry still referenced");
            }
        }
        Ok(())
    }

    /// Remove a package from the scope
    pub fn uninstall(&self, name: &str) -> Result<InstallRecord, InstallError> {
        let _lock = self.lock()?;
        let records_store = self.records_store();
        let mut records = records_store.load()?;

        let record = records
            .get(name)
            .cloned()
            .ok_or_else(|| InstallError::NotInstalled {
                name: name.to_string(),
                scope: self.scope.to_string(),
            })?;

        self.run_preuninstall(&record);

        self.deactivate(&record, &records)
            .map_err(InstallError::step(&record.name, &record.version, InstallStep::Remove))?;
        records.remove(name);
        records_store.save(&records)?;

        info!(package = %record.identifier(), scope = %self.scope, "uninstalled");
        Ok(record)
    }

    fn run_preuninstall(&self, record: &InstallRecord) {
        let manifest = match PackageManifest::from_dir(&record.store_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!(package = %record.identifier(), "no manifest for preuninstall: {}", e);
                return;
            }
        };
        let Some(command) = manifest.script(PREUNINSTALL) else {
            return;
        };

        let ctx = ScriptContext {
            name: &record.name,
            version: &record.version,
            package_dir: &record.store_path,
            scope: &self.scope,
        };
        if let Err(e) = run_script(PREUNINSTALL, command, &ctx) {
            warn!("{}", e);
        }
    }

    /// Compare records with what is on disk
    pub fn verify(&self) -> Result<VerifyReport, InstallError> {
        let records = self.records()?;
        let mut report = VerifyReport::default();

        for record in records.iter() {
            if record.install_path.symlink_metadata().is_err() {
                report.missing_links.push(record.identifier());
            }
            if !record.store_path.join(MANIFEST_FILE).is_file() {
                report.missing_store.push(record.identifier());
            }
        }

        let recorded: Vec<&Path> = records.iter().map(|r| r.install_path.as_path()).collect();
        for entry in module_entries(self.scope.modules_dir()).map_err(StoreError::from)? {
            if !recorded.contains(&entry.as_path()) {
                report.dangling.push(entry);
            }
        }

        Ok(report)
    }

    /// Drop broken records and dangling links
    ///
    /// Returns what was found before repairing.
    pub fn repair(&self) -> Result<VerifyReport, InstallError> {
        let _lock = self.lock()?;
        let report = self.verify()?;

        let records_store = self.records_store();
        let mut records = records_store.load()?;
        let broken: Vec<InstallRecord> = records
            .iter()
            .filter(|r| {
                let id = r.identifier();
                report.missing_links.contains(&id) || report.missing_store.contains(&id)
            })
            .cloned()
            .collect();

        for record in &broken {
            warn!(package = %record.identifier(), "dropping broken record");
            self.deactivate(record, &records)
                .map_err(InstallError::step(&record.name, &record.version, InstallStep::Remove))?;
            records.remove(&record.name);
        }
        if !broken.is_empty() {
            records_store.save(&records)?;
        }

        for entry in &report.dangling {
            let is_link = entry
                .symlink_metadata()
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                warn!(path = %entry.display(), "removing dangling link");
                fs::remove_file(entry).map_err(StoreError::from)?;
            }
        }

        Ok(report)
    }
}

impl fmt::Debug for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("scope", &self.scope)
            .field("store", &self.store)
            .field("concurrency", &self.concurrency)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

/// The in-place source of a develop link
fn develop_dir(package: &PlannedPackage) -> Option<PathBuf> {
    match (&package.source, package.develop) {
        (PackageSource::Directory { path }, true) => Some(path.clone()),
        _ => None,
    }
}

/// Best-effort removal of scratch files and directories
fn discard(path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    if let Err(e) = remove_entry(path) {
        debug!(path = %path.display(), "failed to clean up: {}", e);
    }
}

/// Package entries of a modules directory (`@scope/name` counts as one)
fn module_entries(modules_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    let read = match fs::read_dir(modules_dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e),
    };

    for entry in read {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == RECORD_FILE || name == LOCK_FILE || name == ".bin" {
            continue;
        }
        let path = entry.path();
        let is_scope_dir = name.starts_with('@') && entry.file_type()?.is_dir();
        if is_scope_dir {
            for inner in fs::read_dir(&path)? {
                entries.push(inner?.path());
            }
        } else {
            entries.push(path);
        }
    }

    entries.sort();
    Ok(entries)
}

/// Remove a file, link or directory if present
fn remove_entry(path: &Path) -> io::Result<()> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => remove_link(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_link(path: &Path) -> io::Result<()> {
    // Directory symlinks must be removed as directories on Windows
    fs::remove_file(path).or_else(|_| fs::remove_dir(path))
}

#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

#[cfg(unix)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & 0o111 != 0o111 {
        permissions.set_mode(mode | 0o755);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

#[cfg(windows)]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::planner::plan;
    use crate::registry::MemoryRegistry;
    use crate::resolver::Resolver;
    use crate::source::SourceResolver;
    use tempfile::TempDir;

    struct Fixture {
        _home: TempDir,
        _project: TempDir,
        registry: Arc<MemoryRegistry>,
        installer: Installer,
    }

    fn fixture() -> Fixture {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let registry = Arc::new(MemoryRegistry::new());
        let installer = Installer::new(
            ScopeLayout::local(project.path()),
            PackageStore::for_home(home.path(), Duration::from_secs(1)),
            registry.clone(),
        );
        Fixture {
            _home: home,
            _project: project,
            registry,
            installer,
        }
    }

    fn install(fx: &Fixture, name: &str) -> InstallReport {
        let resolver = Resolver::new(SourceResolver::new(".", fx.registry.clone()));
        let graph = resolver
            .resolve(&[PackageSource::Registry {
                name: name.to_string(),
                range: "*".to_string(),
            }])
            .unwrap();
        let records = fx.installer.records().unwrap();
        fx.installer
            .execute(&plan(&graph, &records, fx.installer.scope()))
            .unwrap()
    }

    #[test]
    fn test_link_exposes_bins() {
        let fx = fixture();
        let mut manifest = PackageManifest::new("tool", "1.0.0");
        manifest
            .bin
            .insert("tool".to_string(), "bin/tool.sh".to_string());
        fx.registry
            .publish(manifest, &[("bin/tool.sh", "#!/bin/sh\necho tool\n".as_bytes())])
            .unwrap();

        let report = install(&fx, "tool");
        assert_eq!(report.installed, vec!["tool@1.0.0"]);

        let scope = fx.installer.scope();
        let bin = scope.bin_path("tool");
        assert!(bin.symlink_metadata().unwrap().file_type().is_symlink());
        assert!(bin.is_file());

        let record = fx.installer.records().unwrap().get("tool").cloned().unwrap();
        assert_eq!(record.bins, vec![bin]);
        assert!(!record.is_global);
    }

    #[test]
    fn test_verify_and_repair_missing_link() {
        let fx = fixture();
        fx.registry
            .publish(PackageManifest::new("lib", "1.0.0"), &[])
            .unwrap();
        install(&fx, "lib");
        assert!(fx.installer.verify().unwrap().is_clean());

        let link = fx.installer.scope().module_path("lib");
        fs::remove_file(&link).unwrap();

        let report = fx.installer.verify().unwrap();
        assert_eq!(report.missing_links, vec!["lib@1.0.0"]);

        fx.installer.repair().unwrap();
        assert!(fx.installer.records().unwrap().is_empty());
        assert!(fx.installer.verify().unwrap().is_clean());
    }

    #[test]
    fn test_dangling_entry_reported() {
        let fx = fixture();
        let modules = fx.installer.scope().modules_dir().to_path_buf();
        fs::create_dir_all(&modules).unwrap();
        std::os::unix::fs::symlink("/nonexistent", modules.join("ghost")).unwrap();

        let report = fx.installer.verify().unwrap();
        assert_eq!(report.dangling, vec![modules.join("ghost")]);

        fx.installer.repair().unwrap();
        assert!(modules.join("ghost").symlink_metadata().is_err());
    }

    #[test]
    fn test_uninstall_unknown() {
        let fx = fixture();
        assert!(matches!(
            fx.installer.uninstall("nope"),
            Err(InstallError::NotInstalled { .. })
        ));
    }

    #[test]
    fn test_scope_mismatch() {
        let fx = fixture();
        let other = TempDir::new().unwrap();
        let graph = crate::resolver::DependencyGraph::default();
        let plan = plan(&graph, &RecordSet::new(), &ScopeLayout::global(other.path()));
        assert!(matches!(
            fx.installer.execute(&plan),
            Err(InstallError::ScopeMismatch { .. })
        ));
    }
}
