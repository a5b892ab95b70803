//! Package manager commands
//!
//! Implements init, dist, install, uninstall, list, run and verify on top of
//! the library. Progress goes to stdout.

pub mod dist;
pub mod init;
pub mod install;
pub mod list;
pub mod run;
pub mod uninstall;
pub mod verify;

pub use dist::dist_project;
pub use init::init_project;
pub use install::{install_packages, InstallOptions};
pub use list::list_packages;
pub use run::run_project_script;
pub use uninstall::uninstall_packages;
pub use verify::verify_scope;

use crate::config::Config;
use crate::installer::Installer;
use crate::manifest::PackageManifest;
use crate::registry::{HttpRegistry, PackageRegistry};
use crate::scope::{find_project_root, ScopeLayout};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Project found around the working directory
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub manifest: PackageManifest,
}

impl Project {
    /// Nearest project at or above `start_dir`
    pub fn find(start_dir: &Path) -> anyhow::Result<Option<Self>> {
        let Some(root) = find_project_root(start_dir) else {
            return Ok(None);
        };
        let manifest = PackageManifest::from_dir(&root)
            .with_context(|| format!("Failed to read the manifest in {}", root.display()))?;
        Ok(Some(Self { root, manifest }))
    }
}

/// Everything a command needs: configuration, the target scope and the
/// surrounding project
#[derive(Debug, Clone)]
pub struct Session {
    pub config: Config,
    pub scope: ScopeLayout,
    pub project: Option<Project>,
    /// Directory relative install targets are resolved against
    pub cwd: PathBuf,
}

impl Session {
    /// Open a session from the process environment
    pub fn open(cwd: &Path, global: bool) -> anyhow::Result<Self> {
        let project = Project::find(cwd)?;
        let config = Config::load(project.as_ref().map(|p| &p.manifest))
            .context("Failed to load configuration")?;
        Ok(Self::with_config(config, cwd, global, project))
    }

    /// Open a session with explicit configuration
    ///
    /// The local scope is the project root, or `cwd` outside a project.
    pub fn with_config(config: Config, cwd: &Path, global: bool, project: Option<Project>) -> Self {
        let scope = if global {
            config.global_scope()
        } else {
            let root = project
                .as_ref()
                .map(|p| p.root.clone())
                .unwrap_or_else(|| cwd.to_path_buf());
            ScopeLayout::local(root)
        };
        Self {
            config,
            scope,
            project,
            cwd: cwd.to_path_buf(),
        }
    }

    /// Registry client for the configured URL
    pub fn http_registry(&self) -> anyhow::Result<Arc<dyn PackageRegistry>> {
        let registry = HttpRegistry::with_url(&self.config.registry_url)
            .with_context(|| format!("Invalid registry {}", self.config.registry_url))?;
        Ok(Arc::new(registry))
    }

    pub fn installer(&self, registry: Arc<dyn PackageRegistry>) -> Installer {
        Installer::new(self.scope.clone(), self.config.store(), registry)
            .with_concurrency(self.config.concurrency)
            .with_lock_timeout(self.config.lock_timeout)
    }
}
