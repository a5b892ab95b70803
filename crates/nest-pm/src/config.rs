//! Tool configuration
//!
//! Resolution order, highest first: environment (`NEST_HOME`,
//! `NEST_REGISTRY`, `NEST_CONCURRENCY`), the project `nest.toml`
//! `[registry]` table, `~/.nest/config.toml`, built-in defaults.
//!
//! ```toml
//! # ~/.nest/config.toml
//! [registry]
//! url = "https://registry.example.com/api/v1"
//!
//! [install]
//! concurrency = 8
//! lock-timeout-ms = 5000
//!
//! [resolve]
//! report-all = true
//! ```

use crate::installer::{DEFAULT_CONCURRENCY, DEFAULT_LOCK_TIMEOUT};
use crate::manifest::PackageManifest;
use crate::registry::DEFAULT_REGISTRY;
use crate::resolver::ResolveMode;
use crate::scope::ScopeLayout;
use crate::store::PackageStore;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_HOME: &str = "NEST_HOME";
pub const ENV_REGISTRY: &str = "NEST_REGISTRY";
pub const ENV_CONCURRENCY: &str = "NEST_CONCURRENCY";

/// Name of the global config file inside the home directory
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine the home directory; set NEST_HOME")]
    NoHome,

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigFile {
    #[serde(default)]
    registry: RegistrySection,
    #[serde(default)]
    install: InstallSection,
    #[serde(default)]
    resolve: ResolveSection,
}

#[derive(Debug, Default, Deserialize)]
struct RegistrySection {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct InstallSection {
    concurrency: Option<usize>,
    lock_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ResolveSection {
    report_all: Option<bool>,
}

/// Effective configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Global scope root and store location
    pub home: PathBuf,
    pub registry_url: String,
    /// Parallel fetch/extract jobs
    pub concurrency: usize,
    pub lock_timeout: Duration,
    pub resolve_mode: ResolveMode,
}

impl Config {
    /// Load from the process environment and the user's config file
    pub fn load(project: Option<&PackageManifest>) -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok(), project)
    }

    /// Load with a custom environment lookup
    pub fn load_with(
        env: impl Fn(&str) -> Option<String>,
        project: Option<&PackageManifest>,
    ) -> Result<Self, ConfigError> {
        let home = match env(ENV_HOME).filter(|h| !h.is_empty()) {
            Some(home) => PathBuf::from(home),
            None => default_home().ok_or(ConfigError::NoHome)?,
        };
        let file = read_config_file(&home.join(CONFIG_FILE))?;

        let registry_url = env(ENV_REGISTRY)
            .filter(|url| !url.is_empty())
            .or_else(|| project.and_then(|m| m.registry.as_ref()).map(|r| r.url.clone()))
            .or(file.registry.url)
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());

        let concurrency = match env(ENV_CONCURRENCY) {
            Some(value) => value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                key: ENV_CONCURRENCY.to_string(),
                value,
            })?,
            None => file.install.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
        };

        let lock_timeout = file
            .install
            .lock_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_LOCK_TIMEOUT);

        let resolve_mode = if file.resolve.report_all.unwrap_or(false) {
            ResolveMode::ReportAll
        } else {
            ResolveMode::FailFast
        };

        Ok(Self {
            home,
            registry_url,
            concurrency: effective_concurrency(concurrency),
            lock_timeout,
            resolve_mode,
        })
    }

    /// `<home>/config.toml`
    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    pub fn global_scope(&self) -> ScopeLayout {
        ScopeLayout::global(&self.home)
    }

    pub fn store(&self) -> PackageStore {
        PackageStore::for_home(&self.home, self.lock_timeout)
    }
}

/// `0` means one job per CPU
fn effective_concurrency(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

fn default_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".nest"))
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
