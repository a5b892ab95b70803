//! Nest package manager library
//!
//! Resolution and installation engine for nest modules:
//! - Version ranges and selection (`semver`)
//! - Package manifests (nest.toml)
//! - Install sources: registry specifiers, directories and archives
//! - Flat dependency resolution with conflict reporting
//! - Install planning and execution into local or global scopes
//! - Shared versioned store with per-scope install records

pub mod archive;
pub mod commands;
pub mod config;
pub mod installer;
pub mod manifest;
pub mod planner;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod script;
pub mod semver;
pub mod source;
pub mod specifier;
pub mod store;

pub use config::{Config, ConfigError};
pub use installer::{InstallError, InstallReport, Installer, VerifyReport};
pub use manifest::{Dependency, ManifestError, PackageInfo, PackageManifest};
pub use planner::{plan, plan_with, InstallAction, InstallPlan, PlanOptions};
pub use registry::{HttpRegistry, MemoryRegistry, PackageRegistry, RegistryError, Release};
pub use resolver::{DependencyGraph, NodeId, ResolveMode, ResolvedNode, Resolver, ResolverError};
pub use scope::{find_project_root, ScopeKind, ScopeLayout};
pub use semver::{Constraint, Range, SemverError, Version};
pub use source::{PackageSource, SourceError, SourceResolver};
pub use specifier::PackageSpecifier;
pub use store::{InstallRecord, PackageStore, RecordSet, RecordStore, ScopeLock, StoreError};
