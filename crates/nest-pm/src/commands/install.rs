//! Install command
//!
//! Installs explicit targets, or the project's dependencies when none are
//! given.

use super::{Project, Session};
use crate::installer::{InstallError, InstallReport};
use crate::manifest::{Dependency, MANIFEST_FILE};
use crate::planner::{plan_with, PlanOptions};
use crate::registry::PackageRegistry;
use crate::resolver::{DependencyGraph, ResolveMode, Resolver};
use crate::source::{PackageSource, SourceResolver};
use anyhow::{bail, Context};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Plans are rebuilt this many times when the scope changes underneath them
const MAX_PLAN_ATTEMPTS: usize = 3;

/// Install options
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Directories, archives or `name@range` specifiers
    pub targets: Vec<String>,

    /// Link directory sources in place
    pub link: bool,

    /// Skip dev dependencies
    pub production: bool,

    /// Collect every resolution error instead of stopping at the first
    pub report_all: bool,

    /// Record the targets under `[dependencies]` of the project manifest
    pub save: bool,

    /// Record the targets under `[dev-dependencies]`
    pub save_dev: bool,
}

/// Resolve, plan and execute an install into the session's scope
pub fn install_packages(
    session: &Session,
    registry: Arc<dyn PackageRegistry>,
    options: &InstallOptions,
) -> anyhow::Result<InstallReport> {
    if options.save && options.save_dev {
        bail!("--save and --save-dev cannot be combined");
    }
    let saving = options.save || options.save_dev;
    if saving {
        if options.targets.is_empty() {
            bail!("Nothing to save: name the packages to install");
        }
        if session.scope.is_global() || session.project.is_none() {
            bail!("Saving requires a local install inside a project with a nest.toml");
        }
    }

    let mode = if options.report_all {
        ResolveMode::ReportAll
    } else {
        session.config.resolve_mode
    };
    let sources = SourceResolver::new(&session.cwd, registry.clone());
    let resolver = Resolver::new(sources.clone())
        .with_mode(mode)
        .production(options.production);

    let graph = if options.targets.is_empty() {
        let Some(project) = &session.project else {
            bail!("Nothing to install: no targets given and no nest.toml found");
        };
        println!("Installing dependencies of {}...", project.manifest.identifier());
        resolver
            .resolve_manifest(&project.manifest, &project.root)
            .context("Failed to resolve dependencies")?
    } else {
        let roots = options
            .targets
            .iter()
            .map(|target| {
                sources
                    .resolve(target)
                    .with_context(|| format!("Invalid install target '{}'", target))
            })
            .collect::<anyhow::Result<Vec<PackageSource>>>()?;
        resolver.resolve(&roots).context("Failed to resolve packages")?
    };
    debug!(packages = graph.len(), "resolution complete");

    let installer = session.installer(registry);
    let mut attempt = 1;
    let report = loop {
        let records = installer.records()?;
        let plan = plan_with(
            &graph,
            &records,
            &session.scope,
            PlanOptions { link: options.link },
        );
        if plan.is_empty() {
            println!("Everything up to date in the {} scope.", session.scope);
        }
        for action in &plan.actions {
            debug!("{}", plan.describe(action));
        }

        match installer.execute(&plan) {
            Err(InstallError::StalePlan { package, .. }) if attempt < MAX_PLAN_ATTEMPTS => {
                debug!(package = %package, attempt, "scope changed while planning, planning again");
                attempt += 1;
            }
            result => {
                break result
                    .with_context(|| format!("Install into the {} scope failed", session.scope))?
            }
        }
    };

    for package in &report.removed {
        println!("  - {}", package);
    }
    for package in &report.installed {
        println!("  + {}", package);
    }
    for failure in &report.script_failures {
        println!("  ! script failed: {}", failure);
    }
    println!(
        "\nDone! {} installed, {} removed, {} unchanged.",
        report.installed.len(),
        report.removed.len(),
        report.skipped.len()
    );

    if let (true, Some(project)) = (saving, &session.project) {
        save_roots(project, &graph, options.save_dev)?;
    }
    Ok(report)
}

/// Write the graph's roots into the project manifest
///
/// Registry packages requested without a range are saved as `^<installed>`.
/// Directory and archive sources are saved as path dependencies relative to
/// the project.
fn save_roots(project: &Project, graph: &DependencyGraph, dev: bool) -> anyhow::Result<()> {
    let manifest_path = project.root.join(MANIFEST_FILE);
    // Re-read so edits made while installing are kept
    let mut manifest = crate::manifest::PackageManifest::from_file(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;

    let section = if dev { "dev-dependencies" } else { "dependencies" };
    println!("Saving {}:", section);
    for &id in graph.roots() {
        let node = graph.node(id);
        if node.name == manifest.name() {
            continue;
        }
        let dependency = match &node.source {
            PackageSource::Registry { range, .. } if range.trim() == "*" => {
                Dependency::Simple(format!("^{}", node.version))
            }
            PackageSource::Registry { range, .. } => Dependency::Simple(range.clone()),
            PackageSource::Directory { path } | PackageSource::Archive { path } => {
                Dependency::Detailed {
                    version: None,
                    path: Some(relative_to(path, &project.root)),
                }
            }
        };
        println!("  {} = {}", node.name, describe(&dependency));

        let (target, other) = if dev {
            (&mut manifest.dev_dependencies, &mut manifest.dependencies)
        } else {
            (&mut manifest.dependencies, &mut manifest.dev_dependencies)
        };
        other.shift_remove(&node.name);
        target.insert(node.name.clone(), dependency);
    }

    manifest
        .to_file(&manifest_path)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
    Ok(())
}

fn relative_to(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

fn describe(dependency: &Dependency) -> String {
    match dependency {
        Dependency::Simple(range) => format!("\"{}\"", range),
        Dependency::Detailed { path: Some(path), .. } => format!("{{ path = \"{}\" }}", path),
        Dependency::Detailed { version, .. } => {
            format!("\"{}\"", version.as_deref().unwrap_or("*"))
        }
    }
}
