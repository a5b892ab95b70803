//! Install planning
//!
//! Compares a resolved graph with the records of a scope and produces the
//! ordered list of filesystem actions the installer executes.

use crate::manifest::PackageManifest;
use crate::registry::Release;
use crate::resolver::{DependencyGraph, NodeId};
use crate::scope::ScopeLayout;
use crate::script::INSTALL_EVENTS;
use crate::semver::Version;
use crate::source::PackageSource;
use crate::store::{InstallRecord, RecordSet};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Index of a package within an [`InstallPlan`]
pub type PackageIndex = usize;

/// One step of an install
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    /// Deactivate a previously installed version
    Remove(InstallRecord),
    /// Obtain the archive (download, or locate the local file)
    Fetch(PackageIndex),
    /// Materialize the package in the store
    Extract(PackageIndex),
    /// Activate the package in the scope and write its record
    Link(PackageIndex),
    /// Run a lifecycle event
    RunScript(PackageIndex, String),
}

/// A package the plan installs
#[derive(Debug, Clone)]
pub struct PlannedPackage {
    pub name: String,
    pub version: Version,
    pub manifest: PackageManifest,
    pub source: PackageSource,
    pub release: Option<Release>,
    /// Requested directly rather than pulled in as a dependency
    pub is_root: bool,
    /// Linked in place from a directory source
    pub develop: bool,
}

impl PlannedPackage {
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Planning switches
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Link directory sources in place instead of copying them
    pub link: bool,
}

/// Ordered install actions for one scope
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub scope: ScopeLayout,
    pub actions: Vec<InstallAction>,
    pub packages: Vec<PlannedPackage>,
    /// Already installed at the wanted version
    pub skipped: Vec<String>,
    edges: Vec<Vec<PackageIndex>>,
}

impl InstallPlan {
    /// A plan with nothing to do
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn package(&self, index: PackageIndex) -> &PlannedPackage {
        &self.packages[index]
    }

    /// Planned packages `index` depends on directly
    pub fn dependencies_of(&self, index: PackageIndex) -> &[PackageIndex] {
        &self.edges[index]
    }

    /// Records removed by this plan
    pub fn removals(&self) -> impl Iterator<Item = &InstallRecord> {
        self.actions.iter().filter_map(|a| match a {
            InstallAction::Remove(record) => Some(record),
            _ => None,
        })
    }

    /// Short text form of an action, e.g. `link bar@2.0.0`
    pub fn describe(&self, action: &InstallAction) -> String {
        match action {
            InstallAction::Remove(record) => format!("remove {}", record.identifier()),
            InstallAction::Fetch(i) => format!("fetch {}", self.packages[*i].identifier()),
            InstallAction::Extract(i) => format!("extract {}", self.packages[*i].identifier()),
            InstallAction::Link(i) => format!("link {}", self.packages[*i].identifier()),
            InstallAction::RunScript(i, event) => {
                format!("run {} {}", event, self.packages[*i].identifier())
            }
        }
    }
}

impl fmt::Display for InstallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for action in &self.actions {
            writeln!(f, "{}", self.describe(action))?;
        }
        Ok(())
    }
}

/// Plan the install of `target` into `scope`
pub fn plan(target: &DependencyGraph, installed: &RecordSet, scope: &ScopeLayout) -> InstallPlan {
    plan_with(target, installed, scope, PlanOptions::default())
}

/// [`plan`] with explicit options
pub fn plan_with(
    target: &DependencyGraph,
    installed: &RecordSet,
    scope: &ScopeLayout,
    options: PlanOptions,
) -> InstallPlan {
    let order = topological_order(target);

    let mut removes = Vec::new();
    let mut packages = Vec::new();
    let mut skipped = Vec::new();
    let mut planned: Vec<NodeId> = Vec::new();
    let mut index_of: HashMap<NodeId, PackageIndex> = HashMap::new();

    for &id in &order {
        let node = target.node(id);
        let version = node.version.to_string();

        match installed.get(&node.name) {
            Some(record) if record.version == version => {
                debug!(package = %node.identifier(), "already installed");
                skipped.push(node.identifier());
                continue;
            }
            Some(record) => removes.push(InstallAction::Remove(record.clone())),
            None => {}
        }

        let develop = options.link && matches!(node.source, PackageSource::Directory { .. });
        index_of.insert(id, packages.len());
        planned.push(id);
        packages.push(PlannedPackage {
            name: node.name.clone(),
            version: node.version.clone(),
            manifest: node.manifest.clone(),
            source: node.source.clone(),
            release: node.release.clone(),
            is_root: target.is_root(id),
            develop,
        });
    }

    let edges: Vec<Vec<PackageIndex>> = planned
        .iter()
        .map(|&id| {
            target
                .node(id)
                .children
                .iter()
                .filter_map(|child| index_of.get(child).copied())
                .collect()
        })
        .collect();

    let mut actions = removes;
    for (index, package) in packages.iter().enumerate() {
        if !package.develop {
            actions.push(InstallAction::Fetch(index));
            actions.push(InstallAction::Extract(index));
        }
        actions.push(InstallAction::Link(index));
        for event in INSTALL_EVENTS {
            if package.manifest.script(event).is_some() {
                actions.push(InstallAction::RunScript(index, event.to_string()));
            }
        }
    }

    debug!(
        scope = %scope,
        actions = actions.len(),
        skipped = skipped.len(),
        "planned install"
    );

    InstallPlan {
        scope: scope.clone(),
        actions,
        packages,
        skipped,
        edges,
    }
}

/// DFS post-order from the roots: dependencies before dependents
///
/// Back-edges of cycles are ignored, so each node appears once.
fn topological_order(graph: &DependencyGraph) -> Vec<NodeId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    let mut marks = vec![Mark::New; graph.len()];
    let mut order = Vec::with_capacity(graph.len());

    // Every node is reachable from a root, but walk all ids to be total
    let starts = graph
        .roots()
        .iter()
        .copied()
        .chain((0..graph.len()).map(NodeId));

    for start in starts {
        if marks[start.0] != Mark::New {
            continue;
        }
        // Explicit stack of (node, next child position)
        let mut stack = vec![(start, 0usize)];
        marks[start.0] = Mark::Active;

        while let Some((id, pos)) = stack.pop() {
            let children = &graph.node(id).children;
            if let Some(&child) = children.get(pos) {
                stack.push((id, pos + 1));
                if marks[child.0] == Mark::New {
                    marks[child.0] = Mark::Active;
                    stack.push((child, 0));
                }
            } else {
                marks[id.0] = Mark::Done;
                order.push(id);
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Dependency;
    use crate::registry::MemoryRegistry;
    use crate::resolver::Resolver;
    use crate::source::SourceResolver;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn publish(registry: &MemoryRegistry, name: &str, version: &str, deps: &[(&str, &str)]) {
        let mut manifest = PackageManifest::new(name, version);
        for (dep, range) in deps {
            manifest
                .dependencies
                .insert(dep.to_string(), Dependency::Simple(range.to_string()));
        }
        registry.publish(manifest, &[]).unwrap();
    }

    fn resolve(registry: MemoryRegistry, targets: &[(&str, &str)]) -> DependencyGraph {
        let resolver = Resolver::new(SourceResolver::new(".", Arc::new(registry)));
        let roots: Vec<PackageSource> = targets
            .iter()
            .map(|(name, range)| PackageSource::Registry {
                name: name.to_string(),
                range: range.to_string(),
            })
            .collect();
        resolver.resolve(&roots).unwrap()
    }

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

    fn described(plan: &InstallPlan) -> Vec<String> {
        plan.actions.iter().map(|a| plan.describe(a)).collect()
    }

    #[test]
    fn test_dependencies_before_dependents() {
        let registry = MemoryRegistry::new();
        publish(&registry, "app", "1.0.0", &[("web", "*"), ("log", "*")]);
        publish(&registry, "web", "1.0.0", &[("log", "*")]);
        publish(&registry, "log", "1.0.0", &[]);

        let graph = resolve(registry, &[("app", "*")]);
        let plan = plan(&graph, &RecordSet::new(), &ScopeLayout::local("/p"));

        let links: Vec<String> = described(&plan)
            .into_iter()
            .filter(|a| a.starts_with("link"))
            .collect();
        assert_eq!(links, vec!["link log@1.0.0", "link web@1.0.0", "link app@1.0.0"]);

        let app = plan.packages.iter().position(|p| p.name == "app").unwrap();
        let deps: Vec<&str> = plan
            .dependencies_of(app)
            .iter()
            .map(|&i| plan.package(i).name.as_str())
            .collect();
        assert_eq!(deps, vec!["web", "log"]);
        assert!(plan.package(app).is_root);
    }

    #[test]
    fn test_cycle_is_broken() {
        let registry = MemoryRegistry::new();
        publish(&registry, "a", "1.0.0", &[("b", "*")]);
        publish(&registry, "b", "1.0.0", &[("a", "*")]);

        let graph = resolve(registry, &[("a", "*")]);
        let plan = plan(&graph, &RecordSet::new(), &ScopeLayout::local("/p"));
        assert_eq!(
            described(&plan),
            vec![
                "fetch b@1.0.0",
                "extract b@1.0.0",
                "link b@1.0.0",
                "fetch a@1.0.0",
                "extract a@1.0.0",
                "link a@1.0.0"
            ]
        );
    }

    #[test]
    fn test_installed_nodes_are_skipped() {
        let registry = MemoryRegistry::new();
        publish(&registry, "foo", "1.3.0", &[]);

        let graph = resolve(registry, &[("foo", "^1.2.0")]);
        let mut installed = RecordSet::new();
        installed.insert(record("foo", "1.3.0"));

        let plan = plan(&graph, &installed, &ScopeLayout::local("/p"));
        assert!(plan.is_empty());
        assert_eq!(plan.skipped, vec!["foo@1.3.0"]);
    }

    #[test]
    fn test_removes_come_first() {
        let registry = MemoryRegistry::new();
        publish(&registry, "foo", "1.0.0", &[("bar", "^2.0.0")]);
        publish(&registry, "bar", "2.0.0", &[]);

        let graph = resolve(registry, &[("foo", "*")]);
        let mut installed = RecordSet::new();
        installed.insert(record("bar", "1.0.0"));

        let plan = plan(&graph, &installed, &ScopeLayout::local("/p"));
        let actions = described(&plan);
        assert_eq!(actions[0], "remove bar@1.0.0");
        let link = actions.iter().position(|a| a == "link bar@2.0.0").unwrap();
        assert!(link > 0);
        assert_eq!(plan.removals().count(), 1);
    }

    #[test]
    fn test_scripts_follow_link() {
        let registry = MemoryRegistry::new();
        let mut manifest = PackageManifest::new("tool", "1.0.0");
        manifest
            .scripts
            .insert("postinstall".to_string(), "true".to_string());
        manifest
            .scripts
            .insert("install".to_string(), "true".to_string());
        registry.publish(manifest, &[]).unwrap();

        let graph = resolve(registry, &[("tool", "*")]);
        let plan = plan(&graph, &RecordSet::new(), &ScopeLayout::global("/h"));
        assert_eq!(
            described(&plan),
            vec![
                "fetch tool@1.0.0",
                "extract tool@1.0.0",
                "link tool@1.0.0",
                "run install tool@1.0.0",
                "run postinstall tool@1.0.0"
            ]
        );
    }
}
