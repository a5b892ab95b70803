//! Dependency resolution
//!
//! Resolves requested sources into a flat [`DependencyGraph`]: at most one
//! version per package name. Nodes live in an arena and refer to each other
//! by [`NodeId`].

use crate::manifest::{Dependency, PackageManifest};
use crate::registry::Release;
use crate::semver::{Range, SemverError, Version};
use crate::source::{PackageSource, SourceError, SourceResolver};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Requirer label used when a request comes straight from the user
const COMMAND_LINE: &str = "<command line>";

/// Errors that can occur during dependency resolution
#[derive(Debug, Error)]
pub enum ResolverError {
    /// An already chosen version does not satisfy a new requirement
    #[error(
        "Version conflict for {name}: {name}@{existing} was chosen via {} but {required_range} is required by {required_by} via {}",
        .existing_chain.join(" -> "),
        .required_chain.join(" -> ")
    )]
    VersionConflict {
        name: String,
        existing: Version,
        required_range: String,
        required_by: String,
        existing_chain: Vec<String>,
        required_chain: Vec<String>,
    },

    /// A package depends on its own name
    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// No version found that satisfies the range
    #[error("No version of {name} satisfies {range} (required by {required_by})")]
    NoMatchingVersion {
        name: String,
        range: String,
        required_by: String,
    },

    /// Failed to parse a version range
    #[error("Invalid version range '{range}' for {name}: {error}")]
    InvalidRange {
        name: String,
        range: String,
        error: SemverError,
    },

    /// A local source declares a different package than the dependency key
    #[error("Dependency '{expected}' at {} is actually package '{found}'", .path.display())]
    NameMismatch {
        expected: String,
        found: String,
        path: PathBuf,
    },

    /// Registry packages cannot carry path dependencies
    #[error("{package} has a path dependency on '{dependency}', which only local packages may declare")]
    UnsupportedPathDependency { package: String, dependency: String },

    /// Fetching or reading a source failed
    #[error("Failed to resolve {package}: {source}")]
    Source {
        package: String,
        #[source]
        source: SourceError,
    },

    /// Every error found in report-all mode
    #[error("{}", format_multiple(.0))]
    Multiple(Vec<ResolverError>),
}

fn format_multiple(errors: &[ResolverError]) -> String {
    let mut out = format!("{} resolution errors:", errors.len());
    for error in errors {
        out.push_str("\n  - ");
        out.push_str(&error.to_string());
    }
    out
}

/// How resolution reacts to errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolveMode {
    /// Stop at the first error
    #[default]
    FailFast,

    /// Keep resolving unaffected subtrees and report everything at the end
    ReportAll,
}

/// Index of a node in a [`DependencyGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// One chosen package version
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub name: String,
    pub version: Version,
    pub manifest: PackageManifest,
    pub source: PackageSource,
    /// Registry release backing this node, for registry sources
    pub release: Option<Release>,
    /// Dependencies, in declaration order
    pub children: Vec<NodeId>,
    /// The node whose dependency first selected this one (None for roots)
    pub required_by: Option<NodeId>,
    /// The range that first selected this node
    pub range: String,
}

impl ResolvedNode {
    /// `name@version`
    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Directory relative path dependencies are resolved against
    fn manifest_dir(&self) -> Option<&Path> {
        match &self.source {
            PackageSource::Registry { .. } => None,
            PackageSource::Directory { path } => Some(path),
            PackageSource::Archive { path } => path.parent(),
        }
    }
}

/// Flat dependency graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<ResolvedNode>,
    roots: Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
    label: Option<String>,
}

impl DependencyGraph {
    pub fn node(&self, id: NodeId) -> &ResolvedNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[ResolvedNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn find(&self, name: &str) -> Option<&ResolvedNode> {
        self.id_of(name).map(|id| self.node(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ResolvedNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.roots.contains(&id)
    }

    /// Requirer path from the request down to `id`, e.g. `app -> web@1.0.0 -> json@2.0.0`
    pub fn chain(&self, id: NodeId) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node(id);
            chain.push(node.identifier());
            current = node.required_by;
        }
        if let Some(label) = &self.label {
            chain.push(label.clone());
        }
        chain.reverse();
        chain
    }

    fn requirer_chain(&self, parent: Option<NodeId>) -> Vec<String> {
        match parent {
            Some(id) => self.chain(id),
            None => vec![self.requirer_label()],
        }
    }

    fn requirer_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| COMMAND_LINE.to_string())
    }

    fn link(&mut self, parent: Option<NodeId>, child: NodeId) {
        let edges = match parent {
            Some(id) => &mut self.nodes[id.0].children,
            None => &mut self.roots,
        };
        if !edges.contains(&child) {
            edges.push(child);
        }
    }
}

/// Dependency resolver
pub struct Resolver {
    sources: SourceResolver,
    mode: ResolveMode,
    production: bool,
}

/// Mutable state of one resolution run
struct Resolution {
    graph: DependencyGraph,
    queue: VecDeque<NodeId>,
    errors: Vec<ResolverError>,
    mode: ResolveMode,
}

impl Resolution {
    fn new(label: Option<String>, mode: ResolveMode) -> Self {
        Self {
            graph: DependencyGraph {
                label,
                ..DependencyGraph::default()
            },
            queue: VecDeque::new(),
            errors: Vec::new(),
            mode,
        }
    }

    /// Keep or propagate an error depending on the mode
    fn record(&mut self, result: Result<(), ResolverError>) -> Result<(), ResolverError> {
        match result {
            Ok(()) => Ok(()),
            Err(error) if self.mode == ResolveMode::ReportAll => {
                debug!("recording resolution error: {}", error);
                self.errors.push(error);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn finish(self) -> Result<DependencyGraph, ResolverError> {
        if self.errors.is_empty() {
            Ok(self.graph)
        } else {
            Err(ResolverError::Multiple(self.errors))
        }
    }

    fn conflict(&self, existing: NodeId, range: &str, parent: Option<NodeId>) -> ResolverError {
        let node = self.graph.node(existing);
        let mut required_chain = self.graph.requirer_chain(parent);
        let required_by = required_chain
            .last()
            .cloned()
            .unwrap_or_else(|| self.graph.requirer_label());
        required_chain.push(format!("{}@{}", node.name, range));

        ResolverError::VersionConflict {
            name: node.name.clone(),
            existing: node.version.clone(),
            required_range: range.to_string(),
            required_by,
            existing_chain: self.graph.chain(existing),
            required_chain,
        }
    }

    fn add_node(&mut self, node: ResolvedNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.graph.nodes.len());
        trace!(package = %node.identifier(), range = %node.range, "selected");
        self.graph.by_name.insert(node.name.clone(), id);
        self.graph.nodes.push(node);
        self.graph.link(parent, id);
        self.queue.push_back(id);
        id
    }
}

impl Resolver {
    pub fn new(sources: SourceResolver) -> Self {
        Self {
            sources,
            mode: ResolveMode::FailFast,
            production: false,
        }
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Skip the project's dev-dependencies
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Resolve explicit install targets
    pub fn resolve(&self, roots: &[PackageSource]) -> Result<DependencyGraph, ResolverError> {
        let mut state = Resolution::new(None, self.mode);

        for source in roots {
            let result = self.require(&mut state, source, None, None);
            state.record(result)?;
        }

        self.expand(&mut state)?;
        let graph = state.finish()?;
        debug!(packages = graph.len(), "resolved install targets");
        Ok(graph)
    }

    /// Resolve the dependencies declared by a project manifest
    ///
    /// The project is the requirer of every root and is not itself part of
    /// the graph.
    pub fn resolve_manifest(
        &self,
        manifest: &PackageManifest,
        dir: &Path,
    ) -> Result<DependencyGraph, ResolverError> {
        let mut state = Resolution::new(Some(manifest.package.name.clone()), self.mode);

        for (name, dep) in manifest.dependencies_in_order(!self.production) {
            let result = if name == manifest.package.name {
                Err(ResolverError::CyclicDependency(vec![
                    manifest.package.name.clone(),
                    name.to_string(),
                ]))
            } else {
                let source = PackageSource::from_dependency(name, dep, dir);
                self.require(&mut state, &source, None, Some(name))
            };
            state.record(result)?;
        }

        self.expand(&mut state)?;
        let graph = state.finish()?;
        debug!(
            packages = graph.len(),
            "resolved dependencies of {}",
            manifest.identifier()
        );
        Ok(graph)
    }

    /// Breadth-first expansion of queued nodes
    fn expand(&self, state: &mut Resolution) -> Result<(), ResolverError> {
        while let Some(id) = state.queue.pop_front() {
            let node = state.graph.node(id);
            let name = node.name.clone();
            let base = node.manifest_dir().map(Path::to_path_buf);
            let deps: Vec<(String, Dependency)> = node
                .manifest
                .dependencies
                .iter()
                .map(|(n, d)| (n.clone(), d.clone()))
                .collect();

            for (dep_name, dep) in deps {
                let result = if dep_name == name {
                    let mut chain = state.graph.chain(id);
                    chain.push(dep_name.clone());
                    Err(ResolverError::CyclicDependency(chain))
                } else {
                    match (&base, dep.is_path()) {
                        (None, true) => Err(ResolverError::UnsupportedPathDependency {
                            package: state.graph.node(id).identifier(),
                            dependency: dep_name.clone(),
                        }),
                        (base, _) => {
                            let dir = base.as_deref().unwrap_or_else(|| Path::new("."));
                            let source = PackageSource::from_dependency(&dep_name, &dep, dir);
                            self.require(state, &source, Some(id), Some(&dep_name))
                        }
                    }
                };
                state.record(result)?;
            }
        }
        Ok(())
    }

    /// Satisfy one requirement, reusing the chosen version when it fits
    fn require(
        &self,
        state: &mut Resolution,
        source: &PackageSource,
        parent: Option<NodeId>,
        expected_name: Option<&str>,
    ) -> Result<(), ResolverError> {
        match source {
            PackageSource::Registry { name, range } => {
                let parsed = Range::parse(range).map_err(|error| ResolverError::InvalidRange {
                    name: name.clone(),
                    range: range.clone(),
                    error,
                })?;

                if let Some(existing) = state.graph.id_of(name) {
                    if parsed.satisfies(&state.graph.node(existing).version) {
                        state.graph.link(parent, existing);
                        return Ok(());
                    }
                    return Err(state.conflict(existing, range, parent));
                }

                let release = self.sources.best_release(name, &parsed).map_err(|e| match e {
                    SourceError::NoMatchingVersion { .. } => ResolverError::NoMatchingVersion {
                        name: name.clone(),
                        range: range.clone(),
                        required_by: state
                            .graph
                            .requirer_chain(parent)
                            .last()
                            .cloned()
                            .unwrap_or_default(),
                    },
                    source => ResolverError::Source {
                        package: name.clone(),
                        source,
                    },
                })?;

                state.add_node(
                    ResolvedNode {
                        name: name.clone(),
                        version: release.version.clone(),
                        manifest: release.manifest.clone(),
                        source: source.clone(),
                        release: Some(release),
                        children: Vec::new(),
                        required_by: parent,
                        range: range.clone(),
                    },
                    parent,
                );
                Ok(())
            }
            PackageSource::Directory { path } | PackageSource::Archive { path } => {
                let found = self
                    .sources
                    .manifest(source)
                    .map_err(|source| ResolverError::Source {
                        package: expected_name
                            .map(str::to_string)
                            .unwrap_or_else(|| path.display().to_string()),
                        source,
                    })?;
                let manifest = found.manifest;

                if let Some(expected) = expected_name {
                    if manifest.package.name != expected {
                        return Err(ResolverError::NameMismatch {
                            expected: expected.to_string(),
                            found: manifest.package.name.clone(),
                            path: path.clone(),
                        });
                    }
                }

                let version = manifest.version();
                let pinned = format!("={}", version);

                if let Some(existing) = state.graph.id_of(&manifest.package.name) {
                    if state.graph.node(existing).version == version {
                        state.graph.link(parent, existing);
                        return Ok(());
                    }
                    return Err(state.conflict(existing, &pinned, parent));
                }

                state.add_node(
                    ResolvedNode {
                        name: manifest.package.name.clone(),
                        version,
                        manifest,
                        source: source.clone(),
                        release: None,
                        children: Vec::new(),
                        required_by: parent,
                        range: pinned,
                    },
                    parent,
                );
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("sources", &self.sources)
            .field("mode", &self.mode)
            .field("production", &self.production)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
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

    fn resolver(registry: MemoryRegistry) -> Resolver {
        Resolver::new(SourceResolver::new(".", Arc::new(registry)))
    }

    fn request(name: &str, range: &str) -> PackageSource {
        PackageSource::Registry {
            name: name.to_string(),
            range: range.to_string(),
        }
    }

    #[test]
    fn test_picks_highest_matching() {
        let registry = MemoryRegistry::new();
        for v in ["1.2.0", "1.3.0", "2.0.0"] {
            publish(&registry, "foo", v, &[]);
        }

        let graph = resolver(registry).resolve(&[request("foo", "^1.2.0")]).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.find("foo").unwrap().version, Version::new(1, 3, 0));
        assert_eq!(graph.roots(), &[NodeId(0)]);
    }

    #[test]
    fn test_shared_dependency_is_reused() {
        let registry = MemoryRegistry::new();
        publish(&registry, "a", "1.0.0", &[("c", "^1.0.0")]);
        publish(&registry, "b", "1.0.0", &[("c", ">=1.1.0")]);
        publish(&registry, "c", "1.2.0", &[]);

        let graph = resolver(registry)
            .resolve(&[request("a", "*"), request("b", "*")])
            .unwrap();
        assert_eq!(graph.len(), 3);
        let c = graph.id_of("c").unwrap();
        assert_eq!(graph.find("a").unwrap().children, vec![c]);
        assert_eq!(graph.find("b").unwrap().children, vec![c]);
        assert_eq!(graph.node(c).required_by, graph.id_of("a"));
    }

    #[test]
    fn test_mutual_dependency_allowed() {
        let registry = MemoryRegistry::new();
        publish(&registry, "a", "1.0.0", &[("b", "^1.0.0")]);
        publish(&registry, "b", "1.0.0", &[("a", "^1.0.0")]);

        let graph = resolver(registry).resolve(&[request("a", "*")]).unwrap();
        let a = graph.id_of("a").unwrap();
        let b = graph.id_of("b").unwrap();
        assert_eq!(graph.node(b).children, vec![a]);
    }

    #[test]
    fn test_self_dependency_is_cyclic() {
        let registry = MemoryRegistry::new();
        publish(&registry, "a", "1.0.0", &[("a", "*")]);

        let err = resolver(registry).resolve(&[request("a", "*")]).unwrap_err();
        match err {
            ResolverError::CyclicDependency(chain) => {
                assert_eq!(chain, vec!["a@1.0.0", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conflict_names_both_chains() {
        let registry = MemoryRegistry::new();
        publish(&registry, "web", "1.0.0", &[("json", "^2.0.0")]);
        publish(&registry, "api", "1.0.0", &[("json", "^1.0.0")]);
        publish(&registry, "json", "1.5.0", &[]);
        publish(&registry, "json", "2.0.0", &[]);

        let mut app = PackageManifest::new("app", "0.1.0");
        app.dependencies
            .insert("web".into(), Dependency::Simple("^1.0.0".into()));
        app.dependencies
            .insert("api".into(), Dependency::Simple("^1.0.0".into()));

        let err = resolver(registry)
            .resolve_manifest(&app, Path::new("."))
            .unwrap_err();
        match &err {
            ResolverError::VersionConflict {
                name,
                existing,
                required_by,
                existing_chain,
                required_chain,
                ..
            } => {
                assert_eq!(name, "json");
                assert_eq!(existing, &Version::new(2, 0, 0));
                assert_eq!(required_by, "api@1.0.0");
                assert_eq!(existing_chain, &["app", "web@1.0.0", "json@2.0.0"]);
                assert_eq!(required_chain, &["app", "api@1.0.0", "json@^1.0.0"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("app -> web@1.0.0 -> json@2.0.0"));
        assert!(message.contains("app -> api@1.0.0"));
    }

    #[test]
    fn test_report_all_collects_errors() {
        let registry = MemoryRegistry::new();
        publish(&registry, "ok", "1.0.0", &[]);
        publish(&registry, "broken", "1.0.0", &[("missing", "^1.0.0")]);

        let err = resolver(registry)
            .with_mode(ResolveMode::ReportAll)
            .resolve(&[
                request("broken", "*"),
                request("ok", "^9.0.0"),
                request("ok", "*"),
            ])
            .unwrap_err();

        match err {
            ResolverError::Multiple(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0], ResolverError::NoMatchingVersion { .. }));
                assert!(matches!(errors[1], ResolverError::Source { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fail_fast_returns_first_error() {
        let registry = MemoryRegistry::new();
        let err = resolver(registry)
            .resolve(&[request("missing", "*"), request("also-missing", "*")])
            .unwrap_err();
        assert!(matches!(
            err,
            ResolverError::Source { ref package, .. } if package == "missing"
        ));
    }

    #[test]
    fn test_production_skips_dev_dependencies() {
        let registry = MemoryRegistry::new();
        publish(&registry, "lib", "1.0.0", &[]);
        publish(&registry, "bench", "1.0.0", &[]);

        let mut app = PackageManifest::new("app", "0.1.0");
        app.dependencies
            .insert("lib".into(), Dependency::Simple("*".into()));
        app.dev_dependencies
            .insert("bench".into(), Dependency::Simple("*".into()));

        let resolver = resolver(registry);
        let all = resolver.resolve_manifest(&app, Path::new(".")).unwrap();
        assert_eq!(all.len(), 2);

        let resolver = resolver.production(true);
        let prod = resolver.resolve_manifest(&app, Path::new(".")).unwrap();
        assert_eq!(prod.len(), 1);
        assert!(prod.find("bench").is_none());
    }
}
