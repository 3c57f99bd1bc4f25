//! Dependency-graph installation.
//!
//! The graph is walked in waves: every wave is a batch of pending requests
//! processed with bounded parallelism, and the dependencies they discover form
//! the next wave. A shared set of `{kind, name, version}` keys that are in
//! flight or done guarantees each version is fetched and extracted at most
//! once per invocation, which also terminates dependency cycles.

use super::error::PkgError;
use super::extract::extract_archive;
use super::hook::run_postinstall;
use super::ident::Identifier;
use super::link::link_binaries;
use super::lockfile::{LockPackage, Lockfile};
use super::manifest::{dependency_key, ManifestSource, PackageManifest, ProjectManifest};
use super::registry::{PackageMetadata, Registries, Registry, RegistryKind};
use super::version::require_version;
use crate::config::DEFAULT_CONCURRENCY;
use crate::paths::Sandbox;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Version recorded for sources that publish no versions (system packages).
pub const ANY_VERSION: &str = "*";

/// Options for one install invocation.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Resolve metadata only: no download, extraction, linking or manifest writes.
    pub dry_run: bool,
    /// Extract into the package store; otherwise into `tmp/`.
    pub persist: bool,
    /// Link the requested package's executables into the sandbox `bin/`.
    pub link: bool,
    /// Keep going after a node fails, collecting failures in the report.
    pub best_effort: bool,
    /// Run post-install hooks of freshly extracted packages.
    pub run_hooks: bool,
    /// Maximum requests processed concurrently within a wave.
    pub concurrency: usize,
    /// Project whose manifest and lockfile record the install.
    pub project_dir: Option<PathBuf>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            persist: true,
            link: false,
            best_effort: false,
            run_hooks: true,
            concurrency: DEFAULT_CONCURRENCY,
            project_dir: None,
        }
    }
}

/// Identity of one concrete package version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PackageKey {
    pub kind: RegistryKind,
    pub name: String,
    pub version: String,
}

impl PackageKey {
    #[must_use]
    pub fn new(kind: RegistryKind, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Key used in the lockfile.
    #[must_use]
    pub fn lock_key(&self) -> String {
        Lockfile::package_key(self.kind, &self.name, &self.version)
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind.prefix(), self.name, self.version)
    }
}

/// What happened to a node of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Downloaded and extracted by this invocation.
    Installed,
    /// Already present in the store; nothing was fetched.
    Reused,
    /// Not downloadable; recorded only.
    Recorded,
    /// Dry run: metadata resolved, nothing written.
    Resolved,
}

/// One visited package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledNode {
    #[serde(flatten)]
    pub key: PackageKey,
    pub status: NodeStatus,
    /// Distance from the requested package.
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Artifact URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<PackageKey>,
}

/// A node that could not be installed (best-effort mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub identifier: String,
    pub code: &'static str,
    pub message: String,
}

/// A post-install hook that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookFailure {
    pub package: PackageKey,
    pub message: String,
}

/// Outcome of [`Installer::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub dry_run: bool,
    /// The requested package, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PackageKey>,
    /// Every distinct package visited, in walk order.
    pub nodes: Vec<InstalledNode>,
    /// Requests that resolved to an already visited version.
    pub skipped: Vec<String>,
    pub bins: Vec<String>,
    pub hook_failures: Vec<HookFailure>,
    pub failures: Vec<NodeFailure>,
}

impl InstallReport {
    #[must_use]
    pub fn root_node(&self) -> Option<&InstalledNode> {
        let root = self.root.as_ref()?;
        self.nodes.iter().find(|n| &n.key == root)
    }

    pub fn with_status(&self, status: NodeStatus) -> impl Iterator<Item = &InstalledNode> {
        self.nodes.iter().filter(move |n| n.status == status)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A request waiting in the queue.
#[derive(Debug, Clone)]
struct Pending {
    /// Identifier as shown to the user.
    identifier: String,
    kind: RegistryKind,
    name: String,
    range: Option<String>,
    parent: Option<PackageKey>,
    depth: usize,
}

/// Shared across all concurrent branches of one invocation.
#[derive(Default)]
struct WalkState {
    seen: Mutex<HashSet<PackageKey>>,
    metadata: Mutex<HashMap<(RegistryKind, String, Option<String>), PackageMetadata>>,
}

enum Visit {
    Node(Box<NodeVisit>),
    Duplicate(PackageKey),
}

struct NodeVisit {
    node: InstalledNode,
    children: Vec<Pending>,
    bins: Vec<String>,
    hook: Option<PendingHook>,
}

struct PendingHook {
    key: PackageKey,
    dir: PathBuf,
    script: String,
}

/// Installs identifiers and their dependency graphs into a sandbox.
pub struct Installer<'a> {
    registries: &'a Registries,
    sandbox: &'a Sandbox,
    options: InstallOptions,
}

impl<'a> Installer<'a> {
    #[must_use]
    pub fn new(registries: &'a Registries, sandbox: &'a Sandbox, options: InstallOptions) -> Self {
        Self {
            registries,
            sandbox,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Install `identifier` and everything it depends on.
    ///
    /// # Errors
    /// Returns the first node failure, prefixed with the failing identifier,
    /// unless best-effort mode collects failures into the report instead.
    /// Manifest and lockfile write failures are always returned.
    pub async fn install(&self, identifier: &str) -> Result<InstallReport, PkgError> {
        let root = self
            .root_request(identifier)
            .map_err(|e| e.with_subject(identifier.trim()))?;

        let state = WalkState::default();
        let concurrency = self.options.concurrency.max(1);
        let mut report = InstallReport {
            dry_run: self.options.dry_run,
            ..Default::default()
        };
        let mut edges: BTreeMap<PackageKey, BTreeSet<PackageKey>> = BTreeMap::new();
        let mut hooks = Vec::new();
        let mut wave = vec![root];

        while !wave.is_empty() {
            let batch = std::mem::take(&mut wave);
            tracing::debug!(requests = batch.len(), "processing install wave");

            let state = &state;
            let mut outcomes: Vec<(usize, Pending, Result<Visit, PkgError>)> =
                stream::iter(batch.into_iter().enumerate())
                    .map(|(seq, item)| async move {
                        let result = self.visit(&item, state).await;
                        (seq, item, result)
                    })
                    .buffer_unordered(concurrency)
                    .collect()
                    .await;
            outcomes.sort_by_key(|(seq, _, _)| *seq);

            for (_, item, result) in outcomes {
                match result {
                    Ok(Visit::Duplicate(key)) => {
                        tracing::debug!(package = %key, "already visited");
                        if let Some(parent) = item.parent {
                            edges.entry(parent).or_default().insert(key);
                        }
                        report.skipped.push(item.identifier);
                    }
                    Ok(Visit::Node(visit)) => {
                        let NodeVisit {
                            node,
                            children,
                            bins,
                            hook,
                        } = *visit;
                        match item.parent {
                            Some(parent) => {
                                edges.entry(parent).or_default().insert(node.key.clone());
                            }
                            None => report.root = Some(node.key.clone()),
                        }
                        report.bins.extend(bins);
                        hooks.extend(hook);
                        wave.extend(children);
                        report.nodes.push(node);
                    }
                    Err(e) => {
                        let e = e.with_subject(&item.identifier);
                        if !self.options.best_effort {
                            return Err(e);
                        }
                        tracing::warn!(identifier = %item.identifier, error = %e, "install failed, continuing");
                        report.failures.push(NodeFailure {
                            identifier: item.identifier,
                            code: e.code(),
                            message: e.message().to_string(),
                        });
                    }
                }
            }
        }

        for node in &mut report.nodes {
            if let Some(deps) = edges.remove(&node.key) {
                node.dependencies = deps.into_iter().collect();
            }
        }

        self.run_hooks(hooks, &mut report).await;
        self.record_project(&report)?;

        Ok(report)
    }

    fn root_request(&self, identifier: &str) -> Result<Pending, PkgError> {
        Identifier::parse(identifier)?;
        let registry = self.registries.select(identifier);
        let resolved = registry.resolve_identifier(identifier)?;
        Ok(Pending {
            identifier: identifier.trim().to_string(),
            kind: registry.kind(),
            name: resolved.name,
            range: resolved.range,
            parent: None,
            depth: 0,
        })
    }

    async fn visit(&self, item: &Pending, state: &WalkState) -> Result<Visit, PkgError> {
        let registry = self.registries.get(item.kind);
        let meta = self.metadata(registry, item, state).await?;
        let version = self.choose_version(registry, item, &meta).await?;
        let key = PackageKey::new(item.kind, &item.name, version);

        if !state.seen.lock().await.insert(key.clone()) {
            return Ok(Visit::Duplicate(key));
        }

        let mut node = InstalledNode {
            key: key.clone(),
            status: NodeStatus::Resolved,
            depth: item.depth,
            path: None,
            resolved: None,
            integrity: None,
            dependencies: Vec::new(),
        };
        let mut visit = NodeVisit {
            node: node.clone(),
            children: Vec::new(),
            bins: Vec::new(),
            hook: None,
        };

        if self.options.dry_run {
            tracing::info!(package = %key, "resolved (dry run)");
            return Ok(Visit::Node(Box::new(visit)));
        }

        let Some(artifact) = registry.artifact(&meta)? else {
            tracing::info!(package = %key, "recorded (not downloadable)");
            node.status = NodeStatus::Recorded;
            visit.node = node;
            return Ok(Visit::Node(Box::new(visit)));
        };

        let dir = self.package_dir(&key);
        node.resolved = Some(artifact.url.clone());
        if dir.is_dir() {
            tracing::debug!(package = %key, dir = %dir.display(), "already in store");
            node.status = NodeStatus::Reused;
            node.integrity = artifact.integrity.as_ref().map(|i| i.to_sri());
        } else {
            let fetched = registry
                .download(self.registries.client(), self.sandbox, &meta)
                .await?
                .ok_or_else(|| PkgError::download_failed(format!("{key} is not downloadable")))?;
            extract_blocking(fetched.path.clone(), dir.clone()).await?;
            tracing::info!(package = %key, size = fetched.size, "installed");
            node.status = NodeStatus::Installed;
            node.integrity = Some(fetched.integrity.to_sri());
        }

        let manifest = PackageManifest::read_dir(&dir).unwrap_or_else(|e| {
            tracing::warn!(package = %key, error = %e, "ignoring unreadable manifest");
            None
        });

        if let Some(manifest) = &manifest {
            visit.children = manifest
                .dependencies
                .iter()
                .map(|(name, spec)| dependency_request(&key, manifest.source, name, spec, item.depth + 1))
                .filter(|dep| match non_registry_spec(dep) {
                    Some(kind) => {
                        tracing::warn!(package = %key, dependency = %dep.name, spec = kind, "skipping dependency not served by a registry");
                        false
                    }
                    None => true,
                })
                .collect();

            if node.status == NodeStatus::Installed && self.options.run_hooks {
                visit.hook = manifest.postinstall.clone().map(|script| PendingHook {
                    key: key.clone(),
                    dir: dir.clone(),
                    script,
                });
            }
        }

        if self.options.link && item.depth == 0 {
            match link_binaries(&dir, &self.sandbox.bin_dir(), manifest.as_ref()) {
                Ok(report) => visit.bins = report.linked,
                Err(e) => tracing::warn!(package = %key, error = %e, "linking failed"),
            }
        }

        node.path = Some(dir);
        visit.node = node;
        Ok(Visit::Node(Box::new(visit)))
    }

    /// Metadata for a request, fetched at most once per `{kind, name, range}`.
    async fn metadata(
        &self,
        registry: &Registry,
        item: &Pending,
        state: &WalkState,
    ) -> Result<PackageMetadata, PkgError> {
        let memo_key = (item.kind, item.name.clone(), item.range.clone());
        let cached = state.metadata.lock().await.get(&memo_key).cloned();
        if let Some(meta) = cached {
            return Ok(meta);
        }

        let meta = registry
            .get_metadata(&item.name, item.range.as_deref())
            .await?;
        state.metadata.lock().await.insert(memo_key, meta.clone());
        Ok(meta)
    }

    async fn choose_version(
        &self,
        registry: &Registry,
        item: &Pending,
        meta: &PackageMetadata,
    ) -> Result<String, PkgError> {
        if let Some(version) = &meta.version {
            return Ok(version.clone());
        }
        match registry.list_versions(&item.name).await? {
            Some(versions) => require_version(
                &item.name,
                &versions,
                item.range.as_deref(),
                &HashMap::new(),
            ),
            None => Ok(item
                .range
                .clone()
                .unwrap_or_else(|| ANY_VERSION.to_string())),
        }
    }

    fn package_dir(&self, key: &PackageKey) -> PathBuf {
        if self.options.persist {
            self.sandbox.package_dir(key.kind, &key.name, &key.version)
        } else {
            self.sandbox
                .tmp_package_dir(key.kind, &key.name, &key.version)
        }
    }

    /// Run collected hooks, every package after its dependencies.
    async fn run_hooks(&self, mut hooks: Vec<PendingHook>, report: &mut InstallReport) {
        let rank: HashMap<PackageKey, usize> = dependency_order(report)
            .into_iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i))
            .collect();
        hooks.sort_by_key(|hook| rank.get(&hook.key).copied().unwrap_or(usize::MAX));
        for hook in hooks {
            if let Err(e) = run_postinstall(&hook.dir, &hook.script).await {
                tracing::warn!(package = %hook.key, error = %e, "postinstall hook failed");
                report.hook_failures.push(HookFailure {
                    package: hook.key,
                    message: e.message().to_string(),
                });
            }
        }
    }

    /// Record the requested package in the project manifest and lockfile.
    fn record_project(&self, report: &InstallReport) -> Result<(), PkgError> {
        if self.options.dry_run || !self.options.persist {
            return Ok(());
        }
        let (Some(project_dir), Some(root)) = (&self.options.project_dir, &report.root) else {
            return Ok(());
        };
        let Some(manifest) = ProjectManifest::locate(project_dir) else {
            tracing::debug!(dir = %project_dir.display(), "no project manifest to update");
            return Ok(());
        };

        let dep_key = dependency_key(root.kind, &root.name);
        manifest.record_dependency(&dep_key, &root.version)?;

        let packages = report.nodes.iter().map(lock_package);
        Lockfile::update(
            &Lockfile::path_in(manifest.dir()),
            packages,
            [(dep_key, root.lock_key())],
        )?;
        Ok(())
    }
}

/// Request for a dependency declared by `parent`'s manifest.
///
/// A recognised prefix selects its adapter; otherwise a foreign `package.json`
/// resolves on npm and a native manifest stays in the parent's namespace.
fn dependency_request(
    parent: &PackageKey,
    source: ManifestSource,
    dep_name: &str,
    spec: &str,
    depth: usize,
) -> Pending {
    let dep_name = dep_name.trim();
    let (kind, name) = match RegistryKind::of_identifier(dep_name) {
        Some(kind) => (kind, kind.strip_own_prefix(dep_name)),
        None if source == ManifestSource::PackageJson => (RegistryKind::Npm, dep_name),
        None => (parent.kind, dep_name),
    };
    let range = Some(spec.trim())
        .filter(|r| !r.is_empty())
        .map(String::from);

    let identifier = match &range {
        Some(range) => format!("{}:{name}@{range}", kind.prefix()),
        None => format!("{}:{name}", kind.prefix()),
    };

    Pending {
        identifier,
        kind,
        name: name.to_string(),
        range,
        parent: Some(parent.clone()),
        depth,
    }
}

/// Post-order walk of the report's dependency edges from the root.
///
/// Every package comes after everything it depends on, except along a cycle
/// where the first package reached is emitted last.
fn dependency_order(report: &InstallReport) -> Vec<&PackageKey> {
    let deps: HashMap<&PackageKey, &[PackageKey]> = report
        .nodes
        .iter()
        .map(|node| (&node.key, node.dependencies.as_slice()))
        .collect();
    let mut order = Vec::with_capacity(report.nodes.len());
    let mut visited: HashSet<&PackageKey> = HashSet::new();
    let starts = report.root.iter().chain(report.nodes.iter().map(|n| &n.key));

    for start in starts {
        if !visited.insert(start) {
            continue;
        }
        let mut stack = vec![(start, 0usize)];
        while let Some(&(key, next)) = stack.last() {
            let children = deps.get(key).copied().unwrap_or_default();
            match children.get(next) {
                Some(child) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if visited.insert(child) {
                        stack.push((child, 0));
                    }
                }
                None => {
                    order.push(key);
                    stack.pop();
                }
            }
        }
    }
    order
}

/// Kind of an npm dependency spec that names no registry version
/// (`file:`, git URLs, `user/repo` shorthands, `npm:` aliases).
fn non_registry_spec(dep: &Pending) -> Option<&'static str> {
    if dep.kind != RegistryKind::Npm {
        return None;
    }
    let spec = dep.range.as_deref()?;
    let (scheme, _) = spec.split_once(':').unwrap_or(("", spec));
    match scheme {
        "file" | "link" | "portal" => Some("local path"),
        "npm" => Some("alias"),
        "workspace" => Some("workspace"),
        "github" | "gitlab" | "bitbucket" | "gist" => Some("git host"),
        "http" | "https" => Some("url"),
        s if s.starts_with("git") => Some("git"),
        _ if spec.contains('/') => Some("git host"),
        _ => None,
    }
}

fn lock_package(node: &InstalledNode) -> LockPackage {
    let mut pkg = LockPackage::new(node.key.kind, &node.key.name, &node.key.version);
    pkg.resolved = node.resolved.clone();
    pkg.integrity = node.integrity.clone();
    pkg.dependencies = node.dependencies.iter().map(PackageKey::lock_key).collect();
    pkg
}

async fn extract_blocking(archive: PathBuf, dest: PathBuf) -> Result<(), PkgError> {
    tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
        .await
        .map_err(|e| PkgError::extraction_failed(format!("Extraction task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(kind: RegistryKind) -> PackageKey {
        PackageKey::new(kind, "parent", "1.0.0")
    }

    #[test]
    fn test_package_key_display() {
        assert_eq!(
            PackageKey::new(RegistryKind::Python, "requests", "2.31.0").to_string(),
            "py:requests@2.31.0"
        );
        assert_eq!(
            PackageKey::new(RegistryKind::Npm, "@a/b", "1.0.0").lock_key(),
            "npm:@a/b@1.0.0"
        );
    }

    #[test]
    fn test_unprefixed_dependency_inherits_namespace() {
        let dep = dependency_request(&parent(RegistryKind::Github), ManifestSource::Chai, "other/repo", "v1", 1);
        assert_eq!(dep.kind, RegistryKind::Github);
        assert_eq!(dep.name, "other/repo");
        assert_eq!(dep.range.as_deref(), Some("v1"));
        assert_eq!(dep.identifier, "gh:other/repo@v1");
        assert_eq!(dep.depth, 1);
    }

    #[test]
    fn test_prefixed_dependency_uses_its_adapter() {
        let dep = dependency_request(&parent(RegistryKind::Npm), ManifestSource::Chai, "py:requests", ">=2", 1);
        assert_eq!(dep.kind, RegistryKind::Python);
        assert_eq!(dep.name, "requests");
        assert_eq!(dep.parent, Some(parent(RegistryKind::Npm)));
    }

    #[test]
    fn test_package_json_dependencies_resolve_on_npm() {
        let dep = dependency_request(&parent(RegistryKind::Github), ManifestSource::PackageJson, "@scope/lib", "^1.0.0", 2);
        assert_eq!(dep.kind, RegistryKind::Npm);
        assert_eq!(dep.name, "@scope/lib");
        assert_eq!(dep.identifier, "npm:@scope/lib@^1.0.0");
    }

    #[test]
    fn test_empty_spec_is_no_range() {
        let dep = dependency_request(&parent(RegistryKind::Npm), ManifestSource::PackageJson, "left-pad", "  ", 1);
        assert!(dep.range.is_none());
        assert_eq!(dep.identifier, "npm:left-pad");
    }

    #[test]
    fn test_non_registry_specs() {
        let npm = |spec: &str| {
            dependency_request(&parent(RegistryKind::Npm), ManifestSource::PackageJson, "dep", spec, 1)
        };
        assert_eq!(non_registry_spec(&npm("file:../dep")), Some("local path"));
        assert_eq!(non_registry_spec(&npm("github:user/repo")), Some("git host"));
        assert_eq!(non_registry_spec(&npm("user/repo#v1")), Some("git host"));
        assert_eq!(non_registry_spec(&npm("git+https://host/r.git")), Some("git"));
        assert_eq!(non_registry_spec(&npm("https://host/dep.tgz")), Some("url"));
        assert_eq!(non_registry_spec(&npm("npm:other@^1")), Some("alias"));
        assert_eq!(non_registry_spec(&npm("^1.0.0 || 2.x")), None);
        assert_eq!(non_registry_spec(&npm("latest")), None);
        assert_eq!(non_registry_spec(&npm("")), None);

        let gh = dependency_request(&parent(RegistryKind::Github), ManifestSource::Chai, "o/r", "release/1.0", 1);
        assert_eq!(non_registry_spec(&gh), None);
    }

    #[test]
    fn test_default_options() {
        let options = InstallOptions::default();
        assert!(options.persist);
        assert!(options.run_hooks);
        assert!(!options.dry_run);
        assert_eq!(options.concurrency, DEFAULT_CONCURRENCY);
    }
}
