//! Core data structures shared by the cache layers, the analyzer and the generator

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// HTTP verbs recognised as route handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Options,
        HttpMethod::Head,
    ];

    /// Match a function name against the verb set, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handler function lifted out of a route file. The body is opaque text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFunction {
    pub name: String,
    pub method: HttpMethod,
    pub signature: String,
    pub body: String,
}

/// An import that resolves inside the project's own module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDependency {
    /// Full import path, e.g. `my-app/api/v1/users/user_repo`.
    pub import_path: String,
    /// Path relative to the project root, e.g. `api/v1/users/user_repo`.
    pub relative_path: PathBuf,
    pub alias: Option<String>,
    /// Absolute package directory, when resolved. Tracked so that files
    /// added to or removed from the package reach the importing route.
    #[serde(default)]
    pub package_dir: Option<PathBuf>,
    /// Source files of the imported package at parse time.
    pub files: Vec<PathBuf>,
}

/// Imports of a source file, split by origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    pub stdlib_imports: Vec<String>,
    pub external_imports: Vec<String>,
    pub local_imports: Vec<LocalDependency>,
}

impl DependencyAnalysis {
    pub fn is_empty(&self) -> bool {
        self.stdlib_imports.is_empty()
            && self.external_imports.is_empty()
            && self.local_imports.is_empty()
    }
}

/// Semantic extraction of one route source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: PathBuf,
    /// Directory of the file relative to the project root.
    pub rel_path: PathBuf,
    pub package_name: String,
    pub methods: Vec<HttpMethod>,
    pub functions: Vec<ExtractedFunction>,
    pub imports: Vec<String>,
    pub dependencies: DependencyAnalysis,
}

impl ParsedFile {
    /// The record produced for empty, incomplete or unparsable sources.
    pub fn empty(path: impl Into<PathBuf>, rel_path: impl Into<PathBuf>) -> Self {
        ParsedFile {
            path: path.into(),
            rel_path: rel_path.into(),
            package_name: String::new(),
            methods: Vec::new(),
            functions: Vec::new(),
            imports: Vec::new(),
            dependencies: DependencyAnalysis::default(),
        }
    }

    /// Files and identifiers this file's generated output depends on.
    pub fn dependency_keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<PathBuf> = self
            .dependencies
            .local_imports
            .iter()
            .flat_map(|dep| dep.package_dir.iter().chain(&dep.files).cloned())
            .collect();
        keys.extend(
            self.dependencies
                .external_imports
                .iter()
                .map(PathBuf::from),
        );
        keys
    }

    /// Dependency keys that are not source files, with their graph kind.
    pub fn non_source_dependencies(&self) -> Vec<(PathBuf, NodeKind)> {
        let deps = &self.dependencies;
        deps.local_imports
            .iter()
            .filter_map(|dep| dep.package_dir.clone())
            .map(|dir| (dir, NodeKind::Package))
            .chain(
                deps.external_imports
                    .iter()
                    .map(|import| (PathBuf::from(import), NodeKind::External)),
            )
            .collect()
    }
}

/// What a dependency-graph vertex stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NodeKind {
    /// A source file: a route or a file of an imported package.
    #[default]
    Source,
    /// Directory of a local package; its file set is a dependency.
    Package,
    /// Import path outside the module.
    External,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Source => "Source",
            NodeKind::Package => "Package",
            NodeKind::External => "External",
        };
        f.write_str(name)
    }
}

/// Identity of one file's bytes at the last observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub path: PathBuf,
    pub hash: ContentHash,
    pub modified: SystemTime,
    pub size: u64,
    pub exists: bool,
}

/// A dependency-graph vertex as seen from outside the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub path: PathBuf,
    pub kind: NodeKind,
    /// Files this node depends on.
    pub dependencies: Vec<PathBuf>,
    /// Files that depend on this node.
    pub dependents: Vec<PathBuf>,
    pub content_hash: Option<ContentHash>,
}

/// Provenance of one emitted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub source_hash: ContentHash,
    pub template_hash: ContentHash,
    pub dependency_hash: ContentHash,
    pub config_hash: ContentHash,
    pub generated_at: DateTime<Utc>,
}

/// Regeneration urgency. A direct hit outranks a transitive one, and a
/// deleted dependency outranks both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Normal = 1,
    Elevated = 2,
    Highest = 3,
}

/// Files needing re-emission for a set of changes, with reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegenerationPlan {
    pub changed_files: Vec<PathBuf>,
    /// Affected files in the order they were first recorded, without duplicates.
    pub affected_files: Vec<PathBuf>,
    /// Changed file -> files reached from it.
    pub regeneration_map: HashMap<PathBuf, Vec<PathBuf>>,
    pub reasons: HashMap<PathBuf, String>,
    pub priority: HashMap<PathBuf, Priority>,
}

impl RegenerationPlan {
    pub fn new(changed_files: Vec<PathBuf>) -> Self {
        RegenerationPlan {
            changed_files,
            ..Default::default()
        }
    }

    /// Record `path` as affected, overwriting any earlier reason and priority.
    pub fn mark(&mut self, path: &Path, reason: impl Into<String>, priority: Priority) {
        self.push_affected(path);
        self.reasons.insert(path.to_path_buf(), reason.into());
        self.priority.insert(path.to_path_buf(), priority);
    }

    /// Record `path` as affected unless it already is. Returns whether it was added.
    pub fn mark_if_absent(&mut self, path: &Path, reason: impl Into<String>, priority: Priority) -> bool {
        if self.is_affected(path) {
            return false;
        }
        self.mark(path, reason, priority);
        true
    }

    pub fn is_affected(&self, path: &Path) -> bool {
        self.reasons.contains_key(path)
    }

    pub fn reason(&self, path: &Path) -> Option<&str> {
        self.reasons.get(path).map(String::as_str)
    }

    pub fn priority_of(&self, path: &Path) -> Option<Priority> {
        self.priority.get(path).copied()
    }

    pub fn affected_set(&self) -> BTreeSet<PathBuf> {
        self.affected_files.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.affected_files.is_empty()
    }

    fn push_affected(&mut self, path: &Path) {
        if !self.reasons.contains_key(path) {
            self.affected_files.push(path.to_path_buf());
        }
    }
}

/// Kind of file-system change fed to the cache manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Write,
    Create,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Write => "write",
            ChangeKind::Create => "create",
            ChangeKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: SystemTime,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        ChangeEvent {
            path: path.into(),
            kind,
            timestamp: SystemTime::now(),
        }
    }
}

/// Per-layer counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_files: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub dependency_nodes: usize,
    pub generation_entries: usize,
    pub last_update: DateTime<Utc>,
}

impl CacheStats {
    pub fn with_counts(total_files: usize, hits: u64, misses: u64) -> Self {
        let lookups = hits + misses;
        let hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            total_files,
            hits,
            misses,
            hit_rate,
            dependency_nodes: 0,
            generation_entries: 0,
            last_update: Utc::now(),
        }
    }
}

/// Structural fingerprint of the emitted routes registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySignature {
    pub route_count: usize,
    pub route_paths: Vec<String>,
    pub signature: ContentHash,
    pub updated_at: DateTime<Utc>,
}

impl RegistrySignature {
    pub fn from_route_paths(route_paths: &[String]) -> Self {
        let mut sorted = route_paths.to_vec();
        sorted.sort();
        RegistrySignature {
            route_count: sorted.len(),
            signature: ContentHash::from_sorted_set(&sorted),
            route_paths: sorted,
            updated_at: Utc::now(),
        }
    }
}
