//! Cache manager: coordinates the four layers and answers "what must be
//! regenerated, and why" for a set of file-system changes.

use super::content::ContentTracker;
use super::generation::{GenerationLedger, StaleReason};
use super::layers::{ContentLayer, DependencyLayer, GenerationLayer, ParseLayer};
use super::parse::ParseStore;
use crate::error::{CacheError, Result};
use crate::exclude::ExcludeSet;
use crate::graph::DependencyGraph;
use crate::hash::ContentHash;
use crate::model::{
    CacheStats, ChangeEvent, ChangeKind, NodeKind, ParsedFile, Priority, RegenerationPlan, RegistrySignature,
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Name of the files the route walker looks for.
pub const ROUTE_FILE: &str = "route.go";

/// Findings of [`CacheManager::validate_integrity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Parsed files with no content entry.
    pub orphan_parses: Vec<PathBuf>,
    pub cycles: Vec<Vec<PathBuf>>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_parses.is_empty() && self.cycles.is_empty()
    }
}

pub struct CacheManager {
    content: Box<dyn ContentLayer>,
    parse: Box<dyn ParseLayer>,
    deps: Box<dyn DependencyLayer>,
    generation: Box<dyn GenerationLayer>,
    registry: RwLock<Option<RegistrySignature>>,
    dirty: DashMap<PathBuf, Priority>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("dirty", &self.dirty.len())
            .finish_non_exhaustive()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    pub fn new() -> Self {
        Self::with_layers(
            Box::new(ContentTracker::new()),
            Box::new(ParseStore::new()),
            Box::new(DependencyGraph::new()),
            Box::new(GenerationLedger::new()),
        )
    }

    pub fn with_layers(
        content: Box<dyn ContentLayer>,
        parse: Box<dyn ParseLayer>,
        deps: Box<dyn DependencyLayer>,
        generation: Box<dyn GenerationLayer>,
    ) -> Self {
        CacheManager {
            content,
            parse,
            deps,
            generation,
            registry: RwLock::new(None),
            dirty: DashMap::new(),
        }
    }

    /// Feed one file-system change through the layers.
    pub fn handle_file_change(&self, event: &ChangeEvent) -> Result<RegenerationPlan> {
        debug!(
            "CacheManager: handling {} ({})",
            event.path.display(),
            event.kind
        );
        let was_node = self.deps.contains(&event.path);
        let mut plan = match event.kind {
            ChangeKind::Delete => self.handle_delete(&event.path),
            _ if event.path.is_dir() => self.handle_directory(&event.path),
            ChangeKind::Write | ChangeKind::Create => self.handle_write(&event.path)?,
        };
        if event.kind != ChangeKind::Write || !was_node {
            self.propagate_package_change(&event.path, &mut plan);
        }
        self.record_dirty(&plan);
        Ok(plan)
    }

    /// A package directory that appeared or changed affects its importers.
    fn handle_directory(&self, dir: &Path) -> RegenerationPlan {
        let mut plan = RegenerationPlan::new(vec![dir.to_path_buf()]);
        if self.is_package(dir) {
            let affected = self.deps.affected_files(dir);
            let reason = format!("package changed: {}", dir.display());
            for file in &affected {
                plan.mark(file, reason.clone(), Priority::Normal);
            }
            plan.regeneration_map.insert(dir.to_path_buf(), affected);
        }
        plan
    }

    /// A file appearing in or leaving a tracked package directory changes
    /// the package's file set, which every importer depends on.
    fn propagate_package_change(&self, path: &Path, plan: &mut RegenerationPlan) {
        let Some(dir) = path.parent().filter(|dir| self.is_package(dir)) else {
            return;
        };
        let reason = format!("package changed: {}", dir.display());
        let affected = self.deps.affected_files(dir);
        for file in &affected {
            plan.mark_if_absent(file, reason.clone(), Priority::Normal);
        }
        debug!(
            "CacheManager: {} changed package {} ({} importers)",
            path.display(),
            dir.display(),
            affected.len()
        );
        plan.regeneration_map
            .entry(dir.to_path_buf())
            .or_default()
            .extend(affected);
    }

    /// Whether `path` is a graph node or sits directly in a tracked package
    /// directory.
    pub fn is_watched_dependency(&self, path: &Path) -> bool {
        self.deps.contains(path) || path.parent().is_some_and(|dir| self.is_package(dir))
    }

    fn is_package(&self, dir: &Path) -> bool {
        self.deps
            .node(dir)
            .is_some_and(|node| node.kind == NodeKind::Package)
    }

    fn handle_delete(&self, path: &Path) -> RegenerationPlan {
        let mut plan = RegenerationPlan::new(vec![path.to_path_buf()]);
        let dependents = self.deps.dependents(path);

        self.content.remove_content(path);
        self.parse.invalidate_parse(path);
        self.deps.remove_node(path);
        self.generation.invalidate_generation(path);

        let reason = format!("dependency deleted: {}", path.display());
        for dependent in &dependents {
            plan.mark(dependent, reason.clone(), Priority::Highest);
        }
        plan.regeneration_map.insert(path.to_path_buf(), dependents);
        plan
    }

    fn handle_write(&self, path: &Path) -> Result<RegenerationPlan> {
        let mut plan = RegenerationPlan::new(vec![path.to_path_buf()]);
        let update = self.content.update_content(path)?;
        if !update.changed {
            debug!("CacheManager: {} unchanged", path.display());
            return Ok(plan);
        }

        self.parse.invalidate_parse(path);
        let affected = self.deps.affected_files(path);
        let reason = format!("dependency changed: {}", path.display());
        for file in &affected {
            plan.mark(file, reason.clone(), Priority::Normal);
        }
        plan.regeneration_map.insert(path.to_path_buf(), affected);
        plan.mark(path, "file content changed", Priority::Elevated);
        Ok(plan)
    }

    fn record_dirty(&self, plan: &RegenerationPlan) {
        for (path, &priority) in &plan.priority {
            self.mark_dirty(path, priority);
        }
    }

    /// Add `path` to the dirty set, keeping the higher priority if present.
    pub fn mark_dirty(&self, path: &Path, priority: Priority) {
        self.dirty
            .entry(path.to_path_buf())
            .and_modify(|p| *p = (*p).max(priority))
            .or_insert(priority);
    }

    /// Batch impact analysis for an explicit set of changed files.
    pub fn regeneration_plan(&self, changed: &[PathBuf]) -> Result<RegenerationPlan> {
        let mut plan = RegenerationPlan::new(changed.to_vec());

        for file in changed {
            let affected = self.deps.affected_files(file);
            let reason = format!("depends on changed file: {}", file.display());
            for dependent in &affected {
                plan.mark_if_absent(dependent, reason.clone(), Priority::Normal);
            }
            plan.regeneration_map.insert(file.clone(), affected);
        }

        for file in changed {
            let Some(entry) = self.content.get_content(file) else {
                continue;
            };
            let dependencies = self.deps.dependencies(file);
            if let Some(reason) =
                self.generation
                    .needs_regeneration(file, entry.hash, &dependencies)
            {
                plan.mark(file, reason.to_string(), Priority::Elevated);
            }
        }

        debug!(
            "CacheManager: {} changed files affect {} files",
            changed.len(),
            plan.affected_files.len()
        );
        Ok(plan)
    }

    pub fn affected_files(&self, changed: &Path) -> Vec<PathBuf> {
        self.deps.affected_files(changed)
    }

    /// Parsed record for `path` if still valid. Refreshes the content entry
    /// first; a content change drops the stored parse.
    pub fn get_parsed_file(&self, path: &Path) -> Result<Option<Arc<ParsedFile>>> {
        let update = self.content.update_content(path)?;
        match update.entry {
            Some(entry) if entry.exists => {}
            _ => {
                self.parse.invalidate_parse(path);
                return Ok(None);
            }
        }
        if update.changed {
            debug!(
                "CacheManager: content changed for {}, dropping parse",
                path.display()
            );
            self.parse.invalidate_parse(path);
        }
        Ok(self.parse.get_parsed_file(path))
    }

    /// Store a parse and rewire the graph node from its dependencies.
    pub fn set_parsed_file(&self, path: &Path, parsed: Arc<ParsedFile>) -> Result<()> {
        self.parse.set_parsed_file(path, Arc::clone(&parsed));
        let dependencies = self.parse.get_dependencies(path);

        for dep in dependencies.iter().filter(|d| d.is_file()) {
            if let Err(e) = self.content.update_content(dep) {
                debug!("CacheManager: could not track {}: {}", dep.display(), e);
            }
        }

        self.deps.update_node(path, &dependencies);
        for (key, kind) in parsed.non_source_dependencies() {
            self.deps.set_kind(&key, kind);
        }
        if let Some(entry) = self.content.get_content(path) {
            self.deps.set_content_hash(path, entry.hash);
        }
        debug!(
            "CacheManager: stored parse of {} with {} dependencies",
            path.display(),
            dependencies.len()
        );
        Ok(())
    }

    pub fn invalidate_parse(&self, path: &Path) {
        self.parse.invalidate_parse(path);
    }

    /// Record a successful emission using the current content, dependencies
    /// and template/config hashes.
    pub fn mark_generated(&self, source: &Path, output: &Path) -> Result<()> {
        let entry = self
            .content
            .get_content(source)
            .ok_or_else(|| CacheError::MissingContent {
                path: source.to_path_buf(),
            })?;
        let dependencies = self.deps.dependencies(source);
        self.generation.mark_generated(
            source,
            output,
            entry.hash,
            self.generation.current_template_hash(),
            self.generation.current_config_hash(),
            &dependencies,
        )
    }

    /// Ledger verdict for `source` against its current content entry.
    pub fn needs_regeneration(&self, source: &Path) -> Result<Option<StaleReason>> {
        let entry = self
            .content
            .get_content(source)
            .ok_or_else(|| CacheError::MissingContent {
                path: source.to_path_buf(),
            })?;
        let dependencies = self.deps.dependencies(source);
        Ok(self
            .generation
            .needs_regeneration(source, entry.hash, &dependencies))
    }

    pub fn set_current_template_hash(&self, hash: ContentHash) {
        self.generation.set_current_template_hash(hash);
    }

    pub fn set_current_config_hash(&self, hash: ContentHash) {
        self.generation.set_current_config_hash(hash);
    }

    pub fn generated_files(&self) -> Vec<PathBuf> {
        self.generation.generated_files()
    }

    /// Cross-layer consistency check. Findings are logged, never fatal.
    pub fn validate_integrity(&self) -> IntegrityReport {
        let orphan_parses: Vec<PathBuf> = self
            .parse
            .all_parsed_files()
            .iter()
            .filter(|parsed| self.content.get_content(&parsed.path).is_none())
            .map(|parsed| parsed.path.clone())
            .collect();
        for path in &orphan_parses {
            warn!("Parsed file {} has no content entry", path.display());
        }

        let cycles = self.deps.detect_cycles();
        if !cycles.is_empty() {
            warn!("Detected {} dependency cycles", cycles.len());
            for (i, cycle) in cycles.iter().enumerate() {
                let rendered: Vec<String> =
                    cycle.iter().map(|p| p.display().to_string()).collect();
                warn!("  cycle {}: {}", i + 1, rendered.join(" -> "));
            }
        }

        IntegrityReport {
            orphan_parses,
            cycles,
        }
    }

    pub fn topological_order(&self) -> Result<Vec<PathBuf>> {
        self.deps.topological_order()
    }

    /// Seed the content tracker with every route file under `root`.
    pub fn warm_cache(&self, root: &Path, exclude: &ExcludeSet) -> usize {
        let started = Instant::now();
        let filter = exclude.clone();
        let walker = ignore::WalkBuilder::new(root)
            .standard_filters(false)
            .filter_entry(move |entry| !filter.is_excluded(entry.path()))
            .build();

        let mut count = 0;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("CacheManager: walk error: {}", e);
                    continue;
                }
            };
            if entry.file_name() != ROUTE_FILE || !entry.path().is_file() {
                continue;
            }
            match self.content.update_content(entry.path()) {
                Ok(_) => count += 1,
                Err(e) => debug!("CacheManager: failed to warm {}: {}", entry.path().display(), e),
            }
        }
        debug!(
            "CacheManager: warmed {} files in {:?}",
            count,
            started.elapsed()
        );
        count
    }

    pub fn registry_signature(&self) -> Option<RegistrySignature> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_registry_signature(&self, signature: RegistrySignature) {
        *self.registry.write().unwrap_or_else(PoisonError::into_inner) = Some(signature);
    }

    /// Whether the registry for `route_paths` differs from the last one emitted.
    pub fn needs_registry_regeneration(&self, route_paths: &[String]) -> bool {
        let current = RegistrySignature::from_route_paths(route_paths);
        match self.registry_signature() {
            Some(previous) => previous.signature != current.signature,
            None => true,
        }
    }

    /// Whether changes to `path` matter to any tracked file.
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.deps.contains(path)
    }

    pub fn is_dirty(&self, path: &Path) -> bool {
        self.dirty.contains_key(path)
    }

    /// Drain the dirty set, highest priority first.
    pub fn take_dirty(&self) -> Vec<(PathBuf, Priority)> {
        let keys: Vec<PathBuf> = self.dirty.iter().map(|e| e.key().clone()).collect();
        let mut drained: Vec<(PathBuf, Priority)> =
            keys.into_iter().filter_map(|k| self.dirty.remove(&k)).collect();
        drained.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        drained
    }

    pub fn stats(&self) -> BTreeMap<&'static str, CacheStats> {
        let mut dependency = self.deps.stats();
        dependency.dependency_nodes = dependency.total_files;
        BTreeMap::from([
            ("content", self.content.stats()),
            ("parse", self.parse.stats()),
            ("dependency", dependency),
            ("generation", self.generation.stats()),
        ])
    }

    pub fn clear(&self) {
        self.content.clear();
        self.parse.clear();
        self.deps.clear();
        self.generation.clear();
        *self.registry.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.dirty.clear();
        debug!("CacheManager: cleared all layers");
    }
}
