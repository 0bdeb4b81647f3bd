//! Generation pass: walk, decide, emit, record

use crate::copier::{CopiedDependency, DependencyCopier};
use crate::route_tree::{Route, RouteTree};
use crate::templates::{
    FunctionData, HandlerData, ImportData, REGISTRY_TEMPLATE, ROUTE_TEMPLATE, RegistryRouteData,
    RegistryTemplateData, RouteTemplateData, TemplateEngine, TemplateRenderer,
};
use crate::walker::{RouteWalker, WalkStats};
use anyhow::{Context, Result};
use chrono::Utc;
use conduit_analyzer::{GoAnalyzer, SourceAnalyzer, create_parser_pool};
use conduit_core::cache::ROUTE_FILE;
use conduit_core::{CacheManager, ExcludeSet, Priority, ProjectConfig, RegistrySignature};
use minijinja::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const REGISTRY_FILE: &str = "routes_registry.go";
pub const REGISTRY_PACKAGE: &str = "generated";

/// Outcome of one generation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub routes: usize,
    /// Folder paths of the routes emitted in this pass.
    pub generated: Vec<String>,
    pub skipped: usize,
    pub registry_written: bool,
    pub walk: WalkStats,
}

pub struct RouteGenerator {
    project: ProjectConfig,
    manager: Arc<CacheManager>,
    analyzer: Arc<dyn SourceAnalyzer>,
    renderer: Box<dyn TemplateRenderer>,
    exclude: ExcludeSet,
}

impl RouteGenerator {
    /// Generator for the project at `root` with the Go analyzer and the
    /// embedded templates.
    pub fn new(root: &Path, manager: Arc<CacheManager>) -> Result<Self> {
        let project = ProjectConfig::resolve(root)?;
        let analyzer = GoAnalyzer::new(
            create_parser_pool(),
            project.root.clone(),
            project.module_name.clone(),
        );
        let renderer = TemplateEngine::new()?;
        Self::with_parts(project, manager, Arc::new(analyzer), Box::new(renderer))
    }

    pub fn with_parts(
        project: ProjectConfig,
        manager: Arc<CacheManager>,
        analyzer: Arc<dyn SourceAnalyzer>,
        renderer: Box<dyn TemplateRenderer>,
    ) -> Result<Self> {
        let exclude = ExcludeSet::new(
            project.root.clone(),
            &project.output_dirs(),
            project.exclude_globs(),
        )
        .context("invalid exclude pattern in config")?;
        Ok(Self {
            project,
            manager,
            analyzer,
            renderer,
            exclude,
        })
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub fn exclude(&self) -> &ExcludeSet {
        &self.exclude
    }

    /// Seed the content layer before the first pass.
    pub fn warm_cache(&self) -> usize {
        self.manager.warm_cache(&self.project.root, &self.exclude)
    }

    /// Run one pass. Only routes whose output is missing, whose inputs are
    /// dirty or whose ledger entry is stale are emitted.
    pub fn generate(&self) -> Result<GenerationReport> {
        let started = Instant::now();
        self.manager
            .set_current_template_hash(self.renderer.template_hash());
        self.manager
            .set_current_config_hash(self.project.config_hash());

        let dirty = self.drain_dirty();

        let walker = RouteWalker::new(&self.manager, self.analyzer.as_ref(), &self.exclude);
        let (mut tree, walk) = walker.walk();
        debug!("Route tree:");
        for line in tree.render_tree().lines() {
            debug!("{}", line);
        }
        tree.calculate_output_paths(&self.project.output_rel(), &self.project.module_name);

        let mut report = GenerationReport {
            routes: tree.len(),
            walk,
            ..Default::default()
        };
        let timestamp = Utc::now().to_rfc3339();
        let mut copier = DependencyCopier::new(&self.project, self.analyzer.as_ref());

        let dirty_paths: HashSet<PathBuf> = dirty.iter().map(|(path, _)| path.clone()).collect();
        let mut emitted: HashSet<&Path> = HashSet::new();
        for route in tree.routes() {
            if !self.needs_regeneration(route, &dirty_paths) {
                debug!("Skipping unchanged route: {}", route.folder_path);
                report.skipped += 1;
                continue;
            }
            if let Err(e) = self.generate_route(route, &mut copier, &timestamp) {
                self.restore_dirty(&dirty, &emitted);
                return Err(e);
            }
            emitted.insert(&route.parsed.path);
            report.generated.push(route.folder_path.clone());
        }

        report.registry_written = self.generate_registry_if_needed(&tree, &report, &timestamp)?;

        let integrity = self.manager.validate_integrity();
        if !integrity.is_clean() {
            debug!(
                "Cache integrity: {} orphan parses, {} cycles",
                integrity.orphan_parses.len(),
                integrity.cycles.len()
            );
        }
        for (layer, stats) in self.manager.stats() {
            debug!(
                "{} cache stats: {} files, {:.1}% hit rate",
                layer, stats.total_files, stats.hit_rate
            );
        }

        info!(
            "Generated {} of {} routes in {:?}",
            report.generated.len(),
            report.routes,
            started.elapsed()
        );
        Ok(report)
    }

    /// Take everything the watch loop marked since the last pass and drop
    /// their parses so the walk re-analyzes them.
    fn drain_dirty(&self) -> Vec<(PathBuf, Priority)> {
        let dirty = self.manager.take_dirty();
        for (path, priority) in &dirty {
            debug!("Dirty since last pass: {} ({:?})", path.display(), priority);
            self.manager.invalidate_parse(path);
        }
        dirty
    }

    /// Hand back dirty entries a failed pass did not emit, so the next pass
    /// still regenerates them.
    fn restore_dirty(&self, dirty: &[(PathBuf, Priority)], emitted: &HashSet<&Path>) {
        for (path, priority) in dirty {
            if !emitted.contains(path.as_path()) {
                self.manager.mark_dirty(path, *priority);
            }
        }
    }

    fn needs_regeneration(&self, route: &Route, dirty: &HashSet<PathBuf>) -> bool {
        let output = self.project.root.join(&route.output_path);
        if !output.exists() {
            debug!(
                "Output file does not exist, regeneration needed for route: {} -> {}",
                route.folder_path,
                route.output_path.display()
            );
            return true;
        }

        let source = &route.parsed.path;
        if dirty.contains(source) {
            debug!("Regeneration needed for route: {} (changed since last pass)", route.folder_path);
            return true;
        }

        match self.manager.regeneration_plan(std::slice::from_ref(source)) {
            Ok(plan) => match plan.reason(source) {
                Some(reason) => {
                    debug!("Regeneration needed for route: {} - {}", route.folder_path, reason);
                    true
                }
                None => false,
            },
            Err(e) => {
                warn!(
                    "Failed to get regeneration plan for {}: {}, assuming regeneration needed",
                    source.display(),
                    e
                );
                true
            }
        }
    }

    fn generate_route(
        &self,
        route: &Route,
        copier: &mut DependencyCopier<'_>,
        timestamp: &str,
    ) -> Result<()> {
        let mut copied = Vec::new();
        if !route.parsed.dependencies.local_imports.is_empty() {
            match copier.copy_dependencies(&route.parsed.dependencies) {
                Ok(deps) => copied = deps,
                Err(e) => warn!(
                    "Failed to copy dependencies for route {}: {:#}",
                    route.folder_path, e
                ),
            }
        }

        let data = self.route_data(route, &copied, timestamp);
        let output = self.project.root.join(&route.output_path);
        self.renderer
            .render(ROUTE_TEMPLATE, &output, &Value::from_serialize(&data))
            .with_context(|| format!("failed to generate route file {}", output.display()))?;

        if let Err(e) = self.manager.mark_generated(&route.parsed.path, &route.output_path) {
            warn!("Failed to mark {} as generated: {}", route.parsed.path.display(), e);
        }
        debug!(
            "Generated {} for route {} with {} dependencies",
            route.relative_output.display(),
            route.folder_path,
            copied.len()
        );
        Ok(())
    }

    fn route_data(
        &self,
        route: &Route,
        copied: &[CopiedDependency],
        timestamp: &str,
    ) -> RouteTemplateData {
        let parsed = &route.parsed;
        let deps = &parsed.dependencies;

        let mut imports: Vec<ImportData> = deps
            .stdlib_imports
            .iter()
            .chain(&deps.external_imports)
            .map(|path| ImportData {
                alias: None,
                path: path.clone(),
            })
            .collect();
        imports.extend(deps.local_imports.iter().map(|local| {
            let path = copied
                .iter()
                .find(|c| c.original_import == local.import_path)
                .map(|c| c.import_path.clone())
                .unwrap_or_else(|| local.import_path.clone());
            ImportData {
                alias: local.alias.clone(),
                path,
            }
        }));

        let package_name = if parsed.package_name.is_empty() {
            route.package_alias.clone()
        } else {
            parsed.package_name.clone()
        };

        RouteTemplateData {
            source: format!("{}/{}", route.folder_path, ROUTE_FILE),
            api_path: route.api_path.clone(),
            package_name,
            module_name: self.project.module_name.clone(),
            timestamp: timestamp.to_string(),
            methods: route.methods.iter().map(|m| m.to_string()).collect(),
            parameters: route.parameters.clone(),
            imports,
            functions: parsed
                .functions
                .iter()
                .map(|f| FunctionData {
                    name: f.name.clone(),
                    method: f.method.to_string(),
                    signature: f.signature.clone(),
                    body: f.body.clone(),
                })
                .collect(),
        }
    }

    /// The registry is rewritten when it is missing, when any route was
    /// emitted in this pass or when the set of route folders changed.
    fn generate_registry_if_needed(
        &self,
        tree: &RouteTree,
        report: &GenerationReport,
        timestamp: &str,
    ) -> Result<bool> {
        let route_paths: Vec<String> = tree.routes().iter().map(|r| r.folder_path.clone()).collect();
        let registry_path = self.project.output_dir().join(REGISTRY_FILE);

        let needed = !registry_path.exists()
            || !report.generated.is_empty()
            || self.manager.needs_registry_regeneration(&route_paths);
        if !needed {
            debug!("Routes registry is up to date, skipping generation");
            return Ok(false);
        }

        let data = RegistryTemplateData {
            package_name: REGISTRY_PACKAGE.to_string(),
            module_name: self.project.module_name.clone(),
            timestamp: timestamp.to_string(),
            routes: tree
                .routes()
                .iter()
                .map(|route| RegistryRouteData {
                    api_path: route.api_path.clone(),
                    folder_path: route.folder_path.clone(),
                    import_path: route.import_path.clone(),
                    package_alias: route.package_alias.clone(),
                    handlers: route
                        .parsed
                        .functions
                        .iter()
                        .map(|f| HandlerData {
                            method: f.method.to_string(),
                            name: f.name.clone(),
                        })
                        .collect(),
                })
                .collect(),
        };
        self.renderer
            .render(REGISTRY_TEMPLATE, &registry_path, &Value::from_serialize(&data))
            .context("failed to generate routes registry")?;

        self.manager
            .set_registry_signature(RegistrySignature::from_route_paths(&route_paths));
        debug!("Generated routes registry with {} routes", route_paths.len());
        Ok(true)
    }
}
