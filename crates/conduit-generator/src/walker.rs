//! Directory walk that discovers route files and feeds the route tree

use crate::route_tree::RouteTree;
use conduit_analyzer::{SourceAnalyzer, package_files};
use conduit_core::cache::ROUTE_FILE;
use conduit_core::{CacheManager, ExcludeSet, LocalDependency, ParsedFile};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl WalkStats {
    pub fn total(&self) -> usize {
        self.cache_hits + self.cache_misses
    }
}

pub struct RouteWalker<'a> {
    manager: &'a CacheManager,
    analyzer: &'a dyn SourceAnalyzer,
    exclude: &'a ExcludeSet,
}

impl<'a> RouteWalker<'a> {
    pub fn new(
        manager: &'a CacheManager,
        analyzer: &'a dyn SourceAnalyzer,
        exclude: &'a ExcludeSet,
    ) -> Self {
        Self {
            manager,
            analyzer,
            exclude,
        }
    }

    /// Build a fresh tree from every non-excluded directory holding a route
    /// file. Cached parses are reused; everything else is analyzed and stored.
    pub fn walk(&self) -> (RouteTree, WalkStats) {
        let started = Instant::now();
        let root = self.exclude.root().to_path_buf();
        let filter = self.exclude.clone();
        let walker = ignore::WalkBuilder::new(&root)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| !filter.is_excluded(entry.path()))
            .build();

        let mut tree = RouteTree::new();
        let mut stats = WalkStats::default();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Walk error: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_dir()) {
                continue;
            }
            let rel_path = match entry.path().strip_prefix(&root) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                _ => continue,
            };

            let route_file = entry.path().join(ROUTE_FILE);
            if !route_file.is_file() {
                continue;
            }

            let parsed = match self.cached(&route_file) {
                Some(parsed) => {
                    debug!("Using cached route {} (methods: {:?})", rel_path.display(), parsed.methods);
                    stats.cache_hits += 1;
                    parsed
                }
                None => {
                    stats.cache_misses += 1;
                    self.analyze(&route_file, &rel_path)
                }
            };
            tree.add_route(&rel_path, parsed);
        }

        debug!(
            "Walk completed in {:?}: {} routes ({} cached, {} parsed)",
            started.elapsed(),
            stats.total(),
            stats.cache_hits,
            stats.cache_misses
        );
        (tree, stats)
    }

    fn cached(&self, route_file: &Path) -> Option<Arc<ParsedFile>> {
        let parsed = match self.manager.get_parsed_file(route_file) {
            Ok(parsed) => parsed?,
            Err(e) => {
                debug!("Cache lookup failed for {}: {}", route_file.display(), e);
                return None;
            }
        };
        if let Some(dep) = stale_package(&parsed) {
            debug!(
                "Package {} of {} gained or lost files, re-analyzing",
                dep.import_path,
                route_file.display()
            );
            self.manager.invalidate_parse(route_file);
            return None;
        }
        Some(parsed)
    }

    fn analyze(&self, route_file: &Path, rel_path: &Path) -> Arc<ParsedFile> {
        let parsed = match self.analyzer.analyze(route_file, rel_path) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to analyze {}: {}", route_file.display(), e);
                ParsedFile::empty(route_file, rel_path)
            }
        };
        if parsed.methods.is_empty() {
            debug!(
                "Parsed route {} (no methods found, may be empty or incomplete)",
                rel_path.display()
            );
        } else {
            debug!("Parsed route {} (methods: {:?})", rel_path.display(), parsed.methods);
        }

        let parsed = Arc::new(parsed);
        if let Err(e) = self.manager.set_parsed_file(route_file, Arc::clone(&parsed)) {
            debug!("Failed to cache parse of {}: {}", route_file.display(), e);
        }
        parsed
    }
}

/// First local dependency whose package directory no longer holds the files
/// recorded at parse time.
fn stale_package(parsed: &ParsedFile) -> Option<&LocalDependency> {
    parsed.dependencies.local_imports.iter().find(|dep| {
        dep.package_dir
            .as_deref()
            .is_some_and(|dir| package_files(dir) != dep.files)
    })
}
