//! Layer seams. The cache manager talks to each layer through one of these
//! traits, so alternate implementations can be swapped in.

use super::content::ContentUpdate;
use super::generation::StaleReason;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::hash::ContentHash;
use crate::model::{CacheStats, ContentEntry, DependencyNode, GenerationInfo, NodeKind, ParsedFile};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Layer 1: file content identity.
pub trait ContentLayer: Send + Sync {
    fn update_content(&self, path: &Path) -> Result<ContentUpdate>;
    fn get_content(&self, path: &Path) -> Option<ContentEntry>;
    fn remove_content(&self, path: &Path);
    fn stats(&self) -> CacheStats;
    fn clear(&self);
}

/// Layer 2: parsed semantic records.
pub trait ParseLayer: Send + Sync {
    fn set_parsed_file(&self, path: &Path, parsed: Arc<ParsedFile>);
    fn get_parsed_file(&self, path: &Path) -> Option<Arc<ParsedFile>>;
    fn invalidate_parse(&self, path: &Path);
    fn get_dependencies(&self, path: &Path) -> Vec<PathBuf>;
    fn all_parsed_files(&self) -> Vec<Arc<ParsedFile>>;
    fn stats(&self) -> CacheStats;
    fn clear(&self);
}

/// Layer 3: dependency edges between files.
pub trait DependencyLayer: Send + Sync {
    fn build_graph(&self, parsed: &[Arc<ParsedFile>]);
    fn update_node(&self, path: &Path, dependencies: &[PathBuf]);
    fn affected_files(&self, changed: &Path) -> Vec<PathBuf>;
    fn dependencies(&self, path: &Path) -> Vec<PathBuf>;
    fn dependents(&self, path: &Path) -> Vec<PathBuf>;
    fn node(&self, path: &Path) -> Option<DependencyNode>;
    fn contains(&self, path: &Path) -> bool;
    fn set_kind(&self, path: &Path, kind: NodeKind);
    fn set_content_hash(&self, path: &Path, hash: ContentHash);
    fn remove_node(&self, path: &Path);
    fn detect_cycles(&self) -> Vec<Vec<PathBuf>>;
    fn topological_order(&self) -> Result<Vec<PathBuf>>;
    fn stats(&self) -> CacheStats;
    fn clear(&self);
}

/// Layer 4: generation provenance.
pub trait GenerationLayer: Send + Sync {
    fn mark_generated(
        &self,
        source: &Path,
        output: &Path,
        source_hash: ContentHash,
        template_hash: ContentHash,
        config_hash: ContentHash,
        dependencies: &[PathBuf],
    ) -> Result<()>;
    fn needs_regeneration(
        &self,
        source: &Path,
        current_hash: ContentHash,
        dependencies: &[PathBuf],
    ) -> Option<StaleReason>;
    fn set_current_template_hash(&self, hash: ContentHash);
    fn set_current_config_hash(&self, hash: ContentHash);
    fn current_template_hash(&self) -> ContentHash;
    fn current_config_hash(&self) -> ContentHash;
    fn generation_info(&self, source: &Path) -> Option<GenerationInfo>;
    fn invalidate_generation(&self, source: &Path);
    fn generated_files(&self) -> Vec<PathBuf>;
    fn stats(&self) -> CacheStats;
    fn clear(&self);
}

impl DependencyLayer for DependencyGraph {
    fn build_graph(&self, parsed: &[Arc<ParsedFile>]) {
        DependencyGraph::build_graph(self, parsed.iter().map(Arc::as_ref));
    }

    fn update_node(&self, path: &Path, dependencies: &[PathBuf]) {
        DependencyGraph::update_node(self, path, dependencies);
    }

    fn affected_files(&self, changed: &Path) -> Vec<PathBuf> {
        DependencyGraph::affected_files(self, changed)
    }

    fn dependencies(&self, path: &Path) -> Vec<PathBuf> {
        DependencyGraph::dependencies(self, path)
    }

    fn dependents(&self, path: &Path) -> Vec<PathBuf> {
        DependencyGraph::dependents(self, path)
    }

    fn node(&self, path: &Path) -> Option<DependencyNode> {
        DependencyGraph::node(self, path)
    }

    fn contains(&self, path: &Path) -> bool {
        DependencyGraph::contains(self, path)
    }

    fn set_kind(&self, path: &Path, kind: NodeKind) {
        DependencyGraph::set_kind(self, path, kind);
    }

    fn set_content_hash(&self, path: &Path, hash: ContentHash) {
        DependencyGraph::set_content_hash(self, path, hash);
    }

    fn remove_node(&self, path: &Path) {
        DependencyGraph::remove_node(self, path);
    }

    fn detect_cycles(&self) -> Vec<Vec<PathBuf>> {
        DependencyGraph::detect_cycles(self)
    }

    fn topological_order(&self) -> Result<Vec<PathBuf>> {
        Ok(DependencyGraph::topological_order(self)?)
    }

    fn stats(&self) -> CacheStats {
        let counts = self.counts();
        CacheStats {
            total_files: counts.nodes,
            hits: 0,
            misses: 0,
            hit_rate: 0.0,
            dependency_nodes: counts.nodes,
            generation_entries: 0,
            last_update: Utc::now(),
        }
    }

    fn clear(&self) {
        DependencyGraph::clear(self);
    }
}
