//! Generation ledger: what was emitted, from which inputs, and when

use super::layers::GenerationLayer;
use crate::error::{CacheError, Result};
use crate::hash::ContentHash;
use crate::model::{CacheStats, GenerationInfo};
use chrono::Utc;
use dashmap::DashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Why a source's generated output is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NoRecord,
    SourceChanged { old: ContentHash, new: ContentHash },
    DependenciesChanged,
    TemplateChanged,
    ConfigChanged,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NoRecord => f.write_str("no generation record found"),
            StaleReason::SourceChanged { old, new } => write!(
                f,
                "source content changed (hash: {} -> {})",
                old.short(),
                new.short()
            ),
            StaleReason::DependenciesChanged => f.write_str("dependencies changed"),
            StaleReason::TemplateChanged => f.write_str("template changed"),
            StaleReason::ConfigChanged => f.write_str("config changed"),
        }
    }
}

/// Stable combined hash of a dependency list.
pub fn dependency_hash(dependencies: &[PathBuf]) -> ContentHash {
    let keys: Vec<String> = dependencies
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    ContentHash::from_sorted_set(&keys)
}

#[derive(Debug, Default, Clone, Copy)]
struct CurrentInputs {
    template: Option<ContentHash>,
    config: Option<ContentHash>,
}

#[derive(Debug, Default)]
pub struct GenerationLedger {
    entries: DashMap<PathBuf, GenerationInfo>,
    current: RwLock<CurrentInputs>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl GenerationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> CurrentInputs {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GenerationLayer for GenerationLedger {
    fn mark_generated(
        &self,
        source: &Path,
        output: &Path,
        source_hash: ContentHash,
        template_hash: ContentHash,
        config_hash: ContentHash,
        dependencies: &[PathBuf],
    ) -> Result<()> {
        if source.as_os_str().is_empty() || output.as_os_str().is_empty() {
            return Err(CacheError::InvalidRecord(
                "source path and output path cannot be empty".to_string(),
            ));
        }

        let info = GenerationInfo {
            source_path: source.to_path_buf(),
            output_path: output.to_path_buf(),
            source_hash,
            template_hash,
            dependency_hash: dependency_hash(dependencies),
            config_hash,
            generated_at: Utc::now(),
        };
        self.entries.insert(source.to_path_buf(), info);
        debug!(
            "GenerationLedger: marked {} as generated ({})",
            source.display(),
            output.display()
        );
        Ok(())
    }

    fn needs_regeneration(
        &self,
        source: &Path,
        current_hash: ContentHash,
        dependencies: &[PathBuf],
    ) -> Option<StaleReason> {
        let Some(info) = self.entries.get(source).map(|e| e.clone()) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Some(StaleReason::NoRecord);
        };

        let current = self.current();
        let reason = if info.source_hash != current_hash {
            Some(StaleReason::SourceChanged {
                old: info.source_hash,
                new: current_hash,
            })
        } else if info.dependency_hash != dependency_hash(dependencies) {
            Some(StaleReason::DependenciesChanged)
        } else if current.template.is_some_and(|t| t != info.template_hash) {
            Some(StaleReason::TemplateChanged)
        } else if current.config.is_some_and(|c| c != info.config_hash) {
            Some(StaleReason::ConfigChanged)
        } else {
            None
        };

        match &reason {
            Some(reason) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("GenerationLedger: {} is stale: {}", source.display(), reason);
            }
            None => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("GenerationLedger: {} is up to date", source.display());
            }
        }
        reason
    }

    fn set_current_template_hash(&self, hash: ContentHash) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .template = Some(hash);
    }

    fn set_current_config_hash(&self, hash: ContentHash) {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .config = Some(hash);
    }

    fn current_template_hash(&self) -> ContentHash {
        self.current().template.unwrap_or_default()
    }

    fn current_config_hash(&self) -> ContentHash {
        self.current().config.unwrap_or_default()
    }

    fn generation_info(&self, source: &Path) -> Option<GenerationInfo> {
        self.entries.get(source).map(|e| e.clone())
    }

    fn invalidate_generation(&self, source: &Path) {
        if self.entries.remove(source).is_some() {
            debug!("GenerationLedger: invalidated {}", source.display());
        }
    }

    fn generated_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.entries.iter().map(|e| e.key().clone()).collect();
        files.sort();
        files
    }

    fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::with_counts(
            self.entries.len(),
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        );
        stats.generation_entries = self.entries.len();
        stats
    }

    fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
