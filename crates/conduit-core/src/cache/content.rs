//! Content tracker: path -> content identity, with a size + mtime fast path

use super::layers::ContentLayer;
use crate::error::{CacheError, Result};
use crate::hash::ContentHash;
use crate::model::{CacheStats, ContentEntry};
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::debug;

/// Result of refreshing one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdate {
    /// Current entry; for a vanished file, the dropped entry with `exists = false`.
    pub entry: Option<ContentEntry>,
    pub changed: bool,
}

#[derive(Debug, Default)]
pub struct ContentTracker {
    entries: DashMap<PathBuf, ContentEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn hash_entry(path: &Path, size: u64, modified: SystemTime) -> Result<ContentEntry> {
        let hash = ContentHash::from_file(path).map_err(|e| CacheError::io(path, e))?;
        Ok(ContentEntry {
            path: path.to_path_buf(),
            hash,
            modified,
            size,
            exists: true,
        })
    }
}

impl ContentLayer for ContentTracker {
    fn update_content(&self, path: &Path) -> Result<ContentUpdate> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let dropped = self.entries.remove(path).map(|(_, mut entry)| {
                    debug!("ContentTracker: file deleted: {}", path.display());
                    entry.exists = false;
                    entry
                });
                let changed = dropped.is_some();
                return Ok(ContentUpdate {
                    entry: dropped,
                    changed,
                });
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let size = metadata.len();
        let modified = metadata.modified().map_err(|e| CacheError::io(path, e))?;

        let Some(existing) = self.entries.get(path).map(|e| e.clone()) else {
            debug!("ContentTracker: new file: {}", path.display());
            self.misses.fetch_add(1, Ordering::Relaxed);
            let entry = Self::hash_entry(path, size, modified)?;
            self.entries.insert(path.to_path_buf(), entry.clone());
            return Ok(ContentUpdate {
                entry: Some(entry),
                changed: true,
            });
        };

        if existing.size == size && existing.modified == modified {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(ContentUpdate {
                entry: Some(existing),
                changed: false,
            });
        }

        let fresh = Self::hash_entry(path, size, modified)?;
        let changed = fresh.hash != existing.hash;
        if changed {
            debug!(
                "ContentTracker: content changed for {} ({} -> {})",
                path.display(),
                existing.hash.short(),
                fresh.hash.short()
            );
        } else {
            debug!(
                "ContentTracker: metadata changed, content same for {}",
                path.display()
            );
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        self.entries.insert(path.to_path_buf(), fresh.clone());
        Ok(ContentUpdate {
            entry: Some(fresh),
            changed,
        })
    }

    fn get_content(&self, path: &Path) -> Option<ContentEntry> {
        let entry = self.entries.get(path).map(|e| e.clone());
        let counter = if entry.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        entry
    }

    fn remove_content(&self, path: &Path) {
        if self.entries.remove(path).is_some() {
            debug!("ContentTracker: removed {}", path.display());
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats::with_counts(
            self.entries.len(),
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
