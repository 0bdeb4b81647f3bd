//! Parse store: path -> shared parsed record

use super::layers::ParseLayer;
use crate::model::{CacheStats, ParsedFile};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
pub struct ParseStore {
    entries: DashMap<PathBuf, Arc<ParsedFile>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ParseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParseLayer for ParseStore {
    fn set_parsed_file(&self, path: &Path, parsed: Arc<ParsedFile>) {
        debug!(
            "ParseStore: stored {} ({} methods)",
            path.display(),
            parsed.methods.len()
        );
        self.entries.insert(path.to_path_buf(), parsed);
    }

    fn get_parsed_file(&self, path: &Path) -> Option<Arc<ParsedFile>> {
        match self.entries.get(path) {
            Some(parsed) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(parsed.value()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn invalidate_parse(&self, path: &Path) {
        if self.entries.remove(path).is_some() {
            debug!("ParseStore: invalidated {}", path.display());
        }
    }

    fn get_dependencies(&self, path: &Path) -> Vec<PathBuf> {
        self.entries
            .get(path)
            .map(|parsed| parsed.dependency_keys())
            .unwrap_or_default()
    }

    fn all_parsed_files(&self) -> Vec<Arc<ParsedFile>> {
        let mut files: Vec<Arc<ParsedFile>> =
            self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyAnalysis, LocalDependency};

    fn parsed_with_deps() -> ParsedFile {
        let mut parsed = ParsedFile::empty("/p/users/route.go", "users");
        parsed.dependencies = DependencyAnalysis {
            stdlib_imports: vec!["net/http".into()],
            external_imports: vec!["github.com/go-chi/chi".into()],
            local_imports: vec![LocalDependency {
                import_path: "my-app/users/user_repo".into(),
                relative_path: "users/user_repo".into(),
                alias: None,
                package_dir: Some("/p/users/user_repo".into()),
                files: vec!["/p/users/user_repo/user_repo.go".into()],
            }],
        };
        parsed
    }

    #[test]
    fn test_dependencies_union_local_packages_and_external() {
        let store = ParseStore::new();
        let path = Path::new("/p/users/route.go");
        store.set_parsed_file(path, Arc::new(parsed_with_deps()));

        assert_eq!(
            store.get_dependencies(path),
            vec![
                PathBuf::from("/p/users/user_repo"),
                PathBuf::from("/p/users/user_repo/user_repo.go"),
                PathBuf::from("github.com/go-chi/chi"),
            ]
        );
        assert!(store.get_dependencies(Path::new("/p/missing.go")).is_empty());
    }

    #[test]
    fn test_invalidate_miss_is_silent() {
        let store = ParseStore::new();
        store.invalidate_parse(Path::new("/nope"));

        let path = Path::new("/p/users/route.go");
        store.set_parsed_file(path, Arc::new(parsed_with_deps()));
        assert!(store.get_parsed_file(path).is_some());
        store.invalidate_parse(path);
        assert!(store.get_parsed_file(path).is_none());

        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }
}
