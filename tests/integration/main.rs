//! Integration tests for Conduit
//!
//! These tests drive the generator, the shared cache and the watch loop
//! together against a scratch Go project.

use conduit_core::cache;
use conduit_core::{CacheManager, ExcludeSet};
use conduit_generator::{REGISTRY_FILE, RouteGenerator};
use conduit_watcher::{FileWatcher, WatchHandler, WatchRegistrar};
use notify::event::{DataChange, EventKind, ModifyKind};
use notify::RecursiveMode;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const OUTPUT: &str = ".conduit/generated";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn create_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "go.mod", "module shop\n\ngo 1.22\n");
    write(
        dir.path(),
        "api/products/route.go",
        "package products\n\nimport \"net/http\"\n\nfunc GET(w http.ResponseWriter, r *http.Request) {}\n",
    );
    write(
        dir.path(),
        "api/products/id_/route.go",
        "package id\n\nimport \"net/http\"\n\nfunc GET(w http.ResponseWriter, r *http.Request) {}\n\nfunc DELETE(w http.ResponseWriter, r *http.Request) {}\n",
    );
    write(dir.path(), "README.md", "# shop\n");
    dir
}

/// Test that a full pass over a nested project emits every route and a
/// registry with parameterized paths
#[test]
fn test_generate_nested_project() {
    let dir = create_project();
    let manager = Arc::new(CacheManager::new());
    let generator = RouteGenerator::new(dir.path(), Arc::clone(&manager)).unwrap();
    assert_eq!(generator.warm_cache(), 2);

    let report = generator.generate().unwrap();
    assert_eq!(report.routes, 2);
    assert_eq!(report.generated, vec!["api/products", "api/products/id_"]);

    let registry = fs::read_to_string(dir.path().join(OUTPUT).join(REGISTRY_FILE)).unwrap();
    assert!(registry.contains("Path: \"/api/products/:id\""));
    assert!(registry.contains("api_products_id__route.DELETE"));

    let stats = manager.stats();
    assert_eq!(stats["generation"].total_files, 2);
}

/// Test that generators sharing the process-wide cache skip work done by
/// an earlier generator
#[test]
fn test_global_cache_is_shared_between_generators() {
    let dir = create_project();
    let manager = Arc::new(CacheManager::new());
    cache::set_global(Arc::clone(&manager));

    let first = RouteGenerator::new(dir.path(), cache::global()).unwrap();
    assert_eq!(first.generate().unwrap().generated.len(), 2);

    let second = RouteGenerator::new(dir.path(), cache::global()).unwrap();
    let report = second.generate().unwrap();
    assert!(report.generated.is_empty());
    assert_eq!(report.skipped, 2);
    assert!(Arc::ptr_eq(second.manager(), &manager));

    cache::reset_global();
    assert!(!Arc::ptr_eq(&cache::global(), &manager));
}

struct Registrar;

impl WatchRegistrar for Registrar {
    fn add_watch(&mut self, _path: &Path, _mode: RecursiveMode) -> notify::Result<()> {
        Ok(())
    }
}

struct Regenerate {
    generator: RouteGenerator,
    passes: Vec<Vec<String>>,
}

impl WatchHandler for Regenerate {
    fn on_change(&mut self) -> anyhow::Result<()> {
        let report = self.generator.generate()?;
        self.passes.push(report.generated);
        Ok(())
    }
}

/// Test that an edit seen by the watch loop regenerates only the edited
/// route after the quiet period
#[tokio::test(start_paused = true)]
async fn test_watch_loop_regenerates_edited_route() {
    let dir = create_project();
    let manager = Arc::new(CacheManager::new());
    let generator = RouteGenerator::new(dir.path(), Arc::clone(&manager)).unwrap();
    generator.generate().unwrap();

    let root = generator.project().root.clone();
    let exclude: ExcludeSet = generator.exclude().clone();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = FileWatcher::with_registrar(Registrar, rx, Arc::clone(&manager), exclude)
        .with_debounce(Duration::from_millis(200));
    let mut handler = Regenerate {
        generator,
        passes: Vec::new(),
    };

    let route = root.join("api/products/id_/route.go");
    fs::write(
        &route,
        "package id\n\nimport \"net/http\"\n\nfunc GET(w http.ResponseWriter, r *http.Request) {}\n\nfunc PUT(w http.ResponseWriter, r *http.Request) {}\n",
    )
    .unwrap();
    tx.send(Ok(notify::Event::new(EventKind::Modify(ModifyKind::Data(
        DataChange::Content,
    )))
    .add_path(route.clone())))
    .unwrap();

    watcher
        .run(&mut handler, tokio::time::sleep(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(handler.passes, vec![vec!["api/products/id_".to_string()]]);
    let generated =
        fs::read_to_string(root.join(OUTPUT).join("routes/api/products/id_/gen_route.go")).unwrap();
    assert!(generated.contains("func PUT("));
    assert!(!generated.contains("func DELETE("));
}

/// Test that the platform watcher can be built and shut down cleanly
#[tokio::test]
async fn test_platform_watcher_shutdown() {
    let dir = create_project();
    let generator = RouteGenerator::new(dir.path(), Arc::new(CacheManager::new())).unwrap();
    let mut watcher =
        FileWatcher::new(Arc::clone(generator.manager()), generator.exclude().clone()).unwrap();
    let mut handler = Regenerate {
        generator,
        passes: Vec::new(),
    };

    watcher.run(&mut handler, async {}).await.unwrap();
    assert!(handler.passes.is_empty());
    assert!(!watcher.is_pending());
    assert!(watcher.watched_paths().len() >= 3);
}
