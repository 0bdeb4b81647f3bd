//! CLI command implementations

use conduit_core::cache;
use conduit_generator::{GenerationReport, RouteGenerator};
use conduit_watcher::{FileWatcher, WatchHandler};
use std::path::Path;
use std::time::Duration;

fn route_generator(root: &Path) -> anyhow::Result<RouteGenerator> {
    let generator = RouteGenerator::new(root, cache::global())?;
    let warmed = generator.warm_cache();
    tracing::debug!("Warmed cache with {} route files", warmed);
    Ok(generator)
}

pub fn generate(root: &Path) -> anyhow::Result<GenerationReport> {
    let generator = route_generator(root)?;
    let report = generator.generate()?;
    tracing::info!(
        "{} routes, {} generated, {} up to date",
        report.routes,
        report.generated.len(),
        report.skipped
    );
    Ok(report)
}

/// Regenerates on every debounced change.
struct DevHandler {
    generator: RouteGenerator,
}

impl WatchHandler for DevHandler {
    fn on_start(&mut self) -> anyhow::Result<()> {
        tracing::info!(
            "Watching {} for changes (Ctrl-C to stop)",
            self.generator.project().root.display()
        );
        Ok(())
    }

    fn on_change(&mut self) -> anyhow::Result<()> {
        let report = self.generator.generate()?;
        if !report.generated.is_empty() {
            tracing::info!("Regenerated: {}", report.generated.join(", "));
        }
        Ok(())
    }

    fn on_close(&mut self) -> anyhow::Result<()> {
        tracing::info!("Stopped watching");
        Ok(())
    }
}

pub async fn dev(root: &Path, debounce_ms: u64) -> anyhow::Result<()> {
    let generator = route_generator(root)?;
    generator.generate()?;

    let mut watcher = FileWatcher::new(
        std::sync::Arc::clone(generator.manager()),
        generator.exclude().clone(),
    )?
    .with_debounce(Duration::from_millis(debounce_ms));

    let mut handler = DevHandler { generator };
    watcher
        .run(&mut handler, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
}

pub fn stats(root: &Path) -> anyhow::Result<()> {
    let generator = route_generator(root)?;
    generator.generate()?;

    for (layer, stats) in generator.manager().stats() {
        println!(
            "{:<11} files: {:>5}  hits: {:>5}  misses: {:>5}  hit rate: {:>5.1}%",
            layer, stats.total_files, stats.hits, stats.misses, stats.hit_rate
        );
    }
    if let Some(registry) = generator.manager().registry_signature() {
        println!(
            "registry    routes: {:>4}  signature: {}",
            registry.route_count,
            registry.signature.short()
        );
    }
    Ok(())
}
