//! Filesystem watcher implementation

use anyhow::{Context, Result, bail};
use conduit_core::cache::ROUTE_FILE;
use conduit_core::{CacheManager, ChangeEvent, ChangeKind, ExcludeSet};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Events the loop acts on, one path each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(p) | WatchEvent::Modified(p) | WatchEvent::Removed(p) => p,
        }
    }

    pub fn change_kind(&self) -> ChangeKind {
        match self {
            WatchEvent::Created(_) => ChangeKind::Create,
            WatchEvent::Modified(_) => ChangeKind::Write,
            WatchEvent::Removed(_) => ChangeKind::Delete,
        }
    }

    /// Split a notify event into per-path events. Renames become a removal
    /// of the old path and a creation of the new one.
    pub fn from_notify(event: notify::Event) -> Vec<WatchEvent> {
        let notify::Event { kind, paths, .. } = event;
        match kind {
            EventKind::Create(_) => paths.into_iter().map(WatchEvent::Created).collect(),
            EventKind::Remove(_) => paths.into_iter().map(WatchEvent::Removed).collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.into_iter().map(WatchEvent::Removed).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.into_iter().map(WatchEvent::Created).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut paths = paths.into_iter();
                let mut events = Vec::new();
                if let Some(from) = paths.next() {
                    events.push(WatchEvent::Removed(from));
                }
                events.extend(paths.map(WatchEvent::Created));
                events
            }
            EventKind::Modify(_) => paths.into_iter().map(WatchEvent::Modified).collect(),
            _ => Vec::new(),
        }
    }
}

/// Whether `path` names a route source file.
pub fn is_route_file(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == ROUTE_FILE)
}

/// Installs watches on directories.
pub trait WatchRegistrar: Send {
    fn add_watch(&mut self, path: &Path, mode: RecursiveMode) -> notify::Result<()>;
}

impl WatchRegistrar for RecommendedWatcher {
    fn add_watch(&mut self, path: &Path, mode: RecursiveMode) -> notify::Result<()> {
        self.watch(path, mode)
    }
}

/// Callbacks driven by the loop.
pub trait WatchHandler: Send {
    /// Runs once the initial watches are installed.
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs when the debounce window elapses after the last change.
    fn on_change(&mut self) -> Result<()>;

    fn on_close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Watches a project tree, feeds relevant changes to the cache manager and
/// runs one regeneration per quiet period.
pub struct FileWatcher<R: WatchRegistrar = RecommendedWatcher> {
    registrar: R,
    events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    manager: Arc<CacheManager>,
    exclude: ExcludeSet,
    debounce: Duration,
    watched: HashSet<PathBuf>,
    deadline: Option<Instant>,
}

impl FileWatcher<RecommendedWatcher> {
    /// Watcher backed by the platform's notify implementation, rooted at
    /// the root of `exclude`.
    pub fn new(manager: Arc<CacheManager>, exclude: ExcludeSet) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if event_tx.send(res).is_err() {
                debug!("Watch loop gone, dropping file system event");
            }
        })
        .context("failed to create file watcher")?;
        Ok(Self::with_registrar(watcher, event_rx, manager, exclude))
    }
}

impl<R: WatchRegistrar> FileWatcher<R> {
    pub fn with_registrar(
        registrar: R,
        events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
        manager: Arc<CacheManager>,
        exclude: ExcludeSet,
    ) -> Self {
        Self {
            registrar,
            events,
            manager,
            exclude,
            debounce: DEFAULT_DEBOUNCE,
            watched: HashSet::new(),
            deadline: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn watched_paths(&self) -> &HashSet<PathBuf> {
        &self.watched
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Watch every non-excluded directory under `dir`, one level each.
    fn watch_tree(&mut self, dir: &Path) -> Result<usize> {
        let filter = self.exclude.clone();
        let walker = ignore::WalkBuilder::new(dir)
            .standard_filters(false)
            .filter_entry(move |entry| !filter.is_excluded(entry.path()))
            .build();

        let mut added = 0;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Walk error while adding watches: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_dir()) {
                continue;
            }
            let path = entry.into_path();
            if self.watched.contains(&path) {
                continue;
            }
            self.registrar
                .add_watch(&path, RecursiveMode::NonRecursive)
                .with_context(|| format!("failed to add watcher for {}", path.display()))?;
            debug!("Adding watcher for: {}", path.display());
            self.watched.insert(path);
            added += 1;
        }
        Ok(added)
    }

    /// Handle one notify event. Returns whether anything outside the
    /// excluded paths was touched.
    pub fn process_event(&mut self, event: notify::Event) -> bool {
        let mut relevant = false;
        for change in WatchEvent::from_notify(event) {
            let path = change.path();
            if self.exclude.is_excluded(path) {
                continue;
            }
            relevant = true;
            debug!("File event: {:?}", change);

            if matches!(change, WatchEvent::Created(_)) && path.is_dir() {
                let dir = path.to_path_buf();
                if let Err(e) = self.watch_tree(&dir) {
                    warn!("Failed to watch new directory {}: {:#}", dir.display(), e);
                }
            }

            if is_route_file(path) || self.manager.is_watched_dependency(path) {
                let event = ChangeEvent::new(path, change.change_kind());
                match self.manager.handle_file_change(&event) {
                    Ok(plan) => debug!(
                        "{} {} affects {} files",
                        event.kind,
                        path.display(),
                        plan.affected_files.len()
                    ),
                    Err(e) => warn!("Failed to process change to {}: {}", path.display(), e),
                }
            }
        }
        relevant
    }

    /// Run until `shutdown` resolves, the event channel closes or notify
    /// reports an error.
    pub async fn run<H, F>(&mut self, handler: &mut H, shutdown: F) -> Result<()>
    where
        H: WatchHandler,
        F: Future<Output = ()>,
    {
        let root = self.exclude.root().to_path_buf();
        let count = self.watch_tree(&root)?;
        info!("Watching {} directories under {}", count, root.display());

        if let Err(e) = handler.on_start() {
            error!("Watcher on_start failed: {:#}", e);
        }

        tokio::pin!(shutdown);
        loop {
            let deadline = self.deadline;
            tokio::select! {
                _ = &mut shutdown => {
                    self.close(handler);
                    return Ok(());
                }
                received = self.events.recv() => match received {
                    None => {
                        self.close(handler);
                        bail!("watcher events channel closed");
                    }
                    Some(Err(e)) => {
                        self.close(handler);
                        return Err(e).context("file watcher error");
                    }
                    Some(Ok(event)) => {
                        if self.process_event(event) {
                            self.deadline = Some(Instant::now() + self.debounce);
                        }
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    debug!("File changes detected, regenerating...");
                    if let Err(e) = handler.on_change() {
                        error!("Watcher on_change failed: {:#}", e);
                    }
                }
            }
        }
    }

    /// Cancel any pending regeneration and run `on_close`.
    pub fn close<H: WatchHandler>(&mut self, handler: &mut H) {
        self.deadline = None;
        if let Err(e) = handler.on_close() {
            error!("Watcher on_close failed: {:#}", e);
        }
    }
}
