//! Conduit Watcher — file-system watch loop with debounced regeneration

pub mod watcher;

pub use watcher::{
    DEFAULT_DEBOUNCE, FileWatcher, WatchEvent, WatchHandler, WatchRegistrar, is_route_file,
};
