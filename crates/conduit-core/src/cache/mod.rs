//! Four-layer incremental build cache
//!
//! 1. [`ContentTracker`]: file content identity
//! 2. [`ParseStore`]: parsed semantic records
//! 3. [`DependencyGraph`](crate::graph::DependencyGraph): file-to-file edges
//! 4. [`GenerationLedger`]: generation provenance
//!
//! [`CacheManager`] owns one of each and coordinates them.

pub mod content;
pub mod generation;
pub mod global;
pub mod layers;
pub mod manager;
pub mod parse;

pub use content::{ContentTracker, ContentUpdate};
pub use generation::{GenerationLedger, StaleReason, dependency_hash};
pub use global::{global, reset_global, set_global};
pub use layers::{ContentLayer, DependencyLayer, GenerationLayer, ParseLayer};
pub use manager::{CacheManager, IntegrityReport, ROUTE_FILE};
pub use parse::ParseStore;
