//! Conduit Core — data model, content hashing, configuration and the
//! four-layer incremental build cache

pub mod cache;
pub mod config;
pub mod error;
pub mod exclude;
pub mod graph;
pub mod hash;
pub mod model;

#[cfg(test)]
pub mod tests;

#[cfg(test)]
pub mod test_utils;

pub use cache::{CacheManager, ContentLayer, DependencyLayer, GenerationLayer, ParseLayer, StaleReason};
pub use config::{Config, ProjectConfig};
pub use error::{CacheError, GraphError, Result};
pub use exclude::{DEFAULT_EXCLUDES, ExcludeSet};
pub use graph::{DependencyGraph, GraphStats};
pub use hash::ContentHash;
pub use model::{
    CacheStats, ChangeEvent, ChangeKind, ContentEntry, DependencyAnalysis, DependencyNode,
    ExtractedFunction, GenerationInfo, HttpMethod, LocalDependency, NodeKind, ParsedFile, Priority,
    RegenerationPlan, RegistrySignature,
};
