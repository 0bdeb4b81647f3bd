//! Error types for the cache layers and the dependency graph

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dependency cycle detected: only {sorted} of {total} nodes could be ordered")]
    Cycle { sorted: usize, total: usize },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid generation record: {0}")]
    InvalidRecord(String),

    #[error("no content entry for {path}")]
    MissingContent { path: PathBuf },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl CacheError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
