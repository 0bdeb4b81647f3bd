//! Analyzer errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set parser language: {0}")]
    Language(String),

    #[error("parser produced no tree for {0}")]
    ParseFailed(PathBuf),

    #[error("parser pool is shut down")]
    PoolClosed,

    #[error("parser worker died")]
    WorkerDied,
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
