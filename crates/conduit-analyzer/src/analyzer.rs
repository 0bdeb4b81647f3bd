//! Source analyzer trait definition

use crate::error::Result;
use conduit_core::ParsedFile;
use std::path::Path;

/// Turns one route source file into a [`ParsedFile`].
///
/// Implementations only fail on I/O or parser setup. Empty, incomplete or
/// syntactically invalid sources yield a record with no methods.
pub trait SourceAnalyzer: Send + Sync {
    fn analyze(&self, path: &Path, rel_path: &Path) -> Result<ParsedFile>;
}
