//! Route source analysis: Go parsing, handler extraction and import resolution

pub mod analyzer;
pub mod error;
pub mod go;
pub mod imports;
pub mod parser_pool;

pub use analyzer::SourceAnalyzer;
pub use error::{AnalyzerError, Result};
pub use go::GoAnalyzer;
pub use imports::{ImportKind, ImportSpec, analyze_dependencies, classify, package_files};
pub use parser_pool::{ParseRequest, ParseResult, ParserPool, create_parser_pool};
