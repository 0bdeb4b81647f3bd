//! Go route analyzer using tree-sitter

use crate::analyzer::SourceAnalyzer;
use crate::error::{AnalyzerError, Result};
use crate::imports::{ImportSpec, analyze_dependencies};
use crate::parser_pool::{ParseRequest, ParserPool};
use conduit_core::{ExtractedFunction, HttpMethod, ParsedFile};
use std::path::{Path, PathBuf};
use tracing::debug;
use tree_sitter::Node;

pub struct GoAnalyzer {
    parser_pool: ParserPool,
    root: PathBuf,
    module_name: String,
}

impl GoAnalyzer {
    /// `root` and `module_name` are used to resolve imports of the project's
    /// own packages.
    pub fn new(parser_pool: ParserPool, root: impl Into<PathBuf>, module_name: impl Into<String>) -> Self {
        Self {
            parser_pool,
            root: root.into(),
            module_name: module_name.into(),
        }
    }

    /// Analyze source text already in memory.
    pub fn analyze_source(&self, path: &Path, rel_path: &Path, source: &str) -> Result<ParsedFile> {
        if source.trim().is_empty() {
            debug!("Empty route file {}, skipping parse", rel_path.display());
            return Ok(ParsedFile::empty(path, rel_path));
        }

        let parsed = self.parser_pool.parse_blocking(ParseRequest {
            content: source.to_string(),
            path: path.to_path_buf(),
        })?;
        let root = parsed.tree.root_node();
        if root.has_error() {
            debug!(
                "Syntax errors in {}, treating as empty",
                rel_path.display()
            );
            return Ok(ParsedFile::empty(path, rel_path));
        }

        let bytes = source.as_bytes();
        let mut file = ParsedFile::empty(path, rel_path);
        let mut specs = Vec::new();
        let mut has_package = false;

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_clause" => {
                    has_package = true;
                    if let Some(name) = Self::package_name(child, bytes) {
                        file.package_name = name;
                    }
                }
                "import_declaration" => Self::collect_imports(child, bytes, &mut specs),
                "function_declaration" => {
                    if let Some(function) = Self::extract_handler(child, bytes) {
                        debug!("Found method {} in {}", function.method, rel_path.display());
                        file.methods.push(function.method);
                        file.functions.push(function);
                    }
                }
                _ => {}
            }
        }
        if !has_package {
            debug!(
                "Route file {} has no package clause, treating as empty",
                rel_path.display()
            );
            return Ok(ParsedFile::empty(path, rel_path));
        }

        file.imports = specs.iter().map(|s| s.path.clone()).collect();
        file.dependencies = analyze_dependencies(&specs, &self.root, &self.module_name);
        Ok(file)
    }

    fn package_name(node: Node, source: &[u8]) -> Option<String> {
        let mut cursor = node.walk();
        let ident = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "package_identifier")?;
        ident.utf8_text(source).ok().map(str::to_string)
    }

    fn collect_imports(node: Node, source: &[u8], specs: &mut Vec<ImportSpec>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_spec" => {
                    if let Some(spec) = Self::import_spec(child, source) {
                        specs.push(spec);
                    }
                }
                "import_spec_list" => Self::collect_imports(child, source, specs),
                _ => {}
            }
        }
    }

    fn import_spec(node: Node, source: &[u8]) -> Option<ImportSpec> {
        let raw = node.child_by_field_name("path")?.utf8_text(source).ok()?;
        let path = raw.trim_matches(|c| c == '"' || c == '`').to_string();
        let alias = node
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(str::to_string);
        Some(ImportSpec { path, alias })
    }

    /// Free functions named after an HTTP verb, in any case.
    fn extract_handler(node: Node, source: &[u8]) -> Option<ExtractedFunction> {
        let name = node.child_by_field_name("name")?.utf8_text(source).ok()?;
        let method = HttpMethod::from_name(name)?;

        let text = node.utf8_text(source).ok()?;
        let (signature, body) = match node.child_by_field_name("body") {
            Some(body) => {
                let split = body.start_byte() - node.start_byte();
                (
                    text[..split].trim_end().to_string(),
                    body.utf8_text(source).ok()?.to_string(),
                )
            }
            None => (text.trim_end().to_string(), String::new()),
        };

        Some(ExtractedFunction {
            name: name.to_string(),
            method,
            signature,
            body,
        })
    }
}

impl SourceAnalyzer for GoAnalyzer {
    fn analyze(&self, path: &Path, rel_path: &Path) -> Result<ParsedFile> {
        let source = std::fs::read_to_string(path).map_err(|source| AnalyzerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.analyze_source(path, rel_path, &source)
    }
}
