//! Import classification and local package resolution

use conduit_core::{DependencyAnalysis, LocalDependency};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One import spec as written in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub path: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Stdlib,
    Local,
    External,
}

/// Local when the path is the module or below it; stdlib when the first
/// element has no dot; external otherwise.
pub fn classify(import_path: &str, module: &str) -> ImportKind {
    if import_path == module || local_suffix(import_path, module).is_some() {
        return ImportKind::Local;
    }
    let first = import_path.split('/').next().unwrap_or(import_path);
    if first.contains('.') {
        ImportKind::External
    } else {
        ImportKind::Stdlib
    }
}

fn local_suffix<'a>(import_path: &'a str, module: &str) -> Option<&'a str> {
    import_path
        .strip_prefix(module)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}

/// `.go` files of the package in `dir`, sorted. Test files are skipped.
pub fn package_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension().is_some_and(|ext| ext == "go")
                && !p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_test.go"))
        })
        .collect();
    files.sort();
    files
}

/// Split imports by origin and resolve local ones against `root`.
pub fn analyze_dependencies(imports: &[ImportSpec], root: &Path, module: &str) -> DependencyAnalysis {
    let mut analysis = DependencyAnalysis::default();
    for spec in imports {
        match classify(&spec.path, module) {
            ImportKind::Stdlib => analysis.stdlib_imports.push(spec.path.clone()),
            ImportKind::External => analysis.external_imports.push(spec.path.clone()),
            ImportKind::Local => {
                let relative = local_suffix(&spec.path, module).unwrap_or("");
                let relative_path = PathBuf::from(relative);
                let package_dir = root.join(&relative_path);
                let files = package_files(&package_dir);
                debug!(
                    "Resolved local import {} to {} files",
                    spec.path,
                    files.len()
                );
                analysis.local_imports.push(LocalDependency {
                    import_path: spec.path.clone(),
                    relative_path,
                    alias: spec.alias.clone(),
                    package_dir: Some(package_dir),
                    files,
                });
            }
        }
    }
    analysis
}
