//! Copies local packages imported by routes into the output tree

use crate::route_tree::import_segment;
use anyhow::{Context, Result, bail};
use conduit_analyzer::SourceAnalyzer;
use conduit_core::{DependencyAnalysis, LocalDependency, ProjectConfig};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEPENDENCIES_DIR: &str = "dependencies";

/// A local package mirrored under `<output>/dependencies`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopiedDependency {
    pub original_import: String,
    pub original_path: PathBuf,
    pub generated_path: PathBuf,
    /// Import path of the copy.
    pub import_path: String,
    pub files: Vec<PathBuf>,
    /// Local packages the copy itself imports.
    pub dependencies: Vec<LocalDependency>,
}

/// Each import path is copied at most once per copier, transitively.
pub struct DependencyCopier<'a> {
    project: &'a ProjectConfig,
    analyzer: &'a dyn SourceAnalyzer,
    output_import: String,
    copied: HashMap<String, CopiedDependency>,
}

impl<'a> DependencyCopier<'a> {
    pub fn new(project: &'a ProjectConfig, analyzer: &'a dyn SourceAnalyzer) -> Self {
        Self {
            project,
            analyzer,
            output_import: import_segment(&project.output_rel()),
            copied: HashMap::new(),
        }
    }

    /// Import path of the copy of the package at `relative`.
    pub fn generated_import_path(&self, relative: &Path) -> String {
        format!(
            "{}/{}/{}/{}",
            self.project.module_name,
            self.output_import,
            DEPENDENCIES_DIR,
            relative.to_string_lossy().replace('\\', "/")
        )
    }

    pub fn copied(&self) -> impl Iterator<Item = &CopiedDependency> {
        self.copied.values()
    }

    /// Copy every local import of one route.
    pub fn copy_dependencies(&mut self, analysis: &DependencyAnalysis) -> Result<Vec<CopiedDependency>> {
        analysis
            .local_imports
            .iter()
            .map(|dep| {
                self.copy_dependency(dep)
                    .with_context(|| format!("failed to copy dependency {}", dep.import_path))
            })
            .collect()
    }

    fn copy_dependency(&mut self, dep: &LocalDependency) -> Result<CopiedDependency> {
        if let Some(existing) = self.copied.get(&dep.import_path) {
            debug!("Dependency {} already copied", dep.import_path);
            return Ok(existing.clone());
        }

        let source_dir = self.project.root.join(&dep.relative_path);
        if !source_dir.is_dir() {
            bail!("dependency path does not exist: {}", source_dir.display());
        }
        let target_dir = self
            .project
            .output_dir()
            .join(DEPENDENCIES_DIR)
            .join(&dep.relative_path);
        fs::create_dir_all(&target_dir)
            .with_context(|| format!("failed to create {}", target_dir.display()))?;

        let mut files = Vec::new();
        let mut transitive: Vec<LocalDependency> = Vec::new();
        for source in conduit_analyzer::package_files(&source_dir) {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = target_dir.join(name);
            let imports = self.local_imports_of(&source, &dep.relative_path);
            self.copy_file(&source, &target, &imports)?;
            for import in imports {
                if !transitive.iter().any(|t| t.import_path == import.import_path) {
                    transitive.push(import);
                }
            }
            files.push(target);
        }

        let copied = CopiedDependency {
            original_import: dep.import_path.clone(),
            original_path: source_dir,
            generated_path: target_dir,
            import_path: self.generated_import_path(&dep.relative_path),
            files,
            dependencies: transitive.clone(),
        };
        self.copied.insert(dep.import_path.clone(), copied.clone());

        for next in &transitive {
            if let Err(e) = self.copy_dependency(next) {
                debug!("Failed to copy transitive dependency {}: {:#}", next.import_path, e);
            }
        }

        debug!(
            "Copied dependency {} to {}",
            dep.import_path,
            copied.generated_path.display()
        );
        Ok(copied)
    }

    fn local_imports_of(&self, source: &Path, relative_dir: &Path) -> Vec<LocalDependency> {
        match self.analyzer.analyze(source, relative_dir) {
            Ok(parsed) => parsed.dependencies.local_imports,
            Err(e) => {
                debug!("Could not analyze {} for imports: {}", source.display(), e);
                Vec::new()
            }
        }
    }

    /// Copy one file, pointing its local imports at their copies.
    fn copy_file(&self, source: &Path, target: &Path, imports: &[LocalDependency]) -> Result<()> {
        let mut content = fs::read_to_string(source)
            .with_context(|| format!("failed to read {}", source.display()))?;
        for import in imports {
            content = content.replace(
                &format!("\"{}\"", import.import_path),
                &format!("\"{}\"", self.generated_import_path(&import.relative_path)),
            );
        }
        fs::write(target, content).with_context(|| format!("failed to write {}", target.display()))
    }
}
