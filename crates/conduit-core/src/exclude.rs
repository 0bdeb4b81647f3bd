//! Path exclusion shared by the route walker and the watch loop

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};

/// Directory names never scanned or watched, wherever they appear.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "vendor",
    ".next",
    "build",
    "dist",
    "__pycache__",
    ".DS_Store",
    ".conduit",
];

#[derive(Debug, Clone)]
pub struct ExcludeSet {
    root: PathBuf,
    prefixes: Vec<PathBuf>,
    globs: GlobSet,
}

impl ExcludeSet {
    /// `prefixes` are root-relative paths (typically the output directories);
    /// `globs` are matched against root-relative paths.
    pub fn new(
        root: impl Into<PathBuf>,
        prefixes: &[PathBuf],
        globs: &[String],
    ) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(ExcludeSet {
            root: root.into(),
            prefixes: prefixes.iter().map(|p| normalize(p)).collect(),
            globs: builder.build()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` (absolute, or relative to the root) is excluded.
    /// The root itself never is.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let rel = normalize(path.strip_prefix(&self.root).unwrap_or(path));
        if rel.as_os_str().is_empty() {
            return false;
        }

        let default_hit = rel.components().any(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|name| DEFAULT_EXCLUDES.contains(&name)),
            _ => false,
        });

        default_hit
            || self.prefixes.iter().any(|prefix| rel.starts_with(prefix))
            || self.globs.is_match(&rel)
    }
}

/// Drop `.` components so `./gen/go` and `gen/go` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> ExcludeSet {
        ExcludeSet::new(
            "/proj",
            &[PathBuf::from("gen/go")],
            &["**/testdata/**".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_default_names_anywhere() {
        let set = set();
        assert!(set.is_excluded(Path::new("/proj/.git/HEAD")));
        assert!(set.is_excluded(Path::new("/proj/web/node_modules/x")));
        assert!(!set.is_excluded(Path::new("/proj/users/route.go")));
        assert!(!set.is_excluded(Path::new("/proj")));
    }

    #[test]
    fn test_prefix_matches_whole_components() {
        let set = set();
        assert!(set.is_excluded(Path::new("/proj/gen/go")));
        assert!(set.is_excluded(Path::new("/proj/gen/go/routes/x.go")));
        assert!(!set.is_excluded(Path::new("/proj/gen/gopher/route.go")));
    }

    #[test]
    fn test_dot_prefixed_output_dir() {
        let set = ExcludeSet::new("/proj", &[PathBuf::from("./gen/go")], &[]).unwrap();
        assert!(set.is_excluded(Path::new("/proj/gen/go/routes/users/route.go")));
        assert!(set.is_excluded(Path::new("gen/go/routes")));
        assert!(set.is_excluded(Path::new("./gen/go")));
        assert!(!set.is_excluded(Path::new("/proj/gen/users/route.go")));
        assert!(!set.is_excluded(Path::new("./")));
    }

    #[test]
    fn test_globs() {
        let set = set();
        assert!(set.is_excluded(Path::new("users/testdata/route.go")));
        assert!(!set.is_excluded(Path::new("users/route.go")));
    }
}
