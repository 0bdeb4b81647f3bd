//! Test utilities for Conduit core

use crate::model::{DependencyAnalysis, HttpMethod, LocalDependency, ParsedFile};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const USERS_ROUTE: &str = r#"package users

import (
	"encoding/json"
	"my-app/api/v1/users/user_repo"
	"net/http"
)

func GET(w http.ResponseWriter, r *http.Request) {
	data, _ := json.Marshal(user_repo.GetAllUsers())
	w.Write(data)
}
"#;

pub const USER_REPO: &str = r#"package user_repo

type User struct {
	ID   string `json:"id"`
	Name string `json:"name"`
}

func GetAllUsers() []User {
	return nil
}
"#;

/// Create a repository with a specific file structure
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for (path, content) in structure {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
    }

    temp_dir
}

/// `users/route.go` importing `users/user_repo`, as on disk.
pub fn create_users_repo() -> TempDir {
    create_repo_with_structure(&[
        ("go.mod", "module my-app\n\ngo 1.22\n"),
        ("api/v1/users/route.go", USERS_ROUTE),
        ("api/v1/users/user_repo/user_repo.go", USER_REPO),
    ])
}

/// A parsed route record whose only local dependency is `dep_files`.
pub fn parsed_route(path: &Path, rel: &str, dep_files: &[PathBuf]) -> ParsedFile {
    let mut parsed = ParsedFile::empty(path, rel);
    parsed.package_name = "users".to_string();
    parsed.methods = vec![HttpMethod::Get];
    if !dep_files.is_empty() {
        parsed.dependencies = DependencyAnalysis {
            stdlib_imports: vec!["net/http".to_string()],
            external_imports: Vec::new(),
            local_imports: vec![LocalDependency {
                import_path: format!("my-app/{rel}/user_repo"),
                relative_path: PathBuf::from(format!("{rel}/user_repo")),
                alias: None,
                package_dir: None,
                files: dep_files.to_vec(),
            }],
        };
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_users_repo() {
        let temp_dir = create_users_repo();
        let root = temp_dir.path();
        assert!(root.join("go.mod").exists());
        assert!(root.join("api/v1/users/route.go").exists());
        assert!(root.join("api/v1/users/user_repo/user_repo.go").exists());
    }
}
