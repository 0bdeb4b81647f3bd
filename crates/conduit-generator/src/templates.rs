//! Template rendering for generated Go sources

use anyhow::{Context, Result};
use conduit_core::ContentHash;
use minijinja::{Environment, Value};
use serde::Serialize;
use std::fs;
use std::path::Path;

pub const ROUTE_TEMPLATE: &str = "gen_route.go.j2";
pub const REGISTRY_TEMPLATE: &str = "routes_registry.go.j2";

const TEMPLATES: &[(&str, &str)] = &[
    (ROUTE_TEMPLATE, include_str!("templates/gen_route.go.j2")),
    (REGISTRY_TEMPLATE, include_str!("templates/routes_registry.go.j2")),
];

/// Renders a named template into a file.
pub trait TemplateRenderer: Send + Sync {
    /// Render `template` with `data` and write the result to `output`,
    /// creating parent directories.
    fn render(&self, template: &str, output: &Path, data: &Value) -> Result<()>;

    /// Identity of the template set; changes whenever any template does.
    fn template_hash(&self) -> ContentHash;
}

pub struct TemplateEngine {
    env: Environment<'static>,
    hash: ContentHash,
}

impl TemplateEngine {
    /// Engine loaded with the embedded templates.
    pub fn new() -> Result<Self> {
        Self::with_templates(TEMPLATES)
    }

    pub fn with_templates(templates: &[(&'static str, &'static str)]) -> Result<Self> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);

        let mut combined = String::new();
        for &(name, source) in templates {
            env.add_template(name, source)
                .with_context(|| format!("invalid template {name}"))?;
            combined.push_str(name);
            combined.push_str(source);
        }

        Ok(Self {
            env,
            hash: ContentHash::from_bytes(combined.as_bytes()),
        })
    }

    pub fn render_to_string(&self, template: &str, data: &Value) -> Result<String> {
        let tmpl = self
            .env
            .get_template(template)
            .with_context(|| format!("unknown template {template}"))?;
        tmpl.render(data)
            .with_context(|| format!("failed to render {template}"))
    }
}

impl TemplateRenderer for TemplateEngine {
    fn render(&self, template: &str, output: &Path, data: &Value) -> Result<()> {
        let rendered = self.render_to_string(template, data)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(output, rendered).with_context(|| format!("failed to write {}", output.display()))
    }

    fn template_hash(&self) -> ContentHash {
        self.hash
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportData {
    pub alias: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionData {
    pub name: String,
    pub method: String,
    pub signature: String,
    pub body: String,
}

/// Context of one generated route file.
#[derive(Debug, Clone, Serialize)]
pub struct RouteTemplateData {
    pub source: String,
    pub api_path: String,
    pub package_name: String,
    pub module_name: String,
    pub timestamp: String,
    pub methods: Vec<String>,
    pub parameters: Vec<String>,
    pub imports: Vec<ImportData>,
    pub functions: Vec<FunctionData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlerData {
    pub method: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryRouteData {
    pub api_path: String,
    pub folder_path: String,
    pub import_path: String,
    pub package_alias: String,
    pub handlers: Vec<HandlerData>,
}

/// Context of the route registry file.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryTemplateData {
    pub package_name: String,
    pub module_name: String,
    pub timestamp: String,
    pub routes: Vec<RegistryRouteData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn route_data() -> RouteTemplateData {
        RouteTemplateData {
            source: "users/route.go".into(),
            api_path: "/users".into(),
            package_name: "users".into(),
            module_name: "my-app".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            methods: vec!["GET".into(), "POST".into()],
            parameters: Vec::new(),
            imports: vec![
                ImportData {
                    alias: None,
                    path: "net/http".into(),
                },
                ImportData {
                    alias: Some("repo".into()),
                    path: "my-app/.conduit/generated/dependencies/users/user_repo".into(),
                },
            ],
            functions: vec![FunctionData {
                name: "GET".into(),
                method: "GET".into(),
                signature: "func GET(w http.ResponseWriter, r *http.Request)".into(),
                body: "{\n\trepo.List(w)\n}".into(),
            }],
        }
    }

    #[test]
    fn test_render_route_file() {
        let engine = TemplateEngine::new().unwrap();
        let out = engine
            .render_to_string(ROUTE_TEMPLATE, &Value::from_serialize(route_data()))
            .unwrap();

        assert!(out.starts_with("// Code generated by conduit. DO NOT EDIT.\n"));
        assert!(out.contains("package users\n\nimport (\n\t\"net/http\"\n\trepo \"my-app/.conduit/generated/dependencies/users/user_repo\"\n)\n"));
        assert!(out.contains("func GET(w http.ResponseWriter, r *http.Request) {\n\trepo.List(w)\n}\n"));
        assert!(out.ends_with("var Methods = []string{\"GET\", \"POST\"}\n"));
    }

    #[test]
    fn test_render_registry_skips_routes_without_handlers() {
        let engine = TemplateEngine::new().unwrap();
        let data = RegistryTemplateData {
            package_name: "generated".into(),
            module_name: "my-app".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            routes: vec![
                RegistryRouteData {
                    api_path: "/users".into(),
                    folder_path: "users".into(),
                    import_path: "my-app/gen/routes/users".into(),
                    package_alias: "users_route".into(),
                    handlers: vec![HandlerData {
                        method: "GET".into(),
                        name: "GET".into(),
                    }],
                },
                RegistryRouteData {
                    api_path: "/empty".into(),
                    folder_path: "empty".into(),
                    import_path: "my-app/gen/routes/empty".into(),
                    package_alias: "empty_route".into(),
                    handlers: Vec::new(),
                },
            ],
        };
        let out = engine
            .render_to_string(REGISTRY_TEMPLATE, &Value::from_serialize(&data))
            .unwrap();

        insta::assert_snapshot!(out, @r#"
// Code generated by conduit. DO NOT EDIT.
// Module: my-app
// Generated at: 2024-01-01T00:00:00Z

package generated

import (
	"net/http"
	users_route "my-app/gen/routes/users"
)

// Route binds one handler to an API path.
type Route struct {
	Method  string
	Path    string
	Handler http.HandlerFunc
}

// Routes lists every generated handler in discovery order.
var Routes = []Route{
	{Method: "GET", Path: "/users", Handler: users_route.GET},
}
"#);
    }

    #[test]
    fn test_render_writes_file_and_hash_tracks_sources() {
        let dir = TempDir::new().unwrap();
        let engine = TemplateEngine::new().unwrap();
        let output = dir.path().join("routes/users/gen_route.go");
        engine
            .render(ROUTE_TEMPLATE, &output, &Value::from_serialize(route_data()))
            .unwrap();
        assert!(output.is_file());

        let other = TemplateEngine::with_templates(&[(ROUTE_TEMPLATE, "package {{ package_name }}\n")]).unwrap();
        assert_ne!(engine.template_hash(), other.template_hash());
        assert_eq!(
            engine.template_hash(),
            TemplateEngine::new().unwrap().template_hash()
        );
    }

    #[test]
    fn test_unknown_template_is_an_error() {
        let engine = TemplateEngine::new().unwrap();
        assert!(engine.render_to_string("missing.j2", &Value::UNDEFINED).is_err());
    }
}
