//! Hierarchical route model built from the directory layout

use conduit_core::{HttpMethod, ParsedFile};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const GENERATED_ROUTE_FILE: &str = "gen_route.go";

/// One directory name on a route's path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSegment {
    /// Directory name as on disk, e.g. `id_`.
    pub name: String,
    /// Name as it appears in the API path, e.g. `:id`.
    pub api_name: String,
    pub is_param: bool,
    pub param_name: Option<String>,
}

/// A trailing underscore marks a path parameter.
pub fn parse_segment(folder_name: &str) -> RouteSegment {
    match folder_name.strip_suffix('_').filter(|p| !p.is_empty()) {
        Some(param) => RouteSegment {
            name: folder_name.to_string(),
            api_name: format!(":{param}"),
            is_param: true,
            param_name: Some(param.to_string()),
        },
        None => RouteSegment {
            name: folder_name.to_string(),
            api_name: folder_name.to_string(),
            is_param: false,
            param_name: None,
        },
    }
}

#[derive(Debug, Clone)]
pub struct RouteNode {
    pub segment: RouteSegment,
    pub children: BTreeMap<String, usize>,
    pub parent: Option<usize>,
    /// API path with a leading slash, e.g. `/users/:id`.
    pub full_path: String,
    /// Folder path joined with `/`, e.g. `users/id_`.
    pub folder_path: String,
    pub depth: usize,
    pub methods: Vec<HttpMethod>,
    pub parsed: Option<Arc<ParsedFile>>,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub api_path: String,
    pub folder_path: String,
    pub segments: Vec<RouteSegment>,
    pub parameters: Vec<String>,
    /// Whether the node had no children when this route was added.
    pub is_leaf: bool,
    pub methods: Vec<HttpMethod>,
    pub parsed: Arc<ParsedFile>,

    /// Generated file, relative to the project root.
    pub output_path: PathBuf,
    pub import_path: String,
    /// Generated file, relative to the output directory.
    pub relative_output: PathBuf,
    pub package_alias: String,
}

/// Arena of nodes (index 0 is the root) plus the flat route list in
/// discovery order.
#[derive(Debug, Clone)]
pub struct RouteTree {
    nodes: Vec<RouteNode>,
    routes: Vec<Route>,
}

impl Default for RouteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTree {
    pub fn new() -> Self {
        let root = RouteNode {
            segment: parse_segment(""),
            children: BTreeMap::new(),
            parent: None,
            full_path: String::new(),
            folder_path: String::new(),
            depth: 0,
            methods: Vec::new(),
            parsed: None,
        };
        Self {
            nodes: vec![root],
            routes: Vec::new(),
        }
    }

    pub fn root(&self) -> &RouteNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> Option<&RouteNode> {
        self.nodes.get(index)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Node at a `/`-joined folder path.
    pub fn find(&self, folder_path: &str) -> Option<&RouteNode> {
        let mut current = 0;
        for part in folder_path.split('/').filter(|p| !p.is_empty()) {
            current = *self.nodes[current].children.get(part)?;
        }
        self.nodes.get(current)
    }

    /// Insert the route for the directory `rel_path`, creating intermediate
    /// nodes as needed. The root directory itself is never a route.
    pub fn add_route(&mut self, rel_path: &Path, parsed: Arc<ParsedFile>) {
        let parts: Vec<String> = rel_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return;
        }

        let mut current = 0;
        let mut segments = Vec::with_capacity(parts.len());
        let mut parameters = Vec::new();

        for (i, part) in parts.iter().enumerate() {
            let segment = parse_segment(part);
            if let Some(param) = &segment.param_name {
                parameters.push(param.clone());
            }
            segments.push(segment.clone());

            let existing = self.nodes[current].children.get(part).copied();
            current = match existing {
                Some(child) => child,
                None => {
                    let full_path = format!(
                        "/{}",
                        segments
                            .iter()
                            .map(|s| s.api_name.as_str())
                            .collect::<Vec<_>>()
                            .join("/")
                    );
                    let child = self.nodes.len();
                    self.nodes.push(RouteNode {
                        segment,
                        children: BTreeMap::new(),
                        parent: Some(current),
                        full_path,
                        folder_path: parts[..=i].join("/"),
                        depth: i + 1,
                        methods: Vec::new(),
                        parsed: None,
                    });
                    self.nodes[current].children.insert(part.clone(), child);
                    child
                }
            };
        }

        let node = &mut self.nodes[current];
        node.parsed = Some(Arc::clone(&parsed));
        node.methods.extend(parsed.methods.iter().copied());

        self.routes.push(Route {
            api_path: node.full_path.clone(),
            folder_path: node.folder_path.clone(),
            segments,
            parameters,
            is_leaf: node.children.is_empty(),
            methods: parsed.methods.clone(),
            parsed,
            output_path: PathBuf::new(),
            import_path: String::new(),
            relative_output: PathBuf::new(),
            package_alias: String::new(),
        });
    }

    /// Derive output file, import path and alias of every route.
    pub fn calculate_output_paths(&mut self, output_rel: &Path, module_name: &str) {
        let output_import = import_segment(output_rel);
        for route in &mut self.routes {
            route.relative_output = Path::new("routes")
                .join(&route.folder_path)
                .join(GENERATED_ROUTE_FILE);
            route.output_path = output_rel.join(&route.relative_output);
            route.import_path = format!("{module_name}/{output_import}/routes/{}", route.folder_path);
            route.package_alias = package_alias(&route.folder_path);
        }
    }

    /// Indented dump of the tree, children sorted by name.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_node(0, "", &mut out);
        out
    }

    fn render_node(&self, index: usize, prefix: &str, out: &mut String) {
        let node = &self.nodes[index];
        if index != 0 {
            out.push_str(prefix);
            out.push_str(&node.segment.name);
            out.push_str(" -> ");
            out.push_str(&node.full_path);
            if let Some(param) = &node.segment.param_name {
                out.push_str(&format!(" (param: {param})"));
            }
            if !node.methods.is_empty() {
                let mut methods: Vec<&str> = node.methods.iter().map(|m| m.as_str()).collect();
                methods.sort_unstable();
                out.push_str(&format!(" [{}]", methods.join(", ")));
            }
            out.push('\n');
        }
        let child_prefix = format!("{prefix}  ");
        for &child in node.children.values() {
            self.render_node(child, &child_prefix, out);
        }
    }
}

/// `api/v1/users` becomes `api_v1_users_route`.
pub fn package_alias(folder_path: &str) -> String {
    let alias: String = folder_path
        .chars()
        .map(|c| if matches!(c, '/' | '-' | ' ') { '_' } else { c })
        .collect();
    format!("{alias}_route")
}

/// Output directory as it appears inside a Go import path.
pub(crate) fn import_segment(output_rel: &Path) -> String {
    let joined = output_rel.to_string_lossy().replace('\\', "/");
    joined
        .trim_start_matches("./")
        .trim_end_matches('/')
        .to_string()
}
