//! Conduit Generator — route discovery, route tree construction and Go
//! code emission driven by the incremental cache

pub mod copier;
pub mod generator;
pub mod route_tree;
pub mod templates;
pub mod walker;


pub use copier::{CopiedDependency, DependencyCopier};
pub use generator::{GenerationReport, REGISTRY_FILE, RouteGenerator};
pub use route_tree::{Route, RouteNode, RouteSegment, RouteTree, package_alias, parse_segment};
pub use templates::{TemplateEngine, TemplateRenderer};
pub use walker::{RouteWalker, WalkStats};
