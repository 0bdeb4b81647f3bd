//! Dependency graph over file paths, backed by petgraph::StableDiGraph
//!
//! An edge `A -> B` means "A depends on B". Dependents are the incoming
//! neighbours, so the dependency/dependent transpose holds by construction.

use crate::error::GraphError;
use crate::hash::ContentHash;
use crate::model::{DependencyNode, NodeKind, ParsedFile};
use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Clone)]
struct NodeData {
    path: PathBuf,
    kind: NodeKind,
    content_hash: Option<ContentHash>,
}

#[derive(Debug, Default)]
struct Inner {
    graph: StableDiGraph<NodeData, ()>,
    index: HashMap<PathBuf, NodeIndex>,
}

impl Inner {
    fn ensure_node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&idx) = self.index.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(NodeData {
            path: path.to_path_buf(),
            kind: NodeKind::Source,
            content_hash: None,
        });
        self.index.insert(path.to_path_buf(), idx);
        idx
    }

    fn set_kind(&mut self, path: &Path, kind: NodeKind) {
        let idx = self.ensure_node(path);
        if let Some(data) = self.graph.node_weight_mut(idx) {
            data.kind = kind;
        }
    }

    fn neighbours(&self, idx: NodeIndex, dir: Direction) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .graph
            .neighbors_directed(idx, dir)
            .filter_map(|n| self.graph.node_weight(n).map(|d| d.path.clone()))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    fn sorted_indices(&self) -> Vec<NodeIndex> {
        let mut entries: Vec<(&PathBuf, NodeIndex)> =
            self.index.iter().map(|(p, &i)| (p, i)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, i)| i).collect()
    }

    fn path_of(&self, idx: NodeIndex) -> Option<&PathBuf> {
        self.graph.node_weight(idx).map(|d| &d.path)
    }
}

/// Node and edge counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

/// Thread-safe dependency graph. All edge updates happen under one lock.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    inner: RwLock<Inner>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the graph from scratch: every parsed file becomes a node, then
    /// edges are wired to its dependencies, creating placeholders as needed.
    pub fn build_graph<'a>(&self, parsed: impl IntoIterator<Item = &'a ParsedFile>) {
        let mut inner = self.write();
        *inner = Inner::default();

        let files: Vec<&ParsedFile> = parsed.into_iter().collect();
        for file in &files {
            inner.ensure_node(&file.path);
        }
        for file in &files {
            let from = inner.ensure_node(&file.path);
            let mut seen = HashSet::new();
            for dep in file.dependency_keys() {
                if seen.insert(dep.clone()) {
                    let to = inner.ensure_node(&dep);
                    inner.graph.add_edge(from, to, ());
                }
            }
            for (key, kind) in file.non_source_dependencies() {
                inner.set_kind(&key, kind);
            }
        }
        debug!(
            "DependencyGraph: built {} nodes, {} edges",
            inner.graph.node_count(),
            inner.graph.edge_count()
        );
    }

    /// Replace the dependency set of `path`, touching only edges that differ.
    pub fn update_node(&self, path: &Path, dependencies: &[PathBuf]) {
        let mut inner = self.write();
        let from = inner.ensure_node(path);

        let wanted: HashSet<&PathBuf> = dependencies.iter().collect();
        let existing: Vec<(EdgeIndex, PathBuf)> = inner
            .graph
            .edges_directed(from, Direction::Outgoing)
            .filter_map(|e| {
                inner
                    .graph
                    .node_weight(e.target())
                    .map(|d| (e.id(), d.path.clone()))
            })
            .collect();

        let mut kept = HashSet::new();
        for (edge, target) in existing {
            if wanted.contains(&target) && kept.insert(target) {
                continue;
            }
            inner.graph.remove_edge(edge);
        }
        for dep in dependencies {
            if kept.insert(dep.clone()) {
                let to = inner.ensure_node(dep);
                inner.graph.add_edge(from, to, ());
            }
        }
        debug!(
            "DependencyGraph: updated {} with {} dependencies",
            path.display(),
            kept.len()
        );
    }

    /// Every file that transitively depends on `changed`, sorted.
    ///
    /// `changed` itself appears only when it sits on a cycle.
    pub fn affected_files(&self, changed: &Path) -> Vec<PathBuf> {
        let inner = self.read();
        let Some(&start) = inner.index.get(changed) else {
            return Vec::new();
        };

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut stack: Vec<NodeIndex> = inner
            .graph
            .neighbors_directed(start, Direction::Incoming)
            .collect();
        while let Some(idx) = stack.pop() {
            if !visited.insert(idx) {
                continue;
            }
            stack.extend(
                inner
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .filter(|n| !visited.contains(n)),
            );
        }

        let mut affected: Vec<PathBuf> = visited
            .into_iter()
            .filter_map(|idx| inner.path_of(idx).cloned())
            .collect();
        affected.sort();
        debug!(
            "DependencyGraph: {} affects {} files",
            changed.display(),
            affected.len()
        );
        affected
    }

    /// Cycles along dependency edges. Each cycle is the DFS path from the
    /// first occurrence of the back-edge target to the node closing it.
    pub fn detect_cycles(&self) -> Vec<Vec<PathBuf>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Grey,
            Black,
        }

        fn visit(
            inner: &Inner,
            idx: NodeIndex,
            color: &mut HashMap<NodeIndex, Color>,
            path: &mut Vec<NodeIndex>,
            cycles: &mut Vec<Vec<PathBuf>>,
        ) {
            color.insert(idx, Color::Grey);
            path.push(idx);

            let mut next: Vec<NodeIndex> = inner
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .collect();
            next.sort_by(|a, b| inner.path_of(*a).cmp(&inner.path_of(*b)));
            next.dedup();

            for n in next {
                match color.get(&n).copied().unwrap_or(Color::White) {
                    Color::White => visit(inner, n, color, path, cycles),
                    Color::Grey => {
                        if let Some(pos) = path.iter().position(|&p| p == n) {
                            cycles.push(
                                path[pos..]
                                    .iter()
                                    .filter_map(|&p| inner.path_of(p).cloned())
                                    .collect(),
                            );
                        }
                    }
                    Color::Black => {}
                }
            }

            path.pop();
            color.insert(idx, Color::Black);
        }

        let inner = self.read();
        let mut color = HashMap::new();
        let mut cycles = Vec::new();
        let mut path = Vec::new();
        for idx in inner.sorted_indices() {
            if !color.contains_key(&idx) {
                visit(&inner, idx, &mut color, &mut path, &mut cycles);
            }
        }
        if !cycles.is_empty() {
            debug!("DependencyGraph: detected {} cycles", cycles.len());
        }
        cycles
    }

    /// Dependencies before dependents (Kahn's algorithm).
    pub fn topological_order(&self) -> Result<Vec<PathBuf>, GraphError> {
        let inner = self.read();
        let total = inner.graph.node_count();

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::with_capacity(total);
        let mut queue = VecDeque::new();
        for idx in inner.sorted_indices() {
            let deps = inner
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .count();
            in_degree.insert(idx, deps);
            if deps == 0 {
                queue.push_back(idx);
            }
        }

        let mut order = Vec::with_capacity(total);
        while let Some(idx) = queue.pop_front() {
            if let Some(path) = inner.path_of(idx) {
                order.push(path.clone());
            }
            let mut dependents: Vec<NodeIndex> = inner
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            dependents.sort_by(|a, b| inner.path_of(*a).cmp(&inner.path_of(*b)));
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != total {
            return Err(GraphError::Cycle {
                sorted: order.len(),
                total,
            });
        }
        Ok(order)
    }

    /// Remove a node and every edge touching it. Unknown paths are ignored.
    pub fn remove_node(&self, path: &Path) {
        let mut inner = self.write();
        if let Some(idx) = inner.index.remove(path) {
            inner.graph.remove_node(idx);
            debug!("DependencyGraph: removed {}", path.display());
        }
    }

    pub fn dependencies(&self, path: &Path) -> Vec<PathBuf> {
        let inner = self.read();
        inner
            .index
            .get(path)
            .map(|&idx| inner.neighbours(idx, Direction::Outgoing))
            .unwrap_or_default()
    }

    pub fn dependents(&self, path: &Path) -> Vec<PathBuf> {
        let inner = self.read();
        inner
            .index
            .get(path)
            .map(|&idx| inner.neighbours(idx, Direction::Incoming))
            .unwrap_or_default()
    }

    /// Snapshot of a node.
    pub fn node(&self, path: &Path) -> Option<DependencyNode> {
        let inner = self.read();
        let &idx = inner.index.get(path)?;
        let data = inner.graph.node_weight(idx)?;
        Some(DependencyNode {
            path: data.path.clone(),
            kind: data.kind,
            dependencies: inner.neighbours(idx, Direction::Outgoing),
            dependents: inner.neighbours(idx, Direction::Incoming),
            content_hash: data.content_hash,
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.read().index.contains_key(path)
    }

    pub fn set_content_hash(&self, path: &Path, hash: ContentHash) {
        let mut inner = self.write();
        if let Some(&idx) = inner.index.get(path) {
            if let Some(data) = inner.graph.node_weight_mut(idx) {
                data.content_hash = Some(hash);
            }
        }
    }

    pub fn set_kind(&self, path: &Path, kind: NodeKind) {
        self.write().set_kind(path, kind);
    }

    pub fn counts(&self) -> GraphStats {
        let inner = self.read();
        GraphStats {
            nodes: inner.graph.node_count(),
            edges: inner.graph.edge_count(),
        }
    }

    pub fn clear(&self) {
        *self.write() = Inner::default();
    }
}
