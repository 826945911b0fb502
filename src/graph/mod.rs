//! File-level dependency graph.
//!
//! This module builds a directed graph over a session's context files:
//!
//! - **Edge construction**: resolved imports become `importer -> imported`
//!   edges; unresolved specifiers are recorded and ignored by the graph
//! - **Importance scoring**: `2 * dependents + dependencies` per file
//! - **Cycle detection**: strongly connected components via Kosaraju
//! - **Affected sets**: bounded BFS over the reverse adjacency

pub mod mediator;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::lang::common::SourceFileAnalysis;
use crate::lang::resolve::resolve_import;

/// A file node carrying its extracted structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    /// Structural facts from the language adapter.
    pub analysis: SourceFileAnalysis,
    /// Import specifiers that resolved to no known file.
    #[serde(default)]
    pub unresolved_imports: Vec<String>,
}

/// Directed dependency graph over a set of analyzed files.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Underlying petgraph structure; edges run importer -> imported.
    graph: DiGraph<String, ()>,
    /// Path to node-index mapping.
    indices: HashMap<String, NodeIndex>,
    /// Per-file structural data.
    nodes: HashMap<String, FileNode>,
}

impl DependencyGraph {
    /// Build a graph from per-file analyses, resolving imports against the
    /// set of analyzed paths.
    pub fn build(analyses: &[SourceFileAnalysis]) -> Self {
        let known: BTreeSet<String> = analyses.iter().map(|a| a.path.clone()).collect();

        let mut graph = DiGraph::new();
        let mut indices = HashMap::with_capacity(analyses.len());
        for analysis in analyses {
            let index = graph.add_node(analysis.path.clone());
            indices.insert(analysis.path.clone(), index);
        }

        let mut nodes = HashMap::with_capacity(analyses.len());
        for analysis in analyses {
            let from = indices[&analysis.path];
            let mut unresolved = Vec::new();
            let mut seen_targets = HashSet::new();
            for spec in &analysis.imports {
                match resolve_import(spec, &analysis.path, &analysis.language, &known) {
                    Some(target) if target != analysis.path => {
                        if seen_targets.insert(target.clone()) {
                            graph.add_edge(from, indices[&target], ());
                        }
                    }
                    Some(_) => {}
                    None => unresolved.push(spec.clone()),
                }
            }
            nodes.insert(
                analysis.path.clone(),
                FileNode {
                    analysis: analysis.clone(),
                    unresolved_imports: unresolved,
                },
            );
        }

        Self {
            graph,
            indices,
            nodes,
        }
    }

    /// Number of file nodes.
    pub fn file_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of import edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// True when `path` is a node.
    pub fn contains(&self, path: &str) -> bool {
        self.indices.contains_key(path)
    }

    /// All file paths in the graph.
    pub fn files(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Structural node for a path.
    pub fn node(&self, path: &str) -> Option<&FileNode> {
        self.nodes.get(path)
    }

    /// Files `path` imports (outgoing adjacency).
    pub fn dependencies_of(&self, path: &str) -> Vec<String> {
        self.neighbors(path, Direction::Outgoing)
    }

    /// Files importing `path` (reverse adjacency).
    pub fn dependents_of(&self, path: &str) -> Vec<String> {
        self.neighbors(path, Direction::Incoming)
    }

    /// Importance score: `2 * |dependents| + |dependencies|`.
    pub fn importance(&self, path: &str) -> u32 {
        let Some(&index) = self.indices.get(path) else {
            return 0;
        };
        let dependents = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .count() as u32;
        let dependencies = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .count() as u32;
        dependents * 2 + dependencies
    }

    /// Importance for every file.
    pub fn importance_map(&self) -> HashMap<String, u32> {
        self.nodes
            .keys()
            .map(|path| (path.clone(), self.importance(path)))
            .collect()
    }

    /// Circular dependency groups (SCCs of size > 1, plus self-loops).
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        for component in kosaraju_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| self.graph.find_edge(n, n).is_some());
            if is_cycle {
                let mut members: Vec<String> = component
                    .iter()
                    .map(|&n| self.graph[n].clone())
                    .collect();
                members.sort();
                cycles.push(members);
            }
        }
        cycles.sort();
        cycles
    }

    /// Transitive set of files importing any of `changed`, bounded by
    /// `max_depth` reverse-BFS levels. The changed files themselves are
    /// not part of the result.
    pub fn affected_set(&self, changed: &[String], max_depth: u32) -> HashSet<String> {
        let mut affected = HashSet::new();
        for (path, _) in self.reverse_bfs(changed, max_depth) {
            affected.insert(path);
        }
        affected
    }

    /// Reverse BFS from `starts` up to `max_depth`, yielding each reached
    /// file with its discovery depth (1 = direct importer).
    pub fn reverse_bfs(&self, starts: &[String], max_depth: u32) -> Vec<(String, u32)> {
        let mut visited: HashSet<NodeIndex> = starts
            .iter()
            .filter_map(|p| self.indices.get(p).copied())
            .collect();
        let mut queue: VecDeque<(NodeIndex, u32)> =
            visited.iter().map(|&n| (n, 0)).collect();
        let mut reached = Vec::new();

        while let Some((index, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.graph.neighbors_directed(index, Direction::Incoming) {
                if visited.insert(neighbor) {
                    reached.push((self.graph[neighbor].clone(), depth + 1));
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }
        reached.sort();
        reached
    }

    /// Every edge as `(from, to)` pairs, for duality checks and summaries.
    pub fn edges(&self) -> Vec<(String, String)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].clone(), self.graph[b].clone()))
            .collect()
    }

    fn neighbors(&self, path: &str, direction: Direction) -> Vec<String> {
        let Some(&index) = self.indices.get(path) else {
            return Vec::new();
        };
        let mut neighbors: Vec<String> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        neighbors.sort();
        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(path: &str, imports: &[&str]) -> SourceFileAnalysis {
        SourceFileAnalysis {
            path: path.to_string(),
            language: "ts".to_string(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_edges_from_resolved_imports() {
        let graph = DependencyGraph::build(&[
            analysis("a.ts", &["./b"]),
            analysis("b.ts", &["./c"]),
            analysis("c.ts", &[]),
        ]);
        assert_eq!(graph.file_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dependencies_of("a.ts"), vec!["b.ts"]);
        assert_eq!(graph.dependents_of("b.ts"), vec!["a.ts"]);
    }

    #[test]
    fn test_unresolved_imports_recorded() {
        let graph = DependencyGraph::build(&[analysis("a.ts", &["./missing", "express"])]);
        assert_eq!(graph.edge_count(), 0);
        let node = graph.node("a.ts").unwrap();
        assert_eq!(node.unresolved_imports, vec!["./missing", "express"]);
    }

    #[test]
    fn test_importance_scoring() {
        // b has two dependents (a, c) and one dependency (d): 2*2 + 1 = 5.
        let graph = DependencyGraph::build(&[
            analysis("a.ts", &["./b"]),
            analysis("b.ts", &["./d"]),
            analysis("c.ts", &["./b"]),
            analysis("d.ts", &[]),
        ]);
        assert_eq!(graph.importance("b.ts"), 5);
        assert_eq!(graph.importance("d.ts"), 2);
        assert_eq!(graph.importance("a.ts"), 1);
        assert_eq!(graph.importance("nonexistent.ts"), 0);
    }

    #[test]
    fn test_adjacency_duality() {
        let graph = DependencyGraph::build(&[
            analysis("a.ts", &["./b", "./c"]),
            analysis("b.ts", &["./c"]),
            analysis("c.ts", &[]),
        ]);
        for (from, to) in graph.edges() {
            assert!(graph.dependencies_of(&from).contains(&to));
            assert!(graph.dependents_of(&to).contains(&from));
        }
    }

    #[test]
    fn test_cycle_detection() {
        let graph = DependencyGraph::build(&[
            analysis("a.ts", &["./b"]),
            analysis("b.ts", &["./a"]),
            analysis("c.ts", &[]),
        ]);
        let cycles = graph.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a.ts", "b.ts"]);
    }

    #[test]
    fn test_reverse_bfs_depth_bound() {
        // e -> d -> c -> b -> a (each file imports the next letter down).
        let graph = DependencyGraph::build(&[
            analysis("a.ts", &[]),
            analysis("b.ts", &["./a"]),
            analysis("c.ts", &["./b"]),
            analysis("d.ts", &["./c"]),
            analysis("e.ts", &["./d"]),
        ]);
        let reached = graph.reverse_bfs(&["a.ts".to_string()], 3);
        let paths: Vec<&str> = reached.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["b.ts", "c.ts", "d.ts"]);
        let depths: HashMap<&str, u32> =
            reached.iter().map(|(p, d)| (p.as_str(), *d)).collect();
        assert_eq!(depths["b.ts"], 1);
        assert_eq!(depths["c.ts"], 2);
        assert_eq!(depths["d.ts"], 3);
    }

    #[test]
    fn test_affected_set_excludes_changed() {
        let graph = DependencyGraph::build(&[
            analysis("a.ts", &[]),
            analysis("b.ts", &["./a"]),
        ]);
        let affected = graph.affected_set(&["a.ts".to_string()], 2);
        assert!(affected.contains("b.ts"));
        assert!(!affected.contains("a.ts"));
    }
}
