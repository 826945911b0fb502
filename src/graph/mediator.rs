//! Mediator: dependency-aware reasoning over the file graph.
//!
//! Produces ripple analyses for hypothetical changes, impact attachments
//! for issues, importance-based prioritization, and the cache invalidation
//! that runs when a session's context expands.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::config::MediatorConfig;
use crate::core::issues::{ImpactAnalysis, RiskLevel};
use crate::graph::DependencyGraph;
use crate::lang::common::{is_test_file, SourceFileAnalysis};

/// Classification of a file reached by ripple analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AffectedKind {
    /// Reached at depth 1.
    Direct,
    /// Reached at depth 2 or deeper.
    Indirect,
    /// Matches test-file naming conventions.
    Test,
}

/// One file reached by a ripple analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RippleAffectedFile {
    /// Reached file path.
    pub path: String,
    /// Direct / indirect / test classification.
    pub kind: AffectedKind,
    /// BFS discovery depth (1 = direct importer).
    pub depth: u32,
}

/// Result of a ripple analysis for a hypothetical change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RippleAnalysis {
    /// File the hypothetical change touches.
    pub source_file: String,
    /// Optional function scope of the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_function: Option<String>,
    /// Files that would be re-invalidated.
    pub affected: Vec<RippleAffectedFile>,
    /// Deepest BFS level reached.
    pub cascade_depth: u32,
    /// Total affected file count.
    pub total_affected: usize,
    /// Risk classification by affected count.
    pub risk_level: RiskLevel,
    /// Human-readable one-paragraph summary.
    pub summary: String,
}

/// Aggregate view of the mediator's graph state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediatorSummary {
    /// Files in the graph.
    pub total_files: usize,
    /// Import edges in the graph.
    pub total_edges: usize,
    /// Circular dependency groups.
    pub circular_dependencies: Vec<Vec<String>>,
    /// Count of import specifiers that resolved to no file.
    pub unresolved_imports: usize,
    /// Top files by importance, descending.
    pub most_important: Vec<(String, u32)>,
    /// Critical files not yet verified.
    pub unverified_critical: Vec<String>,
}

/// Dependency-aware mediator over a session's context.
#[derive(Debug)]
pub struct Mediator {
    graph: DependencyGraph,
    config: MediatorConfig,
    /// Cached importance scores, rebuilt on invalidation.
    importance: HashMap<String, u32>,
    /// Files already verified this session.
    verified: HashSet<String>,
    /// Critical files awaiting verification, in discovery order.
    unverified_critical: Vec<String>,
}

impl Mediator {
    /// Build a mediator over the initial context analyses.
    pub fn new(analyses: &[SourceFileAnalysis], config: MediatorConfig) -> Self {
        let graph = DependencyGraph::build(analyses);
        let importance = graph.importance_map();
        let mut mediator = Self {
            graph,
            config,
            importance,
            verified: HashSet::new(),
            unverified_critical: Vec::new(),
        };
        mediator.refresh_unverified_critical();
        mediator
    }

    /// The underlying graph.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Cached importance for a file.
    pub fn importance_of(&self, path: &str) -> u32 {
        self.importance.get(path).copied().unwrap_or(0)
    }

    /// Files currently considered critical but unverified.
    pub fn unverified_critical(&self) -> &[String] {
        &self.unverified_critical
    }

    /// Record that a file has been verified.
    pub fn mark_verified(&mut self, path: &str) {
        self.verified.insert(path.to_string());
        self.unverified_critical.retain(|p| p != path);
    }

    /// Rebuild the graph over the union of current and new analyses and
    /// recompute importance. Newly critical files that are not verified
    /// are appended to the unverified list; already-verified files are
    /// never re-added. Calling with an empty slice is a no-op.
    pub fn invalidate_cached_importance(&mut self, new_analyses: &[SourceFileAnalysis]) {
        if new_analyses.is_empty() {
            return;
        }

        let mut merged: HashMap<String, SourceFileAnalysis> = self
            .graph
            .files()
            .filter_map(|path| self.graph.node(path))
            .map(|node| (node.analysis.path.clone(), node.analysis.clone()))
            .collect();
        for analysis in new_analyses {
            merged.insert(analysis.path.clone(), analysis.clone());
        }

        let mut union: Vec<SourceFileAnalysis> = merged.into_values().collect();
        union.sort_by(|a, b| a.path.cmp(&b.path));

        self.graph = DependencyGraph::build(&union);
        self.importance = self.graph.importance_map();
        self.refresh_unverified_critical();
    }

    /// Ripple analysis: which files would a change to `file` invalidate.
    pub fn analyze_ripple_effect(
        &self,
        file: &str,
        target_function: Option<&str>,
    ) -> RippleAnalysis {
        let reached = self
            .graph
            .reverse_bfs(&[file.to_string()], self.config.ripple_max_depth);

        let mut cascade_depth = 0;
        let affected: Vec<RippleAffectedFile> = reached
            .into_iter()
            .map(|(path, depth)| {
                cascade_depth = cascade_depth.max(depth);
                let kind = if is_test_file(&path) {
                    AffectedKind::Test
                } else if depth == 1 {
                    AffectedKind::Direct
                } else {
                    AffectedKind::Indirect
                };
                RippleAffectedFile { path, kind, depth }
            })
            .collect();

        let total_affected = affected.len();
        let risk_level = ImpactAnalysis::risk_for_count(total_affected);
        let direct = affected
            .iter()
            .filter(|f| f.kind == AffectedKind::Direct)
            .count();
        let scope = target_function
            .map(|f| format!("{file}::{f}"))
            .unwrap_or_else(|| file.to_string());
        let summary = format!(
            "A change to {scope} would invalidate {total_affected} file(s) \
             ({direct} direct) across {cascade_depth} dependency level(s); \
             risk {}",
            risk_level.as_str()
        );

        RippleAnalysis {
            source_file: file.to_string(),
            target_function: target_function.map(str::to_string),
            affected,
            cascade_depth,
            total_affected,
            risk_level,
            summary,
        }
    }

    /// Impact analysis for an issue at `file:line`.
    pub fn impact_for_location(&self, file: &str, line: Option<usize>) -> ImpactAnalysis {
        let mut callers = self.graph.dependents_of(file);
        callers.truncate(self.config.max_callers_tracked);

        let mut dependencies = self.graph.dependencies_of(file);
        dependencies.truncate(self.config.max_dependencies_tracked);

        let affected_functions = match (line, self.graph.node(file)) {
            (Some(line), Some(node)) => node.analysis.functions_at_line(line),
            _ => Vec::new(),
        };

        let total: HashSet<&String> = callers.iter().chain(dependencies.iter()).collect();
        let total_affected_files = total.len();

        ImpactAnalysis {
            file: file.to_string(),
            callers,
            dependencies,
            affected_functions,
            total_affected_files,
            risk_level: ImpactAnalysis::risk_for_count(total_affected_files),
        }
    }

    /// Aggregate graph summary for clients.
    pub fn summary(&self) -> MediatorSummary {
        let mut ranked: Vec<(String, u32)> = self.importance.clone().into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(10);

        let unresolved_imports = self
            .graph
            .files()
            .filter_map(|path| self.graph.node(path))
            .map(|node| node.unresolved_imports.len())
            .sum();

        MediatorSummary {
            total_files: self.graph.file_count(),
            total_edges: self.graph.edge_count(),
            circular_dependencies: self.graph.cycles(),
            unresolved_imports,
            most_important: ranked,
            unverified_critical: self.unverified_critical.clone(),
        }
    }

    fn refresh_unverified_critical(&mut self) {
        let threshold = self.config.critical_importance_threshold;
        let mut paths: Vec<&String> = self.importance.keys().collect();
        paths.sort();
        for path in paths {
            let critical = self.importance[path] >= threshold;
            let pending = !self.verified.contains(path)
                && !self.unverified_critical.iter().any(|p| p == path);
            if critical && pending {
                self.unverified_critical.push(path.clone());
            }
        }
        // Files whose importance dropped below the threshold stay listed
        // only while still critical.
        let importance = &self.importance;
        self.unverified_critical
            .retain(|p| importance.get(p).copied().unwrap_or(0) >= threshold);
    }
}
