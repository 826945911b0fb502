//! Convergence evaluation over accumulated rounds and issues.
//!
//! The evaluator reduces a session snapshot to a [`ConvergenceSnapshot`]:
//! one linear traversal over the issue set fills the count vectors, phrase
//! scans over round outputs detect category mentions, edge-case analysis,
//! and negative assertions, and the mode-gated predicate decides whether
//! the debate is over.
//!
//! Phrase detection is deliberately structural. Multi-literal scanning
//! runs on Aho-Corasick automata; strict per-category validation belongs
//! to the role-enforcement collaborator.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::core::config::VerificationMode;
use crate::core::issues::{IssueCategory, RiskLevel, Severity};
use crate::core::session::Session;

/// Conceptual edge-case categories reported as covered once the
/// structural scan asserts edge-case analysis.
pub const EDGE_CASE_CATEGORIES: [&str; 9] = [
    "boundary-values",
    "empty-inputs",
    "null-handling",
    "error-paths",
    "invalid-input",
    "overflow",
    "concurrency",
    "resource-exhaustion",
    "state-transitions",
];

/// Section headings that announce edge-case analysis.
static EDGE_HEADINGS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["edge case", "edge-case", "corner case", "boundary analysis", "boundary condition"])
        .expect("static patterns compile")
});

/// Scenario phrases probing failure behavior.
static EDGE_SCENARIOS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["what if", "failure scenario", "when it fails", "fails when", "if it fails"])
        .expect("static patterns compile")
});

/// Boundary vocabulary.
static EDGE_VOCABULARY: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["empty", "null", "zero", "maximum", "minimum", "max ", "min ", "overflow"])
        .expect("static patterns compile")
});

/// Explicit clean statements.
static NEGATIVE_ASSERTIONS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([
            "no issues",
            "no new issues",
            "no problems found",
            "no defects found",
            "nothing to report",
            "verified",
            "looks correct",
            "\u{2713}",
        ])
        .expect("static patterns compile")
});

/// Impact-coverage projection over issues carrying impact analyses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImpactCoverage {
    /// Caller and dependency files of impacted issues.
    pub impacted_files: Vec<String>,
    /// Subset belonging to HIGH/CRITICAL risk issues.
    pub high_risk_impacted_files: Vec<String>,
    /// Impacted files mentioned in some round output.
    pub reviewed_files: Vec<String>,
    /// `|reviewed| / |impacted|`, 1.0 when nothing is impacted.
    pub coverage_rate: f64,
    /// True iff every high-risk impacted file was reviewed.
    pub has_high_risk_coverage: bool,
}

/// Everything the evaluator derives from a session snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceSnapshot {
    /// Whether the mode predicate holds.
    pub is_converged: bool,
    /// Converged one-liner or the highest-priority failing clause.
    pub reason: String,
    /// Per-category examined flags.
    pub category_coverage: Vec<(String, bool)>,
    /// Active issue count.
    pub unresolved_issues: usize,
    /// Active CRITICAL issues.
    pub critical_unresolved: usize,
    /// Active HIGH issues.
    pub high_unresolved: usize,
    /// Trailing rounds whose `issues_raised` is empty.
    pub rounds_without_new_issues: u32,
    /// True when every category is examined.
    pub all_categories_examined: bool,
    /// Categories not yet examined.
    pub uncovered_categories: Vec<String>,
    /// True when no recent transitions exist.
    pub issues_stabilized: bool,
    /// Transitions with `round >= current_round - 1`.
    pub recent_transitions: usize,
    /// Dismissed issues.
    pub dismissed_count: usize,
    /// Merged issues.
    pub merged_count: usize,
    /// Structural edge-case detection outcome.
    pub has_edge_case_coverage: bool,
    /// True when explicit clean statements were found.
    pub has_negative_assertions: bool,
    /// Edge-case categories reported as covered.
    pub edge_case_category_coverage: Vec<(String, bool)>,
    /// True when all edge-case categories are covered.
    pub has_comprehensive_edge_case_coverage: bool,
    /// Impact-coverage projection.
    pub impact_coverage: ImpactCoverage,
}

/// Stateless convergence evaluator.
#[derive(Debug, Default)]
pub struct ConvergenceEvaluator;

impl ConvergenceEvaluator {
    /// Evaluate a session snapshot.
    pub fn evaluate(session: &Session) -> ConvergenceSnapshot {
        let mode = session.mode.mode;
        let min_rounds = session.mode.effective_min_rounds();
        let stable_rounds = session.mode.effective_stable_rounds();

        // Single linear traversal over the issue set.
        let mut category_counts = [0usize; 5];
        let mut unresolved_issues = 0usize;
        let mut critical_unresolved = 0usize;
        let mut high_unresolved = 0usize;
        let mut dismissed_count = 0usize;
        let mut merged_count = 0usize;
        let mut recent_transitions = 0usize;
        let transition_floor = session.current_round.saturating_sub(1);

        for issue in &session.issues {
            category_counts[issue.category.index()] += 1;
            if issue.is_active() {
                unresolved_issues += 1;
                match issue.severity {
                    Severity::Critical => critical_unresolved += 1,
                    Severity::High => high_unresolved += 1,
                    _ => {}
                }
            }
            match issue.status {
                crate::core::issues::IssueStatus::Dismissed => dismissed_count += 1,
                crate::core::issues::IssueStatus::Merged => merged_count += 1,
                _ => {}
            }
            recent_transitions += issue
                .transitions
                .iter()
                .filter(|t| t.round >= transition_floor)
                .count();
        }

        let outputs_lower: String = session
            .rounds
            .iter()
            .map(|r| r.output.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        // Category coverage: an issue of the category, or the category
        // name appearing in any round output.
        let mut category_coverage = Vec::with_capacity(5);
        let mut uncovered_categories = Vec::new();
        for category in IssueCategory::ALL {
            let examined = category_counts[category.index()] > 0
                || outputs_lower.contains(&category.as_str().to_lowercase());
            category_coverage.push((category.as_str().to_string(), examined));
            if !examined {
                uncovered_categories.push(category.as_str().to_string());
            }
        }
        let all_categories_examined = uncovered_categories.is_empty();

        // Structural edge-case detection: any matching group asserts
        // coverage of all conceptual categories.
        let has_edge_case_coverage = EDGE_HEADINGS.is_match(&outputs_lower)
            || EDGE_SCENARIOS.is_match(&outputs_lower)
            || EDGE_VOCABULARY.is_match(&outputs_lower);
        let edge_case_category_coverage: Vec<(String, bool)> = EDGE_CASE_CATEGORIES
            .iter()
            .map(|c| (c.to_string(), has_edge_case_coverage))
            .collect();

        let has_negative_assertions = NEGATIVE_ASSERTIONS.is_match(&outputs_lower);

        let issues_stabilized = recent_transitions == 0;
        let rounds_without_new_issues = session
            .rounds
            .iter()
            .rev()
            .take_while(|r| r.issues_raised.is_empty())
            .count() as u32;

        let impact_coverage = compute_impact_coverage(session, &outputs_lower);

        let current_round = session.current_round;
        let is_converged = match mode {
            VerificationMode::Standard => {
                critical_unresolved == 0
                    && high_unresolved == 0
                    && rounds_without_new_issues >= stable_rounds
                    && current_round >= min_rounds
                    && all_categories_examined
                    && issues_stabilized
                    && has_edge_case_coverage
                    && has_negative_assertions
                    && impact_coverage.has_high_risk_coverage
            }
            VerificationMode::FastTrack => {
                critical_unresolved == 0
                    && high_unresolved == 0
                    && current_round >= min_rounds
                    && all_categories_examined
                    && has_edge_case_coverage
                    && has_negative_assertions
                    && impact_coverage.has_high_risk_coverage
            }
            VerificationMode::SinglePass => {
                critical_unresolved == 0
                    && high_unresolved == 0
                    && all_categories_examined
                    && current_round >= 1
            }
        };

        let reason = if is_converged {
            format!(
                "Converged ({}): impact coverage {:.0}%",
                mode.as_str(),
                impact_coverage.coverage_rate * 100.0
            )
        } else {
            failure_reason(
                mode,
                critical_unresolved,
                high_unresolved,
                &uncovered_categories,
                has_edge_case_coverage,
                has_negative_assertions,
                &impact_coverage,
                issues_stabilized,
                rounds_without_new_issues,
                stable_rounds,
                current_round,
                min_rounds,
            )
        };

        ConvergenceSnapshot {
            is_converged,
            reason,
            category_coverage,
            unresolved_issues,
            critical_unresolved,
            high_unresolved,
            rounds_without_new_issues,
            all_categories_examined,
            uncovered_categories,
            issues_stabilized,
            recent_transitions,
            dismissed_count,
            merged_count,
            has_edge_case_coverage,
            has_negative_assertions,
            edge_case_category_coverage,
            has_comprehensive_edge_case_coverage: has_edge_case_coverage,
            impact_coverage,
        }
    }
}

/// First failing clause in priority order.
#[allow(clippy::too_many_arguments)]
fn failure_reason(
    mode: VerificationMode,
    critical_unresolved: usize,
    high_unresolved: usize,
    uncovered_categories: &[String],
    has_edge_case_coverage: bool,
    has_negative_assertions: bool,
    impact_coverage: &ImpactCoverage,
    issues_stabilized: bool,
    rounds_without_new_issues: u32,
    stable_rounds: u32,
    current_round: u32,
    min_rounds: u32,
) -> String {
    if critical_unresolved > 0 {
        return format!("{critical_unresolved} CRITICAL issue(s) unresolved");
    }
    if high_unresolved > 0 {
        return format!("{high_unresolved} HIGH issue(s) unresolved");
    }
    if !uncovered_categories.is_empty() {
        return format!(
            "Categories not yet examined: {}",
            uncovered_categories.join(", ")
        );
    }
    let needs_structural = !matches!(mode, VerificationMode::SinglePass);
    if needs_structural && !has_edge_case_coverage {
        return "No edge-case analysis detected in round outputs".to_string();
    }
    if needs_structural && !has_negative_assertions {
        return "No explicit clean statements (negative assertions) found".to_string();
    }
    if needs_structural && !impact_coverage.has_high_risk_coverage {
        return format!(
            "{} high-risk impacted file(s) not yet reviewed",
            impact_coverage
                .high_risk_impacted_files
                .iter()
                .filter(|f| !impact_coverage.reviewed_files.contains(f))
                .count()
        );
    }
    if matches!(mode, VerificationMode::Standard) {
        if !issues_stabilized {
            return "Issue set still in motion (recent transitions)".to_string();
        }
        if rounds_without_new_issues < stable_rounds {
            return format!(
                "Only {rounds_without_new_issues} stable round(s); {stable_rounds} required"
            );
        }
    }
    if current_round < min_rounds {
        return format!("Round {current_round} of {min_rounds} minimum");
    }
    "Convergence criteria not yet satisfied".to_string()
}

/// Collect impacted files from issues carrying impact analyses and mark
/// each reviewed when its basename or full path appears in any output.
fn compute_impact_coverage(session: &Session, outputs_lower: &str) -> ImpactCoverage {
    let mut impacted_files: Vec<String> = Vec::new();
    let mut high_risk: Vec<String> = Vec::new();

    for issue in &session.issues {
        let Some(impact) = &issue.impact else {
            continue;
        };
        let is_high_risk =
            matches!(impact.risk_level, RiskLevel::High | RiskLevel::Critical);
        for file in impact.callers.iter().chain(impact.dependencies.iter()) {
            if !impacted_files.contains(file) {
                impacted_files.push(file.clone());
            }
            if is_high_risk && !high_risk.contains(file) {
                high_risk.push(file.clone());
            }
        }
    }

    let reviewed_files: Vec<String> = impacted_files
        .iter()
        .filter(|file| {
            let lower = file.to_lowercase();
            let basename = lower.rsplit('/').next().unwrap_or(&lower).to_string();
            outputs_lower.contains(&lower) || outputs_lower.contains(&basename)
        })
        .cloned()
        .collect();

    let coverage_rate = if impacted_files.is_empty() {
        1.0
    } else {
        reviewed_files.len() as f64 / impacted_files.len() as f64
    };
    let has_high_risk_coverage = high_risk.iter().all(|f| reviewed_files.contains(f));

    ImpactCoverage {
        impacted_files,
        high_risk_impacted_files: high_risk,
        reviewed_files,
        coverage_rate,
        has_high_risk_coverage,
    }
}
