//! Issue model for the adversarial review loop.
//!
//! Issues are raised by the Verifier, adjudicated by the Critic, and tracked
//! through a transition history. Merge/split relations are stored as id
//! references resolved through the issue index, never as owning pointers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::session::Role;

/// Issue category enumeration covering the five examined dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCategory {
    Security,
    Correctness,
    Reliability,
    Maintainability,
    Performance,
}

impl IssueCategory {
    /// All categories, in reporting order.
    pub const ALL: [IssueCategory; 5] = [
        IssueCategory::Security,
        IssueCategory::Correctness,
        IssueCategory::Reliability,
        IssueCategory::Maintainability,
        IssueCategory::Performance,
    ];

    /// Canonical display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Security => "SECURITY",
            Self::Correctness => "CORRECTNESS",
            Self::Reliability => "RELIABILITY",
            Self::Maintainability => "MAINTAINABILITY",
            Self::Performance => "PERFORMANCE",
        }
    }

    /// Conventional id prefix (`SEC`, `COR`, ...).
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Security => "SEC",
            Self::Correctness => "COR",
            Self::Reliability => "REL",
            Self::Maintainability => "MNT",
            Self::Performance => "PRF",
        }
    }

    /// Index into dense per-category count vectors.
    pub fn index(self) -> usize {
        match self {
            Self::Security => 0,
            Self::Correctness => 1,
            Self::Reliability => 2,
            Self::Maintainability => 3,
            Self::Performance => 4,
        }
    }
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Canonical display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    /// Index into dense per-severity count vectors.
    pub fn index(self) -> usize {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

/// Issue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    Raised,
    Challenged,
    Resolved,
    Unresolved,
    Dismissed,
    Merged,
    Split,
}

impl IssueStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [IssueStatus; 7] = [
        IssueStatus::Raised,
        IssueStatus::Challenged,
        IssueStatus::Resolved,
        IssueStatus::Unresolved,
        IssueStatus::Dismissed,
        IssueStatus::Merged,
        IssueStatus::Split,
    ];

    /// Canonical display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raised => "RAISED",
            Self::Challenged => "CHALLENGED",
            Self::Resolved => "RESOLVED",
            Self::Unresolved => "UNRESOLVED",
            Self::Dismissed => "DISMISSED",
            Self::Merged => "MERGED",
            Self::Split => "SPLIT",
        }
    }

    /// Index into dense per-status count vectors.
    pub fn index(self) -> usize {
        match self {
            Self::Raised => 0,
            Self::Challenged => 1,
            Self::Resolved => 2,
            Self::Unresolved => 3,
            Self::Dismissed => 4,
            Self::Merged => 5,
            Self::Split => 6,
        }
    }

    /// Inactive statuses no longer count against convergence.
    pub fn is_inactive(self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed | Self::Merged)
    }
}

/// Critic adjudication verdict on an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriticVerdict {
    Valid,
    Invalid,
    Partial,
}

/// Kind of a recorded issue transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
    Discovered,
    Escalated,
    Demoted,
    MergedInto,
    SplitFrom,
    Invalidated,
    Validated,
    Refined,
}

/// One recorded change in an issue's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTransition {
    /// Transition kind.
    pub kind: TransitionKind,
    /// Status before the transition.
    pub from_status: IssueStatus,
    /// Status after the transition.
    pub to_status: IssueStatus,
    /// Severity before the transition, when it changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_severity: Option<Severity>,
    /// Severity after the transition, when it changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_severity: Option<Severity>,
    /// Round in which the transition happened.
    pub round: u32,
    /// Free-text reason.
    pub reason: String,
    /// Role that triggered the transition.
    pub triggered_by: Role,
    /// Wall-clock timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Risk level attached to impact and ripple analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Canonical display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Dependency-graph projection attached to an issue by the mediator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactAnalysis {
    /// File the issue points at.
    pub file: String,
    /// Files that import the issue's file (reverse adjacency, truncated).
    pub callers: Vec<String>,
    /// Files the issue's file imports (outgoing adjacency, truncated).
    pub dependencies: Vec<String>,
    /// Functions in the file whose line range contains the issue line.
    pub affected_functions: Vec<String>,
    /// Callers + dependencies, deduplicated.
    pub total_affected_files: usize,
    /// Risk classification by affected-file count.
    pub risk_level: RiskLevel,
}

impl ImpactAnalysis {
    /// Classify risk by total affected file count.
    pub fn risk_for_count(total: usize) -> RiskLevel {
        match total {
            n if n >= 10 => RiskLevel::Critical,
            n if n >= 5 => RiskLevel::High,
            n if n >= 2 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

/// An issue raised during the adversarial dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Canonical identifier, upper-cased on storage (`SEC-01`, `COR-02`, ...).
    pub id: String,
    /// Examined dimension.
    pub category: IssueCategory,
    /// Current severity.
    pub severity: Severity,
    /// Lifecycle status.
    pub status: IssueStatus,
    /// One-line summary.
    pub summary: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Supporting evidence (code excerpt, reasoning).
    #[serde(default)]
    pub evidence: String,
    /// Location in `file:line` form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Role that raised the issue.
    pub raised_by: Role,
    /// Round in which the issue was raised.
    pub raised_in_round: u32,
    /// Round in which the issue was resolved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_in_round: Option<u32>,
    /// Critic adjudication, if reviewed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critic_verdict: Option<CriticVerdict>,
    /// Round of the Critic review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critic_review_round: Option<u32>,
    /// Ordered lifecycle history.
    #[serde(default)]
    pub transitions: Vec<IssueTransition>,
    /// Id of the issue this one was merged into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<String>,
    /// Id of the issue this one was split from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_from: Option<String>,
    /// Ids of the issues this one was split into.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub split_into: Vec<String>,
    /// Mediator impact attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<ImpactAnalysis>,
}

impl Issue {
    /// Create a freshly raised issue with a Discovered transition.
    pub fn raised(
        id: impl Into<String>,
        category: IssueCategory,
        severity: Severity,
        summary: impl Into<String>,
        raised_by: Role,
        round: u32,
    ) -> Self {
        let id = id.into().to_uppercase();
        let mut issue = Self {
            id,
            category,
            severity,
            status: IssueStatus::Raised,
            summary: summary.into(),
            description: String::new(),
            evidence: String::new(),
            location: None,
            raised_by,
            raised_in_round: round,
            resolved_in_round: None,
            critic_verdict: None,
            critic_review_round: None,
            transitions: Vec::new(),
            merged_into: None,
            split_from: None,
            split_into: Vec::new(),
            impact: None,
        };
        issue.transitions.push(IssueTransition {
            kind: TransitionKind::Discovered,
            from_status: IssueStatus::Raised,
            to_status: IssueStatus::Raised,
            from_severity: None,
            to_severity: Some(severity),
            round,
            reason: "Issue raised".to_string(),
            triggered_by: raised_by,
            timestamp: Utc::now(),
        });
        issue
    }

    /// Active issues still count against convergence.
    pub fn is_active(&self) -> bool {
        !self.status.is_inactive()
    }

    /// True once a Critic verdict has been recorded.
    pub fn has_critic_review(&self) -> bool {
        self.critic_verdict.is_some()
    }

    /// The `file` half of `file:line`, when a location is attached.
    pub fn location_file(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(|loc| loc.rsplit_once(':').map_or(loc, |(file, _)| file))
    }

    /// The `line` half of `file:line`, when present and numeric.
    pub fn location_line(&self) -> Option<usize> {
        self.location
            .as_deref()
            .and_then(|loc| loc.rsplit_once(':'))
            .and_then(|(_, line)| line.parse().ok())
    }
}
