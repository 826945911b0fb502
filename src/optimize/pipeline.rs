//! Tiered verification pipeline.
//!
//! Three escalating tiers (screen, focused, exhaustive) with per-tier
//! token budgets and a global ceiling. Escalation follows issue yield;
//! budget exhaustion blocks escalation even over critical findings unless
//! the quality-first override is set.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::config::PipelineConfig;
use crate::core::errors::{ElenchusError, Result};
use crate::core::issues::Severity;
use crate::optimize::patterns::PathMatcher;

/// Fraction of the ceiling at which a usage warning is emitted.
const BUDGET_WARN_FRACTION: f64 = 0.8;

/// Escalation triggers: critical findings, or total findings at this count.
const ESCALATE_ISSUE_COUNT: u32 = 3;

/// Pipeline tier, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Screen,
    Focused,
    Exhaustive,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: [Tier; 3] = [Tier::Screen, Tier::Focused, Tier::Exhaustive];

    /// Canonical wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Focused => "focused",
            Self::Exhaustive => "exhaustive",
        }
    }

    /// Share of the global ceiling budgeted to this tier.
    pub fn budget_multiplier(self) -> f64 {
        match self {
            Self::Screen => 0.3,
            Self::Focused => 0.6,
            Self::Exhaustive => 1.0,
        }
    }

    /// Minimum severity this tier focuses on.
    pub fn severity_focus(self) -> Severity {
        match self {
            Self::Screen => Severity::High,
            Self::Focused => Severity::Medium,
            Self::Exhaustive => Severity::Low,
        }
    }

    /// The next tier up, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Self::Screen => Some(Self::Focused),
            Self::Focused => Some(Self::Exhaustive),
            Self::Exhaustive => None,
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = ElenchusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "screen" => Ok(Self::Screen),
            "focused" => Ok(Self::Focused),
            "exhaustive" => Ok(Self::Exhaustive),
            other => Err(ElenchusError::validation_field(
                format!("Unknown tier: {other}"),
                "tier",
            )),
        }
    }
}

/// Outcome of one completed tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierResult {
    /// Completed tier.
    pub tier: Tier,
    /// Files verified at this tier.
    pub files_verified: u32,
    /// Issues found at this tier.
    pub issues_found: u32,
    /// Critical issues among them.
    pub critical_issues: u32,
    /// High-severity issues among them.
    pub high_issues: u32,
    /// Tokens consumed at this tier.
    pub tokens_used: u64,
    /// Wall-clock spent, in milliseconds.
    pub time_ms: u64,
}

/// Decision returned by [`TierPipeline::complete_tier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCompletion {
    /// Whether the pipeline should move to the next tier.
    pub should_escalate: bool,
    /// The tier the pipeline is now positioned at.
    pub next_tier: Option<Tier>,
    /// Human-readable rationale.
    pub reason: String,
    /// True once the global ceiling has been reached.
    pub token_budget_exceeded: bool,
    /// Set when cumulative usage crossed the warning threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_warning: Option<String>,
}

/// Snapshot of pipeline state for clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    /// Tier the pipeline is positioned at.
    pub current_tier: Tier,
    /// Completed tier results, in order.
    pub completed: Vec<TierResult>,
    /// Cumulative tokens used.
    pub total_tokens_used: u64,
    /// Global ceiling.
    pub max_total_tokens: u64,
    /// True once the ceiling has been reached.
    pub token_budget_exceeded: bool,
    /// Per-tier budgets derived from the ceiling.
    pub tier_budgets: Vec<(Tier, u64)>,
}

/// Three-level verification escalator.
#[derive(Debug)]
pub struct TierPipeline {
    config: PipelineConfig,
    always_exhaustive: PathMatcher,
    current_tier: Tier,
    completed: Vec<TierResult>,
    total_tokens_used: u64,
    token_budget_exceeded: bool,
}

impl TierPipeline {
    /// Build a pipeline positioned at the screen tier.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let always_exhaustive = PathMatcher::compile(&config.always_exhaustive_patterns)?;
        Ok(Self {
            config,
            always_exhaustive,
            current_tier: Tier::Screen,
            completed: Vec::new(),
            total_tokens_used: 0,
            token_budget_exceeded: false,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tier the pipeline is positioned at.
    pub fn current_tier(&self) -> Tier {
        self.current_tier
    }

    /// Cumulative token usage.
    pub fn total_tokens_used(&self) -> u64 {
        self.total_tokens_used
    }

    /// True once the ceiling has been reached.
    pub fn token_budget_exceeded(&self) -> bool {
        self.token_budget_exceeded
    }

    /// Token budget for one tier.
    pub fn tier_budget(&self, tier: Tier) -> u64 {
        (self.config.max_total_tokens as f64 * tier.budget_multiplier()) as u64
    }

    /// True when a path must always receive exhaustive verification.
    ///
    /// Such paths bypass the escalation rule but still obey the budget.
    pub fn requires_exhaustive(&self, path: &str) -> bool {
        self.always_exhaustive.is_match(path)
    }

    /// Record a completed tier and decide on escalation.
    pub fn complete_tier(&mut self, result: TierResult) -> TierCompletion {
        self.total_tokens_used = self.total_tokens_used.saturating_add(result.tokens_used);

        if self.config.enforce_token_budget
            && self.total_tokens_used >= self.config.max_total_tokens
        {
            self.token_budget_exceeded = true;
        }

        let mut budget_warning = None;
        let usage = self.total_tokens_used as f64 / self.config.max_total_tokens as f64;
        if usage >= BUDGET_WARN_FRACTION && !self.token_budget_exceeded {
            let message = format!(
                "Token usage at {:.0}% of budget ({}/{})",
                usage * 100.0,
                self.total_tokens_used,
                self.config.max_total_tokens
            );
            warn!("{message}");
            budget_warning = Some(message);
        }

        let wants_escalation = result.critical_issues >= 1
            || result.issues_found >= ESCALATE_ISSUE_COUNT;
        let next = result.tier.next();

        let (should_escalate, reason) = match (wants_escalation, next) {
            (_, None) => (false, "Exhaustive tier complete".to_string()),
            (false, Some(_)) => (
                false,
                format!(
                    "No escalation triggers at {} tier ({} issue(s), {} critical)",
                    result.tier.as_str(),
                    result.issues_found,
                    result.critical_issues
                ),
            ),
            (true, Some(next_tier)) => {
                if self.token_budget_exceeded && !self.config.quality_first {
                    (
                        false,
                        format!(
                            "Token budget exceeded ({}/{}); escalation to {} blocked",
                            self.total_tokens_used,
                            self.config.max_total_tokens,
                            next_tier.as_str()
                        ),
                    )
                } else {
                    (
                        true,
                        format!(
                            "Escalating to {}: {} issue(s), {} critical",
                            next_tier.as_str(),
                            result.issues_found,
                            result.critical_issues
                        ),
                    )
                }
            }
        };

        self.completed.push(result);
        if should_escalate {
            if let Some(next_tier) = next {
                self.current_tier = next_tier;
            }
        }

        TierCompletion {
            should_escalate,
            next_tier: if should_escalate { next } else { None },
            reason,
            token_budget_exceeded: self.token_budget_exceeded,
            budget_warning,
        }
    }

    /// Manually escalate one tier. Fails at the top tier, and under an
    /// exhausted budget without the quality-first override.
    pub fn escalate(&mut self) -> Result<Tier> {
        let next = self.current_tier.next().ok_or_else(|| {
            ElenchusError::state("Already at the exhaustive tier")
        })?;
        if self.token_budget_exceeded && !self.config.quality_first {
            return Err(ElenchusError::budget_exceeded(
                format!(
                    "Token budget exceeded ({}/{})",
                    self.total_tokens_used, self.config.max_total_tokens
                ),
                Some(self.total_tokens_used),
            ));
        }
        self.current_tier = next;
        Ok(next)
    }

    /// Snapshot for clients.
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            current_tier: self.current_tier,
            completed: self.completed.clone(),
            total_tokens_used: self.total_tokens_used,
            max_total_tokens: self.config.max_total_tokens,
            token_budget_exceeded: self.token_budget_exceeded,
            tier_budgets: Tier::ALL
                .iter()
                .map(|&tier| (tier, self.tier_budget(tier)))
                .collect(),
        }
    }

    /// Count of tiers above the highest completed tier (for confidence
    /// scoring of tier-skipped results).
    pub fn skipped_tiers(&self) -> u32 {
        let reached = self
            .completed
            .iter()
            .map(|r| r.tier)
            .max()
            .unwrap_or(Tier::Screen);
        match reached {
            Tier::Screen => 2,
            Tier::Focused => 1,
            Tier::Exhaustive => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(tier: Tier, issues: u32, critical: u32, tokens: u64) -> TierResult {
        TierResult {
            tier,
            files_verified: 5,
            issues_found: issues,
            critical_issues: critical,
            high_issues: 0,
            tokens_used: tokens,
            time_ms: 100,
        }
    }

    fn pipeline(max_tokens: u64, enforce: bool, quality_first: bool) -> TierPipeline {
        TierPipeline::new(PipelineConfig {
            enabled: true,
            max_total_tokens: max_tokens,
            enforce_token_budget: enforce,
            quality_first,
            always_exhaustive_patterns: vec!["**/auth/**".to_string()],
        })
        .unwrap()
    }

    #[test]
    fn test_tier_ordering_and_budgets() {
        let p = pipeline(1000, true, false);
        assert_eq!(p.tier_budget(Tier::Screen), 300);
        assert_eq!(p.tier_budget(Tier::Focused), 600);
        assert_eq!(p.tier_budget(Tier::Exhaustive), 1000);
        assert_eq!(Tier::Screen.next(), Some(Tier::Focused));
        assert_eq!(Tier::Exhaustive.next(), None);
        assert_eq!(Tier::Screen.severity_focus(), Severity::High);
    }

    #[test]
    fn test_escalation_on_critical() {
        let mut p = pipeline(10_000, true, false);
        let completion = p.complete_tier(result(Tier::Screen, 1, 1, 100));
        assert!(completion.should_escalate);
        assert_eq!(completion.next_tier, Some(Tier::Focused));
        assert_eq!(p.current_tier(), Tier::Focused);
    }

    #[test]
    fn test_escalation_on_issue_count() {
        let mut p = pipeline(10_000, true, false);
        let completion = p.complete_tier(result(Tier::Screen, 3, 0, 100));
        assert!(completion.should_escalate);

        let mut p = pipeline(10_000, true, false);
        let completion = p.complete_tier(result(Tier::Screen, 2, 0, 100));
        assert!(!completion.should_escalate);
    }

    #[test]
    fn test_budget_blocks_escalation_despite_critical() {
        let mut p = pipeline(500, true, false);
        let completion = p.complete_tier(result(Tier::Screen, 1, 1, 600));
        assert!(!completion.should_escalate);
        assert!(completion.token_budget_exceeded);
        assert!(completion.reason.contains("Token budget exceeded"));
        assert_eq!(p.current_tier(), Tier::Screen);
    }

    #[test]
    fn test_quality_first_overrides_budget() {
        let mut p = pipeline(500, true, true);
        let completion = p.complete_tier(result(Tier::Screen, 1, 1, 600));
        assert!(completion.should_escalate);
        assert!(completion.token_budget_exceeded);
    }

    #[test]
    fn test_unenforced_budget_never_blocks() {
        let mut p = pipeline(500, false, false);
        let completion = p.complete_tier(result(Tier::Screen, 1, 1, 600));
        assert!(completion.should_escalate);
        assert!(!completion.token_budget_exceeded);
    }

    #[test]
    fn test_budget_warning_at_eighty_percent() {
        let mut p = pipeline(1000, true, false);
        let completion = p.complete_tier(result(Tier::Screen, 0, 0, 850));
        assert!(completion.budget_warning.is_some());
        assert!(!completion.token_budget_exceeded);
    }

    #[test]
    fn test_exhaustive_tier_never_escalates() {
        let mut p = pipeline(10_000, true, false);
        let completion = p.complete_tier(result(Tier::Exhaustive, 10, 5, 100));
        assert!(!completion.should_escalate);
        assert_eq!(completion.reason, "Exhaustive tier complete");
    }

    #[test]
    fn test_manual_escalation_budget_check() {
        let mut p = pipeline(500, true, false);
        p.complete_tier(result(Tier::Screen, 0, 0, 600));
        let err = p.escalate().unwrap_err();
        assert!(matches!(err, ElenchusError::BudgetExceeded { .. }));
    }

    #[test]
    fn test_always_exhaustive_patterns() {
        let p = pipeline(1000, true, false);
        assert!(p.requires_exhaustive("src/auth/login.ts"));
        assert!(!p.requires_exhaustive("src/render/view.ts"));
    }

    #[test]
    fn test_skipped_tiers() {
        let mut p = pipeline(10_000, true, false);
        assert_eq!(p.skipped_tiers(), 2);
        p.complete_tier(result(Tier::Screen, 0, 0, 10));
        assert_eq!(p.skipped_tiers(), 2);
        p.complete_tier(result(Tier::Focused, 0, 0, 10));
        assert_eq!(p.skipped_tiers(), 1);
        p.complete_tier(result(Tier::Exhaustive, 0, 0, 10));
        assert_eq!(p.skipped_tiers(), 0);
    }
}
