//! Safeguards coordination across the optimization layer.
//!
//! The coordinator stitches differential scoping, caching, the tier
//! pipeline, and sampling into a per-session policy: it auto-activates
//! compensating controls when optimizations are on, tracks per-file
//! confidence, assesses overall quality, and gates convergence when the
//! assessment falls short.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::{PeriodicConfig, SafeguardsConfig, SamplingConfig};
use crate::core::errors::Result;
use crate::optimize::confidence::{
    ConfidenceAggregator, ConfidenceScore, SessionConfidence,
};
use crate::optimize::patterns::{merge_patterns, PathMatcher};
use crate::optimize::sampling::SamplingHistory;

/// Which optimizations a session has enabled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveOptimizations {
    /// Differential (diff-scoped) verification.
    pub differential: bool,
    /// Verification result caching.
    pub cache: bool,
    /// Tiered pipeline.
    pub pipeline: bool,
}

impl ActiveOptimizations {
    /// True when any optimization is on.
    pub fn any(self) -> bool {
        self.differential || self.cache || self.pipeline
    }
}

/// Discretized quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityLevel {
    Unacceptable,
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl QualityLevel {
    /// Thresholds over the composite score.
    pub fn for_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Excellent
        } else if score >= 0.8 {
            Self::Good
        } else if score >= 0.7 {
            Self::Acceptable
        } else if score >= 0.5 {
            Self::Poor
        } else {
            Self::Unacceptable
        }
    }
}

/// Severity class of a quality concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcernClass {
    Info,
    Warning,
    Error,
}

/// One quality concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityConcern {
    /// Severity class.
    pub class: ConcernClass,
    /// Human-readable detail.
    pub message: String,
}

/// Metric inputs behind a quality assessment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// Fraction of context files verified.
    pub coverage: f64,
    /// Session confidence score.
    pub confidence: f64,
    /// Percentage of samples that surfaced issues.
    pub sampling_productivity: f64,
    /// Accumulated incremental-verification drift in `[0, 1]`.
    pub incremental_drift: f64,
}

/// Aggregate quality assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    /// Composite score.
    pub score: f64,
    /// Discretized level.
    pub level: QualityLevel,
    /// Metric inputs.
    pub metrics: QualityMetrics,
    /// Concerns, most severe first.
    pub concerns: Vec<QualityConcern>,
    /// Ordered follow-up actions.
    pub actions: Vec<String>,
}

/// Gating decision for convergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceGate {
    /// Whether convergence may be declared.
    pub allowed: bool,
    /// Reasons when blocked.
    pub reasons: Vec<String>,
}

/// Per-project incremental verification tracker, persisted across
/// sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeriodicTracker {
    /// Incremental (optimized) verifications since the last full pass.
    pub incremental_count: u32,
    /// Timestamp of the last full verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_full_verification: Option<DateTime<Utc>>,
}

/// Why a periodic full verification was forced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicDecision {
    /// Whether a full pass is required now.
    pub force_full: bool,
    /// Trigger descriptions when forced.
    pub triggers: Vec<String>,
}

/// Per-session safeguards coordinator.
#[derive(Debug)]
pub struct SafeguardsCoordinator {
    config: SafeguardsConfig,
    optimizations: ActiveOptimizations,
    /// Effective sampling configuration after auto-activation.
    effective_sampling: SamplingConfig,
    /// Effective periodic policy after auto-activation.
    effective_periodic: PeriodicConfig,
    always_full: PathMatcher,
    aggregator: ConfidenceAggregator,
    history: SamplingHistory,
    tracker: PeriodicTracker,
    /// Files in the session context.
    total_files: usize,
    /// Files with any verification observation.
    verified_files: usize,
}

impl SafeguardsCoordinator {
    /// Build a coordinator, applying auto-activation when any
    /// optimization is on.
    ///
    /// Auto-activation forces sampling and periodic verification on,
    /// adopts the max of the base and per-optimization sampling rates,
    /// tightens the incremental threshold, and merges the extended
    /// always-full patterns (deduplicated).
    pub fn new(
        config: SafeguardsConfig,
        base_sampling: SamplingConfig,
        optimizations: ActiveOptimizations,
        tracker: PeriodicTracker,
    ) -> Result<Self> {
        let mut effective_sampling = base_sampling;
        let mut effective_periodic = config.periodic.clone();

        if optimizations.any() {
            effective_sampling.enabled = true;
            let mut rate = effective_sampling.rate;
            if optimizations.differential {
                rate = rate.max(config.differential_sampling_rate);
            }
            if optimizations.cache {
                rate = rate.max(config.cache_sampling_rate);
            }
            if optimizations.pipeline {
                rate = rate.max(config.pipeline_sampling_rate);
            }
            effective_sampling.rate = rate;

            effective_periodic.incremental_threshold = effective_periodic
                .incremental_threshold
                .min(config.optimized_incremental_threshold);
            effective_periodic.always_full_patterns = merge_patterns(
                &effective_periodic.always_full_patterns,
                &config.extended_always_full_patterns,
            );
        }

        let always_full = PathMatcher::compile(&effective_periodic.always_full_patterns)?;

        Ok(Self {
            config,
            optimizations,
            effective_sampling,
            effective_periodic,
            always_full,
            aggregator: ConfidenceAggregator::new(),
            history: SamplingHistory::default(),
            tracker,
            total_files: 0,
            verified_files: 0,
        })
    }

    /// Active optimizations.
    pub fn optimizations(&self) -> ActiveOptimizations {
        self.optimizations
    }

    /// Effective sampling configuration.
    pub fn effective_sampling(&self) -> &SamplingConfig {
        &self.effective_sampling
    }

    /// Effective periodic policy.
    pub fn effective_periodic(&self) -> &PeriodicConfig {
        &self.effective_periodic
    }

    /// Sampling history (for weight computation and periodic checks).
    pub fn history(&self) -> &SamplingHistory {
        &self.history
    }

    /// Tracker snapshot for persistence.
    pub fn tracker(&self) -> &PeriodicTracker {
        &self.tracker
    }

    /// Record the session's context size for coverage metrics.
    pub fn set_total_files(&mut self, total: usize) {
        self.total_files = total;
    }

    /// Record a per-file confidence observation.
    pub fn record_confidence(&mut self, path: &str, score: ConfidenceScore) {
        if self.aggregator.score_for(path).is_none() {
            self.verified_files += 1;
        }
        self.aggregator.observe(path, score);
    }

    /// Record the outcome of verifying one sampled file.
    pub fn record_sampling_result(&mut self, path: &str, issues_found: u32, now: DateTime<Utc>) {
        self.history.record(path, issues_found, now);
    }

    /// Count one optimized (incremental) verification.
    pub fn record_incremental(&mut self) {
        self.tracker.incremental_count += 1;
    }

    /// Reset the tracker after a full verification.
    pub fn record_full_verification(&mut self, now: DateTime<Utc>) {
        self.tracker.incremental_count = 0;
        self.tracker.last_full_verification = Some(now);
    }

    /// Session confidence aggregation.
    pub fn session_confidence(&self) -> SessionConfidence {
        self.aggregator.aggregate()
    }

    /// Decide whether a periodic full verification must run now.
    pub fn periodic_check(&self, changed_paths: &[String], now: DateTime<Utc>) -> PeriodicDecision {
        let mut triggers = Vec::new();

        if self.tracker.incremental_count >= self.effective_periodic.incremental_threshold {
            triggers.push(format!(
                "{} incremental verification(s) since last full pass (threshold {})",
                self.tracker.incremental_count, self.effective_periodic.incremental_threshold
            ));
        }

        if let Some(last_full) = self.tracker.last_full_verification {
            let hours = (now - last_full).num_minutes() as f64 / 60.0;
            if hours >= self.effective_periodic.max_hours_since_full {
                triggers.push(format!(
                    "{hours:.1}h since last full verification (max {:.1}h)",
                    self.effective_periodic.max_hours_since_full
                ));
            }
        }

        let confidence = self.session_confidence();
        if confidence.files_scored > 0
            && confidence.score < self.effective_periodic.confidence_floor
        {
            triggers.push(format!(
                "Session confidence {:.2} below floor {:.2}",
                confidence.score, self.effective_periodic.confidence_floor
            ));
        }

        for path in changed_paths {
            if self.always_full.is_match(path) {
                triggers.push(format!("Changed path {path} matches an always-full pattern"));
                break;
            }
        }

        let recent = self.history.recent_miss_paths(now);
        if recent.iter().any(|p| changed_paths.contains(p)) {
            triggers.push("Recently missed paths are present in the change set".to_string());
        }

        PeriodicDecision {
            force_full: !triggers.is_empty(),
            triggers,
        }
    }

    /// Build the aggregate quality assessment.
    ///
    /// Score composite: `0.4*confidence + 0.3*coverage + 0.2*(1 - drift)
    /// + 0.1*(1 - productivity/100)`.
    pub fn quality_assessment(&self) -> QualityAssessment {
        let confidence = self.session_confidence();
        let coverage = if self.total_files == 0 {
            1.0
        } else {
            (self.verified_files as f64 / self.total_files as f64).min(1.0)
        };
        let productivity = self.history.productivity_percent();
        let drift = if self.effective_periodic.incremental_threshold == 0 {
            0.0
        } else {
            (f64::from(self.tracker.incremental_count)
                / f64::from(self.effective_periodic.incremental_threshold))
            .min(1.0)
        };

        let score = 0.4 * confidence.score
            + 0.3 * coverage
            + 0.2 * (1.0 - drift)
            + 0.1 * (1.0 - productivity / 100.0);
        let level = QualityLevel::for_score(score);

        let mut concerns = Vec::new();
        if confidence.score < self.config.minimum_acceptable_confidence {
            concerns.push(QualityConcern {
                class: ConcernClass::Error,
                message: format!(
                    "Session confidence {:.2} below acceptable minimum {:.2}",
                    confidence.score, self.config.minimum_acceptable_confidence
                ),
            });
        }
        if coverage < 0.5 && self.total_files > 0 {
            concerns.push(QualityConcern {
                class: ConcernClass::Warning,
                message: format!("Only {:.0}% of context files verified", coverage * 100.0),
            });
        }
        if productivity > 20.0 {
            // Productive sampling means the optimizations keep skipping
            // files that turn out to carry issues.
            concerns.push(QualityConcern {
                class: ConcernClass::Warning,
                message: format!(
                    "Sampling productivity {productivity:.0}% indicates optimizations are skipping risky files"
                ),
            });
        }
        if drift >= 1.0 {
            concerns.push(QualityConcern {
                class: ConcernClass::Warning,
                message: "Incremental drift threshold reached; full verification due".to_string(),
            });
        }

        let mut actions: Vec<String> = confidence
            .recommendations
            .iter()
            .map(|r| format!("{r:?}"))
            .collect();
        if drift >= 1.0 {
            actions.push("Run a full verification pass".to_string());
        }

        QualityAssessment {
            score,
            level,
            metrics: QualityMetrics {
                coverage,
                confidence: confidence.score,
                sampling_productivity: productivity,
                incremental_drift: drift,
            },
            concerns,
            actions,
        }
    }

    /// Gate convergence on the current quality assessment.
    ///
    /// Strict mode blocks on POOR or worse, or confidence under the
    /// minimum; normal mode blocks only on UNACCEPTABLE or an error-class
    /// concern.
    pub fn should_allow_convergence(&self) -> ConvergenceGate {
        let assessment = self.quality_assessment();
        let mut reasons = Vec::new();

        if self.config.strict_mode {
            if assessment.level <= QualityLevel::Poor {
                reasons.push(format!(
                    "Quality level {:?} below strict-mode requirement",
                    assessment.level
                ));
            }
            if assessment.metrics.confidence < self.config.minimum_acceptable_confidence {
                reasons.push(format!(
                    "Confidence {:.2} below minimum {:.2}",
                    assessment.metrics.confidence, self.config.minimum_acceptable_confidence
                ));
            }
        } else {
            if assessment.level == QualityLevel::Unacceptable {
                reasons.push("Quality level UNACCEPTABLE".to_string());
            }
            for concern in &assessment.concerns {
                if concern.class == ConcernClass::Error {
                    reasons.push(concern.message.clone());
                }
            }
        }

        ConvergenceGate {
            allowed: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::confidence::ConfidenceScore;
    use chrono::Duration;

    fn coordinator(
        strict: bool,
        optimizations: ActiveOptimizations,
    ) -> SafeguardsCoordinator {
        let config = SafeguardsConfig {
            strict_mode: strict,
            ..Default::default()
        };
        SafeguardsCoordinator::new(
            config,
            SamplingConfig::default(),
            optimizations,
            PeriodicTracker::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_auto_activation_adopts_max_rate() {
        let all_on = ActiveOptimizations {
            differential: true,
            cache: true,
            pipeline: true,
        };
        let c = coordinator(false, all_on);
        assert!(c.effective_sampling().enabled);
        // differential rate (15.0) dominates the base 10.0.
        assert!((c.effective_sampling().rate - 15.0).abs() < 1e-9);
        // Tightened threshold: min(5, 3).
        assert_eq!(c.effective_periodic().incremental_threshold, 3);
        // Extended patterns merged.
        assert!(c
            .effective_periodic()
            .always_full_patterns
            .contains(&"**/crypto/**".to_string()));
    }

    #[test]
    fn test_no_activation_without_optimizations() {
        let c = coordinator(false, ActiveOptimizations::default());
        assert!(!c.effective_sampling().enabled);
        assert_eq!(c.effective_periodic().incremental_threshold, 5);
    }

    #[test]
    fn test_quality_score_composite() {
        let mut c = coordinator(false, ActiveOptimizations::default());
        c.set_total_files(2);
        c.record_confidence("a.ts", ConfidenceScore::full());
        c.record_confidence("b.ts", ConfidenceScore::full());

        let assessment = c.quality_assessment();
        // confidence 1.0, coverage 1.0, drift 0, productivity 0 -> score 1.0.
        assert!((assessment.score - 1.0).abs() < 1e-9);
        assert_eq!(assessment.level, QualityLevel::Excellent);
        assert!(assessment.concerns.is_empty());
    }

    #[test]
    fn test_gating_normal_mode() {
        let mut c = coordinator(false, ActiveOptimizations::default());
        c.set_total_files(1);
        c.record_confidence("a.ts", ConfidenceScore::full());
        assert!(c.should_allow_convergence().allowed);
    }

    #[test]
    fn test_gating_blocks_on_low_confidence_error() {
        let mut c = coordinator(false, ActiveOptimizations::default());
        c.set_total_files(4);
        // A deeply degraded cache observation drags confidence down.
        for path in ["a.ts", "b.ts", "c.ts", "d.ts"] {
            c.record_confidence(
                path,
                ConfidenceScore::cache(82_800, 86_400, 0.5, true, true),
            );
        }
        let gate = c.should_allow_convergence();
        assert!(!gate.allowed);
        assert!(!gate.reasons.is_empty());
    }

    #[test]
    fn test_strict_mode_blocks_poor() {
        let mut c = coordinator(true, ActiveOptimizations::default());
        c.set_total_files(10);
        // One mediocre observation, nine unverified files: poor coverage.
        c.record_confidence("a.ts", ConfidenceScore::tiered(crate::optimize::pipeline::Tier::Screen, 2));
        let gate = c.should_allow_convergence();
        assert!(!gate.allowed);
    }

    #[test]
    fn test_periodic_triggers() {
        let mut c = coordinator(false, ActiveOptimizations::default());
        let now = Utc::now();

        // Fresh tracker, nothing forces.
        let decision = c.periodic_check(&[], now);
        assert!(!decision.force_full);

        // Incremental threshold.
        for _ in 0..5 {
            c.record_incremental();
        }
        assert!(c.periodic_check(&[], now).force_full);

        // Reset clears the count.
        c.record_full_verification(now);
        assert!(!c.periodic_check(&[], now).force_full);

        // Wall-clock trigger.
        c.record_full_verification(now - Duration::hours(100));
        assert!(c.periodic_check(&[], now).force_full);

        // Always-full pattern trigger.
        c.record_full_verification(now);
        let decision = c.periodic_check(&["src/auth/login.ts".to_string()], now);
        assert!(decision.force_full);
    }

    #[test]
    fn test_periodic_recent_miss_trigger() {
        let mut c = coordinator(false, ActiveOptimizations::default());
        let now = Utc::now();
        c.record_full_verification(now);
        for _ in 0..3 {
            c.record_sampling_result("src/hot.ts", 1, now - Duration::days(1));
        }
        let decision = c.periodic_check(&["src/hot.ts".to_string()], now);
        assert!(decision.force_full);
        assert!(decision
            .triggers
            .iter()
            .any(|t| t.contains("Recently missed")));
    }
}
