//! Confidence scoring for optimized verification results.
//!
//! Every verified file gets a [`ConfidenceScore`] derived from how it was
//! verified (full read, cache hit, chunked pass, tier level, spot sample).
//! Scores share a five-factor schema with fixed per-source weights; coded
//! warnings subtract their impact from the composite. Session aggregation
//! averages per-file scores and folds warnings into ordered
//! recommendations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::optimize::pipeline::Tier;

/// Discretized confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Unreliable,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Thresholds: HIGH >= 0.85, MEDIUM >= 0.7, LOW >= 0.5.
    pub fn for_value(value: f64) -> Self {
        if value >= 0.85 {
            Self::High
        } else if value >= 0.7 {
            Self::Medium
        } else if value >= 0.5 {
            Self::Low
        } else {
            Self::Unreliable
        }
    }
}

/// How a file's verification result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationSource {
    Full,
    Cache,
    Chunk,
    Tiered,
    Sampled,
}

/// Coded warning reasons attached to confidence scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// Cache entry older than half its TTL.
    StaleCache,
    /// Requirements changed since the cached verification.
    ContextMismatch,
    /// The file's dependency set changed since the cached verification.
    UnverifiedDependency,
    /// Chunked verification may have missed cross-boundary behavior.
    ChunkBoundary,
    /// Calls crossing chunk boundaries were not co-verified.
    CrossFileRisk,
    /// One or more pipeline tiers were skipped.
    SkippedTier,
}

/// One warning with its score impact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceWarning {
    /// Coded reason.
    pub code: WarningCode,
    /// Human-readable detail.
    pub message: String,
    /// Amount subtracted from the composite score.
    pub impact: f64,
}

/// Factor breakdown behind a confidence value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceFactors {
    /// Inherent reliability of the verification method.
    pub method_base: f64,
    /// Recency of the underlying result.
    pub freshness: f64,
    /// How well the verification context matches the current one.
    pub context_match: f64,
    /// Fraction of the file's behavior the method covered.
    pub coverage: f64,
    /// Track record of the method on this project.
    pub historical_accuracy: f64,
}

impl ConfidenceFactors {
    /// All factors at 1.0.
    pub fn perfect() -> Self {
        Self {
            method_base: 1.0,
            freshness: 1.0,
            context_match: 1.0,
            coverage: 1.0,
            historical_accuracy: 1.0,
        }
    }

    /// Weighted composite under fixed per-source weights (summing to 1).
    fn composite(&self, weights: [f64; 5]) -> f64 {
        self.method_base * weights[0]
            + self.freshness * weights[1]
            + self.context_match * weights[2]
            + self.coverage * weights[3]
            + self.historical_accuracy * weights[4]
    }
}

/// A per-file confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceScore {
    /// Composite value in `[0, 1]`.
    pub value: f64,
    /// Discretized level.
    pub level: ConfidenceLevel,
    /// Verification source.
    pub source: VerificationSource,
    /// Factor breakdown.
    pub factors: ConfidenceFactors,
    /// Warnings whose impacts were subtracted.
    pub warnings: Vec<ConfidenceWarning>,
}

impl ConfidenceScore {
    fn build(
        source: VerificationSource,
        factors: ConfidenceFactors,
        weights: [f64; 5],
        warnings: Vec<ConfidenceWarning>,
    ) -> Self {
        let penalty: f64 = warnings.iter().map(|w| w.impact).sum();
        let value = (factors.composite(weights) - penalty).clamp(0.0, 1.0);
        Self {
            value,
            level: ConfidenceLevel::for_value(value),
            source,
            factors,
            warnings,
        }
    }

    /// Full verification: 1.0 with no warnings.
    pub fn full() -> Self {
        Self {
            value: 1.0,
            level: ConfidenceLevel::High,
            source: VerificationSource::Full,
            factors: ConfidenceFactors::perfect(),
            warnings: Vec::new(),
        }
    }

    /// Cache hit: freshness decays linearly after TTL/2.
    pub fn cache(
        age_seconds: u64,
        ttl_seconds: u64,
        decay_rate_per_hour: f64,
        requirements_changed: bool,
        dependencies_changed: bool,
    ) -> Self {
        let half_ttl = ttl_seconds / 2;
        let freshness = if age_seconds <= half_ttl {
            1.0
        } else {
            let excess_hours = (age_seconds - half_ttl) as f64 / 3600.0;
            (1.0 - excess_hours * decay_rate_per_hour).max(0.0)
        };

        let mut warnings = Vec::new();
        if age_seconds > half_ttl {
            warnings.push(ConfidenceWarning {
                code: WarningCode::StaleCache,
                message: format!("Cached result is {:.1}h old", age_seconds as f64 / 3600.0),
                impact: 0.05,
            });
        }
        if requirements_changed {
            warnings.push(ConfidenceWarning {
                code: WarningCode::ContextMismatch,
                message: "Requirements changed since the cached verification".to_string(),
                impact: 0.2,
            });
        }
        if dependencies_changed {
            warnings.push(ConfidenceWarning {
                code: WarningCode::UnverifiedDependency,
                message: "Dependency set changed since the cached verification".to_string(),
                impact: 0.15,
            });
        }

        let factors = ConfidenceFactors {
            method_base: 0.85,
            freshness,
            context_match: if requirements_changed { 0.6 } else { 1.0 },
            coverage: 1.0,
            historical_accuracy: 0.9,
        };
        Self::build(
            VerificationSource::Cache,
            factors,
            [0.3, 0.3, 0.2, 0.1, 0.1],
            warnings,
        )
    }

    /// Chunked verification: context match follows dependency coverage.
    pub fn chunk(
        dependency_coverage: f64,
        boundary_risk: bool,
        cross_chunk_calls: usize,
    ) -> Self {
        let mut warnings = Vec::new();
        if boundary_risk {
            warnings.push(ConfidenceWarning {
                code: WarningCode::ChunkBoundary,
                message: "Chunk boundaries may hide cross-unit behavior".to_string(),
                impact: 0.1,
            });
        }
        if cross_chunk_calls > 0 {
            warnings.push(ConfidenceWarning {
                code: WarningCode::CrossFileRisk,
                message: format!("{cross_chunk_calls} call(s) cross chunk boundaries"),
                impact: (0.05 * cross_chunk_calls as f64).min(0.2),
            });
        }

        let factors = ConfidenceFactors {
            method_base: 0.75,
            freshness: 1.0,
            context_match: dependency_coverage.clamp(0.0, 1.0),
            coverage: 0.9,
            historical_accuracy: 0.85,
        };
        Self::build(
            VerificationSource::Chunk,
            factors,
            [0.3, 0.1, 0.3, 0.2, 0.1],
            warnings,
        )
    }

    /// Tiered verification: method base per tier reached, coverage reduced
    /// 0.2 per skipped tier.
    pub fn tiered(reached: Tier, skipped_tiers: u32) -> Self {
        let method_base = match reached {
            Tier::Screen => 0.4,
            Tier::Focused => 0.7,
            Tier::Exhaustive => 1.0,
        };
        let coverage = (1.0 - 0.2 * f64::from(skipped_tiers)).max(0.0);
        let warnings = if skipped_tiers > 0 {
            vec![ConfidenceWarning {
                code: WarningCode::SkippedTier,
                message: format!("{skipped_tiers} tier(s) skipped"),
                impact: 0.0,
            }]
        } else {
            Vec::new()
        };

        let factors = ConfidenceFactors {
            method_base,
            freshness: 1.0,
            context_match: 1.0,
            coverage,
            historical_accuracy: 0.9,
        };
        Self::build(
            VerificationSource::Tiered,
            factors,
            [0.5, 0.1, 0.1, 0.2, 0.1],
            warnings,
        )
    }

    /// Spot sample: 0.9 when the sample surfaced issues, else 0.95.
    pub fn sampled(productive: bool) -> Self {
        let value = if productive { 0.9 } else { 0.95 };
        Self {
            value,
            level: ConfidenceLevel::for_value(value),
            source: VerificationSource::Sampled,
            factors: ConfidenceFactors {
                method_base: value,
                freshness: 1.0,
                context_match: 1.0,
                coverage: value,
                historical_accuracy: 0.9,
            },
            warnings: Vec::new(),
        }
    }
}

/// Ordered follow-up actions derived from warning codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    /// Re-verify files backed by stale cache entries.
    ReVerifyStale,
    /// Verify behavior across chunk boundaries.
    VerifyBoundaries,
    /// Run the remaining pipeline tiers.
    CompleteTiers,
    /// Fall back to full verification.
    FullVerification,
}

/// Session-level confidence aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfidence {
    /// Arithmetic mean of per-file values (1.0 with no observations).
    pub score: f64,
    /// Discretized level of the mean.
    pub level: ConfidenceLevel,
    /// Files observed.
    pub files_scored: usize,
    /// Union of distinct warning codes seen.
    pub warning_codes: Vec<WarningCode>,
    /// Ordered recommendations.
    pub recommendations: Vec<Recommendation>,
}

/// Aggregates per-file confidence observations for one session.
#[derive(Debug, Default)]
pub struct ConfidenceAggregator {
    scores: HashMap<String, ConfidenceScore>,
}

impl ConfidenceAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the score for a file.
    pub fn observe(&mut self, path: impl Into<String>, score: ConfidenceScore) {
        self.scores.insert(path.into(), score);
    }

    /// Score for one file, if observed.
    pub fn score_for(&self, path: &str) -> Option<&ConfidenceScore> {
        self.scores.get(path)
    }

    /// Number of files observed.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// True when nothing has been observed.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Aggregate all observations into a session confidence.
    pub fn aggregate(&self) -> SessionConfidence {
        if self.scores.is_empty() {
            return SessionConfidence {
                score: 1.0,
                level: ConfidenceLevel::High,
                files_scored: 0,
                warning_codes: Vec::new(),
                recommendations: Vec::new(),
            };
        }

        let score =
            self.scores.values().map(|s| s.value).sum::<f64>() / self.scores.len() as f64;

        let mut warning_codes: Vec<WarningCode> = Vec::new();
        for file_score in self.scores.values() {
            for warning in &file_score.warnings {
                if !warning_codes.contains(&warning.code) {
                    warning_codes.push(warning.code);
                }
            }
        }

        let mut recommendations: Vec<Recommendation> = Vec::new();
        let mut push = |r: Recommendation| {
            if !recommendations.contains(&r) {
                recommendations.push(r);
            }
        };
        for code in &warning_codes {
            match code {
                WarningCode::StaleCache => push(Recommendation::ReVerifyStale),
                WarningCode::ChunkBoundary | WarningCode::CrossFileRisk => {
                    push(Recommendation::VerifyBoundaries)
                }
                WarningCode::SkippedTier => push(Recommendation::CompleteTiers),
                WarningCode::ContextMismatch | WarningCode::UnverifiedDependency => {
                    push(Recommendation::FullVerification)
                }
            }
        }
        let level = ConfidenceLevel::for_value(score);
        if level <= ConfidenceLevel::Low && !recommendations.contains(&Recommendation::FullVerification) {
            recommendations.push(Recommendation::FullVerification);
        }
        recommendations.sort();

        SessionConfidence {
            score,
            level,
            files_scored: self.scores.len(),
            warning_codes,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(ConfidenceLevel::for_value(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::for_value(0.84), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::for_value(0.7), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::for_value(0.69), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::for_value(0.5), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::for_value(0.49), ConfidenceLevel::Unreliable);
    }

    #[test]
    fn test_full_is_perfect() {
        let score = ConfidenceScore::full();
        assert_eq!(score.value, 1.0);
        assert_eq!(score.level, ConfidenceLevel::High);
        assert!(score.warnings.is_empty());
    }

    #[test]
    fn test_cache_fresh_has_no_stale_warning() {
        let score = ConfidenceScore::cache(3600, 86_400, 0.02, false, false);
        assert!(score
            .warnings
            .iter()
            .all(|w| w.code != WarningCode::StaleCache));
        assert!(score.value > 0.8);
    }

    #[test]
    fn test_cache_decay_after_half_ttl() {
        let fresh = ConfidenceScore::cache(3600, 86_400, 0.02, false, false);
        // 20h old with a 24h TTL: 8h past the 12h half-life.
        let stale = ConfidenceScore::cache(72_000, 86_400, 0.02, false, false);
        assert!(stale.value < fresh.value);
        assert!(stale
            .warnings
            .iter()
            .any(|w| w.code == WarningCode::StaleCache));
    }

    #[test]
    fn test_cache_context_mismatch_warning() {
        let score = ConfidenceScore::cache(0, 86_400, 0.02, true, true);
        let codes: Vec<WarningCode> = score.warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&WarningCode::ContextMismatch));
        assert!(codes.contains(&WarningCode::UnverifiedDependency));
    }

    #[test]
    fn test_chunk_cross_file_penalty_capped() {
        let few = ConfidenceScore::chunk(1.0, false, 2);
        let many = ConfidenceScore::chunk(1.0, false, 50);
        let impact_of = |s: &ConfidenceScore| {
            s.warnings
                .iter()
                .find(|w| w.code == WarningCode::CrossFileRisk)
                .map(|w| w.impact)
                .unwrap()
        };
        assert!((impact_of(&few) - 0.10).abs() < 1e-9);
        assert!((impact_of(&many) - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_tiered_method_bases() {
        let screen = ConfidenceScore::tiered(Tier::Screen, 2);
        let exhaustive = ConfidenceScore::tiered(Tier::Exhaustive, 0);
        assert!(screen.value < exhaustive.value);
        assert!((screen.factors.method_base - 0.4).abs() < 1e-9);
        assert!((exhaustive.factors.method_base - 1.0).abs() < 1e-9);
        assert!((screen.factors.coverage - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_sampled_values() {
        assert!((ConfidenceScore::sampled(true).value - 0.9).abs() < 1e-9);
        assert!((ConfidenceScore::sampled(false).value - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_aggregation_mean_and_recommendations() {
        let mut aggregator = ConfidenceAggregator::new();
        aggregator.observe("a.ts", ConfidenceScore::full());
        aggregator.observe("b.ts", ConfidenceScore::cache(72_000, 86_400, 0.02, false, false));
        aggregator.observe("c.ts", ConfidenceScore::tiered(Tier::Screen, 2));

        let session = aggregator.aggregate();
        assert_eq!(session.files_scored, 3);
        let expected = (aggregator.score_for("a.ts").unwrap().value
            + aggregator.score_for("b.ts").unwrap().value
            + aggregator.score_for("c.ts").unwrap().value)
            / 3.0;
        assert!((session.score - expected).abs() < 1e-9);
        assert!(session.recommendations.contains(&Recommendation::ReVerifyStale));
        assert!(session.recommendations.contains(&Recommendation::CompleteTiers));
        // Ordered buckets.
        let mut sorted = session.recommendations.clone();
        sorted.sort();
        assert_eq!(session.recommendations, sorted);
    }

    #[test]
    fn test_empty_aggregation_defaults_high() {
        let session = ConfidenceAggregator::new().aggregate();
        assert_eq!(session.score, 1.0);
        assert_eq!(session.level, ConfidenceLevel::High);
        assert!(session.recommendations.is_empty());
    }
}
