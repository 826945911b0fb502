//! Weighted sampling of files excluded by optimizations.
//!
//! When differential scoping, caching, or tier skipping leaves files
//! unverified, the sampling engine draws a spot-check subset. Draws are
//! weighted without replacement, with the total weight recomputed after
//! every draw so the distribution stays correct, and are reproducible
//! through a seeded 31-bit linear congruential generator.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::{SamplingConfig, SamplingStrategy};
use crate::core::errors::Result;
use crate::core::session::ChangeStatus;
use crate::lang::common::is_test_file;
use crate::optimize::patterns::PathMatcher;

/// Days over which recorded misses count as recent.
pub const MISS_WINDOW_DAYS: i64 = 7;

/// Recent misses at or above this count flag a path for periodic checks.
pub const MISS_THRESHOLD: usize = 3;

/// Seeded 31-bit linear congruential generator.
///
/// `state = state * 1103515245 + 12345 (mod 2^31)`; the same seed always
/// produces the same draw sequence.
#[derive(Debug, Clone)]
pub struct Lcg31 {
    state: u32,
}

impl Lcg31 {
    /// Modulus of the generator (2^31).
    const MODULUS: u64 = 1 << 31;

    /// Create a generator from a seed.
    pub fn new(seed: u32) -> Self {
        Self {
            state: seed % (Self::MODULUS as u32),
        }
    }

    /// Next raw 31-bit value.
    pub fn next_u31(&mut self) -> u32 {
        let next = (u64::from(self.state))
            .wrapping_mul(1_103_515_245)
            .wrapping_add(12_345)
            % Self::MODULUS;
        self.state = next as u32;
        self.state
    }

    /// Next value uniformly distributed on `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u31()) / (Self::MODULUS as f64)
    }
}

/// A file excluded from verification by an optimization, as presented to
/// the sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    /// File path.
    pub path: String,
    /// Which optimization skipped it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_by: Option<String>,
    /// Change classification, when differential metadata exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_status: Option<ChangeStatus>,
    /// Files importing this one (fan-in).
    #[serde(default)]
    pub fan_in: u32,
    /// Files this one imports.
    #[serde(default)]
    pub dependency_count: u32,
}

impl SkippedFile {
    /// Convenience constructor for a path-only record.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            skipped_by: None,
            change_status: None,
            fan_in: 0,
            dependency_count: 0,
        }
    }
}

/// One selected sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledFile {
    /// File path.
    pub path: String,
    /// Weight the file carried when drawn.
    pub weight: f64,
    /// Why the file entered the sample.
    pub reason: String,
}

/// Result of one sampling pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingSelection {
    /// Selected files, in draw order (always-sample matches first).
    pub sampled: Vec<SampledFile>,
    /// Eligible pool size after never-sample filtering.
    pub eligible: usize,
    /// Target sample size after clamping.
    pub target: usize,
    /// Seed used for the draw.
    pub seed: u32,
}

/// Per-path sampling outcomes across a session.
///
/// A *miss* is a productive sample: a file an optimization skipped where
/// verification then found an issue.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingHistory {
    /// Issues found per sampled path.
    pub issues_found: HashMap<String, u32>,
    /// Timestamps of recorded misses per path.
    pub miss_times: HashMap<String, Vec<DateTime<Utc>>>,
    /// Total samples verified.
    pub total_sampled: u64,
    /// Samples that surfaced at least one issue.
    pub productive_samples: u64,
}

impl SamplingHistory {
    /// Record the outcome of verifying one sampled file.
    pub fn record(&mut self, path: &str, issues_found: u32, now: DateTime<Utc>) {
        self.total_sampled += 1;
        if issues_found > 0 {
            self.productive_samples += 1;
            *self.issues_found.entry(path.to_string()).or_insert(0) += issues_found;
            self.miss_times
                .entry(path.to_string())
                .or_default()
                .push(now);
        }
    }

    /// Share of samples that surfaced issues, as a percentage.
    pub fn productivity_percent(&self) -> f64 {
        if self.total_sampled == 0 {
            return 0.0;
        }
        self.productive_samples as f64 / self.total_sampled as f64 * 100.0
    }

    /// True when the path ever produced a miss.
    pub fn has_recorded_miss(&self, path: &str) -> bool {
        self.miss_times.get(path).is_some_and(|t| !t.is_empty())
    }

    /// Recorded issue count for a path.
    pub fn issue_count(&self, path: &str) -> u32 {
        self.issues_found.get(path).copied().unwrap_or(0)
    }

    /// Paths with at least [`MISS_THRESHOLD`] misses inside the
    /// [`MISS_WINDOW_DAYS`] window ending at `now`.
    pub fn recent_miss_paths(&self, now: DateTime<Utc>) -> Vec<String> {
        let floor = now - Duration::days(MISS_WINDOW_DAYS);
        let mut paths: Vec<String> = self
            .miss_times
            .iter()
            .filter(|(_, times)| times.iter().filter(|&&t| t >= floor).count() >= MISS_THRESHOLD)
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }
}

/// Weighted sampling engine.
#[derive(Debug)]
pub struct SamplingEngine {
    config: SamplingConfig,
    never: PathMatcher,
    always: PathMatcher,
}

impl SamplingEngine {
    /// Build an engine, compiling the config's pattern lists.
    pub fn new(config: SamplingConfig) -> Result<Self> {
        let never = PathMatcher::compile(&config.never_sample_patterns)?;
        let always = PathMatcher::compile(&config.always_sample_patterns)?;
        Ok(Self {
            config,
            never,
            always,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Target sample size for an eligible pool.
    pub fn target_for(&self, eligible: usize) -> usize {
        let raw = (eligible as f64 * self.config.rate / 100.0).ceil() as usize;
        raw.clamp(self.config.min_samples, self.config.max_samples)
            .min(eligible)
    }

    /// Select files for spot-check verification.
    ///
    /// Never-sample matches are filtered first; always-sample matches are
    /// force-included; the remaining budget is drawn weighted without
    /// replacement. The total weight over the remaining pool is recomputed
    /// after each draw so relative probabilities stay correct.
    pub fn select_files(
        &self,
        skipped: &[SkippedFile],
        history: &SamplingHistory,
        seed: u32,
    ) -> SamplingSelection {
        let mut pool: Vec<&SkippedFile> = skipped
            .iter()
            .filter(|f| !self.never.is_match(&f.path))
            .collect();
        let eligible = pool.len();
        let target = self.target_for(eligible);

        let mut sampled = Vec::with_capacity(target);

        // Forced inclusions come first and consume budget.
        let mut index = 0;
        while index < pool.len() {
            if sampled.len() >= target {
                break;
            }
            if self.always.is_match(&pool[index].path) {
                let file = pool.remove(index);
                sampled.push(SampledFile {
                    path: file.path.clone(),
                    weight: self.weight_for(file, history),
                    reason: "always-sample pattern".to_string(),
                });
            } else {
                index += 1;
            }
        }

        let mut rng = Lcg31::new(seed);
        while sampled.len() < target && !pool.is_empty() {
            let weights: Vec<f64> = pool
                .iter()
                .map(|f| self.weight_for(f, history))
                .collect();
            let total: f64 = weights.iter().sum();
            if total <= 0.0 {
                break;
            }

            let threshold = rng.next_f64() * total;
            let mut cumulative = 0.0;
            let mut chosen = pool.len() - 1;
            for (i, weight) in weights.iter().enumerate() {
                cumulative += weight;
                if threshold < cumulative {
                    chosen = i;
                    break;
                }
            }

            let file = pool.remove(chosen);
            sampled.push(SampledFile {
                path: file.path.clone(),
                weight: weights[chosen],
                reason: format!("{:?} draw", self.config.strategy),
            });
        }

        SamplingSelection {
            sampled,
            eligible,
            target,
            seed,
        }
    }

    /// Weight of one file under the active strategy, with the historical
    /// boost applied multiplicatively.
    pub fn weight_for(&self, file: &SkippedFile, history: &SamplingHistory) -> f64 {
        let base = match self.config.strategy {
            SamplingStrategy::Uniform => 1.0,
            SamplingStrategy::RiskWeighted => self.risk_weight(file, history),
            SamplingStrategy::ChangeWeighted => match file.change_status {
                Some(ChangeStatus::Added | ChangeStatus::Modified | ChangeStatus::Renamed) => 2.0,
                Some(_) => 1.0,
                None => 1.0,
            },
            SamplingStrategy::DependencyWeighted => {
                (1.0 + 0.1 * f64::from(file.dependency_count)).min(2.0)
            }
        };
        if history.has_recorded_miss(&file.path) {
            base * self.config.historical_boost
        } else {
            base
        }
    }

    fn risk_weight(&self, file: &SkippedFile, history: &SamplingHistory) -> f64 {
        let lower = file.path.to_ascii_lowercase();
        let mut weight = 1.0;
        if ["auth", "security", "payment", "crypto", "password", "token"]
            .iter()
            .any(|risk| lower.contains(risk))
        {
            weight += 0.3;
        }
        if is_entry_point(&lower) {
            weight += 0.1;
        }
        // Historical issue count contributes up to +0.3.
        weight += (f64::from(history.issue_count(&file.path)) * 0.1).min(0.3);
        if file.fan_in >= 5 {
            weight += 0.1;
        }
        if is_test_file(&file.path) {
            weight -= 0.2;
        }
        weight.max(0.1)
    }
}

fn is_entry_point(lower_path: &str) -> bool {
    let basename = lower_path.rsplit('/').next().unwrap_or(lower_path);
    matches!(
        basename,
        "main.rs" | "main.go" | "main.py" | "index.ts" | "index.js" | "app.ts" | "app.js"
            | "__main__.py" | "server.ts" | "server.js"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: f64, min: usize, max: usize, strategy: SamplingStrategy) -> SamplingConfig {
        SamplingConfig {
            enabled: true,
            rate,
            min_samples: min,
            max_samples: max,
            strategy,
            seed: Some(42),
            never_sample_patterns: vec!["**/*.min.js".to_string()],
            always_sample_patterns: vec!["**/auth/**".to_string()],
            historical_boost: 1.5,
        }
    }

    fn pool(count: usize) -> Vec<SkippedFile> {
        (0..count)
            .map(|i| SkippedFile::new(format!("src/module{i:02}.ts")))
            .collect()
    }

    #[test]
    fn test_lcg_sequence_is_deterministic() {
        let mut a = Lcg31::new(42);
        let mut b = Lcg31::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u31(), b.next_u31());
        }
        assert_ne!(Lcg31::new(42).next_u31(), Lcg31::new(43).next_u31());
    }

    #[test]
    fn test_lcg_unit_interval() {
        let mut rng = Lcg31::new(7);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_target_clamping() {
        let engine = SamplingEngine::new(config(10.0, 2, 20, SamplingStrategy::Uniform)).unwrap();
        assert_eq!(engine.target_for(30), 3); // ceil(30 * 0.10)
        assert_eq!(engine.target_for(5), 2); // min clamp
        assert_eq!(engine.target_for(1000), 20); // max clamp
        assert_eq!(engine.target_for(1), 1); // never above pool size
        assert_eq!(engine.target_for(0), 0);
    }

    #[test]
    fn test_seeded_reproducibility() {
        let engine =
            SamplingEngine::new(config(10.0, 2, 20, SamplingStrategy::RiskWeighted)).unwrap();
        let files = pool(30);
        let history = SamplingHistory::default();

        let first = engine.select_files(&files, &history, 42);
        let second = engine.select_files(&files, &history, 42);
        let paths = |sel: &SamplingSelection| {
            sel.sampled.iter().map(|s| s.path.clone()).collect::<Vec<_>>()
        };
        assert_eq!(paths(&first), paths(&second));
        assert_eq!(first.target, 3);
    }

    #[test]
    fn test_never_patterns_filtered() {
        let engine = SamplingEngine::new(config(100.0, 0, 50, SamplingStrategy::Uniform)).unwrap();
        let mut files = pool(3);
        files.push(SkippedFile::new("dist/bundle.min.js"));
        let selection = engine.select_files(&files, &SamplingHistory::default(), 1);
        assert_eq!(selection.eligible, 3);
        assert!(selection
            .sampled
            .iter()
            .all(|s| s.path != "dist/bundle.min.js"));
    }

    #[test]
    fn test_always_patterns_forced() {
        let engine = SamplingEngine::new(config(10.0, 1, 2, SamplingStrategy::Uniform)).unwrap();
        let mut files = pool(20);
        files.push(SkippedFile::new("src/auth/session.ts"));
        let selection = engine.select_files(&files, &SamplingHistory::default(), 9);
        assert_eq!(selection.sampled[0].path, "src/auth/session.ts");
        assert_eq!(selection.sampled[0].reason, "always-sample pattern");
    }

    #[test]
    fn test_risk_weighting_favors_sensitive_paths() {
        let engine =
            SamplingEngine::new(config(10.0, 2, 20, SamplingStrategy::RiskWeighted)).unwrap();
        let history = SamplingHistory::default();
        let auth = engine.weight_for(&SkippedFile::new("src/payment/charge.ts"), &history);
        let plain = engine.weight_for(&SkippedFile::new("src/render/view.ts"), &history);
        assert!(auth > plain);
    }

    #[test]
    fn test_historical_boost_multiplies() {
        let engine = SamplingEngine::new(config(10.0, 2, 20, SamplingStrategy::Uniform)).unwrap();
        let mut history = SamplingHistory::default();
        let file = SkippedFile::new("src/flaky.ts");
        let before = engine.weight_for(&file, &history);
        history.record("src/flaky.ts", 2, Utc::now());
        let after = engine.weight_for(&file, &history);
        assert!((after / before - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_dependency_weight_cap() {
        let engine =
            SamplingEngine::new(config(10.0, 2, 20, SamplingStrategy::DependencyWeighted))
                .unwrap();
        let mut file = SkippedFile::new("src/hub.ts");
        file.dependency_count = 50;
        let weight = engine.weight_for(&file, &SamplingHistory::default());
        assert!((weight - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_inclusion_frequency() {
        // With uniform weights the empirical inclusion frequency should
        // approach target/eligible.
        let engine = SamplingEngine::new(SamplingConfig {
            enabled: true,
            rate: 20.0,
            min_samples: 0,
            max_samples: 100,
            strategy: SamplingStrategy::Uniform,
            seed: None,
            never_sample_patterns: Vec::new(),
            always_sample_patterns: Vec::new(),
            historical_boost: 1.5,
        })
        .unwrap();
        let files = pool(20);
        let history = SamplingHistory::default();
        let runs = 400u32;
        let mut hits = 0u32;
        for seed in 0..runs {
            let selection = engine.select_files(&files, &history, seed);
            if selection.sampled.iter().any(|s| s.path == "src/module00.ts") {
                hits += 1;
            }
        }
        // target/eligible = 4/20 = 0.2; allow generous tolerance.
        let frequency = f64::from(hits) / f64::from(runs);
        assert!((frequency - 0.2).abs() < 0.08, "frequency {frequency}");
    }

    #[test]
    fn test_history_recent_misses() {
        let mut history = SamplingHistory::default();
        let now = Utc::now();
        for _ in 0..3 {
            history.record("src/hot.ts", 1, now - Duration::days(2));
        }
        history.record("src/old.ts", 1, now - Duration::days(30));
        assert_eq!(history.recent_miss_paths(now), vec!["src/hot.ts"]);
        assert!(history.has_recorded_miss("src/old.ts"));
        assert!((history.productivity_percent() - 100.0).abs() < 1e-9);
    }
}
