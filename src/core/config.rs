//! Configuration types and management for elenchus-rs.
//!
//! The aggregate [`ElenchusConfig`] carries defaults for every subsystem:
//! verification modes, convergence thresholds, mediator limits, and the
//! optimization layer (differential, cache, pipeline, sampling, safeguards).
//! Per-session requests may override the relevant sections at start time.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::{ElenchusError, Result};

/// Verification mode controlling round minimums and Critic-skip policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMode {
    /// Full adversarial loop: three rounds minimum, stability required.
    #[default]
    Standard,
    /// Abbreviated loop: one round minimum, Critic skipped after clean rounds.
    FastTrack,
    /// One verifier pass, no alternation.
    SinglePass,
}

impl VerificationMode {
    /// Canonical wire tag for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::FastTrack => "fast-track",
            Self::SinglePass => "single-pass",
        }
    }

    /// Default minimum rounds before convergence may be declared.
    pub fn default_min_rounds(self) -> u32 {
        match self {
            Self::Standard => 3,
            Self::FastTrack | Self::SinglePass => 1,
        }
    }

    /// Default trailing rounds without new issues required for stability.
    pub fn default_stable_rounds(self) -> u32 {
        match self {
            Self::Standard => 2,
            Self::FastTrack | Self::SinglePass => 1,
        }
    }
}

/// Per-session verification mode configuration with overridable thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModeConfig {
    /// Active verification mode.
    pub mode: VerificationMode,
    /// Minimum rounds before convergence; `None` uses the mode default.
    pub min_rounds: Option<u32>,
    /// Required trailing stable rounds; `None` uses the mode default.
    pub stable_rounds_required: Option<u32>,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            mode: VerificationMode::Standard,
            min_rounds: None,
            stable_rounds_required: None,
        }
    }
}

impl ModeConfig {
    /// Effective minimum-round threshold.
    pub fn effective_min_rounds(&self) -> u32 {
        self.min_rounds.unwrap_or(self.mode.default_min_rounds())
    }

    /// Effective stable-round threshold.
    pub fn effective_stable_rounds(&self) -> u32 {
        self.stable_rounds_required
            .unwrap_or(self.mode.default_stable_rounds())
    }
}

/// Mediator and dependency-graph limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediatorConfig {
    /// Importance score at or above which a file counts as critical.
    pub critical_importance_threshold: u32,
    /// Reverse-BFS depth bound for ripple analysis.
    pub ripple_max_depth: u32,
    /// Maximum caller files tracked per impact analysis.
    pub max_callers_tracked: usize,
    /// Maximum dependency files tracked per impact analysis.
    pub max_dependencies_tracked: usize,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            critical_importance_threshold: 3,
            ripple_max_depth: 3,
            max_callers_tracked: 10,
            max_dependencies_tracked: 5,
        }
    }
}

/// Differential (diff-scoped) verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DifferentialConfig {
    /// Whether diff-scoped verification is active for the session.
    pub enabled: bool,
    /// Base reference: `last-verified`, a commit, a branch, or `HEAD~N`.
    pub base_ref: String,
    /// Extend the changed set with importers of changed files.
    pub trace_dependencies: bool,
    /// Transitive closure depth for dependency tracing.
    pub max_affected_depth: u32,
    /// Include `-U0` hunks for changed files in the diff result.
    pub include_hunks: bool,
}

impl Default for DifferentialConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_ref: "last-verified".to_string(),
            trace_dependencies: true,
            max_affected_depth: 2,
            include_hunks: false,
        }
    }
}

/// Verification-cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Whether result caching is active for the session.
    pub enabled: bool,
    /// Entry time-to-live in seconds.
    pub ttl_seconds: u64,
    /// Maximum entries before LRU eviction.
    pub max_entries: usize,
    /// Minimum post-decay confidence for a hit.
    pub min_confidence: f64,
    /// Linear confidence decay per hour after TTL/2.
    pub decay_rate_per_hour: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_seconds: 24 * 60 * 60,
            max_entries: 1000,
            min_confidence: 0.5,
            decay_rate_per_hour: 0.02,
        }
    }
}

/// Tiered-verification pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Whether the tier pipeline is active for the session.
    pub enabled: bool,
    /// Global token ceiling across all tiers.
    pub max_total_tokens: u64,
    /// Enforce the ceiling (block escalation when exhausted).
    pub enforce_token_budget: bool,
    /// Allow escalation past the ceiling when criticals are present.
    pub quality_first: bool,
    /// Path globs that always receive exhaustive verification.
    pub always_exhaustive_patterns: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_total_tokens: 100_000,
            enforce_token_budget: true,
            quality_first: false,
            always_exhaustive_patterns: vec![
                "**/auth/**".to_string(),
                "**/security/**".to_string(),
                "**/*auth*".to_string(),
            ],
        }
    }
}

/// File-selection strategy for spot-check sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingStrategy {
    /// Every eligible file weighs 1.
    Uniform,
    /// Weight by path risk category, history, and fan-in.
    #[default]
    RiskWeighted,
    /// Weight by change metadata when available.
    ChangeWeighted,
    /// Weight by outgoing dependency count.
    DependencyWeighted,
}

/// Sampling-engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingConfig {
    /// Whether sampling of skipped files is active.
    pub enabled: bool,
    /// Percentage of eligible files to sample.
    pub rate: f64,
    /// Lower bound on the sample size.
    pub min_samples: usize,
    /// Upper bound on the sample size.
    pub max_samples: usize,
    /// Weighting strategy.
    pub strategy: SamplingStrategy,
    /// RNG seed for reproducible draws; `None` derives one from the session.
    pub seed: Option<u32>,
    /// Path globs that are never sampled.
    pub never_sample_patterns: Vec<String>,
    /// Path globs that are always included before the weighted draw.
    pub always_sample_patterns: Vec<String>,
    /// Multiplicative boost for paths with recorded misses.
    pub historical_boost: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 10.0,
            min_samples: 2,
            max_samples: 20,
            strategy: SamplingStrategy::RiskWeighted,
            seed: None,
            never_sample_patterns: vec![
                "**/*.min.js".to_string(),
                "**/node_modules/**".to_string(),
                "**/dist/**".to_string(),
            ],
            always_sample_patterns: Vec::new(),
            historical_boost: 1.5,
        }
    }
}

/// Periodic full-verification policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeriodicConfig {
    /// Incremental verifications before a full pass is forced.
    pub incremental_threshold: u32,
    /// Hours since the last full pass before one is forced.
    pub max_hours_since_full: f64,
    /// Session confidence below which a full pass is forced.
    pub confidence_floor: f64,
    /// Path globs whose change always forces a full pass.
    pub always_full_patterns: Vec<String>,
}

impl Default for PeriodicConfig {
    fn default() -> Self {
        Self {
            incremental_threshold: 5,
            max_hours_since_full: 72.0,
            confidence_floor: 0.6,
            always_full_patterns: vec![
                "**/auth/**".to_string(),
                "**/security/**".to_string(),
                "**/payment/**".to_string(),
            ],
        }
    }
}

/// Safeguards coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SafeguardsConfig {
    /// Strict gating blocks convergence on POOR assessments.
    pub strict_mode: bool,
    /// Session confidence below which strict gating blocks.
    pub minimum_acceptable_confidence: f64,
    /// Sampling rate adopted when differential verification is active.
    pub differential_sampling_rate: f64,
    /// Sampling rate adopted when result caching is active.
    pub cache_sampling_rate: f64,
    /// Sampling rate adopted when the tier pipeline is active.
    pub pipeline_sampling_rate: f64,
    /// Tightened incremental threshold while optimizations are active.
    pub optimized_incremental_threshold: u32,
    /// Extra always-full patterns merged in while optimizations are active.
    pub extended_always_full_patterns: Vec<String>,
    /// Periodic full-verification policy.
    pub periodic: PeriodicConfig,
}

impl Default for SafeguardsConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            minimum_acceptable_confidence: 0.65,
            differential_sampling_rate: 15.0,
            cache_sampling_rate: 10.0,
            pipeline_sampling_rate: 8.0,
            optimized_incremental_threshold: 3,
            extended_always_full_patterns: vec!["**/crypto/**".to_string()],
            periodic: PeriodicConfig::default(),
        }
    }
}

/// Storage locations for persisted state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Data directory root; `None` resolves `ELENCHUS_DATA_DIR` then the
    /// platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the effective data directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        if let Ok(dir) = std::env::var("ELENCHUS_DATA_DIR") {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("elenchus")
    }
}

/// Session engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Default round ceiling for new sessions.
    pub default_max_rounds: u32,
    /// Largest file content kept in a session context, in bytes.
    pub max_file_bytes: u64,
    /// Ceiling on files loaded into the initial context.
    pub max_context_files: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_max_rounds: 10,
            max_file_bytes: 512 * 1024,
            max_context_files: 500,
        }
    }
}

/// Aggregate configuration for the elenchus service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ElenchusConfig {
    /// Session engine limits.
    pub session: SessionConfig,
    /// Default mode configuration for new sessions.
    pub mode: ModeConfig,
    /// Mediator and graph limits.
    pub mediator: MediatorConfig,
    /// Differential verification defaults.
    pub differential: DifferentialConfig,
    /// Verification cache defaults.
    pub cache: CacheConfig,
    /// Tier pipeline defaults.
    pub pipeline: PipelineConfig,
    /// Sampling engine defaults.
    pub sampling: SamplingConfig,
    /// Safeguards policy.
    pub safeguards: SafeguardsConfig,
    /// Storage locations.
    pub storage: StorageConfig,
}

impl ElenchusConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ElenchusError::io(format!("Cannot read config {}", path.display()), e))?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.session.default_max_rounds == 0 {
            return Err(ElenchusError::config_field(
                "default_max_rounds must be at least 1",
                "session.defaultMaxRounds",
            ));
        }
        if !(0.0..=100.0).contains(&self.sampling.rate) {
            return Err(ElenchusError::config_field(
                "sampling rate must be within [0, 100]",
                "sampling.rate",
            ));
        }
        if self.sampling.min_samples > self.sampling.max_samples {
            return Err(ElenchusError::config_field(
                "min_samples cannot exceed max_samples",
                "sampling.minSamples",
            ));
        }
        if !(0.0..=1.0).contains(&self.cache.min_confidence) {
            return Err(ElenchusError::config_field(
                "min_confidence must be within [0, 1]",
                "cache.minConfidence",
            ));
        }
        if self.cache.decay_rate_per_hour < 0.0 {
            return Err(ElenchusError::config_field(
                "decay rate cannot be negative",
                "cache.decayRatePerHour",
            ));
        }
        if self.pipeline.max_total_tokens == 0 {
            return Err(ElenchusError::config_field(
                "max_total_tokens must be positive",
                "pipeline.maxTotalTokens",
            ));
        }
        if !(0.0..=1.0).contains(&self.safeguards.minimum_acceptable_confidence) {
            return Err(ElenchusError::config_field(
                "minimum acceptable confidence must be within [0, 1]",
                "safeguards.minimumAcceptableConfidence",
            ));
        }
        if self.mediator.ripple_max_depth == 0 {
            return Err(ElenchusError::config_field(
                "ripple depth must be at least 1",
                "mediator.rippleMaxDepth",
            ));
        }
        Ok(())
    }
}
