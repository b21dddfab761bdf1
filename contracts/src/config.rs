//! Typed configuration surface and loader
//!
//! Configs layer a TOML file under environment overrides (`VERIDEX_*`).
//! Unknown keys surface as warnings; out-of-range numerics fail the load.
//! The loaded config is content-hashed so runs can be tied to the exact
//! configuration that produced them.

use crate::{ModelTier, Warning, WarningType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] config::ConfigError),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    OutOfRange { field: String, reason: String },
}

/// Iteration and token budgets for a single job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_iterations_per_context: u32,
    pub max_total_iterations: u32,
    pub max_total_tokens: u64,
    pub max_tokens_per_call: u64,
    /// When false, budget breaches warn but do not block.
    pub enforce_hard: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_iterations_per_context: 3,
            max_total_iterations: 12,
            max_total_tokens: 400_000,
            max_tokens_per_call: 16_000,
            enforce_hard: true,
        }
    }
}

/// Date restriction for search queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRestrict {
    Year,
    Month,
    Week,
    #[default]
    None,
}

impl DateRestrict {
    /// Provider query-parameter form, when restricted.
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            DateRestrict::Year => Some("y"),
            DateRestrict::Month => Some("m"),
            DateRestrict::Week => Some("w"),
            DateRestrict::None => None,
        }
    }
}

/// Which search provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchProviderChoice {
    #[default]
    Auto,
    Serpapi,
    GoogleCse,
}

/// Search orchestrator options. Caps are enforced at load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results kept per query; cap 10.
    pub max_results_per_query: usize,
    /// Evidence items gathered before phases stop; cap 20.
    pub max_evidence_items: usize,
    pub date_restrict: DateRestrict,
    pub provider: SearchProviderChoice,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results_per_query: 3,
            max_evidence_items: 8,
            date_restrict: DateRestrict::None,
            provider: SearchProviderChoice::Auto,
        }
    }
}

/// Toggle for the self-consistency step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfConsistencyMode {
    #[default]
    Enabled,
    Disabled,
}

/// Model tier per debate step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateProfile {
    pub advocate: ModelTier,
    pub self_consistency: ModelTier,
    pub challenger: ModelTier,
    pub reconciler: ModelTier,
    pub validators: ModelTier,
}

impl Default for DebateProfile {
    fn default() -> Self {
        Self {
            advocate: ModelTier::Sonnet,
            self_consistency: ModelTier::Sonnet,
            challenger: ModelTier::Sonnet,
            reconciler: ModelTier::Sonnet,
            validators: ModelTier::Haiku,
        }
    }
}

/// Spread-band confidence multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadMultipliers {
    pub stable: f64,
    pub moderate: f64,
    pub wide: f64,
    pub unstable: f64,
}

impl Default for SpreadMultipliers {
    fn default() -> Self {
        Self {
            stable: 1.0,
            moderate: 0.9,
            wide: 0.7,
            unstable: 0.4,
        }
    }
}

/// Verdict debate engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    pub profile: DebateProfile,
    /// Provider family requested for the debate steps; falls back to the
    /// global default (with a warning) when it is not the one configured.
    pub provider: Option<String>,
    pub self_consistency_mode: SelfConsistencyMode,
    /// Clamped to [0.1, 0.7]; forced to 0 under deterministic mode.
    pub self_consistency_temperature: f64,
    pub stable_threshold: f64,
    pub moderate_threshold: f64,
    pub unstable_threshold: f64,
    pub spread_multipliers: SpreadMultipliers,
    /// Confidence floor below which elevated-harm verdicts read UNVERIFIED.
    pub high_harm_min_confidence: f64,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            profile: DebateProfile::default(),
            provider: None,
            self_consistency_mode: SelfConsistencyMode::Enabled,
            self_consistency_temperature: 0.4,
            stable_threshold: 5.0,
            moderate_threshold: 12.0,
            unstable_threshold: 20.0,
            spread_multipliers: SpreadMultipliers::default(),
            high_harm_min_confidence: 50.0,
        }
    }
}

impl DebateConfig {
    /// Confidence multiplier for a consistency spread.
    pub fn spread_multiplier(&self, spread: f64) -> f64 {
        if spread <= self.stable_threshold {
            self.spread_multipliers.stable
        } else if spread <= self.moderate_threshold {
            self.spread_multipliers.moderate
        } else if spread <= self.unstable_threshold {
            self.spread_multipliers.wide
        } else {
            self.spread_multipliers.unstable
        }
    }
}

/// Claim-extraction post-validation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub thesis_relevance_validation_enabled: bool,
    /// Below this, keep but log.
    pub low_confidence_threshold: f64,
    /// Below this, downgrade direct to tangential.
    pub auto_downgrade_threshold: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            thesis_relevance_validation_enabled: true,
            low_confidence_threshold: 70.0,
            auto_downgrade_threshold: 60.0,
        }
    }
}

/// Aggregation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub min_evidence_for_tangential: usize,
    pub require_quality_evidence: bool,
    /// Opinion-ratio percentage above which a warning is emitted.
    pub warning_threshold_percent: f64,
    /// When > 0, surplus opinion-only factors beyond this count are dropped.
    pub max_opinion_count: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_evidence_for_tangential: 2,
            require_quality_evidence: false,
            warning_threshold_percent: 70.0,
            max_opinion_count: 0,
        }
    }
}

/// Per-call and per-stage timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub per_call_timeout_secs: u64,
    pub per_stage_budget_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            per_call_timeout_secs: 60,
            per_stage_budget_secs: 300,
        }
    }
}

/// Calibration thresholds for the paired-input runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub max_pair_skew: f64,
    pub max_mean_directional_skew: f64,
    pub min_pass_rate: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_pair_skew: 20.0,
            max_mean_directional_skew: 10.0,
            min_pass_rate: 0.8,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Default provider family for all tiers.
    pub llm_provider: Option<String>,
    pub deterministic: bool,
    pub budget: BudgetConfig,
    pub search: SearchConfig,
    pub debate: DebateConfig,
    pub extraction: ExtractionConfig,
    pub aggregation: AggregationConfig,
    pub timeouts: TimeoutConfig,
    pub calibration: CalibrationConfig,
}

impl PipelineConfig {
    /// Validate ranges, clamping capped values. Returns warnings for
    /// clamps; hard errors for nonsensical values.
    pub fn validate(&mut self) -> Result<Vec<Warning>, ConfigError> {
        let mut warnings = Vec::new();

        if self.search.max_results_per_query > 10 {
            warnings.push(clamp_warning("search.max_results_per_query", 10));
            self.search.max_results_per_query = 10;
        }
        if self.search.max_evidence_items > 20 {
            warnings.push(clamp_warning("search.max_evidence_items", 20));
            self.search.max_evidence_items = 20;
        }
        if self.search.max_results_per_query == 0 {
            return Err(ConfigError::OutOfRange {
                field: "search.max_results_per_query".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.debate.self_consistency_temperature) {
            return Err(ConfigError::OutOfRange {
                field: "debate.self_consistency_temperature".to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&self.debate.high_harm_min_confidence) {
            return Err(ConfigError::OutOfRange {
                field: "debate.high_harm_min_confidence".to_string(),
                reason: "must be within [0, 100]".to_string(),
            });
        }
        if self.debate.stable_threshold > self.debate.moderate_threshold
            || self.debate.moderate_threshold > self.debate.unstable_threshold
        {
            return Err(ConfigError::OutOfRange {
                field: "debate spread thresholds".to_string(),
                reason: "must be ordered stable <= moderate <= unstable".to_string(),
            });
        }
        if self.budget.max_iterations_per_context == 0 || self.budget.max_total_iterations == 0 {
            return Err(ConfigError::OutOfRange {
                field: "budget iteration caps".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(warnings)
    }

    /// Content hash of this configuration, for reproducibility metadata.
    pub fn content_hash(&self) -> String {
        // serde_json writes struct fields in declaration order, which is
        // stable per build.
        let serialized = serde_json::to_string(self).unwrap_or_default();
        format!("{:x}", md5::compute(serialized.as_bytes()))
    }
}

fn clamp_warning(field: &str, cap: usize) -> Warning {
    Warning {
        warning_type: WarningType::StructuralInvariantViolation,
        severity: crate::WarningSeverity::Warning,
        message: format!("{field} exceeds cap; clamped to {cap}"),
        details: serde_json::json!({ "field": field, "cap": cap }),
    }
}

/// Top-level keys accepted in a config file.
const KNOWN_KEYS: &[&str] = &[
    "llm_provider",
    "deterministic",
    "budget",
    "search",
    "debate",
    "extraction",
    "aggregation",
    "timeouts",
    "calibration",
];

/// Load configuration from an optional TOML file layered under `VERIDEX_*`
/// environment overrides. Unknown top-level keys become warnings.
pub fn load_config(path: Option<&Path>) -> Result<(PipelineConfig, Vec<Warning>), ConfigError> {
    let mut warnings = Vec::new();

    if let Some(path) = path {
        if let Ok(raw) = std::fs::read_to_string(path) {
            let value: toml::Value = toml::from_str(&raw)?;
            if let Some(table) = value.as_table() {
                let known: BTreeSet<&str> = KNOWN_KEYS.iter().copied().collect();
                for key in table.keys() {
                    if !known.contains(key.as_str()) {
                        warnings.push(Warning {
                            warning_type: WarningType::StructuralInvariantViolation,
                            severity: crate::WarningSeverity::Warning,
                            message: format!("unknown config key `{key}` ignored"),
                            details: serde_json::json!({ "key": key }),
                        });
                    }
                }
            }
        }
    }

    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix("VERIDEX")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut cfg: PipelineConfig = settings.try_deserialize()?;
    warnings.extend(cfg.validate()?);
    Ok((cfg, warnings))
}
