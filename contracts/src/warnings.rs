//! Warning taxonomy, stage errors, and stage events
//!
//! Recoverable conditions stay local with one retry and a warning. Stage
//! failures bubble as `StageError`. Fatal budget or pause conditions end the
//! run with a partial result; they never escape the orchestrator.

use crate::{ModelTier, ProviderKind};
use serde::{Deserialize, Serialize};

/// Closed warning taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    /// Unique source count is 0 after research.
    NoSuccessfulSources,
    /// Zero sources after at least 10 searches ran.
    SourceAcquisitionCollapse,
    /// LLM output failed schema validation after one retry.
    StructuredOutputFailure,
    /// Soft refusal detected in an LLM response.
    ContentPolicySoftRefusal,
    /// Propagated from the search orchestrator.
    SearchProviderError,
    /// Configured debate provider unavailable; global default used.
    DebateProviderFallback,
    /// Run terminated early by the circuit breaker.
    SystemPaused,
    /// Iteration or token budget exhausted.
    BudgetExceeded,
    /// The deterministic structural consistency check failed an invariant.
    StructuralInvariantViolation,
    /// Verdict downgraded to UNVERIFIED by the harm-confidence floor.
    HarmConfidenceFloorTriggered,
}

impl WarningType {
    /// Default severity for this warning type.
    pub fn default_severity(&self) -> WarningSeverity {
        match self {
            WarningType::NoSuccessfulSources
            | WarningType::SourceAcquisitionCollapse
            | WarningType::SystemPaused
            | WarningType::BudgetExceeded => WarningSeverity::Error,
            WarningType::StructuredOutputFailure
            | WarningType::ContentPolicySoftRefusal
            | WarningType::SearchProviderError
            | WarningType::DebateProviderFallback
            | WarningType::StructuralInvariantViolation => WarningSeverity::Warning,
            WarningType::HarmConfidenceFloorTriggered => WarningSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}

/// A warning surfaced in the result envelope. None are silently swallowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    #[serde(rename = "type")]
    pub warning_type: WarningType,
    pub severity: WarningSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl Warning {
    pub fn new(warning_type: WarningType, message: impl Into<String>) -> Self {
        Self {
            warning_type,
            severity: warning_type.default_severity(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Pipeline stage identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Research,
    Clustering,
    Verdict,
    Aggregation,
}

impl Stage {
    pub fn number(&self) -> u8 {
        match self {
            Stage::Extraction => 1,
            Stage::Research => 2,
            Stage::Clustering => 3,
            Stage::Verdict => 4,
            Stage::Aggregation => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Research => "research",
            Stage::Clustering => "clustering",
            Stage::Verdict => "verdict",
            Stage::Aggregation => "aggregation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Structured error crossing a stage boundary.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("stage {stage} failed: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
    pub prompt_key: Option<String>,
    pub provider: Option<ProviderKind>,
    pub model: Option<ModelTier>,
    /// Which side of a parallel step failed, when applicable.
    pub side: Option<String>,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            prompt_key: None,
            provider: None,
            model: None,
            side: None,
        }
    }

    pub fn with_prompt(mut self, prompt_key: impl Into<String>, model: ModelTier) -> Self {
        self.prompt_key = Some(prompt_key.into());
        self.provider = Some(ProviderKind::Llm);
        self.model = Some(model);
        self
    }

    pub fn with_side(mut self, side: impl Into<String>) -> Self {
        self.side = Some(side.into());
        self
    }
}

/// Event emitted after each stage completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub name: String,
    pub duration_ms: u64,
    pub tokens_used: u64,
    pub warnings_count: usize,
}
