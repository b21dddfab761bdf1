//! Result envelope and run-level reporting types

use crate::{
    AnalysisContext, AtomicClaim, ClaimBoundary, ClaimVerdict, CoverageMatrix,
    EvidenceItem, FetchedSource, VerdictNarrative, Warning,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a run completed all stages or terminated early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    Partial,
}

/// Run-level metadata in the result envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMeta {
    pub pipeline: String,
    pub model: String,
    pub provider: String,
    pub schema_version: String,
    pub search_providers: Vec<String>,
    pub llm_call_count: u64,
    /// Content hash of the loaded configuration, for reproducibility.
    pub config_hash: String,
}

/// The decomposition of the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Understanding {
    pub implied_claim: String,
    pub analysis_contexts: Vec<AnalysisContext>,
    pub atomic_claims: Vec<AtomicClaim>,
    pub sub_claims: Vec<String>,
}

/// One executed search query, for the evidence trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQueryRecord {
    pub query: String,
    pub focus: String,
    pub iteration: u32,
    pub results_count: usize,
    pub provider: String,
}

/// Research-stage statistics carried in the result envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchStats {
    pub iterations_by_context: HashMap<String, u32>,
    pub total_searches: u64,
    pub unique_sources: usize,
    pub fetched_ok: usize,
    pub fetched_failed: usize,
    pub llm_calls: u64,
    pub total_tokens: u64,
}

/// Gate 1: claim-fidelity statistics. Never blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gate1Report {
    pub total_claims: usize,
    pub passed_fidelity: usize,
    pub filtered: usize,
    pub central_retained: usize,
    pub passed: bool,
}

/// Confidence band for publishability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Insufficient,
}

/// Classify a confidence score into its publishability band. Idempotent on
/// already-classified values by construction.
pub fn classify_confidence(confidence: f64) -> ConfidenceBand {
    if confidence >= 70.0 {
        ConfidenceBand::High
    } else if confidence >= 45.0 {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::Insufficient
    }
}

/// Gate 4: confidence publishability. Insufficient claims stay in the
/// output but flagged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gate4Report {
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub insufficient_confidence: usize,
    pub insufficient_claim_ids: Vec<String>,
    pub passed: bool,
}

/// Quality-gate outputs, first-class in the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityGates {
    pub gate1: Gate1Report,
    pub gate4: Gate4Report,
    pub all_passed: bool,
}

/// Output of the aggregation stage, before envelope assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAssessment {
    pub overall_truth_percentage: f64,
    pub overall_verdict: String,
    pub confidence: f64,
    pub claim_verdicts: Vec<ClaimVerdict>,
    pub verdict_narrative: Option<VerdictNarrative>,
    pub warnings: Vec<Warning>,
    pub metrics: AggregationMetrics,
}

/// Aggregation accounting: opinion-vs-documented factors and weights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationMetrics {
    pub opinions: usize,
    pub documented: usize,
    pub total_weight: f64,
    pub pruned_tangential: usize,
    pub pruned_opinion_only: usize,
}

/// Top-level analysis result returned to the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub meta: ResultMeta,
    pub understanding: Understanding,
    pub facts: Vec<EvidenceItem>,
    pub sources: Vec<FetchedSource>,
    pub search_queries: Vec<SearchQueryRecord>,
    pub claim_boundaries: Vec<ClaimBoundary>,
    pub coverage_matrix: CoverageMatrix,
    pub claim_verdicts: Vec<ClaimVerdict>,
    pub verdict_narrative: Option<VerdictNarrative>,
    pub quality_gates: QualityGates,
    pub truth_percentage: f64,
    pub confidence: f64,
    pub overall_verdict: String,
    pub warnings: Vec<Warning>,
    pub research_stats: ResearchStats,
    pub status: RunStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_bands() {
        assert_eq!(classify_confidence(70.0), ConfidenceBand::High);
        assert_eq!(classify_confidence(69.9), ConfidenceBand::Medium);
        assert_eq!(classify_confidence(45.0), ConfidenceBand::Medium);
        assert_eq!(classify_confidence(44.9), ConfidenceBand::Insufficient);
        assert_eq!(classify_confidence(0.0), ConfidenceBand::Insufficient);
    }

    #[test]
    fn research_stats_default_is_zeroed() {
        let stats = ResearchStats::default();
        assert_eq!(stats.total_searches, 0);
        assert!(stats.iterations_by_context.is_empty());
    }
}
