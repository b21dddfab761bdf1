//! Atomic claims and analysis contexts
//!
//! An atomic claim is a minimal verifiable assertion extracted from the
//! input. An analysis context (scope) is a bounded frame within which a
//! claim is judged: a legal proceeding, a methodology, a region, a time
//! window.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Centrality of a claim to the input's thesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Centrality {
    High,
    Medium,
    Low,
}

/// Potential for real-world harm if the claim is judged incorrectly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarmPotential {
    Critical,
    High,
    Medium,
    Low,
}

impl HarmPotential {
    /// Critical and high harm claims are held to the confidence floor.
    pub fn is_elevated(&self) -> bool {
        matches!(self, HarmPotential::Critical | HarmPotential::High)
    }
}

/// Direction of a claim relative to the input's thesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimDirection {
    SupportsThesis,
    ContradictsThesis,
    Contextual,
}

/// How directly a claim bears on the thesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThesisRelevance {
    Direct,
    Tangential,
    Irrelevant,
}

/// How well a claim is grounded in the input text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundingQuality {
    Strong,
    Moderate,
    Weak,
    None,
}

/// The evidence profile an extraction expects verification to need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedEvidenceProfile {
    pub methodologies: Vec<String>,
    pub expected_metrics: Vec<String>,
    pub expected_source_types: Vec<String>,
}

/// A minimal verifiable assertion extracted from the input.
///
/// Invariants: `id` is unique within a run; `is_central` implies
/// `centrality == High`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicClaim {
    pub id: String,
    pub statement: String,
    pub category: String,
    pub centrality: Centrality,
    pub harm_potential: HarmPotential,
    pub is_central: bool,
    pub claim_direction: ClaimDirection,
    pub key_entities: Vec<String>,
    pub check_worthiness: f64,
    /// How precisely the statement pins down a verifiable fact, in [0,1].
    pub specificity_score: f64,
    pub grounding_quality: GroundingQuality,
    pub expected_evidence_profile: ExpectedEvidenceProfile,
    pub thesis_relevance: ThesisRelevance,
    /// Confidence in the relevance judgment, in [0,100].
    pub thesis_relevance_confidence: f64,
    pub is_counter_claim: bool,
    pub related_context_id: Option<String>,
}

impl AtomicClaim {
    /// Centrality must be high for a claim marked central.
    pub fn is_well_formed(&self) -> bool {
        !self.is_central || self.centrality == Centrality::High
    }
}

/// Type of an analysis context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Legal,
    Methodological,
    Geographic,
    Temporal,
    Other,
}

impl ContextType {
    /// Provider-invariant rank used for the canonical context sort.
    pub fn type_rank(&self) -> u8 {
        match self {
            ContextType::Legal => 0,
            ContextType::Methodological => 1,
            ContextType::Geographic => 2,
            ContextType::Temporal => 3,
            ContextType::Other => 4,
        }
    }
}

/// Reserved id for the fallback context appended when extraction produced
/// no contexts at all.
pub const CTX_GENERAL: &str = "CTX_1";

/// Reserved sink context for evidence that cannot be attributed to exactly
/// one context. Unscoped evidence is excluded from per-context aggregation.
pub const CTX_UNSCOPED: &str = "CTX_UNSCOPED";

/// A bounded frame within which claims are judged.
///
/// Invariant: at least one context always exists; the fallback is
/// `CTX_1` / "General context".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// Stable canonical id (`CTX_FTC`, `CTX_2`, ...).
    pub id: String,
    pub name: String,
    pub short_name: String,
    #[serde(rename = "type")]
    pub context_type: ContextType,
    pub subject: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Empty unless the input carried an explicit 4-digit year.
    pub date: String,
    /// "unknown" unless the input carried an explicit status anchor word.
    pub status: String,
}

impl AnalysisContext {
    /// The fallback context used when extraction found none.
    pub fn general() -> Self {
        Self {
            id: CTX_GENERAL.to_string(),
            name: "General context".to_string(),
            short_name: "General".to_string(),
            context_type: ContextType::Other,
            subject: String::new(),
            metadata: HashMap::new(),
            date: String::new(),
            status: "unknown".to_string(),
        }
    }

    pub fn is_general(&self) -> bool {
        self.id == CTX_GENERAL || self.short_name == "General"
    }

    pub fn is_unscoped(&self) -> bool {
        self.id == CTX_UNSCOPED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_claim_requires_high_centrality() {
        let mut claim = AtomicClaim {
            id: "CLAIM_1".to_string(),
            statement: "Ten children died after the treatment".to_string(),
            category: "health".to_string(),
            centrality: Centrality::High,
            harm_potential: HarmPotential::High,
            is_central: true,
            claim_direction: ClaimDirection::SupportsThesis,
            key_entities: vec!["children".to_string()],
            check_worthiness: 0.9,
            specificity_score: 0.8,
            grounding_quality: GroundingQuality::Strong,
            expected_evidence_profile: ExpectedEvidenceProfile::default(),
            thesis_relevance: ThesisRelevance::Direct,
            thesis_relevance_confidence: 90.0,
            is_counter_claim: false,
            related_context_id: None,
        };
        assert!(claim.is_well_formed());

        claim.centrality = Centrality::Low;
        assert!(!claim.is_well_formed());
    }

    #[test]
    fn context_type_rank_is_total() {
        let mut ranks: Vec<u8> = [
            ContextType::Legal,
            ContextType::Methodological,
            ContextType::Geographic,
            ContextType::Temporal,
            ContextType::Other,
        ]
        .iter()
        .map(|t| t.type_rank())
        .collect();
        ranks.dedup();
        assert_eq!(ranks.len(), 5);
    }

    #[test]
    fn general_context_is_fallback() {
        let ctx = AnalysisContext::general();
        assert_eq!(ctx.id, CTX_GENERAL);
        assert!(ctx.is_general());
        assert_eq!(ctx.status, "unknown");
        assert!(ctx.date.is_empty());
    }
}
