//! Stage 1: claim extraction
//!
//! One model call decomposes the input into atomic claims and raw
//! analysis contexts. Parsing is defensive field by field; the
//! deterministic post-validation pass adjusts thesis relevance but never
//! deletes claims (filtering is the quality gate's job).

use crate::scopes::ScopeHint;
use serde_json::{json, Value};
use tracing::{debug, info};
use veridex_contracts::{
    AnalysisContext, AtomicClaim, Centrality, ClaimDirection, ContextType, ExpectedEvidenceProfile,
    ExtractionConfig, GroundingQuality, HarmPotential, InputKind, ThesisRelevance, Warning,
};
use veridex_llm::{CallOptions, LlmClient, LlmError, PromptKey};

/// Stage 1 output.
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    pub implied_claim: String,
    pub claims: Vec<AtomicClaim>,
    pub contexts: Vec<AnalysisContext>,
    pub warnings: Vec<Warning>,
    /// False when the extraction call degraded to its fallback.
    pub well_formed: bool,
}

/// Claim extractor over the LLM call primitive.
#[derive(Debug, Clone)]
pub struct ClaimExtractor {
    llm: LlmClient,
}

impl ClaimExtractor {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Run extraction for an input, passing pre-detected scope hints.
    pub async fn extract(
        &self,
        text: &str,
        kind: InputKind,
        hints: &[ScopeHint],
    ) -> Result<ExtractionOutput, LlmError> {
        let payload = json!({
            "input": text,
            "kind": kind,
            "scope_hints": hints,
        });
        let result = self
            .llm
            .call(PromptKey::ClaimExtraction, &payload, &CallOptions::default())
            .await?;

        let implied_claim = result.value["implied_claim"]
            .as_str()
            .unwrap_or(text)
            .to_string();
        let claims = parse_claims(&result.value["atomic_claims"]);
        let contexts = parse_contexts(&result.value["analysis_contexts"]);
        info!(
            "extraction produced {} claims across {} contexts",
            claims.len(),
            contexts.len()
        );

        let well_formed = result.is_well_formed();
        Ok(ExtractionOutput {
            implied_claim,
            claims,
            contexts,
            warnings: result.warnings,
            well_formed,
        })
    }
}

/// Deterministic thesis-relevance post-validation. Claims below the
/// auto-downgrade threshold lose `direct`; between the thresholds they
/// keep it but are logged. Never deletes.
pub fn validate_thesis_relevance(claims: &mut [AtomicClaim], config: &ExtractionConfig) {
    if !config.thesis_relevance_validation_enabled {
        return;
    }
    for claim in claims.iter_mut() {
        if claim.thesis_relevance != ThesisRelevance::Direct {
            continue;
        }
        let confidence = claim.thesis_relevance_confidence;
        if confidence < config.auto_downgrade_threshold {
            debug!(
                "claim {} relevance downgraded (confidence {:.0})",
                claim.id, confidence
            );
            claim.thesis_relevance = ThesisRelevance::Tangential;
        } else if confidence < config.low_confidence_threshold {
            debug!(
                "claim {} kept direct at low confidence {:.0}",
                claim.id, confidence
            );
        }
    }
}

fn parse_claims(value: &Value) -> Vec<AtomicClaim> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| parse_claim(entry, index))
        .collect()
}

fn parse_claim(value: &Value, index: usize) -> Option<AtomicClaim> {
    let statement = value["statement"].as_str()?.trim().to_string();
    if statement.is_empty() {
        return None;
    }
    let centrality = parse_enum(value, "centrality", Centrality::Medium);
    let is_central = value["is_central"].as_bool().unwrap_or(false) && centrality == Centrality::High;

    Some(AtomicClaim {
        id: format!("CLAIM_{}", index + 1),
        statement,
        category: str_field(value, "category", "general"),
        centrality,
        harm_potential: parse_enum(value, "harm_potential", HarmPotential::Low),
        is_central,
        claim_direction: parse_enum(value, "claim_direction", ClaimDirection::Contextual),
        key_entities: string_list(&value["key_entities"]),
        check_worthiness: value["check_worthiness"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
        specificity_score: value["specificity_score"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
        grounding_quality: parse_enum(value, "grounding_quality", GroundingQuality::Moderate),
        expected_evidence_profile: ExpectedEvidenceProfile {
            methodologies: string_list(&value["expected_evidence_profile"]["methodologies"]),
            expected_metrics: string_list(&value["expected_evidence_profile"]["expected_metrics"]),
            expected_source_types: string_list(
                &value["expected_evidence_profile"]["expected_source_types"],
            ),
        },
        thesis_relevance: parse_enum(value, "thesis_relevance", ThesisRelevance::Direct),
        thesis_relevance_confidence: value["thesis_relevance_confidence"]
            .as_f64()
            .unwrap_or(80.0)
            .clamp(0.0, 100.0),
        is_counter_claim: value["is_counter_claim"].as_bool().unwrap_or(false),
        related_context_id: value["related_context_id"].as_str().map(|s| s.to_string()),
    })
}

fn parse_contexts(value: &Value) -> Vec<AnalysisContext> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let name = entry["name"].as_str()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(AnalysisContext {
                id: entry["id"]
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("RAW_CTX_{}", index + 1)),
                short_name: str_field(entry, "short_name", &name),
                name,
                context_type: parse_enum(entry, "type", ContextType::Other),
                subject: str_field(entry, "subject", ""),
                metadata: entry["metadata"]
                    .as_object()
                    .map(|m| m.clone().into_iter().collect())
                    .unwrap_or_default(),
                date: str_field(entry, "date", ""),
                status: str_field(entry, "status", "unknown"),
            })
        })
        .collect()
}

fn parse_enum<T: serde::de::DeserializeOwned>(value: &Value, key: &str, default: T) -> T {
    value
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(default)
}

fn str_field(value: &Value, key: &str, default: &str) -> String {
    value[key].as_str().unwrap_or(default).to_string()
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}
