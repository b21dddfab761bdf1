//! Stage 3: boundary clustering
//!
//! One model call groups evidence into claim-assessment boundaries by
//! methodology, geography, or temporality. Deterministic post-processing
//! assigns canonical boundary ids, writes `claim_boundary_id` onto the
//! evidence, and builds the coverage matrix.

use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};
use veridex_contracts::{
    AtomicClaim, ClaimBoundary, CoverageMatrix, EvidenceItem, Warning,
};
use veridex_llm::{CallOptions, LlmClient, LlmError, PromptKey};

/// Output of the clustering stage.
#[derive(Debug, Clone)]
pub struct ClusteringOutput {
    pub boundaries: Vec<ClaimBoundary>,
    pub coverage: CoverageMatrix,
    pub warnings: Vec<Warning>,
}

/// The clustering stage.
#[derive(Debug, Clone)]
pub struct ClusteringStage {
    llm: LlmClient,
}

impl ClusteringStage {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Cluster evidence into boundaries, mutating each item's
    /// `claim_boundary_id`. Assignments naming unknown evidence ids are
    /// ignored.
    pub async fn run(
        &self,
        claims: &[AtomicClaim],
        evidence: &mut [EvidenceItem],
    ) -> Result<ClusteringOutput, LlmError> {
        let payload = json!({
            "claims": claims.iter().map(|c| json!({
                "claim_id": c.id,
                "statement": c.statement,
            })).collect::<Vec<_>>(),
            "evidence": evidence.iter().map(|e| json!({
                "evidence_id": e.id,
                "statement": e.statement,
                "scope": e.evidence_scope,
                "context_id": e.context_id,
            })).collect::<Vec<_>>(),
        });
        let result = self
            .llm
            .call(PromptKey::BoundaryClustering, &payload, &CallOptions::default())
            .await?;
        let warnings = result.warnings.clone();

        // Canonical CB ids are assigned in emission order; the model's own
        // ids survive only inside the remap.
        let mut boundaries = Vec::new();
        let mut id_remap: HashMap<String, String> = HashMap::new();
        if let Some(entries) = result.value["boundaries"].as_array() {
            for (index, entry) in entries.iter().enumerate() {
                let Some(name) = entry["name"].as_str() else {
                    continue;
                };
                let canonical = format!("CB_{}", boundaries.len() + 1);
                if let Some(model_id) = entry["id"].as_str() {
                    id_remap.insert(model_id.to_string(), canonical.clone());
                }
                boundaries.push(ClaimBoundary {
                    id: canonical,
                    name: name.to_string(),
                    short_name: entry["short_name"]
                        .as_str()
                        .unwrap_or(name)
                        .to_string(),
                    methodology: entry["methodology"].as_str().map(|s| s.to_string()),
                    geographic: entry["geographic"].as_str().map(|s| s.to_string()),
                    temporal: entry["temporal"].as_str().map(|s| s.to_string()),
                    internal_coherence: entry["internal_coherence"]
                        .as_f64()
                        .unwrap_or(0.5)
                        .clamp(0.0, 1.0),
                    constituent_contexts: entry["constituent_contexts"]
                        .as_array()
                        .map(|ctxs| {
                            ctxs.iter()
                                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                                .collect()
                        })
                        .unwrap_or_default(),
                    evidence_count: 0,
                });
                debug!("boundary CB_{} ({name})", index + 1);
            }
        }

        let mut evidence_index: HashMap<String, usize> = evidence
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        if let Some(assignments) = result.value["assignments"].as_array() {
            for assignment in assignments {
                let (Some(evidence_id), Some(boundary_id)) = (
                    assignment["evidence_id"].as_str(),
                    assignment["boundary_id"].as_str(),
                ) else {
                    continue;
                };
                let canonical = id_remap
                    .get(boundary_id)
                    .cloned()
                    .or_else(|| {
                        boundaries
                            .iter()
                            .find(|b| b.id == boundary_id)
                            .map(|b| b.id.clone())
                    });
                let Some(canonical) = canonical else {
                    continue;
                };
                if let Some(&index) = evidence_index.get(evidence_id) {
                    evidence[index].claim_boundary_id = Some(canonical);
                }
            }
        }
        evidence_index.clear();

        for boundary in boundaries.iter_mut() {
            boundary.evidence_count = evidence
                .iter()
                .filter(|e| e.claim_boundary_id.as_deref() == Some(boundary.id.as_str()))
                .count();
        }

        let claim_ids: Vec<String> = claims.iter().map(|c| c.id.clone()).collect();
        let boundary_ids: Vec<String> = boundaries.iter().map(|b| b.id.clone()).collect();
        let coverage = CoverageMatrix::build(&claim_ids, &boundary_ids, evidence);

        info!(
            "clustering produced {} boundaries over {} evidence items",
            boundaries.len(),
            evidence.len()
        );
        Ok(ClusteringOutput {
            boundaries,
            coverage,
            warnings,
        })
    }
}
