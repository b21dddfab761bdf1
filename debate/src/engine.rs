//! The five-step debate engine
//!
//! Step 1 advocate, Step 2 self-consistency and Step 3 adversarial
//! challenge (run concurrently, joined before reconciliation), Step 4
//! reconciliation, Step 5 advisory validation. Structural invariants are
//! enforced deterministically between model turns.

use crate::adjustments::{
    apply_spread_adjustment, enforce_harm_confidence_floor, triangulation_score,
};
use crate::consistency::structural_consistency_check;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};
use veridex_contracts::{
    AtomicClaim, BoundaryFinding, ChallengeDocument, ChallengeResponse, ClaimBoundary,
    ClaimVerdict, ConsistencyResult, CoverageMatrix, DebateConfig, EvidenceItem, FactualBasis,
    SelfConsistencyMode, VerdictLabel, Warning,
};
use veridex_llm::{CallOptions, CallResult, LlmClient, LlmError, PromptKey};

/// A debate step failure, carrying which side of the sequence failed.
#[derive(Debug, thiserror::Error)]
#[error("debate step `{side}` failed: {source}")]
pub struct DebateError {
    pub side: &'static str,
    #[source]
    pub source: LlmError,
}

/// Immutable view of the material a debate runs over.
#[derive(Debug, Clone, Copy)]
pub struct DebateInput<'a> {
    pub claims: &'a [AtomicClaim],
    pub evidence: &'a [EvidenceItem],
    pub boundaries: &'a [ClaimBoundary],
    pub coverage: &'a CoverageMatrix,
}

/// Outcome of a full debate over the claim set.
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    pub verdicts: Vec<ClaimVerdict>,
    pub challenges: ChallengeDocument,
    pub warnings: Vec<Warning>,
}

/// The debate engine.
#[derive(Debug, Clone)]
pub struct DebateEngine {
    llm: LlmClient,
    config: DebateConfig,
}

impl DebateEngine {
    pub fn new(llm: LlmClient, config: DebateConfig) -> Self {
        Self { llm, config }
    }

    /// Run the five steps over the claim set.
    pub async fn run(&self, input: DebateInput<'_>) -> Result<DebateOutcome, DebateError> {
        let mut warnings = Vec::new();

        // Step 1: advocate.
        let advocate_result = self
            .advocate_call(&input, self.default_temperature())
            .await
            .map_err(|source| DebateError {
                side: "advocate",
                source,
            })?;
        warnings.extend(advocate_result.warnings.clone());
        let mut verdicts = self.parse_verdicts(&advocate_result.value, input.claims);
        info!("advocate produced {} verdicts", verdicts.len());

        // Steps 2 and 3 run concurrently and rejoin before reconciliation.
        let (consistency, challenge) = tokio::join!(
            self.self_consistency(&input, &verdicts),
            self.challenger_call(&input, &verdicts),
        );
        let consistency = consistency.map_err(|source| DebateError {
            side: "self_consistency",
            source,
        })?;
        let (challenges, mut challenge_warnings) = challenge.map_err(|source| DebateError {
            side: "challenger",
            source,
        })?;
        warnings.append(&mut challenge_warnings);

        for verdict in verdicts.iter_mut() {
            verdict.consistency_result = consistency.get(&verdict.claim_id).cloned();
        }

        // Step 4: reconciliation, preserving advocate evidence lists.
        let mut reconcile_warnings = self
            .reconcile(&mut verdicts, &challenges, &consistency)
            .await
            .map_err(|source| DebateError {
                side: "reconciliation",
                source,
            })?;
        warnings.append(&mut reconcile_warnings);

        // Step 5: advisory validation; issues surface as warnings only.
        let mut validation_warnings = self
            .validate(&input, &verdicts)
            .await
            .map_err(|source| DebateError {
                side: "validation",
                source,
            })?;
        warnings.append(&mut validation_warnings);

        // Deterministic post-processing.
        for verdict in verdicts.iter_mut() {
            apply_spread_adjustment(verdict, &self.config);
            verdict.triangulation_score = Some(triangulation_score(verdict));
            if let Some(warning) = enforce_harm_confidence_floor(verdict, &self.config) {
                warnings.push(warning);
            }
        }
        warnings.extend(structural_consistency_check(
            &verdicts,
            input.evidence,
            input.boundaries,
            input.coverage,
        ));

        Ok(DebateOutcome {
            verdicts,
            challenges,
            warnings,
        })
    }

    fn default_temperature(&self) -> f64 {
        self.config.self_consistency_temperature
    }

    async fn advocate_call(
        &self,
        input: &DebateInput<'_>,
        temperature: f64,
    ) -> Result<CallResult, LlmError> {
        let payload = json!({
            "claims": input.claims.iter().map(claim_payload).collect::<Vec<_>>(),
            "evidence": input.evidence.iter().map(evidence_payload).collect::<Vec<_>>(),
            "boundaries": input.boundaries,
        });
        let options = CallOptions::with_tier(self.config.profile.advocate)
            .with_temperature(temperature);
        self.llm
            .call(PromptKey::VerdictAdvocate, &payload, &options)
            .await
    }

    /// Step 2: two additional advocate runs measuring verdict spread.
    /// Disabled mode yields unassessed results with zero spread.
    async fn self_consistency(
        &self,
        input: &DebateInput<'_>,
        advocate_verdicts: &[ClaimVerdict],
    ) -> Result<HashMap<String, ConsistencyResult>, LlmError> {
        let mut results = HashMap::new();

        if self.config.self_consistency_mode == SelfConsistencyMode::Disabled {
            for verdict in advocate_verdicts {
                results.insert(
                    verdict.claim_id.clone(),
                    ConsistencyResult::unassessed(&verdict.claim_id, verdict.truth_percentage),
                );
            }
            return Ok(results);
        }

        let temperature = self
            .config
            .self_consistency_temperature
            .clamp(0.1, 0.7);
        let mut samples: HashMap<String, Vec<f64>> = advocate_verdicts
            .iter()
            .map(|v| (v.claim_id.clone(), vec![v.truth_percentage]))
            .collect();

        for repeat in 0..2 {
            let result = self.advocate_call(input, temperature).await?;
            let repeat_verdicts = self.parse_verdicts(&result.value, input.claims);
            debug!("self-consistency repeat {} parsed", repeat + 1);
            for verdict in repeat_verdicts {
                if let Some(entry) = samples.get_mut(&verdict.claim_id) {
                    entry.push(verdict.truth_percentage);
                }
            }
            // A claim missing from a repeat reuses its advocate sample so
            // the spread never shrinks from dropout.
            for entry in samples.values_mut() {
                if entry.len() < repeat + 2 {
                    let first = entry[0];
                    entry.push(first);
                }
            }
        }

        for (claim_id, percentages) in samples {
            results.insert(
                claim_id.clone(),
                ConsistencyResult::from_samples(claim_id, percentages, self.config.stable_threshold),
            );
        }
        Ok(results)
    }

    /// Step 3: the adversarial challenger.
    async fn challenger_call(
        &self,
        input: &DebateInput<'_>,
        verdicts: &[ClaimVerdict],
    ) -> Result<(ChallengeDocument, Vec<Warning>), LlmError> {
        let payload = json!({
            "verdicts": verdicts.iter().map(verdict_payload).collect::<Vec<_>>(),
            "evidence": input.evidence.iter().map(evidence_payload).collect::<Vec<_>>(),
        });
        let options = CallOptions::with_tier(self.config.profile.challenger);
        let result = self
            .llm
            .call(PromptKey::VerdictChallenger, &payload, &options)
            .await?;
        let document: ChallengeDocument =
            serde_json::from_value(result.value.clone()).unwrap_or_default();
        Ok((document, result.warnings))
    }

    /// Step 4: reconciliation. Claims absent from the response keep the
    /// advocate verdict unchanged; boundary findings and evidence id
    /// lists always survive from the advocate.
    async fn reconcile(
        &self,
        verdicts: &mut [ClaimVerdict],
        challenges: &ChallengeDocument,
        consistency: &HashMap<String, ConsistencyResult>,
    ) -> Result<Vec<Warning>, LlmError> {
        // Stable ordering keeps deterministic-mode prompts identical.
        let mut consistency_rows: Vec<&ConsistencyResult> = consistency.values().collect();
        consistency_rows.sort_by(|a, b| a.claim_id.cmp(&b.claim_id));
        let payload = json!({
            "verdicts": verdicts.iter().map(verdict_payload).collect::<Vec<_>>(),
            "challenges": challenges,
            "consistency": consistency_rows,
        });
        let options = CallOptions::with_tier(self.config.profile.reconciler);
        let result = self
            .llm
            .call(PromptKey::VerdictReconciliation, &payload, &options)
            .await?;

        let revised: HashMap<String, &Value> = result.value["verdicts"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v["claim_id"].as_str().map(|id| (id.to_string(), v)))
                    .collect()
            })
            .unwrap_or_default();

        for verdict in verdicts.iter_mut() {
            let Some(entry) = revised.get(&verdict.claim_id) else {
                continue;
            };
            if let Some(truth) = entry["truth_percentage"].as_f64() {
                verdict.truth_percentage = truth.clamp(0.0, 100.0);
                verdict.verdict = VerdictLabel::for_percentage(verdict.truth_percentage);
            }
            if let Some(confidence) = entry["confidence"].as_f64() {
                verdict.confidence = confidence.clamp(0.0, 100.0);
            }
            if let Some(reasoning) = entry["reasoning"].as_str() {
                verdict.reasoning = reasoning.to_string();
            }
            verdict.challenge_responses = entry["challenge_responses"]
                .as_array()
                .map(|responses| {
                    responses
                        .iter()
                        .filter_map(|r| {
                            Some(ChallengeResponse {
                                challenge_type: r["challenge_type"].as_str()?.to_string(),
                                response: r["response"].as_str().unwrap_or_default().to_string(),
                                verdict_adjusted: r["verdict_adjusted"].as_bool().unwrap_or(false),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
        }
        Ok(result.warnings)
    }

    /// Step 5: grounding and direction validation, two calls in parallel.
    async fn validate(
        &self,
        input: &DebateInput<'_>,
        verdicts: &[ClaimVerdict],
    ) -> Result<Vec<Warning>, LlmError> {
        let payload = json!({
            "verdicts": verdicts.iter().map(verdict_payload).collect::<Vec<_>>(),
            "evidence_ids": input.evidence.iter().map(|e| &e.id).collect::<Vec<_>>(),
        });
        let options = CallOptions::with_tier(self.config.profile.validators);
        let (grounding, direction) = tokio::join!(
            self.llm
                .call(PromptKey::ValidationGrounding, &payload, &options),
            self.llm
                .call(PromptKey::ValidationDirection, &payload, &options),
        );
        let grounding = grounding?;
        let direction = direction?;

        let mut warnings = Vec::new();
        warnings.extend(grounding.warnings.clone());
        warnings.extend(direction.warnings.clone());
        for (kind, result) in [("grounding", &grounding), ("direction", &direction)] {
            if let Some(issues) = result.value["issues"].as_array() {
                for issue in issues {
                    let message = issue
                        .as_str()
                        .map(|s| s.to_string())
                        .or_else(|| issue["description"].as_str().map(|s| s.to_string()))
                        .unwrap_or_else(|| issue.to_string());
                    warnings.push(
                        Warning::new(
                            veridex_contracts::WarningType::StructuralInvariantViolation,
                            format!("{kind} validation: {message}"),
                        )
                        .with_details(json!({ "validator": kind })),
                    );
                }
            }
        }
        Ok(warnings)
    }

    /// Parse and sanitize advocate-format verdicts, one per input claim.
    /// Claims missing from the response get a neutral default.
    fn parse_verdicts(&self, value: &Value, claims: &[AtomicClaim]) -> Vec<ClaimVerdict> {
        let by_claim: HashMap<&str, &Value> = value["verdicts"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v["claim_id"].as_str().map(|id| (id, v)))
                    .collect()
            })
            .unwrap_or_default();

        claims
            .iter()
            .enumerate()
            .map(|(index, claim)| {
                let entry = by_claim.get(claim.id.as_str());
                parse_verdict_entry(entry.copied(), claim, index)
            })
            .collect()
    }
}

fn claim_payload(claim: &AtomicClaim) -> Value {
    json!({
        "claim_id": claim.id,
        "statement": claim.statement,
        "harm_potential": claim.harm_potential,
        "is_counter_claim": claim.is_counter_claim,
        "context_id": claim.related_context_id,
    })
}

fn evidence_payload(evidence: &EvidenceItem) -> Value {
    json!({
        "evidence_id": evidence.id,
        "statement": evidence.statement,
        "direction": evidence.claim_direction,
        "probative_value": evidence.probative_value,
        "boundary_id": evidence.claim_boundary_id,
        "context_id": evidence.context_id,
    })
}

fn verdict_payload(verdict: &ClaimVerdict) -> Value {
    json!({
        "claim_id": verdict.claim_id,
        "truth_percentage": verdict.truth_percentage,
        "confidence": verdict.confidence,
        "reasoning": verdict.reasoning,
        "supporting_evidence_ids": verdict.supporting_evidence_ids,
        "contradicting_evidence_ids": verdict.contradicting_evidence_ids,
        "boundary_findings": verdict.boundary_findings,
    })
}

fn parse_verdict_entry(entry: Option<&Value>, claim: &AtomicClaim, index: usize) -> ClaimVerdict {
    let entry = entry.cloned().unwrap_or_else(|| json!({}));
    let truth = entry["truth_percentage"].as_f64().unwrap_or(50.0).clamp(0.0, 100.0);
    let confidence = entry["confidence"].as_f64().unwrap_or(30.0).clamp(0.0, 100.0);

    let boundary_findings = entry["boundary_findings"]
        .as_array()
        .map(|findings| {
            findings
                .iter()
                .filter_map(|f| {
                    Some(BoundaryFinding {
                        boundary_id: f["boundary_id"].as_str()?.to_string(),
                        truth_percentage: f["truth_percentage"]
                            .as_f64()
                            .unwrap_or(50.0)
                            .clamp(0.0, 100.0),
                        confidence: f["confidence"].as_f64().unwrap_or(50.0).clamp(0.0, 100.0),
                        summary: f["summary"].as_str().unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ClaimVerdict {
        id: format!("CV_{}", index + 1),
        claim_id: claim.id.clone(),
        truth_percentage: truth,
        verdict: VerdictLabel::for_percentage(truth),
        confidence,
        reasoning: entry["reasoning"].as_str().unwrap_or_default().to_string(),
        harm_potential: claim.harm_potential,
        is_contested: entry["is_contested"].as_bool().unwrap_or(false),
        factual_basis: entry
            .get("factual_basis")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(FactualBasis::Unknown),
        supporting_evidence_ids: string_list(&entry["supporting_evidence_ids"]),
        contradicting_evidence_ids: string_list(&entry["contradicting_evidence_ids"]),
        boundary_findings,
        consistency_result: None,
        challenge_responses: Vec::new(),
        triangulation_score: None,
        evidence_weight: None,
        source_reliability_meta: None,
    }
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
