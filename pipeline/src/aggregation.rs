//! Stage 5: aggregation
//!
//! Weighted-average verdict over the per-claim verdicts: centrality,
//! harm, and contestation multipliers scaled by confidence, counter-claim
//! inversion, tangential and opinion pruning, the opinion-ratio monitor,
//! and narrative synthesis.

use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use veridex_contracts::{
    AggregationConfig, AggregationMetrics, AtomicClaim, Centrality, ClaimDirection, ClaimVerdict,
    EvidenceItem, FactualBasis, FinalAssessment, HarmPotential, ThesisRelevance, VerdictLabel,
    VerdictNarrative, VerdictScale, Warning, WarningType,
};
use veridex_llm::{CallOptions, LlmClient, LlmError, PromptKey};

/// Boundary disagreement threshold, in truth points.
const BOUNDARY_DISAGREEMENT_PP: f64 = 20.0;

/// Centrality multiplier.
fn centrality_multiplier(centrality: Centrality) -> f64 {
    match centrality {
        Centrality::High => 3.0,
        Centrality::Medium => 2.0,
        Centrality::Low => 1.0,
    }
}

/// Harm multiplier, full four-level map.
fn harm_multiplier(harm: HarmPotential) -> f64 {
    match harm {
        HarmPotential::Critical => 2.0,
        HarmPotential::High => 1.5,
        HarmPotential::Medium | HarmPotential::Low => 1.0,
    }
}

/// Contestation multiplier: contested documented facts are discounted,
/// contested opinions are not (their basis already carries the doubt).
fn contestation_multiplier(verdict: &ClaimVerdict) -> f64 {
    if !verdict.is_contested {
        return 1.0;
    }
    match verdict.factual_basis {
        FactualBasis::Established => 0.3,
        FactualBasis::Disputed => 0.5,
        FactualBasis::Opinion | FactualBasis::Alleged | FactualBasis::Unknown => 1.0,
    }
}

/// Per-claim aggregation weight. Tangential and irrelevant claims weigh
/// nothing.
pub fn claim_weight(claim: &AtomicClaim, verdict: &ClaimVerdict) -> f64 {
    if claim.thesis_relevance != ThesisRelevance::Direct {
        return 0.0;
    }
    centrality_multiplier(claim.centrality)
        * harm_multiplier(claim.harm_potential)
        * contestation_multiplier(verdict)
        * (verdict.confidence / 100.0)
}

/// Effective truth contribution: counter-claims invert.
pub fn effective_truth(claim: &AtomicClaim, verdict: &ClaimVerdict) -> f64 {
    if claim.is_counter_claim {
        100.0 - verdict.truth_percentage
    } else {
        verdict.truth_percentage
    }
}

fn is_opinion_basis(basis: FactualBasis) -> bool {
    matches!(
        basis,
        FactualBasis::Opinion | FactualBasis::Alleged | FactualBasis::Unknown
    )
}

/// Tangential pruning: never prune `direct`; prune tangential and
/// irrelevant claims with too little evidence or, when quality evidence
/// is required, without a single high or medium probative fact.
pub fn prune_tangential_baseless_claims(
    claims: &[AtomicClaim],
    evidence: &[EvidenceItem],
    config: &AggregationConfig,
) -> HashSet<String> {
    let mut pruned = HashSet::new();
    for claim in claims {
        if claim.thesis_relevance == ThesisRelevance::Direct {
            continue;
        }
        let claim_evidence: Vec<&EvidenceItem> = evidence
            .iter()
            .filter(|e| e.relevant_claim_ids.iter().any(|id| id == &claim.id))
            .collect();
        let too_little = claim_evidence.len() < config.min_evidence_for_tangential;
        let no_quality = config.require_quality_evidence
            && !claim_evidence.iter().any(|e| e.probative_value.is_quality());
        if too_little || no_quality {
            debug!("pruning tangential claim {} from aggregation", claim.id);
            pruned.insert(claim.id.clone());
        }
    }
    pruned
}

/// The aggregation stage.
#[derive(Debug, Clone)]
pub struct AggregationStage {
    llm: LlmClient,
    config: AggregationConfig,
}

impl AggregationStage {
    pub fn new(llm: LlmClient, config: AggregationConfig) -> Self {
        Self { llm, config }
    }

    /// Aggregate the claim verdicts and synthesize the narrative.
    pub async fn run(
        &self,
        claims: &[AtomicClaim],
        evidence: &[EvidenceItem],
        verdicts: &[ClaimVerdict],
        scale: VerdictScale,
    ) -> Result<(FinalAssessment, HashSet<String>), LlmError> {
        let mut warnings = Vec::new();
        let claims_by_id: HashMap<&str, &AtomicClaim> =
            claims.iter().map(|c| (c.id.as_str(), c)).collect();

        let pruned_tangential = prune_tangential_baseless_claims(claims, evidence, &self.config);

        // The factor list: verdicts for unpruned claims.
        let factors: Vec<(&AtomicClaim, &ClaimVerdict)> = verdicts
            .iter()
            .filter_map(|v| claims_by_id.get(v.claim_id.as_str()).map(|c| (*c, v)))
            .filter(|(c, _)| !pruned_tangential.contains(&c.id))
            .collect();

        // Opinion accounting runs over the full factor list, before the
        // opinion pruning, so opinions + documented = |factors|.
        let opinions = factors
            .iter()
            .filter(|(_, v)| is_opinion_basis(v.factual_basis))
            .count();
        let documented = factors.len() - opinions;
        if opinions + documented > 0 {
            let ratio = 100.0 * opinions as f64 / (opinions + documented) as f64;
            if ratio > self.config.warning_threshold_percent {
                warnings.push(
                    Warning::new(
                        WarningType::StructuralInvariantViolation,
                        format!(
                            "opinion-dominated assessment: {:.0}% of factors are opinion-based",
                            ratio
                        ),
                    )
                    .with_details(json!({
                        "opinions": opinions,
                        "documented": documented,
                        "ratio_percent": ratio,
                    })),
                );
            }
        }

        // The surplus cap runs on the full factor list, ahead of the
        // unconditional opinion prune. Supporting factors sort first and
        // are dropped first so opinions cannot inflate the thesis.
        let mut working = factors;
        let mut pruned_opinion_only = 0usize;
        if self.config.max_opinion_count > 0 {
            let mut opinion_indexes: Vec<usize> = working
                .iter()
                .enumerate()
                .filter(|(_, (_, v))| is_opinion_basis(v.factual_basis))
                .map(|(i, _)| i)
                .collect();
            if opinion_indexes.len() > self.config.max_opinion_count {
                opinion_indexes.sort_by_key(|&i| {
                    let (claim, _) = working[i];
                    match claim.claim_direction {
                        ClaimDirection::SupportsThesis => 0,
                        ClaimDirection::Contextual => 1,
                        ClaimDirection::ContradictsThesis => 2,
                    }
                });
                let surplus = opinion_indexes.len() - self.config.max_opinion_count;
                let dropped: HashSet<usize> =
                    opinion_indexes.into_iter().take(surplus).collect();
                pruned_opinion_only += dropped.len();
                working = working
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| !dropped.contains(i))
                    .map(|(_, f)| f)
                    .collect();
            }
        }

        // Unconditional opinion prune: factors with no factual basis at
        // all never reach the weighted average.
        let aggregable: Vec<(&AtomicClaim, &ClaimVerdict)> = working
            .into_iter()
            .filter(|(_, v)| {
                let drop = matches!(
                    v.factual_basis,
                    FactualBasis::Opinion | FactualBasis::Unknown
                );
                if drop {
                    pruned_opinion_only += 1;
                }
                !drop
            })
            .collect();

        // Weighted average; neutral 50 when nothing weighs anything.
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for (claim, verdict) in &aggregable {
            let weight = claim_weight(claim, verdict);
            if weight <= 0.0 {
                continue;
            }
            weighted_sum += effective_truth(claim, verdict) * weight;
            total_weight += weight;
        }
        let overall_truth = if total_weight > 0.0 {
            (weighted_sum / total_weight).round()
        } else {
            50.0
        };

        let overall_confidence = if aggregable.is_empty() {
            0.0
        } else {
            aggregable.iter().map(|(_, v)| v.confidence).sum::<f64>() / aggregable.len() as f64
        };

        let disagreement = boundary_disagreement(verdicts);
        let narrative = self
            .synthesize_narrative(verdicts, overall_truth, overall_confidence, &disagreement)
            .await?;

        let overall_label = VerdictLabel::for_percentage(overall_truth);
        info!(
            "aggregated {} factors to {:.0} ({})",
            aggregable.len(),
            overall_truth,
            overall_label.render(scale)
        );

        let assessment = FinalAssessment {
            overall_truth_percentage: overall_truth,
            overall_verdict: overall_label.render(scale).to_string(),
            confidence: overall_confidence,
            claim_verdicts: verdicts.to_vec(),
            verdict_narrative: Some(narrative),
            warnings,
            metrics: AggregationMetrics {
                opinions,
                documented,
                total_weight,
                pruned_tangential: pruned_tangential.len(),
                pruned_opinion_only,
            },
        };
        Ok((assessment, pruned_tangential))
    }

    async fn synthesize_narrative(
        &self,
        verdicts: &[ClaimVerdict],
        overall_truth: f64,
        confidence: f64,
        disagreement: &Option<String>,
    ) -> Result<VerdictNarrative, LlmError> {
        let payload = json!({
            "overall_truth_percentage": overall_truth,
            "confidence": confidence,
            "boundary_disagreement": disagreement,
            "claim_verdicts": verdicts.iter().map(|v| json!({
                "claim_id": v.claim_id,
                "truth_percentage": v.truth_percentage,
                "verdict": v.verdict,
                "reasoning": v.reasoning,
            })).collect::<Vec<_>>(),
        });
        let result = self
            .llm
            .call(PromptKey::NarrativeSynthesis, &payload, &CallOptions::default())
            .await?;

        let value = &result.value;
        let model_disagreements = value["boundary_disagreements"]
            .as_str()
            .map(|s| s.to_string());
        Ok(VerdictNarrative {
            headline: value["headline"].as_str().unwrap_or_default().to_string(),
            evidence_base_summary: value["evidence_base_summary"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            key_finding: value["key_finding"].as_str().unwrap_or_default().to_string(),
            // The narrative must mention a >20 point boundary split even
            // when the model leaves it out.
            boundary_disagreements: model_disagreements.or_else(|| disagreement.clone()),
            limitations: value["limitations"].as_str().unwrap_or_default().to_string(),
        })
    }
}

/// Mean truth per boundary across all verdicts; a split wider than 20
/// points yields a description for the narrative.
pub fn boundary_disagreement(verdicts: &[ClaimVerdict]) -> Option<String> {
    let mut by_boundary: HashMap<&str, Vec<f64>> = HashMap::new();
    for verdict in verdicts {
        for finding in &verdict.boundary_findings {
            by_boundary
                .entry(finding.boundary_id.as_str())
                .or_default()
                .push(finding.truth_percentage);
        }
    }
    if by_boundary.len() < 2 {
        return None;
    }
    let mut means: Vec<(&str, f64)> = by_boundary
        .into_iter()
        .map(|(id, values)| (id, values.iter().sum::<f64>() / values.len() as f64))
        .collect();
    means.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let (low_id, low) = means.first().copied()?;
    let (high_id, high) = means.last().copied()?;
    if high - low > BOUNDARY_DISAGREEMENT_PP {
        Some(format!(
            "boundaries disagree: {high_id} averages {high:.0} while {low_id} averages {low:.0}"
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veridex_contracts::{
        BoundaryFinding, EvidenceDirection, EvidenceScope, GroundingQuality, ProbativeValue,
    };

    fn claim(id: &str, relevance: ThesisRelevance, centrality: Centrality) -> AtomicClaim {
        AtomicClaim {
            id: id.to_string(),
            statement: "statement".to_string(),
            category: "general".to_string(),
            centrality,
            harm_potential: HarmPotential::Low,
            is_central: centrality == Centrality::High,
            claim_direction: ClaimDirection::SupportsThesis,
            key_entities: Vec::new(),
            check_worthiness: 0.5,
            specificity_score: 0.5,
            grounding_quality: GroundingQuality::Moderate,
            expected_evidence_profile: Default::default(),
            thesis_relevance: relevance,
            thesis_relevance_confidence: 90.0,
            is_counter_claim: false,
            related_context_id: None,
        }
    }

    fn verdict(claim_id: &str, truth: f64, confidence: f64, basis: FactualBasis) -> ClaimVerdict {
        ClaimVerdict {
            id: format!("CV_{claim_id}"),
            claim_id: claim_id.to_string(),
            truth_percentage: truth,
            verdict: VerdictLabel::for_percentage(truth),
            confidence,
            reasoning: String::new(),
            harm_potential: HarmPotential::Low,
            is_contested: false,
            factual_basis: basis,
            supporting_evidence_ids: Vec::new(),
            contradicting_evidence_ids: Vec::new(),
            boundary_findings: Vec::new(),
            consistency_result: None,
            challenge_responses: Vec::new(),
            triangulation_score: None,
            evidence_weight: None,
            source_reliability_meta: None,
        }
    }

    fn evidence_for(claim_id: &str, n: usize, probative: ProbativeValue) -> Vec<EvidenceItem> {
        (0..n)
            .map(|i| EvidenceItem {
                id: format!("EV_{claim_id}_{i}"),
                statement: "A full evidence sentence.".to_string(),
                category: "statistic".to_string(),
                specificity: "specific".to_string(),
                source_id: "E1".to_string(),
                source_url: "https://example.org".to_string(),
                source_title: "t".to_string(),
                source_excerpt: "x".to_string(),
                claim_direction: EvidenceDirection::Supports,
                probative_value: probative,
                evidence_scope: EvidenceScope::default(),
                claim_boundary_id: Some("CB_1".to_string()),
                relevant_claim_ids: vec![claim_id.to_string()],
                context_id: "CTX_1".to_string(),
            })
            .collect()
    }

    #[test]
    fn weight_formula() {
        let c = claim("CLAIM_1", ThesisRelevance::Direct, Centrality::High);
        let v = verdict("CLAIM_1", 70.0, 80.0, FactualBasis::Established);
        // 3.0 * 1.0 * 1.0 * 0.8
        assert!((claim_weight(&c, &v) - 2.4).abs() < 1e-9);

        let mut contested = v.clone();
        contested.is_contested = true;
        // Contested established facts are heavily discounted.
        assert!((claim_weight(&c, &contested) - 0.72).abs() < 1e-9);

        let tangential = claim("CLAIM_2", ThesisRelevance::Tangential, Centrality::High);
        assert_eq!(claim_weight(&tangential, &v), 0.0);
    }

    #[test]
    fn counter_claims_invert() {
        let mut c = claim("CLAIM_1", ThesisRelevance::Direct, Centrality::High);
        c.is_counter_claim = true;
        let v = verdict("CLAIM_1", 80.0, 90.0, FactualBasis::Established);
        assert_eq!(effective_truth(&c, &v), 20.0);
    }

    #[test]
    fn tangential_pruning_rules() {
        let direct = claim("CLAIM_1", ThesisRelevance::Direct, Centrality::High);
        let tangential = claim("CLAIM_2", ThesisRelevance::Tangential, Centrality::Low);
        let claims = vec![direct, tangential];
        let config = AggregationConfig::default();

        // One low-probative item: below the two-item floor.
        let evidence = evidence_for("CLAIM_2", 1, ProbativeValue::Low);
        let pruned = prune_tangential_baseless_claims(&claims, &evidence, &config);
        assert!(pruned.contains("CLAIM_2"));
        assert!(!pruned.contains("CLAIM_1"));

        // Two items pass the default rules.
        let evidence = evidence_for("CLAIM_2", 2, ProbativeValue::Low);
        let pruned = prune_tangential_baseless_claims(&claims, &evidence, &config);
        assert!(pruned.is_empty());

        // Quality requirement turns low-probative packs into prunes.
        let strict = AggregationConfig {
            require_quality_evidence: true,
            ..Default::default()
        };
        let pruned = prune_tangential_baseless_claims(&claims, &evidence, &strict);
        assert!(pruned.contains("CLAIM_2"));
    }

    #[test]
    fn boundary_disagreement_detection() {
        let mut v1 = verdict("CLAIM_1", 80.0, 80.0, FactualBasis::Established);
        v1.boundary_findings = vec![
            BoundaryFinding {
                boundary_id: "CB_1".to_string(),
                truth_percentage: 85.0,
                confidence: 80.0,
                summary: String::new(),
            },
            BoundaryFinding {
                boundary_id: "CB_2".to_string(),
                truth_percentage: 40.0,
                confidence: 70.0,
                summary: String::new(),
            },
        ];
        let disagreement = boundary_disagreement(&[v1.clone()]);
        assert!(disagreement.is_some());
        assert!(disagreement.unwrap().contains("disagree"));

        v1.boundary_findings[1].truth_percentage = 75.0;
        assert!(boundary_disagreement(&[v1]).is_none());
    }

    mod stage {
        use super::*;
        use std::sync::Arc;
        use veridex_llm::{LlmClient, ScriptedTransport};
        use veridex_resilience::{BudgetTracker, ProviderHealth};

        fn aggregation(config: AggregationConfig) -> (AggregationStage, Arc<ScriptedTransport>) {
            let transport = Arc::new(ScriptedTransport::new());
            transport.enqueue_json(
                "NARRATIVE_SYNTHESIS",
                json!({
                    "headline": "Largely supported",
                    "evidence_base_summary": "Three sources corroborate the figures.",
                    "key_finding": "The central claim holds in most boundaries.",
                    "limitations": "Regional coverage is thin.",
                }),
            );
            let stage = AggregationStage::new(
                LlmClient::new(
                    transport.clone(),
                    Arc::new(BudgetTracker::new(Default::default())),
                    ProviderHealth::with_defaults(),
                    true,
                ),
                config,
            );
            (stage, transport)
        }

        #[tokio::test]
        async fn weighted_average_and_metrics() {
            let claims = vec![
                claim("CLAIM_1", ThesisRelevance::Direct, Centrality::High),
                claim("CLAIM_2", ThesisRelevance::Direct, Centrality::Low),
            ];
            let verdicts = vec![
                verdict("CLAIM_1", 90.0, 100.0, FactualBasis::Established),
                verdict("CLAIM_2", 30.0, 100.0, FactualBasis::Established),
            ];
            let (stage, _) = aggregation(AggregationConfig::default());
            let (assessment, pruned) = stage
                .run(&claims, &[], &verdicts, VerdictScale::Statement)
                .await
                .unwrap();

            // (90*3 + 30*1) / 4 = 75.
            assert_eq!(assessment.overall_truth_percentage, 75.0);
            assert_eq!(assessment.overall_verdict, "MOSTLY-TRUE");
            assert_eq!(assessment.metrics.documented, 2);
            assert_eq!(assessment.metrics.opinions, 0);
            assert!(pruned.is_empty());
            assert_eq!(
                assessment.verdict_narrative.as_ref().unwrap().headline,
                "Largely supported"
            );
        }

        #[tokio::test]
        async fn zero_weight_defaults_to_neutral() {
            let claims = vec![claim("CLAIM_1", ThesisRelevance::Tangential, Centrality::Low)];
            let verdicts = vec![verdict("CLAIM_1", 90.0, 100.0, FactualBasis::Established)];
            let (stage, _) = aggregation(AggregationConfig::default());
            let (assessment, pruned) = stage
                .run(&claims, &[], &verdicts, VerdictScale::Statement)
                .await
                .unwrap();
            assert_eq!(assessment.overall_truth_percentage, 50.0);
            assert!(pruned.contains("CLAIM_1"));
        }

        #[tokio::test]
        async fn question_scale_renders_yes() {
            let claims = vec![claim("CLAIM_1", ThesisRelevance::Direct, Centrality::High)];
            let verdicts = vec![verdict("CLAIM_1", 90.0, 100.0, FactualBasis::Established)];
            let (stage, _) = aggregation(AggregationConfig::default());
            let (assessment, _) = stage
                .run(&claims, &[], &verdicts, VerdictScale::Question)
                .await
                .unwrap();
            assert_eq!(assessment.overall_verdict, "YES");
        }

        #[tokio::test]
        async fn opinion_cap_drops_supporting_alleged_factors_first() {
            let mut claims = vec![
                claim("CLAIM_1", ThesisRelevance::Direct, Centrality::High),
                claim("CLAIM_2", ThesisRelevance::Direct, Centrality::High),
                claim("CLAIM_3", ThesisRelevance::Direct, Centrality::High),
            ];
            claims[2].claim_direction = ClaimDirection::ContradictsThesis;
            // Alleged-basis factors survive the unconditional prune, so
            // only the cap limits them.
            let verdicts = vec![
                verdict("CLAIM_1", 90.0, 100.0, FactualBasis::Alleged),
                verdict("CLAIM_2", 90.0, 100.0, FactualBasis::Alleged),
                verdict("CLAIM_3", 20.0, 100.0, FactualBasis::Alleged),
            ];
            let config = AggregationConfig {
                max_opinion_count: 1,
                ..Default::default()
            };
            let (stage, _) = aggregation(config);
            let (assessment, _) = stage
                .run(&claims, &[], &verdicts, VerdictScale::Statement)
                .await
                .unwrap();

            // The two supporting alleged factors are dropped by the cap;
            // the contradicting one survives and alone sets the average.
            assert_eq!(assessment.metrics.pruned_opinion_only, 2);
            assert_eq!(assessment.overall_truth_percentage, 20.0);
            // The opinion ratio still counts every factor.
            assert_eq!(assessment.metrics.opinions, 3);
            assert_eq!(assessment.metrics.documented, 0);
        }

        #[tokio::test]
        async fn opinion_ratio_warning_and_pruning() {
            let claims = vec![
                claim("CLAIM_1", ThesisRelevance::Direct, Centrality::High),
                claim("CLAIM_2", ThesisRelevance::Direct, Centrality::High),
                claim("CLAIM_3", ThesisRelevance::Direct, Centrality::High),
            ];
            let verdicts = vec![
                verdict("CLAIM_1", 80.0, 90.0, FactualBasis::Opinion),
                verdict("CLAIM_2", 80.0, 90.0, FactualBasis::Opinion),
                verdict("CLAIM_3", 70.0, 90.0, FactualBasis::Established),
            ];
            let (stage, _) = aggregation(AggregationConfig::default());
            let (assessment, _) = stage
                .run(&claims, &[], &verdicts, VerdictScale::Statement)
                .await
                .unwrap();

            // 2 of 3 factors are opinion-based, but the 70% threshold is
            // not crossed; the invariant still holds.
            assert_eq!(
                assessment.metrics.opinions + assessment.metrics.documented,
                3
            );
            // Opinion-only factors were pruned from the average: only the
            // established verdict contributes.
            assert_eq!(assessment.overall_truth_percentage, 70.0);
            assert_eq!(assessment.metrics.pruned_opinion_only, 2);
        }
    }
}
