//! Quality gates
//!
//! Gate 1 measures claim fidelity through the pipeline; Gate 4 bands
//! final verdicts by publishable confidence. Gates attach statistics and
//! flag weak output; they never block a run.

use std::collections::HashSet;
use veridex_contracts::{
    classify_confidence, AtomicClaim, ClaimVerdict, ConfidenceBand, Gate1Report, Gate4Report,
    QualityGates,
};

/// Gate 1: how many claims survived extraction-level checks, how many
/// were filtered from aggregation, and whether central claims survived.
pub fn gate1_claim_fidelity(
    claims: &[AtomicClaim],
    pruned_from_aggregation: &HashSet<String>,
) -> Gate1Report {
    let total_claims = claims.len();
    let passed_fidelity = claims
        .iter()
        .filter(|c| c.is_well_formed() && !c.statement.trim().is_empty())
        .count();
    let filtered = claims
        .iter()
        .filter(|c| pruned_from_aggregation.contains(&c.id))
        .count();
    let central_retained = claims
        .iter()
        .filter(|c| c.is_central && !pruned_from_aggregation.contains(&c.id))
        .count();

    Gate1Report {
        total_claims,
        passed_fidelity,
        filtered,
        central_retained,
        // Advisory: the gate reports, it does not block.
        passed: passed_fidelity == total_claims,
    }
}

/// Gate 4: confidence publishability bands over the final verdicts.
pub fn gate4_confidence_publishability(verdicts: &[ClaimVerdict]) -> Gate4Report {
    let mut report = Gate4Report::default();
    for verdict in verdicts {
        match classify_confidence(verdict.confidence) {
            ConfidenceBand::High => report.high_confidence += 1,
            ConfidenceBand::Medium => report.medium_confidence += 1,
            ConfidenceBand::Insufficient => {
                report.insufficient_confidence += 1;
                report.insufficient_claim_ids.push(verdict.claim_id.clone());
            }
        }
    }
    report.passed = report.insufficient_confidence == 0;
    report
}

/// Assemble both gates into the result-envelope shape.
pub fn run_quality_gates(
    claims: &[AtomicClaim],
    verdicts: &[ClaimVerdict],
    pruned_from_aggregation: &HashSet<String>,
) -> QualityGates {
    let gate1 = gate1_claim_fidelity(claims, pruned_from_aggregation);
    let gate4 = gate4_confidence_publishability(verdicts);
    QualityGates {
        all_passed: gate1.passed && gate4.passed,
        gate1,
        gate4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veridex_contracts::{
        Centrality, ClaimDirection, FactualBasis, GroundingQuality, HarmPotential,
        ThesisRelevance, VerdictLabel,
    };

    fn claim(id: &str, central: bool) -> AtomicClaim {
        AtomicClaim {
            id: id.to_string(),
            statement: "statement".to_string(),
            category: "general".to_string(),
            centrality: if central { Centrality::High } else { Centrality::Low },
            harm_potential: HarmPotential::Low,
            is_central: central,
            claim_direction: ClaimDirection::SupportsThesis,
            key_entities: Vec::new(),
            check_worthiness: 0.5,
            specificity_score: 0.5,
            grounding_quality: GroundingQuality::Moderate,
            expected_evidence_profile: Default::default(),
            thesis_relevance: ThesisRelevance::Direct,
            thesis_relevance_confidence: 90.0,
            is_counter_claim: false,
            related_context_id: None,
        }
    }

    fn verdict(claim_id: &str, confidence: f64) -> ClaimVerdict {
        ClaimVerdict {
            id: format!("CV_{claim_id}"),
            claim_id: claim_id.to_string(),
            truth_percentage: 70.0,
            verdict: VerdictLabel::LeaningTrue,
            confidence,
            reasoning: String::new(),
            harm_potential: HarmPotential::Low,
            is_contested: false,
            factual_basis: FactualBasis::Established,
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

    #[test]
    fn gate1_counts() {
        let claims = vec![claim("CLAIM_1", true), claim("CLAIM_2", false)];
        let pruned: HashSet<String> = ["CLAIM_2".to_string()].into_iter().collect();
        let report = gate1_claim_fidelity(&claims, &pruned);
        assert_eq!(report.total_claims, 2);
        assert_eq!(report.passed_fidelity, 2);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.central_retained, 1);
        assert!(report.passed);
    }

    #[test]
    fn gate4_bands_and_flags() {
        let verdicts = vec![
            verdict("CLAIM_1", 85.0),
            verdict("CLAIM_2", 50.0),
            verdict("CLAIM_3", 20.0),
        ];
        let report = gate4_confidence_publishability(&verdicts);
        assert_eq!(report.high_confidence, 1);
        assert_eq!(report.medium_confidence, 1);
        assert_eq!(report.insufficient_confidence, 1);
        assert_eq!(report.insufficient_claim_ids, vec!["CLAIM_3".to_string()]);
        assert!(!report.passed);
    }

    #[test]
    fn gates_compose() {
        let claims = vec![claim("CLAIM_1", true)];
        let verdicts = vec![verdict("CLAIM_1", 90.0)];
        let gates = run_quality_gates(&claims, &verdicts, &HashSet::new());
        assert!(gates.all_passed);
    }
}
