//! Deterministic verdict post-processing
//!
//! These adjustments run after reconciliation and never consult a model:
//! spread-based confidence discounting, the harm-confidence floor, and
//! triangulation scoring across boundaries.

use tracing::debug;
use veridex_contracts::{
    ClaimVerdict, DebateConfig, TriangulationLevel, TriangulationScore, VerdictLabel, Warning,
    WarningType,
};

/// Multiply confidence by the configured spread multiplier.
pub fn apply_spread_adjustment(verdict: &mut ClaimVerdict, config: &DebateConfig) {
    let Some(consistency) = &verdict.consistency_result else {
        return;
    };
    if !consistency.assessed {
        return;
    }
    let multiplier = config.spread_multiplier(consistency.spread);
    if multiplier < 1.0 {
        debug!(
            "claim {} confidence discounted by {} for spread {:.1}",
            verdict.claim_id, multiplier, consistency.spread
        );
    }
    verdict.confidence = (verdict.confidence * multiplier).clamp(0.0, 100.0);
}

/// Elevated-harm verdicts below the confidence floor read UNVERIFIED.
/// Numeric fields are preserved for transparency; the triggered floor is
/// reported as an info warning.
pub fn enforce_harm_confidence_floor(
    verdict: &mut ClaimVerdict,
    config: &DebateConfig,
) -> Option<Warning> {
    if !verdict.harm_potential.is_elevated() {
        return None;
    }
    if verdict.confidence >= config.high_harm_min_confidence {
        return None;
    }
    if verdict.verdict == VerdictLabel::Unverified {
        return None;
    }
    let previous = verdict.verdict;
    verdict.verdict = VerdictLabel::Unverified;
    Some(
        Warning::new(
            WarningType::HarmConfidenceFloorTriggered,
            format!(
                "claim {} downgraded from {:?} (confidence {:.0} below floor {:.0})",
                verdict.claim_id, previous, verdict.confidence, config.high_harm_min_confidence
            ),
        )
        .with_details(serde_json::json!({
            "claim_id": verdict.claim_id,
            "previous_verdict": format!("{previous:?}"),
            "confidence": verdict.confidence,
            "floor": config.high_harm_min_confidence,
        })),
    )
}

/// Truth percentage above which a boundary finding counts as supporting.
const SUPPORT_FLOOR: f64 = 58.0;
/// Truth percentage below which a boundary finding counts as contradicting.
const CONTRADICT_CEILING: f64 = 42.0;

/// Triangulation across the verdict's boundary findings: factor >= 1 when
/// independent boundaries agree, < 1 when they conflict.
pub fn triangulation_score(verdict: &ClaimVerdict) -> TriangulationScore {
    let boundary_count = verdict.boundary_findings.len();
    let supporting = verdict
        .boundary_findings
        .iter()
        .filter(|f| f.truth_percentage >= SUPPORT_FLOOR)
        .count();
    let contradicting = verdict
        .boundary_findings
        .iter()
        .filter(|f| f.truth_percentage <= CONTRADICT_CEILING)
        .count();

    let (level, factor) = match boundary_count {
        0 => (TriangulationLevel::None, 1.0),
        1 => (TriangulationLevel::Single, 1.0),
        _ if supporting > 0 && contradicting > 0 => (TriangulationLevel::Contested, 0.8),
        _ if supporting >= 2 || contradicting >= 2 => (TriangulationLevel::Corroborated, 1.1),
        _ => (TriangulationLevel::Single, 1.0),
    };

    TriangulationScore {
        boundary_count,
        supporting,
        contradicting,
        level,
        factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veridex_contracts::{
        BoundaryFinding, ConsistencyResult, FactualBasis, HarmPotential,
    };

    fn verdict(truth: f64, confidence: f64, harm: HarmPotential) -> ClaimVerdict {
        ClaimVerdict {
            id: "CV_1".to_string(),
            claim_id: "CLAIM_1".to_string(),
            truth_percentage: truth,
            verdict: VerdictLabel::for_percentage(truth),
            confidence,
            reasoning: String::new(),
            harm_potential: harm,
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

    fn finding(boundary_id: &str, truth: f64) -> BoundaryFinding {
        BoundaryFinding {
            boundary_id: boundary_id.to_string(),
            truth_percentage: truth,
            confidence: 70.0,
            summary: String::new(),
        }
    }

    #[test]
    fn spread_25_multiplies_confidence_by_04() {
        let mut v = verdict(70.0, 80.0, HarmPotential::Low);
        v.consistency_result = Some(ConsistencyResult::from_samples(
            "CLAIM_1",
            vec![55.0, 80.0, 70.0],
            5.0,
        ));
        apply_spread_adjustment(&mut v, &DebateConfig::default());
        assert!((v.confidence - 32.0).abs() < 1e-9);
    }

    #[test]
    fn stable_spread_keeps_confidence() {
        let mut v = verdict(70.0, 80.0, HarmPotential::Low);
        v.consistency_result = Some(ConsistencyResult::from_samples(
            "CLAIM_1",
            vec![70.0, 72.0, 71.0],
            5.0,
        ));
        apply_spread_adjustment(&mut v, &DebateConfig::default());
        assert_eq!(v.confidence, 80.0);
    }

    #[test]
    fn unassessed_consistency_is_untouched() {
        let mut v = verdict(70.0, 80.0, HarmPotential::Low);
        v.consistency_result = Some(ConsistencyResult::unassessed("CLAIM_1", 70.0));
        apply_spread_adjustment(&mut v, &DebateConfig::default());
        assert_eq!(v.confidence, 80.0);
    }

    #[test]
    fn harm_floor_preserves_numbers() {
        // harm high, confidence 49, truth 72: UNVERIFIED label, numbers kept.
        let mut v = verdict(72.0, 49.0, HarmPotential::High);
        assert_eq!(v.verdict, VerdictLabel::MostlyTrue);
        let warning = enforce_harm_confidence_floor(&mut v, &DebateConfig::default());
        assert_eq!(v.verdict, VerdictLabel::Unverified);
        assert_eq!(v.truth_percentage, 72.0);
        assert_eq!(v.confidence, 49.0);
        let warning = warning.unwrap();
        assert_eq!(
            warning.warning_type,
            WarningType::HarmConfidenceFloorTriggered
        );
    }

    #[test]
    fn harm_floor_ignores_low_harm_and_confident_verdicts() {
        let mut low = verdict(72.0, 30.0, HarmPotential::Low);
        assert!(enforce_harm_confidence_floor(&mut low, &DebateConfig::default()).is_none());
        assert_eq!(low.verdict, VerdictLabel::MostlyTrue);

        let mut confident = verdict(72.0, 80.0, HarmPotential::Critical);
        assert!(enforce_harm_confidence_floor(&mut confident, &DebateConfig::default()).is_none());
    }

    #[test]
    fn triangulation_levels() {
        let mut v = verdict(70.0, 70.0, HarmPotential::Low);
        assert_eq!(triangulation_score(&v).level, TriangulationLevel::None);

        v.boundary_findings = vec![finding("CB_1", 75.0)];
        assert_eq!(triangulation_score(&v).level, TriangulationLevel::Single);

        v.boundary_findings = vec![finding("CB_1", 75.0), finding("CB_2", 80.0)];
        let score = triangulation_score(&v);
        assert_eq!(score.level, TriangulationLevel::Corroborated);
        assert!(score.factor >= 1.0);

        v.boundary_findings = vec![finding("CB_1", 75.0), finding("CB_2", 20.0)];
        let score = triangulation_score(&v);
        assert_eq!(score.level, TriangulationLevel::Contested);
        assert!(score.factor < 1.0);
        assert_eq!(score.supporting, 1);
        assert_eq!(score.contradicting, 1);
    }
}
