//! Structural consistency check
//!
//! Deterministic invariants over the finished verdict set. The check
//! returns warnings and never mutates: a violated invariant is a signal
//! for the consumer, not a crash.

use std::collections::HashSet;
use veridex_contracts::{
    ClaimVerdict, CoverageMatrix, EvidenceItem, ClaimBoundary, VerdictLabel, Warning, WarningType,
};

fn violation(message: String, details: serde_json::Value) -> Warning {
    Warning::new(WarningType::StructuralInvariantViolation, message).with_details(details)
}

/// Run all structural invariants over the verdict set.
pub fn structural_consistency_check(
    verdicts: &[ClaimVerdict],
    evidence: &[EvidenceItem],
    boundaries: &[ClaimBoundary],
    coverage: &CoverageMatrix,
) -> Vec<Warning> {
    let evidence_ids: HashSet<&str> = evidence.iter().map(|e| e.id.as_str()).collect();
    let boundary_ids: HashSet<&str> = boundaries.iter().map(|b| b.id.as_str()).collect();
    let mut warnings = Vec::new();

    for verdict in verdicts {
        // 1. Every cited evidence id exists.
        for cited in verdict.cited_evidence_ids() {
            if !evidence_ids.contains(cited.as_str()) {
                warnings.push(violation(
                    format!(
                        "claim {} cites unknown evidence id {}",
                        verdict.claim_id, cited
                    ),
                    serde_json::json!({ "claim_id": verdict.claim_id, "evidence_id": cited }),
                ));
            }
        }

        // 2. Every boundary finding resolves.
        for finding in &verdict.boundary_findings {
            if !boundary_ids.contains(finding.boundary_id.as_str()) {
                warnings.push(violation(
                    format!(
                        "claim {} has a finding for unknown boundary {}",
                        verdict.claim_id, finding.boundary_id
                    ),
                    serde_json::json!({
                        "claim_id": verdict.claim_id,
                        "boundary_id": finding.boundary_id,
                    }),
                ));
            }
        }

        // 3. Truth percentage is in range.
        if !(0.0..=100.0).contains(&verdict.truth_percentage) {
            warnings.push(violation(
                format!(
                    "claim {} truth percentage {} out of range",
                    verdict.claim_id, verdict.truth_percentage
                ),
                serde_json::json!({
                    "claim_id": verdict.claim_id,
                    "truth_percentage": verdict.truth_percentage,
                }),
            ));
        }

        // 4. Label matches the band, except where the harm floor forced
        // UNVERIFIED while preserving the numbers.
        let expected = VerdictLabel::for_percentage(verdict.truth_percentage);
        if verdict.verdict != expected && verdict.verdict != VerdictLabel::Unverified {
            warnings.push(violation(
                format!(
                    "claim {} label {:?} does not match band for {:.0}",
                    verdict.claim_id, verdict.verdict, verdict.truth_percentage
                ),
                serde_json::json!({
                    "claim_id": verdict.claim_id,
                    "label": format!("{:?}", verdict.verdict),
                    "expected": format!("{expected:?}"),
                }),
            ));
        }

        // 5. A verdict over a claim with zero covered evidence.
        if coverage.total_for_claim(&verdict.claim_id) == 0 {
            warnings.push(violation(
                format!("claim {} has zero evidence items", verdict.claim_id),
                serde_json::json!({ "claim_id": verdict.claim_id }),
            ));
        }
    }

    warnings
}
