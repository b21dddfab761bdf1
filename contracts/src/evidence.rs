//! Evidence items, fetched sources, claim boundaries, and the coverage matrix

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of an evidence item relative to the claims it bears on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceDirection {
    Supports,
    Contradicts,
    Neutral,
    Mixed,
}

/// Evidential weight of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbativeValue {
    Low,
    Medium,
    High,
}

impl ProbativeValue {
    /// High and medium probative facts count as quality evidence for the
    /// tangential-claim pruning rule.
    pub fn is_quality(&self) -> bool {
        matches!(self, ProbativeValue::High | ProbativeValue::Medium)
    }
}

/// The scope an evidence item was gathered under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceScope {
    pub name: String,
    pub methodology: String,
    pub temporal: String,
    pub geographic: String,
}

/// A single piece of evidence extracted from a fetched source.
///
/// Invariants: ids are unique within a run; every claim→evidence citation
/// resolves; ambiguous evidence binds to `CTX_UNSCOPED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// `EV_{n}` or the synthetic `E{n}` id the extraction model cited.
    pub id: String,
    /// At least one full sentence.
    pub statement: String,
    pub category: String,
    pub specificity: String,
    pub source_id: String,
    pub source_url: String,
    pub source_title: String,
    pub source_excerpt: String,
    pub claim_direction: EvidenceDirection,
    pub probative_value: ProbativeValue,
    pub evidence_scope: EvidenceScope,
    /// Assigned by boundary clustering; absent until stage 3 runs.
    pub claim_boundary_id: Option<String>,
    pub relevant_claim_ids: Vec<String>,
    /// The analysis context this item binds to, or `CTX_UNSCOPED`.
    pub context_id: String,
}

/// A source fetched during research.
///
/// Created by the research stage; `track_record_score` is written once by
/// the reliability prefetch and never mutated after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedSource {
    pub id: String,
    pub url: String,
    pub title: String,
    pub full_text: String,
    pub fetched_at: DateTime<Utc>,
    pub category: String,
    pub fetch_success: bool,
    /// Reliability score in [0,1]; None when the domain is unknown.
    pub track_record_score: Option<f64>,
}

/// A cluster of evidence sharing methodology, geography, or temporality.
/// The unit of per-boundary judgment in the debate stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimBoundary {
    /// `CB_{n}`.
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub methodology: Option<String>,
    pub geographic: Option<String>,
    pub temporal: Option<String>,
    /// How coherent the cluster is internally, in [0,1].
    pub internal_coherence: f64,
    pub constituent_contexts: Vec<String>,
    pub evidence_count: usize,
}

/// Dense |claims|×|boundaries| evidence count table with inverse indexes.
/// Read-only after build; an index, not a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageMatrix {
    pub claims: Vec<String>,
    pub boundaries: Vec<String>,
    pub counts: Vec<Vec<u32>>,
    #[serde(skip)]
    claim_index: HashMap<String, usize>,
    #[serde(skip)]
    boundary_index: HashMap<String, usize>,
}

impl CoverageMatrix {
    /// Build the matrix from evidence. Evidence referring to an unknown
    /// boundary id is ignored (counted 0) without erroring.
    pub fn build(
        claim_ids: &[String],
        boundary_ids: &[String],
        evidence: &[EvidenceItem],
    ) -> Self {
        let claim_index: HashMap<String, usize> = claim_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let boundary_index: HashMap<String, usize> = boundary_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut counts = vec![vec![0u32; boundary_ids.len()]; claim_ids.len()];
        for item in evidence {
            let Some(boundary_id) = item.claim_boundary_id.as_deref() else {
                continue;
            };
            let Some(&b) = boundary_index.get(boundary_id) else {
                continue;
            };
            for claim_id in &item.relevant_claim_ids {
                if let Some(&c) = claim_index.get(claim_id) {
                    counts[c][b] += 1;
                }
            }
        }

        Self {
            claims: claim_ids.to_vec(),
            boundaries: boundary_ids.to_vec(),
            counts,
            claim_index,
            boundary_index,
        }
    }

    /// Rebuild the skipped indexes after deserialization.
    pub fn reindex(&mut self) {
        self.claim_index = self
            .claims
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        self.boundary_index = self
            .boundaries
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
    }

    pub fn count(&self, claim_id: &str, boundary_id: &str) -> u32 {
        match (
            self.claim_index.get(claim_id),
            self.boundary_index.get(boundary_id),
        ) {
            (Some(&c), Some(&b)) => self.counts[c][b],
            _ => 0,
        }
    }

    /// Boundary ids holding at least one evidence item for the claim.
    pub fn boundaries_for_claim(&self, claim_id: &str) -> Vec<&str> {
        let Some(&c) = self.claim_index.get(claim_id) else {
            return Vec::new();
        };
        self.boundaries
            .iter()
            .enumerate()
            .filter(|(b, _)| self.counts[c][*b] > 0)
            .map(|(_, id)| id.as_str())
            .collect()
    }

    /// Claim ids with at least one evidence item in the boundary.
    pub fn claims_for_boundary(&self, boundary_id: &str) -> Vec<&str> {
        let Some(&b) = self.boundary_index.get(boundary_id) else {
            return Vec::new();
        };
        self.claims
            .iter()
            .enumerate()
            .filter(|(c, _)| self.counts[*c][b] > 0)
            .map(|(_, id)| id.as_str())
            .collect()
    }

    /// Total evidence items counted for a claim across all boundaries.
    pub fn total_for_claim(&self, claim_id: &str) -> u32 {
        let Some(&c) = self.claim_index.get(claim_id) else {
            return 0;
        };
        self.counts[c].iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, boundary: Option<&str>, claims: &[&str]) -> EvidenceItem {
        EvidenceItem {
            id: id.to_string(),
            statement: "Example statement with a full sentence.".to_string(),
            category: "statistic".to_string(),
            specificity: "specific".to_string(),
            source_id: "E1".to_string(),
            source_url: "https://example.org/a".to_string(),
            source_title: "Example".to_string(),
            source_excerpt: "excerpt".to_string(),
            claim_direction: EvidenceDirection::Supports,
            probative_value: ProbativeValue::High,
            evidence_scope: EvidenceScope::default(),
            claim_boundary_id: boundary.map(|s| s.to_string()),
            relevant_claim_ids: claims.iter().map(|s| s.to_string()).collect(),
            context_id: "CTX_1".to_string(),
        }
    }

    #[test]
    fn matrix_counts_and_inverse_indexes() {
        let claims = vec!["CLAIM_1".to_string(), "CLAIM_2".to_string()];
        let boundaries = vec!["CB_1".to_string(), "CB_2".to_string()];
        let evidence = vec![
            item("EV_1", Some("CB_1"), &["CLAIM_1"]),
            item("EV_2", Some("CB_1"), &["CLAIM_1", "CLAIM_2"]),
            item("EV_3", Some("CB_2"), &["CLAIM_2"]),
        ];
        let matrix = CoverageMatrix::build(&claims, &boundaries, &evidence);

        assert_eq!(matrix.count("CLAIM_1", "CB_1"), 2);
        assert_eq!(matrix.count("CLAIM_1", "CB_2"), 0);
        assert_eq!(matrix.count("CLAIM_2", "CB_2"), 1);
        assert_eq!(matrix.boundaries_for_claim("CLAIM_1"), vec!["CB_1"]);
        assert_eq!(
            matrix.claims_for_boundary("CB_1"),
            vec!["CLAIM_1", "CLAIM_2"]
        );
        assert_eq!(matrix.total_for_claim("CLAIM_2"), 2);
    }

    #[test]
    fn unknown_boundary_ids_count_zero() {
        let claims = vec!["CLAIM_1".to_string()];
        let boundaries = vec!["CB_1".to_string()];
        let evidence = vec![item("EV_1", Some("CB_99"), &["CLAIM_1"])];
        let matrix = CoverageMatrix::build(&claims, &boundaries, &evidence);
        assert_eq!(matrix.count("CLAIM_1", "CB_1"), 0);
        assert_eq!(matrix.total_for_claim("CLAIM_1"), 0);
    }

    #[test]
    fn unknown_lookups_are_empty() {
        let matrix = CoverageMatrix::build(&[], &[], &[]);
        assert_eq!(matrix.count("CLAIM_9", "CB_9"), 0);
        assert!(matrix.boundaries_for_claim("CLAIM_9").is_empty());
        assert!(matrix.claims_for_boundary("CB_9").is_empty());
    }
}
