//! Reliability evaluator types and post-processing
//!
//! The LLM evaluator emits a source type, a score, a factual rating, and
//! cited evidence. Post-processing is deterministic: scores are
//! normalized, source-type caps applied, the rating label realigned to
//! the capped score band, and thin evidence forced to insufficient data.

use serde::{Deserialize, Serialize};

/// Source type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    EditorialPublisher,
    WireService,
    Government,
    StateMedia,
    StateControlledMedia,
    PlatformUgc,
    Advocacy,
    Aggregator,
    PropagandaOutlet,
    KnownDisinformation,
    Unknown,
}

impl SourceType {
    /// Hard score ceiling for structurally untrustworthy source types.
    pub fn score_cap(&self) -> Option<f64> {
        match self {
            SourceType::PropagandaOutlet | SourceType::KnownDisinformation => Some(0.14),
            SourceType::StateControlledMedia | SourceType::PlatformUgc => Some(0.42),
            _ => None,
        }
    }
}

/// Factual-track-record rating labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactualRating {
    HighlyReliable,
    Reliable,
    LeaningReliable,
    Mixed,
    LeaningUnreliable,
    Unreliable,
    HighlyUnreliable,
    InsufficientData,
    /// Legacy label accepted on input; normalized to `Reliable` and
    /// never emitted.
    #[serde(rename = "generally_reliable")]
    GenerallyReliable,
}

impl FactualRating {
    /// Normalize legacy labels.
    pub fn normalized(self) -> Self {
        match self {
            FactualRating::GenerallyReliable => FactualRating::Reliable,
            other => other,
        }
    }

    /// The rating band containing a score.
    pub fn for_score(score: f64) -> Self {
        let s = score.clamp(0.0, 1.0);
        if s >= 0.85 {
            FactualRating::HighlyReliable
        } else if s >= 0.70 {
            FactualRating::Reliable
        } else if s >= 0.58 {
            FactualRating::LeaningReliable
        } else if s >= 0.43 {
            FactualRating::Mixed
        } else if s >= 0.29 {
            FactualRating::LeaningUnreliable
        } else if s >= 0.15 {
            FactualRating::Unreliable
        } else {
            FactualRating::HighlyUnreliable
        }
    }
}

/// Bias assessment attached to an evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiasAssessment {
    #[serde(default)]
    pub political_bias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_bias: Option<String>,
}

/// One evidence citation backing the evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceCitation {
    pub claim: String,
    pub basis: String,
    pub evidence_id: String,
}

/// Full evaluator output after post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityAssessment {
    pub source_type: SourceType,
    /// Track-record score in [0,1]; None when data was insufficient.
    pub score: Option<f64>,
    pub confidence: f64,
    pub factual_rating: FactualRating,
    #[serde(default)]
    pub bias: BiasAssessment,
    #[serde(default)]
    pub evidence_cited: Vec<EvidenceCitation>,
    #[serde(default)]
    pub caveats: Vec<String>,
}

/// Normalize a raw score: accepts [0,100] or [0,1]; values above 1 are
/// divided by 100; NaN and infinities become 0.5; negatives become 0.
/// Idempotent.
pub fn normalize_track_record_score(raw: f64) -> f64 {
    if raw.is_nan() || raw.is_infinite() {
        return 0.5;
    }
    if raw < 0.0 {
        return 0.0;
    }
    if raw > 1.0 {
        (raw / 100.0).clamp(0.0, 1.0)
    } else {
        raw
    }
}

/// Minimum evidence items for a scored evaluation.
pub const MIN_EVIDENCE_ITEMS: usize = 3;
/// Minimum evaluator confidence for a scored evaluation.
pub const MIN_CONFIDENCE: f64 = 0.50;

/// Deterministic post-processing over a raw evaluator output.
pub fn post_process(mut assessment: ReliabilityAssessment) -> ReliabilityAssessment {
    assessment.factual_rating = assessment.factual_rating.normalized();
    assessment.confidence = assessment.confidence.clamp(0.0, 1.0);

    if let Some(raw) = assessment.score {
        let mut score = normalize_track_record_score(raw);
        if let Some(cap) = assessment.source_type.score_cap() {
            score = score.min(cap);
        }
        assessment.score = Some(score);
        assessment.factual_rating = FactualRating::for_score(score);
    }

    // Thin evidence or low confidence forces insufficient data.
    if assessment.evidence_cited.len() < MIN_EVIDENCE_ITEMS
        || assessment.confidence < MIN_CONFIDENCE
    {
        assessment.score = None;
        assessment.factual_rating = FactualRating::InsufficientData;
    }

    assessment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citations(n: usize) -> Vec<EvidenceCitation> {
        (0..n)
            .map(|i| EvidenceCitation {
                claim: format!("claim {i}"),
                basis: "third-party assessment".to_string(),
                evidence_id: format!("EV_{i}"),
            })
            .collect()
    }

    fn assessment(source_type: SourceType, score: f64, confidence: f64) -> ReliabilityAssessment {
        ReliabilityAssessment {
            source_type,
            score: Some(score),
            confidence,
            factual_rating: FactualRating::Mixed,
            bias: BiasAssessment::default(),
            evidence_cited: citations(4),
            caveats: Vec::new(),
        }
    }

    #[test]
    fn score_normalization_accepts_both_ranges() {
        assert_eq!(normalize_track_record_score(0.8), 0.8);
        assert_eq!(normalize_track_record_score(80.0), 0.8);
        assert_eq!(normalize_track_record_score(f64::NAN), 0.5);
        assert_eq!(normalize_track_record_score(f64::INFINITY), 0.5);
        assert_eq!(normalize_track_record_score(-3.0), 0.0);
    }

    #[test]
    fn score_normalization_is_idempotent() {
        for raw in [0.0, 0.37, 1.0, 42.0, 100.0, -1.0] {
            let once = normalize_track_record_score(raw);
            assert_eq!(once, normalize_track_record_score(once));
        }
    }

    #[test]
    fn propaganda_outlets_are_capped() {
        let processed = post_process(assessment(SourceType::PropagandaOutlet, 0.9, 0.9));
        assert_eq!(processed.score, Some(0.14));
        assert_eq!(processed.factual_rating, FactualRating::HighlyUnreliable);
    }

    #[test]
    fn ugc_and_state_controlled_capped_at_042() {
        let processed = post_process(assessment(SourceType::PlatformUgc, 0.8, 0.9));
        assert_eq!(processed.score, Some(0.42));
        assert_eq!(processed.factual_rating, FactualRating::LeaningUnreliable);

        let processed = post_process(assessment(SourceType::StateControlledMedia, 0.3, 0.9));
        assert_eq!(processed.score, Some(0.3));
    }

    #[test]
    fn rating_realigns_to_capped_band() {
        let processed = post_process(assessment(SourceType::EditorialPublisher, 0.9, 0.9));
        assert_eq!(processed.factual_rating, FactualRating::HighlyReliable);

        let processed = post_process(assessment(SourceType::EditorialPublisher, 88.0, 0.9));
        assert_eq!(processed.score, Some(0.88));
        assert_eq!(processed.factual_rating, FactualRating::HighlyReliable);
    }

    #[test]
    fn thin_evidence_forces_insufficient_data() {
        let mut thin = assessment(SourceType::EditorialPublisher, 0.9, 0.9);
        thin.evidence_cited = citations(2);
        let processed = post_process(thin);
        assert_eq!(processed.score, None);
        assert_eq!(processed.factual_rating, FactualRating::InsufficientData);

        let unsure = assessment(SourceType::EditorialPublisher, 0.9, 0.4);
        let processed = post_process(unsure);
        assert_eq!(processed.factual_rating, FactualRating::InsufficientData);
    }

    #[test]
    fn legacy_label_normalizes() {
        assert_eq!(
            FactualRating::GenerallyReliable.normalized(),
            FactualRating::Reliable
        );
        let parsed: FactualRating = serde_json::from_str("\"generally_reliable\"").unwrap();
        assert_eq!(parsed.normalized(), FactualRating::Reliable);
    }
}
