//! Verdict types: the seven-level scale, per-claim verdicts, consistency
//! and challenge records, and the narrative

use serde::{Deserialize, Serialize};

/// The seven-level symmetric verdict scale with neutral UNVERIFIED in the
/// middle. Statement-form inputs render TRUE..FALSE; question-form inputs
/// render the parallel YES..NO scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum VerdictLabel {
    True,
    MostlyTrue,
    LeaningTrue,
    Unverified,
    LeaningFalse,
    MostlyFalse,
    False,
}

/// Which rendering of the seven-level scale to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictScale {
    Statement,
    Question,
}

impl VerdictLabel {
    /// Map a truth percentage to its band. Inclusive lower bounds:
    /// TRUE >=86, MOSTLY-TRUE 72, LEANING-TRUE 58, UNVERIFIED 43,
    /// LEANING-FALSE 29, MOSTLY-FALSE 15, FALSE <15.
    pub fn for_percentage(truth_percentage: f64) -> Self {
        let p = truth_percentage.clamp(0.0, 100.0);
        if p >= 86.0 {
            VerdictLabel::True
        } else if p >= 72.0 {
            VerdictLabel::MostlyTrue
        } else if p >= 58.0 {
            VerdictLabel::LeaningTrue
        } else if p >= 43.0 {
            VerdictLabel::Unverified
        } else if p >= 29.0 {
            VerdictLabel::LeaningFalse
        } else if p >= 15.0 {
            VerdictLabel::MostlyFalse
        } else {
            VerdictLabel::False
        }
    }

    /// Render the label on the requested scale.
    pub fn render(&self, scale: VerdictScale) -> &'static str {
        match scale {
            VerdictScale::Statement => match self {
                VerdictLabel::True => "TRUE",
                VerdictLabel::MostlyTrue => "MOSTLY-TRUE",
                VerdictLabel::LeaningTrue => "LEANING-TRUE",
                VerdictLabel::Unverified => "UNVERIFIED",
                VerdictLabel::LeaningFalse => "LEANING-FALSE",
                VerdictLabel::MostlyFalse => "MOSTLY-FALSE",
                VerdictLabel::False => "FALSE",
            },
            VerdictScale::Question => match self {
                VerdictLabel::True => "YES",
                VerdictLabel::MostlyTrue => "MOSTLY-YES",
                VerdictLabel::LeaningTrue => "LEANING-YES",
                VerdictLabel::Unverified => "UNVERIFIED",
                VerdictLabel::LeaningFalse => "LEANING-NO",
                VerdictLabel::MostlyFalse => "MOSTLY-NO",
                VerdictLabel::False => "NO",
            },
        }
    }

    /// Distance in bands between two labels, for calibration comparisons.
    pub fn band_distance(&self, other: &VerdictLabel) -> u8 {
        (self.band_index() as i8 - other.band_index() as i8).unsigned_abs()
    }

    fn band_index(&self) -> u8 {
        match self {
            VerdictLabel::True => 6,
            VerdictLabel::MostlyTrue => 5,
            VerdictLabel::LeaningTrue => 4,
            VerdictLabel::Unverified => 3,
            VerdictLabel::LeaningFalse => 2,
            VerdictLabel::MostlyFalse => 1,
            VerdictLabel::False => 0,
        }
    }
}

/// Whether the claim rests on documented fact, dispute, or opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactualBasis {
    Established,
    Disputed,
    Opinion,
    Alleged,
    Unknown,
}

/// Self-consistency measurement across repeated advocate runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyResult {
    pub claim_id: String,
    /// Truth percentages from the advocate run plus the repeats.
    pub percentages: Vec<f64>,
    pub average: f64,
    /// max - min across the runs.
    pub spread: f64,
    pub stable: bool,
    /// False when self-consistency was disabled.
    pub assessed: bool,
}

impl ConsistencyResult {
    /// The result used when self-consistency is disabled: a single sample,
    /// zero spread, trivially stable.
    pub fn unassessed(claim_id: impl Into<String>, percentage: f64) -> Self {
        Self {
            claim_id: claim_id.into(),
            percentages: vec![percentage],
            average: percentage,
            spread: 0.0,
            stable: true,
            assessed: false,
        }
    }

    /// Compute from a sample set; `stable` holds when spread <= threshold.
    pub fn from_samples(
        claim_id: impl Into<String>,
        percentages: Vec<f64>,
        stable_threshold: f64,
    ) -> Self {
        let max = percentages.iter().cloned().fold(f64::MIN, f64::max);
        let min = percentages.iter().cloned().fold(f64::MAX, f64::min);
        let spread = if percentages.is_empty() { 0.0 } else { max - min };
        let average = if percentages.is_empty() {
            0.0
        } else {
            percentages.iter().sum::<f64>() / percentages.len() as f64
        };
        Self {
            claim_id: claim_id.into(),
            percentages,
            average,
            spread,
            stable: spread <= stable_threshold,
            assessed: true,
        }
    }
}

/// Severity of an adversarial challenge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeSeverity {
    Low,
    Medium,
    High,
}

/// A single methodological or evidentiary critique raised by the challenger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengePoint {
    #[serde(rename = "type")]
    pub point_type: String,
    pub description: String,
    pub evidence_ids: Vec<String>,
    pub severity: ChallengeSeverity,
}

/// Challenges keyed per claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimChallenge {
    pub claim_id: String,
    pub points: Vec<ChallengePoint>,
}

/// The challenger step's full output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeDocument {
    pub challenges: Vec<ClaimChallenge>,
}

impl ChallengeDocument {
    pub fn points_for(&self, claim_id: &str) -> &[ChallengePoint] {
        self.challenges
            .iter()
            .find(|c| c.claim_id == claim_id)
            .map(|c| c.points.as_slice())
            .unwrap_or(&[])
    }
}

/// How the reconciler answered one challenge point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge_type: String,
    pub response: String,
    pub verdict_adjusted: bool,
}

/// Per-boundary finding within a claim verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryFinding {
    pub boundary_id: String,
    pub truth_percentage: f64,
    pub confidence: f64,
    pub summary: String,
}

/// Triangulation level across independent boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriangulationLevel {
    None,
    Single,
    Corroborated,
    Contested,
}

/// Agreement across independent boundaries. Factor >= 1 when unanimous,
/// < 1 when mixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangulationScore {
    pub boundary_count: usize,
    pub supporting: usize,
    pub contradicting: usize,
    pub level: TriangulationLevel,
    pub factor: f64,
}

/// Reliability metadata attached when evidence weighting ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReliabilityMeta {
    /// Mean track-record score of cited sources, unknowns at the default.
    pub mean_score: f64,
    pub known_sources: usize,
    pub unknown_sources: usize,
}

/// Final per-claim verdict.
///
/// Invariants: the label matches the truth-percentage band; every cited
/// evidence id exists in the run; elevated harm with confidence below the
/// floor forces the UNVERIFIED label while preserving the numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimVerdict {
    pub id: String,
    pub claim_id: String,
    pub truth_percentage: f64,
    pub verdict: VerdictLabel,
    pub confidence: f64,
    pub reasoning: String,
    pub harm_potential: crate::HarmPotential,
    pub is_contested: bool,
    pub factual_basis: FactualBasis,
    pub supporting_evidence_ids: Vec<String>,
    pub contradicting_evidence_ids: Vec<String>,
    pub boundary_findings: Vec<BoundaryFinding>,
    pub consistency_result: Option<ConsistencyResult>,
    pub challenge_responses: Vec<ChallengeResponse>,
    pub triangulation_score: Option<TriangulationScore>,
    /// Mean cited-source reliability applied to the verdict, when known.
    pub evidence_weight: Option<f64>,
    pub source_reliability_meta: Option<SourceReliabilityMeta>,
}

impl ClaimVerdict {
    pub fn cited_evidence_ids(&self) -> impl Iterator<Item = &String> {
        self.supporting_evidence_ids
            .iter()
            .chain(self.contradicting_evidence_ids.iter())
    }
}

/// Narrative synthesis of the aggregated result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictNarrative {
    pub headline: String,
    pub evidence_base_summary: String,
    pub key_finding: String,
    /// Present when two boundaries disagree by more than 20 points.
    pub boundary_disagreements: Option<String>,
    pub limitations: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_have_inclusive_lower_bounds() {
        assert_eq!(VerdictLabel::for_percentage(86.0), VerdictLabel::True);
        assert_eq!(VerdictLabel::for_percentage(85.9), VerdictLabel::MostlyTrue);
        assert_eq!(VerdictLabel::for_percentage(72.0), VerdictLabel::MostlyTrue);
        assert_eq!(VerdictLabel::for_percentage(58.0), VerdictLabel::LeaningTrue);
        assert_eq!(VerdictLabel::for_percentage(57.9), VerdictLabel::Unverified);
        assert_eq!(VerdictLabel::for_percentage(43.0), VerdictLabel::Unverified);
        assert_eq!(VerdictLabel::for_percentage(42.9), VerdictLabel::LeaningFalse);
        assert_eq!(VerdictLabel::for_percentage(29.0), VerdictLabel::LeaningFalse);
        assert_eq!(VerdictLabel::for_percentage(15.0), VerdictLabel::MostlyFalse);
        assert_eq!(VerdictLabel::for_percentage(14.9), VerdictLabel::False);
        assert_eq!(VerdictLabel::for_percentage(0.0), VerdictLabel::False);
    }

    #[test]
    fn question_scale_renders_yes_no() {
        assert_eq!(VerdictLabel::True.render(VerdictScale::Question), "YES");
        assert_eq!(
            VerdictLabel::MostlyFalse.render(VerdictScale::Question),
            "MOSTLY-NO"
        );
        assert_eq!(
            VerdictLabel::Unverified.render(VerdictScale::Question),
            "UNVERIFIED"
        );
        assert_eq!(VerdictLabel::False.render(VerdictScale::Statement), "FALSE");
    }

    #[test]
    fn consistency_spread_and_stability() {
        let result =
            ConsistencyResult::from_samples("CLAIM_1", vec![70.0, 75.0, 72.0], 5.0);
        assert!(result.assessed);
        assert_eq!(result.spread, 5.0);
        assert!(result.stable);
        assert!((result.average - 72.333).abs() < 0.01);

        let wide = ConsistencyResult::from_samples("CLAIM_1", vec![40.0, 70.0, 55.0], 5.0);
        assert_eq!(wide.spread, 30.0);
        assert!(!wide.stable);
    }

    #[test]
    fn unassessed_consistency_is_stable_with_zero_spread() {
        let result = ConsistencyResult::unassessed("CLAIM_1", 64.0);
        assert!(!result.assessed);
        assert!(result.stable);
        assert_eq!(result.spread, 0.0);
    }

    #[test]
    fn band_distance_is_symmetric() {
        assert_eq!(
            VerdictLabel::True.band_distance(&VerdictLabel::MostlyTrue),
            1
        );
        assert_eq!(
            VerdictLabel::MostlyTrue.band_distance(&VerdictLabel::True),
            1
        );
        assert_eq!(VerdictLabel::True.band_distance(&VerdictLabel::False), 6);
    }
}
