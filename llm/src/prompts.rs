//! Prompt registry
//!
//! Every call site names a prompt by key. The registry carries the
//! instruction template, the default model tier, the response keys the
//! output must contain, and the neutral fallback shape used when parsing
//! fails twice.

use serde_json::{json, Value};
use veridex_contracts::ModelTier;

/// Known prompt keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKey {
    ClaimExtraction,
    QueryGeneration,
    EvidenceExtraction,
    BoundaryClustering,
    VerdictAdvocate,
    VerdictChallenger,
    VerdictReconciliation,
    ValidationGrounding,
    ValidationDirection,
    NarrativeSynthesis,
    ReliabilityEvaluator,
}

impl PromptKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKey::ClaimExtraction => "CLAIM_EXTRACTION",
            PromptKey::QueryGeneration => "QUERY_GENERATION",
            PromptKey::EvidenceExtraction => "EVIDENCE_EXTRACTION",
            PromptKey::BoundaryClustering => "BOUNDARY_CLUSTERING",
            PromptKey::VerdictAdvocate => "VERDICT_ADVOCATE",
            PromptKey::VerdictChallenger => "VERDICT_CHALLENGER",
            PromptKey::VerdictReconciliation => "VERDICT_RECONCILIATION",
            PromptKey::ValidationGrounding => "VALIDATION_GROUNDING",
            PromptKey::ValidationDirection => "VALIDATION_DIRECTION",
            PromptKey::NarrativeSynthesis => "NARRATIVE_SYNTHESIS",
            PromptKey::ReliabilityEvaluator => "RELIABILITY_EVALUATOR",
        }
    }

    /// Default model tier for this prompt.
    pub fn default_tier(&self) -> ModelTier {
        match self {
            PromptKey::ClaimExtraction
            | PromptKey::QueryGeneration
            | PromptKey::EvidenceExtraction
            | PromptKey::ValidationGrounding
            | PromptKey::ValidationDirection
            | PromptKey::NarrativeSynthesis => ModelTier::Haiku,
            PromptKey::BoundaryClustering
            | PromptKey::VerdictAdvocate
            | PromptKey::VerdictChallenger
            | PromptKey::VerdictReconciliation
            | PromptKey::ReliabilityEvaluator => ModelTier::Sonnet,
        }
    }

    /// Top-level keys the parsed response object must contain.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            PromptKey::ClaimExtraction => &["atomic_claims", "analysis_contexts", "implied_claim"],
            PromptKey::QueryGeneration => &["queries"],
            PromptKey::EvidenceExtraction => &["evidence_items"],
            PromptKey::BoundaryClustering => &["boundaries", "assignments"],
            PromptKey::VerdictAdvocate => &["verdicts"],
            PromptKey::VerdictChallenger => &["challenges"],
            PromptKey::VerdictReconciliation => &["verdicts"],
            PromptKey::ValidationGrounding => &["issues"],
            PromptKey::ValidationDirection => &["issues"],
            PromptKey::NarrativeSynthesis => &["headline", "key_finding"],
            PromptKey::ReliabilityEvaluator => &["source_type", "factual_rating"],
        }
    }

    /// Neutral fallback returned after a second schema failure. Shapes are
    /// chosen so downstream stages degrade rather than crash.
    pub fn fallback_value(&self) -> Value {
        match self {
            PromptKey::ClaimExtraction => json!({
                "implied_claim": "",
                "atomic_claims": [],
                "analysis_contexts": [],
            }),
            PromptKey::QueryGeneration => json!({ "queries": [] }),
            PromptKey::EvidenceExtraction => json!({ "evidence_items": [] }),
            PromptKey::BoundaryClustering => json!({ "boundaries": [], "assignments": [] }),
            PromptKey::VerdictAdvocate | PromptKey::VerdictReconciliation => {
                json!({ "verdicts": [] })
            }
            PromptKey::VerdictChallenger => json!({ "challenges": [] }),
            PromptKey::ValidationGrounding | PromptKey::ValidationDirection => {
                json!({ "issues": [] })
            }
            PromptKey::NarrativeSynthesis => json!({
                "headline": "",
                "evidence_base_summary": "",
                "key_finding": "",
                "limitations": "",
            }),
            PromptKey::ReliabilityEvaluator => json!({
                "source_type": "unknown",
                "score": null,
                "confidence": 0.0,
                "factual_rating": "insufficient_data",
                "evidence_cited": [],
                "caveats": [],
            }),
        }
    }

    /// Instruction template. The payload is appended as a JSON block.
    pub fn instructions(&self) -> &'static str {
        match self {
            PromptKey::ClaimExtraction => {
                "Decompose the input into atomic, independently verifiable claims. \
                 For each claim set: centrality (high|medium|low), harm_potential \
                 (critical|high|medium|low), claim_direction (supports_thesis|\
                 contradicts_thesis|contextual), thesis_relevance (direct|tangential|\
                 irrelevant) with thesis_relevance_confidence 0-100, key_entities, \
                 grounding_quality (strong|moderate|weak|none), specificity_score 0-1, \
                 an expected_evidence_profile, and mark counter-claims with \
                 is_counter_claim=true. Also list the analysis contexts (legal, \
                 methodological, geographic, temporal, other) the input spans. \
                 Respond with a single JSON object."
            }
            PromptKey::QueryGeneration => {
                "Generate 1-4 focused web search queries that would surface \
                 primary evidence for the claims below within the given analysis \
                 context. Prefer queries naming concrete entities, metrics, and \
                 dates. Respond with a single JSON object {\"queries\": [...]}."
            }
            PromptKey::EvidenceExtraction => {
                "From each fetched article below, extract zero or more evidence \
                 items bearing on the listed claims. Each item needs: a statement \
                 of at least one full sentence, source_excerpt quoted from the \
                 article, claim_direction (supports|contradicts|neutral|mixed), \
                 probative_value (high|medium|low), an evidence_scope (name, \
                 methodology, temporal, geographic), relevant_claim_ids, and the \
                 source id E{n} of the article it came from. Respond with a single \
                 JSON object."
            }
            PromptKey::BoundaryClustering => {
                "Group the evidence items into claim-assessment boundaries that \
                 share methodology, geography, or temporality. Name each boundary, \
                 estimate internal_coherence 0-1, list constituent contexts, and \
                 assign each evidence id to exactly one boundary. Respond with a \
                 single JSON object."
            }
            PromptKey::VerdictAdvocate => {
                "Act as the advocate. For each claim, weigh the evidence pack and \
                 emit a verdict: truth_percentage 0-100, confidence 0-100, \
                 reasoning, factual_basis (established|disputed|opinion|alleged|\
                 unknown), is_contested, per-boundary findings, and the supporting \
                 and contradicting evidence ids. Cite only evidence ids from the \
                 pack. Respond with a single JSON object."
            }
            PromptKey::VerdictChallenger => {
                "Act as the adversarial challenger. For each claim verdict below, \
                 raise targeted methodological and evidentiary critiques: sampling \
                 problems, scope mismatches, source weaknesses, missing \
                 counter-evidence. Each point carries a type, description, \
                 evidence_ids, and severity (low|medium|high). Respond with a \
                 single JSON object."
            }
            PromptKey::VerdictReconciliation => {
                "Reconcile the advocate verdicts with the challenge points and the \
                 consistency measurements. For each claim return revised \
                 truth_percentage, confidence, reasoning, and challenge_responses \
                 (challenge_type, response, verdict_adjusted). Do not re-emit \
                 boundary findings or evidence lists. Respond with a single JSON \
                 object."
            }
            PromptKey::ValidationGrounding => {
                "Validate grounding: every evidence id cited by the verdicts below \
                 must exist in the evidence pack, and reasoning must rely on the \
                 pack rather than pretrained knowledge. List issues found; an empty \
                 list means the verdicts are grounded. Respond with a single JSON \
                 object {\"issues\": [...]}."
            }
            PromptKey::ValidationDirection => {
                "Validate direction: each claim's polarity must be consistent with \
                 its supporting_evidence_ids and contradicting_evidence_ids. List \
                 issues found. Respond with a single JSON object {\"issues\": [...]}."
            }
            PromptKey::NarrativeSynthesis => {
                "Write the verdict narrative from the aggregated numbers and claim \
                 verdicts: headline, evidence_base_summary, key_finding, \
                 boundary_disagreements (required when two boundaries differ by \
                 more than 20 points), limitations. Respond with a single JSON \
                 object."
            }
            PromptKey::ReliabilityEvaluator => {
                "Evaluate the factual track record of the domain below using only \
                 the retrieved third-party assessments. Emit source_type, score 0-1 \
                 or null, confidence 0-1, factual_rating, bias, evidence_cited \
                 (claim, basis, evidence_id), and caveats. Respond with a single \
                 JSON object."
            }
        }
    }

    /// Render the full prompt for a payload.
    pub fn render(&self, payload: &Value) -> String {
        format!(
            "{}\n\nInput:\n```json\n{}\n```",
            self.instructions(),
            serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
        )
    }
}

impl std::fmt::Display for PromptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
