//! Context canonicalization
//!
//! Stabilizes context identifiers across providers and prevents
//! cross-scope citation bleed when a single input mentions multiple
//! institutions with overlapping labels. Canonicalization is idempotent.

use crate::scopes::{input_has_year, input_status_anchor};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use veridex_contracts::{AnalysisContext, AtomicClaim, CTX_UNSCOPED};

const MAX_SUBJECT_NAME: usize = 120;

/// Names too generic to keep.
const GENERIC_NAMES: &[&str] = &[
    "general criminal proceeding",
    "general proceeding",
    "general context",
    "legal context",
    "unnamed context",
];

static INSTITUTION_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{2,5})\b").expect("pattern"));

/// Detect an institution code (FTC, EC, SC, ...) in a context's name,
/// short name, or subject.
pub fn institution_code(context: &AnalysisContext) -> Option<String> {
    for text in [&context.short_name, &context.name, &context.subject] {
        if let Some(captures) = INSTITUTION_CODE.captures(text) {
            return Some(captures[1].to_string());
        }
    }
    None
}

/// Canonicalization output: stabilized contexts plus the old-to-new id
/// remap applied to claims.
#[derive(Debug, Clone)]
pub struct CanonicalContexts {
    pub contexts: Vec<AnalysisContext>,
    pub remap: HashMap<String, String>,
}

/// Canonicalize contexts against the raw input text and rewrite claim
/// references through the remap.
pub fn canonicalize_contexts(
    raw: Vec<AnalysisContext>,
    input_text: &str,
    claims: &mut [AtomicClaim],
) -> CanonicalContexts {
    // Provider-invariant lex order.
    let mut sorted = raw;
    sorted.sort_by(|a, b| {
        let key_a = (
            a.context_type.type_rank(),
            institution_code(a).unwrap_or_default(),
            a.name.clone(),
        );
        let key_b = (
            b.context_type.type_rank(),
            institution_code(b).unwrap_or_default(),
            b.name.clone(),
        );
        key_a.cmp(&key_b)
    });

    let has_year = input_has_year(input_text);
    let status_anchor = input_status_anchor(input_text);

    let mut assigned: HashSet<String> = HashSet::new();
    let mut remap = HashMap::new();
    let mut contexts = Vec::with_capacity(sorted.len());

    for (index, mut context) in sorted.into_iter().enumerate() {
        let stable_index = index + 1;
        let code = institution_code(&context);

        // Canonical id: CTX_{INSTITUTION} when detectable, else CTX_{n};
        // collisions take the stable index as a suffix.
        let mut id = match &code {
            Some(code) => format!("CTX_{code}"),
            None => format!("CTX_{stable_index}"),
        };
        if !assigned.insert(id.clone()) {
            id = format!("{id}_{stable_index}");
            assigned.insert(id.clone());
        }

        // Generic names are replaced with the subject or a derived form.
        if GENERIC_NAMES.contains(&context.name.to_lowercase().as_str()) {
            context.name = if !context.subject.is_empty() {
                truncate(&context.subject, MAX_SUBJECT_NAME)
            } else {
                match &code {
                    Some(code) => format!("{:?} context ({code})", context.context_type),
                    None => format!("{:?} context", context.context_type),
                }
            };
        }

        if !has_year {
            context.date = String::new();
        }
        context.status = match status_anchor {
            Some(anchor) => anchor.to_string(),
            None => "unknown".to_string(),
        };

        if context.id != id {
            debug!("context {} canonicalized to {}", context.id, id);
            remap.insert(context.id.clone(), id.clone());
        } else {
            remap.insert(context.id.clone(), id.clone());
        }
        context.id = id;
        contexts.push(context);
    }

    for claim in claims.iter_mut() {
        if let Some(old) = &claim.related_context_id {
            if let Some(new) = remap.get(old) {
                claim.related_context_id = Some(new.clone());
            }
        }
    }

    CanonicalContexts { contexts, remap }
}

/// Append the fallback "General context" when extraction produced none.
pub fn ensure_at_least_one_context(contexts: &mut Vec<AnalysisContext>) {
    if contexts.is_empty() {
        contexts.push(AnalysisContext::general());
    }
}

/// Bind a piece of evidence text to a context id. Evidence matching
/// multiple contexts, or only an abbreviation shared between contexts,
/// binds to `CTX_UNSCOPED` and is excluded from per-context aggregation.
pub fn bind_evidence_scope(
    evidence_text: &str,
    contexts: &[AnalysisContext],
    default_context: &str,
) -> String {
    let lowered = evidence_text.to_lowercase();

    // Token -> contexts that claim it. Shared tokens disambiguate nothing.
    let mut token_owners: BTreeMap<String, HashSet<&str>> = BTreeMap::new();
    for context in contexts {
        let mut tokens: Vec<String> = vec![context.short_name.to_lowercase()];
        if let Some(code) = institution_code(context) {
            tokens.push(code.to_lowercase());
        }
        let subject_words: Vec<String> = context
            .subject
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        for word in &subject_words {
            if word.len() >= 5 {
                tokens.push(word.clone());
            }
        }
        // Short qualifiers ("Country A", "Phase II", "Case 7") are too
        // short to stand alone; they disambiguate as part of the phrase
        // they qualify.
        for pair in subject_words.windows(2) {
            if pair[0].len() >= 4 && pair[1].len() <= 3 {
                tokens.push(format!("{} {}", pair[0], pair[1]));
            }
        }
        for token in tokens {
            if token.len() >= 2 {
                token_owners
                    .entry(token)
                    .or_default()
                    .insert(context.id.as_str());
            }
        }
    }

    let mut matched: HashSet<&str> = HashSet::new();
    let mut saw_shared_token = false;
    for (token, owners) in &token_owners {
        if !contains_token(&lowered, token) {
            continue;
        }
        if owners.len() == 1 {
            matched.extend(owners.iter());
        } else {
            // An abbreviation or term shared between contexts.
            saw_shared_token = true;
        }
    }

    match matched.len() {
        1 => matched.into_iter().next().unwrap_or(default_context).to_string(),
        0 if saw_shared_token => CTX_UNSCOPED.to_string(),
        0 => default_context.to_string(),
        _ => CTX_UNSCOPED.to_string(),
    }
}

fn contains_token(haystack: &str, token: &str) -> bool {
    let words: Vec<&str> = haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if token.contains(' ') {
        let parts: Vec<&str> = token.split(' ').collect();
        words.windows(parts.len()).any(|window| window == parts.as_slice())
    } else {
        words.iter().any(|word| *word == token)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text[..cut].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use veridex_contracts::ContextType;

    fn context(id: &str, name: &str, short: &str, subject: &str, t: ContextType) -> AnalysisContext {
        AnalysisContext {
            id: id.to_string(),
            name: name.to_string(),
            short_name: short.to_string(),
            context_type: t,
            subject: subject.to_string(),
            metadata: StdHashMap::new(),
            date: "2023".to_string(),
            status: "pending".to_string(),
        }
    }

    #[test]
    fn institution_ids_and_collision_suffixing() {
        let raw = vec![
            context("raw_b", "Supreme Court of Country B", "SC", "Case 2024-017 in Country B", ContextType::Legal),
            context("raw_a", "Supreme Court of Country A", "SC", "Case 2024-017 in Country A", ContextType::Legal),
        ];
        let mut claims = Vec::new();
        let result = canonicalize_contexts(raw, "two courts, Case 2024-017", &mut claims);
        let ids: Vec<&str> = result.contexts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids[0], "CTX_SC");
        assert_eq!(ids[1], "CTX_SC_2");
    }

    #[test]
    fn generic_names_replaced_with_subject() {
        let raw = vec![context(
            "raw_1",
            "General criminal proceeding",
            "Proc",
            "Fraud case against the former minister",
            ContextType::Legal,
        )];
        let mut claims = Vec::new();
        let result = canonicalize_contexts(raw, "fraud case", &mut claims);
        assert_eq!(result.contexts[0].name, "Fraud case against the former minister");
    }

    #[test]
    fn date_and_status_blanking_rules() {
        let raw = vec![context("raw_1", "Court", "FTC", "FTC matter", ContextType::Legal)];
        let mut claims = Vec::new();
        let result = canonicalize_contexts(raw, "no year no status words", &mut claims);
        assert_eq!(result.contexts[0].date, "");
        assert_eq!(result.contexts[0].status, "unknown");

        let raw = vec![context("raw_1", "Court", "FTC", "FTC matter", ContextType::Legal)];
        let mut claims = Vec::new();
        let result = canonicalize_contexts(raw, "the 2024 case is still pending", &mut claims);
        assert_eq!(result.contexts[0].date, "2023");
        assert_eq!(result.contexts[0].status, "pending");
    }

    #[test]
    fn claim_references_are_remapped() {
        let raw = vec![context("raw_ftc", "FTC inquiry", "FTC", "FTC matter", ContextType::Legal)];
        let mut claims = vec![AtomicClaim {
            id: "CLAIM_1".to_string(),
            statement: "s".to_string(),
            category: "c".to_string(),
            centrality: veridex_contracts::Centrality::High,
            harm_potential: veridex_contracts::HarmPotential::Low,
            is_central: true,
            claim_direction: veridex_contracts::ClaimDirection::SupportsThesis,
            key_entities: Vec::new(),
            check_worthiness: 0.5,
            specificity_score: 0.5,
            grounding_quality: veridex_contracts::GroundingQuality::Moderate,
            expected_evidence_profile: Default::default(),
            thesis_relevance: veridex_contracts::ThesisRelevance::Direct,
            thesis_relevance_confidence: 90.0,
            is_counter_claim: false,
            related_context_id: Some("raw_ftc".to_string()),
        }];
        let result = canonicalize_contexts(raw, "input", &mut claims);
        assert_eq!(claims[0].related_context_id.as_deref(), Some("CTX_FTC"));
        assert_eq!(result.remap["raw_ftc"], "CTX_FTC");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let raw = vec![
            context("raw_1", "Supreme Court A", "SCA", "Case in A", ContextType::Legal),
            context("raw_2", "Production methodology", "Prod", "Production energy", ContextType::Methodological),
        ];
        let mut claims = Vec::new();
        let once = canonicalize_contexts(raw, "the 2024 pending case", &mut claims);
        let twice = canonicalize_contexts(once.contexts.clone(), "the 2024 pending case", &mut claims);
        let once_ids: Vec<&String> = once.contexts.iter().map(|c| &c.id).collect();
        let twice_ids: Vec<&String> = twice.contexts.iter().map(|c| &c.id).collect();
        assert_eq!(once_ids, twice_ids);
        for (a, b) in once.contexts.iter().zip(twice.contexts.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.status, b.status);
        }
    }

    #[test]
    fn fallback_context_appended_when_empty() {
        let mut contexts = Vec::new();
        ensure_at_least_one_context(&mut contexts);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].id, "CTX_1");
        // A second call does not duplicate it.
        ensure_at_least_one_context(&mut contexts);
        assert_eq!(contexts.len(), 1);
    }

    #[test]
    fn shared_abbreviation_binds_unscoped() {
        let contexts = vec![
            context("CTX_SC", "Supreme Court of Country A", "SC", "Country A proceedings", ContextType::Legal),
            context("CTX_SC_2", "Supreme Court of Country B", "SC", "Country B proceedings", ContextType::Legal),
        ];
        // Only the shared abbreviation: unscoped.
        assert_eq!(
            bind_evidence_scope("The SC ruled on the matter", &contexts, "CTX_1"),
            CTX_UNSCOPED
        );
        // The short qualifier resolves through its phrase: "Country A" is
        // unique to the first context even though "SC", "country", and
        // "proceedings" are all shared.
        assert_eq!(
            bind_evidence_scope("Country A proceedings continued before the SC", &contexts, "CTX_1"),
            "CTX_SC"
        );
        assert_eq!(
            bind_evidence_scope("The SC of Country B dismissed the appeal", &contexts, "CTX_1"),
            "CTX_SC_2"
        );
        // A unique full-length subject word also resolves.
        let contexts2 = vec![
            context("CTX_SC", "Supreme Court of Alphaland", "SCA", "Alphaland fraud case", ContextType::Legal),
            context("CTX_SC_2", "Supreme Court of Betaland", "SCB", "Betaland fraud case", ContextType::Legal),
        ];
        assert_eq!(
            bind_evidence_scope("The Alphaland bench heard testimony", &contexts2, "CTX_1"),
            "CTX_SC"
        );
    }

    #[test]
    fn unmatched_evidence_uses_default() {
        let contexts = vec![context(
            "CTX_FTC",
            "FTC inquiry",
            "FTC",
            "FTC antitrust matter",
            ContextType::Legal,
        )];
        assert_eq!(
            bind_evidence_scope("Completely unrelated text", &contexts, "CTX_1"),
            "CTX_1"
        );
    }
}
