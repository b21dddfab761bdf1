//! Heuristic scope pre-detection
//!
//! Before extraction runs, regex patterns over the raw input suggest the
//! analysis contexts a comparison is likely to span. The hints are passed
//! to the extraction prompt; they never override what extraction finds.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A pre-detected scope hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeHint {
    pub id: String,
    pub name: String,
    pub rationale: String,
}

static COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(more|less|fewer|better|worse)\b.*\bthan\b|\b\w{3,}er\s+than\b")
        .expect("pattern")
});

static EFFICIENCY_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(energy|efficien\w+|consum\w+|fuel|power|emissions?|mileage)\b")
        .expect("pattern")
});

static LEGAL_FAIRNESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(fair(ness)?|due process|impartial\w*|biased?\s+(court|trial|judge)|rigged)\b")
        .expect("pattern")
});

static ENVIRONMENT_HEALTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(health(ier|y)?|safer?|toxic\w*|pollut\w*|carbon|climate|cancer|mortality)\b")
        .expect("pattern")
});

/// Detect scope hints in the raw input.
pub fn detect_scope_hints(input: &str) -> Vec<ScopeHint> {
    let mut hints = Vec::new();
    let comparison = COMPARISON.is_match(input);

    if comparison && EFFICIENCY_TERMS.is_match(input) {
        hints.push(ScopeHint {
            id: "SCOPE_PRODUCTION".to_string(),
            name: "Production phase".to_string(),
            rationale: "efficiency comparison".to_string(),
        });
        hints.push(ScopeHint {
            id: "SCOPE_USAGE".to_string(),
            name: "Usage phase".to_string(),
            rationale: "efficiency comparison".to_string(),
        });
    }

    if LEGAL_FAIRNESS.is_match(input) {
        hints.push(ScopeHint {
            id: "SCOPE_LEGAL_PROC".to_string(),
            name: "Legal proceeding".to_string(),
            rationale: "legal fairness trigger".to_string(),
        });
        hints.push(ScopeHint {
            id: "SCOPE_OUTCOMES".to_string(),
            name: "Case outcomes".to_string(),
            rationale: "legal fairness trigger".to_string(),
        });
    }

    if comparison && ENVIRONMENT_HEALTH.is_match(input) {
        hints.push(ScopeHint {
            id: "SCOPE_DIRECT".to_string(),
            name: "Direct effects".to_string(),
            rationale: "environmental or health comparison".to_string(),
        });
        hints.push(ScopeHint {
            id: "SCOPE_LIFECYCLE".to_string(),
            name: "Lifecycle effects".to_string(),
            rationale: "environmental or health comparison".to_string(),
        });
    }

    hints
}

/// Does the input carry an explicit 4-digit year?
pub fn input_has_year(input: &str) -> bool {
    static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("pattern"));
    YEAR.is_match(input)
}

/// Status anchor words that justify a non-"unknown" context status.
pub fn input_status_anchor(input: &str) -> Option<&'static str> {
    const ANCHORS: &[&str] = &[
        "pending", "ongoing", "closed", "dismissed", "convicted", "acquitted", "settled",
        "appealed", "overturned",
    ];
    let lowered = input.to_lowercase();
    ANCHORS.iter().copied().find(|anchor| lowered.contains(anchor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficiency_comparison_detects_production_and_usage() {
        let hints =
            detect_scope_hints("Hydrogen cars use more energy than electric cars");
        let ids: Vec<&str> = hints.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"SCOPE_PRODUCTION"));
        assert!(ids.contains(&"SCOPE_USAGE"));
        assert!(hints.len() >= 2);
    }

    #[test]
    fn legal_fairness_trigger() {
        let hints = detect_scope_hints("The trial was rigged and lacked due process");
        let ids: Vec<&str> = hints.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"SCOPE_LEGAL_PROC"));
        assert!(ids.contains(&"SCOPE_OUTCOMES"));
    }

    #[test]
    fn health_comparison_trigger() {
        let hints = detect_scope_hints("Vaping is safer than smoking");
        let ids: Vec<&str> = hints.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"SCOPE_DIRECT"));
        assert!(ids.contains(&"SCOPE_LIFECYCLE"));
    }

    #[test]
    fn plain_statement_yields_no_hints() {
        assert!(detect_scope_hints("The company was founded by two engineers").is_empty());
    }

    #[test]
    fn year_and_status_detection() {
        assert!(input_has_year("Case 2024-017 before the court"));
        assert!(!input_has_year("Case 17 before the court"));
        assert_eq!(
            input_status_anchor("the case is still pending before the SC"),
            Some("pending")
        );
        assert_eq!(input_status_anchor("no status words here"), None);
    }
}
