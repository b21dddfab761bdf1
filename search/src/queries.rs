//! Phased query plans and the static assessment vocabulary
//!
//! A source assessment runs seven query families in a fixed order. Site
//! lists and key-term translations are static configuration, not fetched.

use serde::{Deserialize, Serialize};

/// The seven phase families, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPhase {
    ReliabilityEnglish,
    ReliabilityTranslated,
    GlobalFactChecker,
    RegionalFactChecker,
    PropagandaTracking,
    NegativeSignal,
    EntityFocused,
}

impl QueryPhase {
    pub fn ordered() -> [QueryPhase; 7] {
        [
            QueryPhase::ReliabilityEnglish,
            QueryPhase::ReliabilityTranslated,
            QueryPhase::GlobalFactChecker,
            QueryPhase::RegionalFactChecker,
            QueryPhase::PropagandaTracking,
            QueryPhase::NegativeSignal,
            QueryPhase::EntityFocused,
        ]
    }

    pub fn focus(&self) -> &'static str {
        match self {
            QueryPhase::ReliabilityEnglish => "reliability",
            QueryPhase::ReliabilityTranslated => "reliability_translated",
            QueryPhase::GlobalFactChecker => "fact_checker_global",
            QueryPhase::RegionalFactChecker => "fact_checker_regional",
            QueryPhase::PropagandaTracking => "propaganda_tracking",
            QueryPhase::NegativeSignal => "negative_signal",
            QueryPhase::EntityFocused => "entity",
        }
    }
}

/// A planned query with its phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub phase: QueryPhase,
    pub query: String,
}

/// Global fact-checking sites targeted with `site:` batches.
pub const GLOBAL_FACT_CHECKERS: &[&str] = &[
    "snopes.com",
    "politifact.com",
    "factcheck.org",
    "fullfact.org",
    "apnews.com",
    "reuters.com",
    "afp.com",
    "leadstories.com",
    "checkyourfact.com",
];

/// Regional fact-checking sites keyed by language code.
pub fn regional_fact_checkers(language: &str) -> &'static [&'static str] {
    match language {
        "de" => &["correctiv.org", "mimikama.org", "dpa-factchecking.com"],
        "fr" => &["factuel.afp.com", "liberation.fr", "francetvinfo.fr"],
        "es" => &["maldita.es", "newtral.es", "chequeado.com"],
        "it" => &["pagellapolitica.it", "facta.news", "open.online"],
        "pt" => &["aosfatos.org", "lupa.uol.com.br", "poligrafo.sapo.pt"],
        "ru" => &["provereno.media", "factcheck.kz"],
        "uk" => &["stopfake.org", "voxukraine.org"],
        _ => &[],
    }
}

/// English assessment vocabulary used by the relevance filter.
pub const ASSESSMENT_TERMS_EN: &[&str] = &[
    "reliability",
    "credibility",
    "bias",
    "misinformation",
    "disinformation",
    "fact check",
    "fact-check",
    "debunked",
    "propaganda",
    "accuracy",
    "fake news",
    "false claims",
    "media rating",
];

/// The fixed key-term set translated for non-English relevance checks.
/// Static config; extended by adding languages here.
pub fn translated_key_terms(language: &str) -> &'static [&'static str] {
    match language {
        "de" => &[
            "zuverlässigkeit",
            "glaubwürdigkeit",
            "desinformation",
            "faktencheck",
            "propaganda",
            "falschmeldung",
        ],
        "fr" => &[
            "fiabilité",
            "crédibilité",
            "désinformation",
            "vérification des faits",
            "propagande",
            "fausses informations",
        ],
        "es" => &[
            "fiabilidad",
            "credibilidad",
            "desinformación",
            "verificación de hechos",
            "propaganda",
            "noticias falsas",
        ],
        "ru" => &[
            "достоверность",
            "дезинформация",
            "проверка фактов",
            "пропаганда",
            "фейковые новости",
        ],
        _ => &[],
    }
}

/// Hosts recognized as fact-checkers for the relevance filter.
pub fn is_fact_checker_host(host: &str) -> bool {
    let host = host.trim_start_matches("www.");
    GLOBAL_FACT_CHECKERS
        .iter()
        .chain(
            ["de", "fr", "es", "it", "pt", "ru", "uk"]
                .iter()
                .flat_map(|lang| regional_fact_checkers(lang).iter()),
        )
        .any(|site| host == *site || host.ends_with(&format!(".{site}")))
}

/// Build the full query plan for assessing a source domain.
pub fn plan_source_queries(
    domain: &str,
    brand_variants: &[String],
    language: Option<&str>,
    key_entities: &[String],
) -> Vec<PlannedQuery> {
    let mut plan = Vec::new();
    let brand = brand_variants.first().cloned().unwrap_or_else(|| domain.to_string());

    // (i) reliability assessment, English.
    for term in ["reliability", "credibility and bias", "factual reporting record"] {
        plan.push(PlannedQuery {
            phase: QueryPhase::ReliabilityEnglish,
            query: format!("\"{domain}\" {term}"),
        });
    }

    // (ii) language-translated reliability queries.
    if let Some(lang) = language.filter(|l| *l != "en") {
        for term in translated_key_terms(lang).iter().take(3) {
            plan.push(PlannedQuery {
                phase: QueryPhase::ReliabilityTranslated,
                query: format!("\"{domain}\" {term}"),
            });
        }
    }

    // (iii) global fact-checker site batches of 3.
    for batch in GLOBAL_FACT_CHECKERS.chunks(3) {
        let sites = batch
            .iter()
            .map(|s| format!("site:{s}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        plan.push(PlannedQuery {
            phase: QueryPhase::GlobalFactChecker,
            query: format!("{brand} ({sites})"),
        });
    }

    // (iv) regional fact-checker sites, language-keyed.
    if let Some(lang) = language {
        for batch in regional_fact_checkers(lang).chunks(3) {
            let sites = batch
                .iter()
                .map(|s| format!("site:{s}"))
                .collect::<Vec<_>>()
                .join(" OR ");
            plan.push(PlannedQuery {
                phase: QueryPhase::RegionalFactChecker,
                query: format!("{brand} ({sites})"),
            });
        }
    }

    // (v) state/foreign propaganda tracking, kept ahead of the generic
    // negative-signal sweep.
    for term in ["state media", "state-controlled", "foreign influence operation"] {
        plan.push(PlannedQuery {
            phase: QueryPhase::PropagandaTracking,
            query: format!("\"{domain}\" {term}"),
        });
    }

    // (vi) negative signals.
    for term in ["propaganda", "debunked", "false claims"] {
        plan.push(PlannedQuery {
            phase: QueryPhase::NegativeSignal,
            query: format!("{brand} {term}"),
        });
    }

    // (vii) entity-focused queries.
    for entity in key_entities.iter().take(3) {
        plan.push(PlannedQuery {
            phase: QueryPhase::EntityFocused,
            query: format!("{brand} \"{entity}\""),
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_run_in_declared_order() {
        let plan = plan_source_queries(
            "example-news.com",
            &["example".to_string()],
            Some("de"),
            &["Ministry".to_string()],
        );
        let phases: Vec<QueryPhase> = plan.iter().map(|q| q.phase).collect();
        let mut last_index = 0;
        let order = QueryPhase::ordered();
        for phase in phases {
            let index = order.iter().position(|p| *p == phase).unwrap();
            assert!(index >= last_index, "phase out of order: {phase:?}");
            last_index = index;
        }
    }

    #[test]
    fn site_batches_of_three() {
        let plan = plan_source_queries("example.com", &["example".to_string()], None, &[]);
        let batches: Vec<&PlannedQuery> = plan
            .iter()
            .filter(|q| q.phase == QueryPhase::GlobalFactChecker)
            .collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].query.matches("site:").count(), 3);
    }

    #[test]
    fn english_input_skips_translated_phase() {
        let plan = plan_source_queries("example.com", &["example".to_string()], Some("en"), &[]);
        assert!(!plan
            .iter()
            .any(|q| q.phase == QueryPhase::ReliabilityTranslated));
    }

    #[test]
    fn fact_checker_hosts_recognized() {
        assert!(is_fact_checker_host("snopes.com"));
        assert!(is_fact_checker_host("www.politifact.com"));
        assert!(is_fact_checker_host("factuel.afp.com"));
        assert!(!is_fact_checker_host("example-news.com"));
    }
}
