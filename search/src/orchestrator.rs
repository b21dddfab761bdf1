//! Search orchestration
//!
//! Executes queries against the selected provider with failover, a single
//! jittered retry for transient errors, URL de-duplication across phases,
//! the two-part relevance filter, and self-citation exclusion.

use crate::provider::{ProviderRegistry, SearchHit, SearchProvider, SearchRequest};
use crate::queries::{
    is_fact_checker_host, plan_source_queries, translated_key_terms, ASSESSMENT_TERMS_EN,
};
use crate::variants::brand_variants;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use veridex_contracts::{
    ProviderKind, SearchConfig, SearchQueryRecord, Warning, WarningType,
};
use veridex_resilience::{classify, ProviderFailure, ProviderHealth};

/// Host portion of a URL, lowercased.
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Is `host` the evaluated domain or one of its subdomains?
pub fn is_self_citation(host: &str, evaluated_domain: &str) -> bool {
    let host = host.trim_start_matches("www.");
    let domain = evaluated_domain.trim_start_matches("www.").to_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Outcome of a full source assessment sweep.
#[derive(Debug, Clone)]
pub struct SourceAssessment {
    pub hits: Vec<SearchHit>,
    pub queries: Vec<SearchQueryRecord>,
}

/// Search orchestrator shared by the research stage and the reliability
/// evaluator.
#[derive(Debug)]
pub struct SearchOrchestrator {
    registry: ProviderRegistry,
    config: SearchConfig,
    health: Arc<ProviderHealth>,
    active_provider: AtomicUsize,
    error_counts: Mutex<HashMap<String, u32>>,
    total_searches: AtomicUsize,
}

impl SearchOrchestrator {
    pub fn new(registry: ProviderRegistry, config: SearchConfig, health: Arc<ProviderHealth>) -> Self {
        Self {
            registry,
            config,
            health,
            active_provider: AtomicUsize::new(0),
            error_counts: Mutex::new(HashMap::new()),
            total_searches: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.registry.provider_names()
    }

    pub fn total_searches(&self) -> u64 {
        self.total_searches.load(Ordering::SeqCst) as u64
    }

    fn providers(&self) -> Vec<Arc<dyn SearchProvider>> {
        self.registry.select(self.config.provider)
    }

    /// Execute one query with de-duplication against previously seen URLs.
    /// Transient errors retry once with jitter; fatal errors are fed to
    /// provider health and the query is skipped.
    pub async fn execute_query(
        &self,
        query: &str,
        focus: &str,
        iteration: u32,
        seen_urls: &mut HashSet<String>,
    ) -> (Vec<SearchHit>, SearchQueryRecord) {
        let providers = self.providers();
        self.total_searches.fetch_add(1, Ordering::SeqCst);

        let request = SearchRequest {
            query: query.to_string(),
            max_results: self.config.max_results_per_query,
            date_restrict: self.config.date_restrict,
        };

        let mut hits = Vec::new();
        let mut provider_name = String::from("none");

        let start = self.active_provider.load(Ordering::SeqCst);
        'providers: for offset in 0..providers.len() {
            let index = (start + offset) % providers.len();
            let provider = &providers[index];
            provider_name = provider.name().to_string();

            let mut attempted_retry = false;
            loop {
                match provider.search(&request).await {
                    Ok(found) => {
                        self.health.record_success(ProviderKind::Search);
                        self.active_provider.store(index, Ordering::SeqCst);
                        hits = found;
                        break 'providers;
                    }
                    Err(failure) => {
                        let fatal = self.note_failure(&failure, focus);
                        if fatal {
                            debug!("fatal search error, failing over: {}", failure.message);
                            continue 'providers;
                        }
                        if attempted_retry {
                            break 'providers;
                        }
                        attempted_retry = true;
                        let jitter = rand::thread_rng().gen_range(0..=250);
                        sleep(Duration::from_millis(250 + jitter)).await;
                    }
                }
            }
        }

        let fresh: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| seen_urls.insert(hit.url.clone()))
            .collect();

        let record = SearchQueryRecord {
            query: query.to_string(),
            focus: focus.to_string(),
            iteration,
            results_count: fresh.len(),
            provider: provider_name,
        };
        (fresh, record)
    }

    /// Record a provider failure; returns true when it was fatal (counted
    /// toward the circuit breaker) and the query should fail over.
    fn note_failure(&self, failure: &ProviderFailure, focus: &str) -> bool {
        let mut failure = failure.clone();
        failure.provider = Some(ProviderKind::Search);
        let classified = classify(&failure);
        *self
            .error_counts
            .lock()
            .entry(focus.to_string())
            .or_insert(0) += 1;
        if classified.should_count_as_failure || failure.fatal == Some(true) {
            warn!("search provider failure ({}): {}", focus, classified.message);
            self.health.record_error(&classified);
            true
        } else {
            false
        }
    }

    /// Aggregate provider-error warning, when any errors occurred.
    pub fn drain_warnings(&self) -> Vec<Warning> {
        let counts = std::mem::take(&mut *self.error_counts.lock());
        if counts.is_empty() {
            return Vec::new();
        }
        let occurrences: u32 = counts.values().sum();
        vec![Warning::new(
            WarningType::SearchProviderError,
            format!("{occurrences} search provider errors during run"),
        )
        .with_details(serde_json::json!({
            "occurrences": occurrences,
            "stage_counts": counts,
        }))]
    }

    /// Full adaptive assessment sweep for a source domain: phase queries
    /// in order until the evidence cap, relevance-filtered, self-citation
    /// excluded, de-duplicated by URL.
    pub async fn assess_source(
        &self,
        domain: &str,
        language: Option<&str>,
        key_entities: &[String],
    ) -> SourceAssessment {
        let variants = brand_variants(domain);
        let plan = plan_source_queries(domain, &variants, language, key_entities);
        info!(
            "assessing {} with {} planned queries ({} brand variants)",
            domain,
            plan.len(),
            variants.len()
        );

        let mut seen_urls = HashSet::new();
        let mut kept = Vec::new();
        let mut records = Vec::new();

        for (iteration, planned) in plan.iter().enumerate() {
            if kept.len() >= self.config.max_evidence_items {
                break;
            }
            let (hits, record) = self
                .execute_query(
                    &planned.query,
                    planned.phase.focus(),
                    iteration as u32,
                    &mut seen_urls,
                )
                .await;
            records.push(record);

            for hit in hits {
                if kept.len() >= self.config.max_evidence_items {
                    break;
                }
                if self.is_relevant(&hit, domain, &variants, language) {
                    kept.push(hit);
                }
            }
        }

        SourceAssessment {
            hits: kept,
            queries: records,
        }
    }

    /// Two-part relevance filter: the hit must mention the domain or a
    /// brand variant of at least 4 chars, and must either come from a
    /// known fact-checker host or contain an assessment term.
    fn is_relevant(
        &self,
        hit: &SearchHit,
        domain: &str,
        variants: &[String],
        language: Option<&str>,
    ) -> bool {
        let Some(host) = host_of(&hit.url) else {
            return false;
        };
        if is_self_citation(&host, domain) {
            return false;
        }

        let text = format!("{} {}", hit.title, hit.snippet).to_lowercase();
        let mentions_brand = text.contains(&domain.to_lowercase())
            || variants
                .iter()
                .filter(|v| v.len() >= 4)
                .any(|v| text.contains(v.as_str()));
        if !mentions_brand {
            return false;
        }

        if is_fact_checker_host(&host) {
            return true;
        }
        let mut terms: Vec<&str> = ASSESSMENT_TERMS_EN.to_vec();
        if let Some(lang) = language {
            terms.extend(translated_key_terms(lang));
        }
        terms.iter().any(|term| text.contains(term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticSearchProvider;
    use veridex_contracts::SearchProviderChoice;

    fn orchestrator_with(provider: StaticSearchProvider) -> SearchOrchestrator {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(provider));
        SearchOrchestrator::new(
            registry,
            SearchConfig::default(),
            ProviderHealth::with_defaults(),
        )
    }

    #[test]
    fn self_citation_detection() {
        assert!(is_self_citation("example.com", "example.com"));
        assert!(is_self_citation("blog.example.com", "example.com"));
        assert!(is_self_citation("example.com", "www.example.com"));
        assert!(!is_self_citation("other.com", "example.com"));
        assert!(!is_self_citation("notexample.com", "example.com"));
    }

    #[tokio::test]
    async fn dedup_across_queries() {
        let provider = StaticSearchProvider::named("serpapi");
        let hit = StaticSearchProvider::hit(
            "https://factcheck.org/a",
            "t",
            "s",
            "serpapi",
        );
        provider.add_results("alpha", vec![hit.clone()]);
        provider.add_results("beta", vec![hit]);
        let orchestrator = orchestrator_with(provider);

        let mut seen = HashSet::new();
        let (first, _) = orchestrator
            .execute_query("alpha query", "test", 0, &mut seen)
            .await;
        let (second, _) = orchestrator
            .execute_query("beta query", "test", 1, &mut seen)
            .await;
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn assessment_filters_self_citations_and_irrelevant_hits() {
        let provider = StaticSearchProvider::named("serpapi");
        provider.add_results(
            "example-news.com",
            vec![
                StaticSearchProvider::hit(
                    "https://example-news.com/about",
                    "About us",
                    "example-news.com reliability statement",
                    "serpapi",
                ),
                StaticSearchProvider::hit(
                    "https://factcheck.org/example",
                    "Fact check of example-news",
                    "example-news.com has published false claims",
                    "serpapi",
                ),
                StaticSearchProvider::hit(
                    "https://random.org/page",
                    "Unrelated",
                    "nothing about the outlet at all",
                    "serpapi",
                ),
            ],
        );
        let orchestrator = orchestrator_with(provider);

        let assessment = orchestrator
            .assess_source("example-news.com", None, &[])
            .await;
        assert_eq!(assessment.hits.len(), 1);
        assert!(assessment.hits[0].url.contains("factcheck.org"));
        assert!(!assessment.queries.is_empty());
    }

    #[tokio::test]
    async fn fatal_errors_feed_circuit_breaker() {
        let provider = StaticSearchProvider::named("serpapi");
        for _ in 0..3 {
            provider.push_failure(ProviderFailure::from_status(
                ProviderKind::Search,
                429,
                "rate limited",
            ));
        }
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(provider));
        let health = ProviderHealth::with_defaults();
        let orchestrator = SearchOrchestrator::new(
            registry,
            SearchConfig {
                provider: SearchProviderChoice::Serpapi,
                ..Default::default()
            },
            health.clone(),
        );

        let mut seen = HashSet::new();
        for i in 0..3 {
            let (hits, _) = orchestrator
                .execute_query("anything", "test", i, &mut seen)
                .await;
            assert!(hits.is_empty());
        }
        assert!(health.is_circuit_open(ProviderKind::Search));
        assert!(health.is_paused());
        let warnings = orchestrator.drain_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].warning_type, WarningType::SearchProviderError);
    }
}
