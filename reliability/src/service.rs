//! The reliability service
//!
//! Two-phase lifecycle per run: an async batch prefetch resolves scores
//! for every domain likely to be cited, then verdict-time lookups are
//! synchronous and never perform I/O. Evidence weighting pulls verdicts
//! toward 50 in proportion to how unreliable their cited sources are.

use crate::cache::{CachedReliability, ReliabilityCache};
use crate::domains::{domain_of, unique_important_domains};
use crate::evaluator::{post_process, FactualRating, ReliabilityAssessment, SourceType};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use veridex_contracts::{ModelTier, SourceReliabilityMeta, Warning};
use veridex_llm::{CallOptions, LlmClient, PromptKey};
use veridex_search::SearchOrchestrator;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityServiceConfig {
    /// Score assumed for unknown sources during evidence weighting.
    pub default_unknown_score: f64,
    /// Run a second model pass and require agreement.
    pub consensus_enabled: bool,
    /// Maximum score disagreement for consensus.
    pub consensus_tolerance: f64,
}

impl Default for ReliabilityServiceConfig {
    fn default() -> Self {
        Self {
            default_unknown_score: 0.5,
            consensus_enabled: false,
            consensus_tolerance: 0.15,
        }
    }
}

/// Prefetch accounting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefetchStats {
    pub candidates: usize,
    pub filtered: usize,
    pub cache_hits: usize,
    pub evaluated: usize,
    pub insufficient: usize,
}

/// A verdict adjusted by cited-source reliability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedVerdict {
    pub adjusted_truth: f64,
    pub adjusted_confidence: f64,
    pub evidence_weight: f64,
    pub meta: SourceReliabilityMeta,
}

/// Source-reliability service: prefetch plus cached sync lookup.
#[derive(Debug)]
pub struct ReliabilityService {
    cache: Arc<dyn ReliabilityCache>,
    llm: LlmClient,
    search: Arc<SearchOrchestrator>,
    config: ReliabilityServiceConfig,
    /// Resolved scores for this process; the sync-lookup store.
    scores: DashMap<String, Option<f64>>,
}

impl ReliabilityService {
    pub fn new(
        cache: Arc<dyn ReliabilityCache>,
        llm: LlmClient,
        search: Arc<SearchOrchestrator>,
        config: ReliabilityServiceConfig,
    ) -> Self {
        Self {
            cache,
            llm,
            search,
            config,
            scores: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ReliabilityServiceConfig {
        &self.config
    }

    /// Batch prefetch for all URLs likely to be cited. Cache misses go to
    /// the LLM evaluator once per domain; results are persisted. Repeated
    /// prefetches for the same domain are idempotent.
    pub async fn prefetch(
        &self,
        urls: &[String],
        language: Option<&str>,
    ) -> (PrefetchStats, Vec<Warning>) {
        let mut stats = PrefetchStats {
            candidates: urls.len(),
            ..Default::default()
        };
        let mut warnings = Vec::new();

        let domains = unique_important_domains(urls);
        stats.filtered = urls.len().saturating_sub(domains.len());

        let cached = self.cache.batch_get(&domains).await;
        for (domain, record) in &cached {
            self.scores.insert(domain.clone(), record.score);
        }
        stats.cache_hits = cached.len();

        for domain in domains {
            if self.scores.contains_key(&domain) {
                continue;
            }
            // Mark in-flight before the evaluation so concurrent
            // prefetches for the same domain coalesce on the entry.
            self.scores.insert(domain.clone(), None);

            let (assessment, mut eval_warnings) = self.evaluate_domain(&domain, language).await;
            warnings.append(&mut eval_warnings);
            stats.evaluated += 1;
            if assessment.score.is_none() {
                stats.insufficient += 1;
            }

            self.scores.insert(domain.clone(), assessment.score);
            self.cache
                .set(
                    &domain,
                    CachedReliability {
                        score: assessment.score,
                        confidence: assessment.confidence,
                        consensus_achieved: !self.config.consensus_enabled
                            || assessment.score.is_some(),
                    },
                )
                .await;
        }

        info!(
            "reliability prefetch: {} cache hits, {} evaluated, {} insufficient",
            stats.cache_hits, stats.evaluated, stats.insufficient
        );
        (stats, warnings)
    }

    /// One evaluator attempt for a domain, with the optional consensus
    /// pass.
    async fn evaluate_domain(
        &self,
        domain: &str,
        language: Option<&str>,
    ) -> (ReliabilityAssessment, Vec<Warning>) {
        let assessment_pack = self.search.assess_source(domain, language, &[]).await;
        let payload = json!({
            "domain": domain,
            "evidence": assessment_pack.hits.iter().enumerate().map(|(i, hit)| json!({
                "evidence_id": format!("EV_{}", i + 1),
                "url": hit.url,
                "title": hit.title,
                "snippet": hit.snippet,
            })).collect::<Vec<_>>(),
        });

        let mut warnings = Vec::new();
        let primary = self
            .call_evaluator(&payload, None, &mut warnings)
            .await
            .unwrap_or_else(insufficient_assessment);

        let assessment = if self.config.consensus_enabled && primary.score.is_some() {
            match self
                .call_evaluator(&payload, Some(ModelTier::Opus), &mut warnings)
                .await
            {
                Some(secondary) => merge_consensus(primary, secondary, self.config.consensus_tolerance),
                None => primary,
            }
        } else {
            primary
        };

        if assessment.score.is_none() {
            debug!("insufficient reliability data for {}", domain);
        }
        if assessment_pack.hits.is_empty() {
            warn!("no third-party assessments found for {}", domain);
        }
        (assessment, warnings)
    }

    async fn call_evaluator(
        &self,
        payload: &serde_json::Value,
        tier: Option<ModelTier>,
        warnings: &mut Vec<Warning>,
    ) -> Option<ReliabilityAssessment> {
        let options = CallOptions {
            tier,
            ..Default::default()
        };
        let result = self
            .llm
            .call(PromptKey::ReliabilityEvaluator, payload, &options)
            .await
            .ok()?;
        warnings.extend(result.warnings.clone());
        if !result.is_well_formed() {
            return None;
        }
        let raw: ReliabilityAssessment = serde_json::from_value(result.value).ok()?;
        Some(post_process(raw))
    }

    /// Sync lookup. No I/O; unknown domains return None.
    pub fn track_record_score(&self, url: &str) -> Option<f64> {
        let domain = domain_of(url)?;
        self.scores.get(&domain).and_then(|entry| *entry)
    }

    /// Apply evidence weighting to a verdict from the scores of its
    /// cited source URLs.
    pub fn apply_evidence_weight(
        &self,
        truth_percentage: f64,
        confidence: f64,
        cited_urls: &[String],
    ) -> WeightedVerdict {
        let scores: Vec<Option<f64>> = cited_urls
            .iter()
            .map(|url| self.track_record_score(url))
            .collect();
        weight_verdict(
            truth_percentage,
            confidence,
            &scores,
            self.config.default_unknown_score,
        )
    }
}

/// The weighting formula, standalone for testing:
/// `adjusted_truth = clamp(50 + (truth - 50) * mean_score, 0, 100)` and
/// `adjusted_confidence = confidence * (0.5 + mean_score / 2)`.
pub fn weight_verdict(
    truth_percentage: f64,
    confidence: f64,
    scores: &[Option<f64>],
    default_unknown: f64,
) -> WeightedVerdict {
    let unknown_sources = scores.iter().filter(|s| s.is_none()).count();
    let known_sources = scores.len() - unknown_sources;
    let mean_score = if scores.is_empty() {
        default_unknown
    } else {
        scores
            .iter()
            .map(|s| s.unwrap_or(default_unknown))
            .sum::<f64>()
            / scores.len() as f64
    };

    WeightedVerdict {
        adjusted_truth: (50.0 + (truth_percentage - 50.0) * mean_score).clamp(0.0, 100.0),
        adjusted_confidence: confidence * (0.5 + mean_score / 2.0),
        evidence_weight: mean_score,
        meta: SourceReliabilityMeta {
            mean_score,
            known_sources,
            unknown_sources,
        },
    }
}

fn insufficient_assessment() -> ReliabilityAssessment {
    ReliabilityAssessment {
        source_type: SourceType::Unknown,
        score: None,
        confidence: 0.0,
        factual_rating: FactualRating::InsufficientData,
        bias: Default::default(),
        evidence_cited: Vec::new(),
        caveats: Vec::new(),
    }
}

/// Merge primary and secondary evaluator passes: agreement within
/// tolerance averages the scores; disagreement keeps the primary and
/// drops the consensus flag upstream.
fn merge_consensus(
    primary: ReliabilityAssessment,
    secondary: ReliabilityAssessment,
    tolerance: f64,
) -> ReliabilityAssessment {
    match (primary.score, secondary.score) {
        (Some(a), Some(b)) if (a - b).abs() <= tolerance => {
            let mut merged = primary;
            let mean = (a + b) / 2.0;
            merged.score = Some(mean);
            merged.factual_rating = FactualRating::for_score(mean);
            merged
        }
        _ => primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryReliabilityCache;
    use crate::evaluator::BiasAssessment;
    use std::sync::Arc;
    use veridex_contracts::{BudgetConfig, SearchConfig};
    use veridex_llm::ScriptedTransport;
    use veridex_resilience::{BudgetTracker, ProviderHealth};
    use veridex_search::ProviderRegistry;

    fn service(cache: Arc<MemoryReliabilityCache>) -> ReliabilityService {
        let transport = Arc::new(ScriptedTransport::new());
        transport.enqueue_json(
            "RELIABILITY_EVALUATOR",
            json!({
                "source_type": "editorial_publisher",
                "score": 0.8,
                "confidence": 0.9,
                "factual_rating": "reliable",
                "evidence_cited": [
                    {"claim": "a", "basis": "b", "evidence_id": "EV_1"},
                    {"claim": "c", "basis": "d", "evidence_id": "EV_2"},
                    {"claim": "e", "basis": "f", "evidence_id": "EV_3"},
                ],
            }),
        );
        let health = ProviderHealth::with_defaults();
        let llm = LlmClient::new(
            transport,
            Arc::new(BudgetTracker::new(BudgetConfig::default())),
            health.clone(),
            true,
        );
        let search = Arc::new(SearchOrchestrator::new(
            ProviderRegistry::new(),
            SearchConfig::default(),
            health,
        ));
        ReliabilityService::new(cache, llm, search, ReliabilityServiceConfig::default())
    }

    #[tokio::test]
    async fn prefetch_uses_cache_then_evaluator() {
        let cache = Arc::new(MemoryReliabilityCache::new());
        cache.seed("reuters.com", 0.95, 0.9);
        let service = service(cache.clone());

        let urls = vec![
            "https://www.reuters.com/article".to_string(),
            "https://freshoutlet.com/story".to_string(),
        ];
        let (stats, _warnings) = service.prefetch(&urls, None).await;
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.evaluated, 1);

        assert_eq!(
            service.track_record_score("https://reuters.com/x"),
            Some(0.95)
        );
        assert_eq!(
            service.track_record_score("https://freshoutlet.com/y"),
            Some(0.8)
        );
        // Evaluated result was persisted.
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn sync_lookup_unknown_is_none() {
        let service = service(Arc::new(MemoryReliabilityCache::new()));
        assert_eq!(service.track_record_score("https://nobody.org/a"), None);
    }

    #[test]
    fn weighting_formula_matches_contract() {
        // truth 80, sources 0.95 and 0.88: mean 0.915, adjusted ~77.45.
        let weighted = weight_verdict(80.0, 90.0, &[Some(0.95), Some(0.88)], 0.5);
        assert!((weighted.evidence_weight - 0.915).abs() < 1e-9);
        assert!((weighted.adjusted_truth - 77.45).abs() < 1e-9);
        assert!((weighted.adjusted_confidence - 90.0 * 0.9575).abs() < 1e-9);
        assert_eq!(weighted.meta.unknown_sources, 0);
    }

    #[test]
    fn all_unknown_sources_use_default() {
        let weighted = weight_verdict(80.0, 90.0, &[None, None, None], 0.5);
        assert_eq!(weighted.evidence_weight, 0.5);
        assert_eq!(weighted.meta.unknown_sources, 3);
        assert_eq!(weighted.adjusted_truth, 65.0);
    }

    #[test]
    fn consensus_merges_within_tolerance() {
        let mk = |score: f64| ReliabilityAssessment {
            source_type: SourceType::EditorialPublisher,
            score: Some(score),
            confidence: 0.9,
            factual_rating: FactualRating::for_score(score),
            bias: BiasAssessment::default(),
            evidence_cited: Vec::new(),
            caveats: Vec::new(),
        };
        let merged = merge_consensus(mk(0.8), mk(0.7), 0.15);
        assert_eq!(merged.score, Some(0.75));

        let kept = merge_consensus(mk(0.8), mk(0.3), 0.15);
        assert_eq!(kept.score, Some(0.8));
    }
}
