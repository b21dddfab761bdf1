//! Stage 2: evidence research
//!
//! Per analysis context, iteratively: generate queries, search, fetch,
//! and extract evidence items, respecting iteration and token budgets and
//! the system pause flag. Sources are fetched through a seam so tests and
//! offline runs replace the network.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use veridex_contracts::{
    AnalysisContext, AtomicClaim, EvidenceDirection, EvidenceItem, EvidenceScope, FetchedSource,
    ProbativeValue, ResearchStats, SearchQueryRecord, Warning, WarningType, CTX_GENERAL,
};
use veridex_extraction::bind_evidence_scope;
use veridex_llm::{CallOptions, LlmClient, LlmError, PromptKey};
use veridex_reliability::is_important_domain;
use veridex_resilience::{BudgetTracker, ProviderHealth};
use veridex_search::{ArticleFetcher, SearchOrchestrator};

/// Evidence items wanted per claim before a context stops iterating.
const EVIDENCE_PER_CLAIM_TARGET: usize = 2;

/// Seam for article retrieval.
#[async_trait]
pub trait SourceFetcher: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, index: usize, url: &str, title_hint: &str) -> FetchedSource;
}

#[async_trait]
impl SourceFetcher for ArticleFetcher {
    async fn fetch(&self, index: usize, url: &str, title_hint: &str) -> FetchedSource {
        ArticleFetcher::fetch(self, index, url, title_hint).await
    }
}

/// In-memory fetcher for tests and offline runs: text is served from a
/// registered corpus keyed by URL.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    pages: Mutex<HashMap<String, (String, String)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, url: &str, title: &str, text: &str) {
        self.pages
            .lock()
            .insert(url.to_string(), (title.to_string(), text.to_string()));
    }
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self, index: usize, url: &str, title_hint: &str) -> FetchedSource {
        let pages = self.pages.lock();
        let (title, text) = pages
            .get(url)
            .cloned()
            .unwrap_or((title_hint.to_string(), String::new()));
        FetchedSource {
            id: format!("E{}", index + 1),
            url: url.to_string(),
            title,
            fetch_success: !text.is_empty(),
            full_text: text,
            fetched_at: chrono::Utc::now(),
            category: String::new(),
            track_record_score: None,
        }
    }
}

/// Output of the research stage.
#[derive(Debug, Clone, Default)]
pub struct ResearchOutput {
    pub sources: Vec<FetchedSource>,
    pub evidence: Vec<EvidenceItem>,
    pub queries: Vec<SearchQueryRecord>,
    pub stats: ResearchStats,
    pub warnings: Vec<Warning>,
}

/// The research stage.
#[derive(Debug)]
pub struct ResearchStage {
    llm: LlmClient,
    search: Arc<SearchOrchestrator>,
    fetcher: Arc<dyn SourceFetcher>,
    budget: Arc<BudgetTracker>,
    health: Arc<ProviderHealth>,
}

impl ResearchStage {
    pub fn new(
        llm: LlmClient,
        search: Arc<SearchOrchestrator>,
        fetcher: Arc<dyn SourceFetcher>,
        budget: Arc<BudgetTracker>,
        health: Arc<ProviderHealth>,
    ) -> Self {
        Self {
            llm,
            search,
            fetcher,
            budget,
            health,
        }
    }

    /// Run the iterative research loop across all contexts.
    pub async fn run(
        &self,
        implied_claim: &str,
        contexts: &[AnalysisContext],
        claims: &[AtomicClaim],
    ) -> Result<ResearchOutput, LlmError> {
        let mut output = ResearchOutput::default();
        let mut seen_urls: HashSet<String> = HashSet::new();

        for context in contexts {
            if context.is_unscoped() {
                continue;
            }
            let context_claims: Vec<&AtomicClaim> = claims
                .iter()
                .filter(|c| {
                    c.related_context_id.as_deref() == Some(context.id.as_str())
                        || c.related_context_id.is_none()
                        || context.id == CTX_GENERAL
                })
                .collect();
            if context_claims.is_empty() {
                continue;
            }

            let mut iteration = 0u32;
            loop {
                let decision = self.budget.check_context_iteration_budget(&context.id);
                if !decision.allowed {
                    debug!(
                        "research for {} stopped: {}",
                        context.id,
                        decision.reason.unwrap_or_default()
                    );
                    break;
                }
                if self.health.is_paused() {
                    debug!("research for {} stopped: system paused", context.id);
                    break;
                }
                if self.evidence_target_met(&output.evidence, &context_claims) {
                    break;
                }

                self.run_iteration(
                    implied_claim,
                    context,
                    contexts,
                    &context_claims,
                    iteration,
                    &mut seen_urls,
                    &mut output,
                )
                .await?;
                self.budget.record_iteration(&context.id);
                *output
                    .stats
                    .iterations_by_context
                    .entry(context.id.clone())
                    .or_insert(0) += 1;
                iteration += 1;
            }
        }

        output.stats.total_searches = self.search.total_searches();
        output.stats.unique_sources = output
            .sources
            .iter()
            .filter(|s| s.fetch_success)
            .map(|s| s.url.as_str())
            .collect::<HashSet<_>>()
            .len();
        output.stats.fetched_ok = output.sources.iter().filter(|s| s.fetch_success).count();
        output.stats.fetched_failed = output.sources.len() - output.stats.fetched_ok;
        let budget_stats = self.budget.stats();
        output.stats.llm_calls = budget_stats.llm_calls;
        output.stats.total_tokens = budget_stats.total_tokens;

        if output.stats.unique_sources == 0 {
            output.warnings.push(Warning::new(
                WarningType::NoSuccessfulSources,
                "research produced no successfully fetched sources",
            ));
            if output.stats.total_searches >= 10 {
                output.warnings.push(
                    Warning::new(
                        WarningType::SourceAcquisitionCollapse,
                        format!(
                            "{} searches ran without yielding a single source",
                            output.stats.total_searches
                        ),
                    )
                    .with_details(json!({ "total_searches": output.stats.total_searches })),
                );
            }
        }
        output.warnings.extend(self.search.drain_warnings());

        info!(
            "research finished: {} evidence items from {} sources over {} searches",
            output.evidence.len(),
            output.stats.unique_sources,
            output.stats.total_searches
        );
        Ok(output)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_iteration(
        &self,
        implied_claim: &str,
        context: &AnalysisContext,
        all_contexts: &[AnalysisContext],
        context_claims: &[&AtomicClaim],
        iteration: u32,
        seen_urls: &mut HashSet<String>,
        output: &mut ResearchOutput,
    ) -> Result<(), LlmError> {
        // 1. Generate 1-4 queries for this context.
        let payload = json!({
            "implied_claim": implied_claim,
            "context": { "id": context.id, "name": context.name, "subject": context.subject },
            "claims": context_claims.iter().map(|c| json!({
                "claim_id": c.id,
                "statement": c.statement,
                "key_entities": c.key_entities,
            })).collect::<Vec<_>>(),
            "iteration": iteration,
        });
        let result = self
            .llm
            .call(PromptKey::QueryGeneration, &payload, &CallOptions::default())
            .await?;
        output.warnings.extend(result.warnings.clone());
        let queries: Vec<String> = result.value["queries"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|q| q.as_str().map(|s| s.to_string()))
                    .take(4)
                    .collect()
            })
            .unwrap_or_default();
        if queries.is_empty() {
            return Ok(());
        }

        // 2-3. Search and fetch new URLs.
        let mut fetched_batch = Vec::new();
        for query in &queries {
            let (hits, record) = self
                .search
                .execute_query(query, &context.id, iteration, seen_urls)
                .await;
            output.queries.push(record);

            for hit in hits {
                let Some(domain) = veridex_reliability::domain_of(&hit.url) else {
                    continue;
                };
                if !is_important_domain(&domain) {
                    continue;
                }
                let source = self
                    .fetcher
                    .fetch(output.sources.len(), &hit.url, &hit.title)
                    .await;
                if source.fetch_success {
                    fetched_batch.push(source.clone());
                } else {
                    warn!("fetch failed for {}", hit.url);
                }
                output.sources.push(source);
            }
        }
        if fetched_batch.is_empty() {
            return Ok(());
        }

        // 4. Extract evidence from the fetched batch.
        let extraction_payload = json!({
            "claims": context_claims.iter().map(|c| json!({
                "claim_id": c.id,
                "statement": c.statement,
            })).collect::<Vec<_>>(),
            "articles": fetched_batch.iter().map(|s| json!({
                "source_id": s.id,
                "title": s.title,
                "url": s.url,
                "text": truncate(&s.full_text, 6000),
            })).collect::<Vec<_>>(),
        });
        let extraction = self
            .llm
            .call(
                PromptKey::EvidenceExtraction,
                &extraction_payload,
                &CallOptions::default(),
            )
            .await?;
        output.warnings.extend(extraction.warnings.clone());

        let sources_by_id: HashMap<&str, &FetchedSource> =
            fetched_batch.iter().map(|s| (s.id.as_str(), s)).collect();
        if let Some(items) = extraction.value["evidence_items"].as_array() {
            for item in items {
                let Some(source_id) = item["source_id"].as_str() else {
                    continue;
                };
                // The model must cite a fetched source by its E{n} id.
                let Some(source) = sources_by_id.get(source_id) else {
                    debug!("evidence cited unknown source id {source_id}");
                    continue;
                };
                let Some(statement) = item["statement"].as_str() else {
                    continue;
                };
                if statement.trim().len() < 20 {
                    continue;
                }
                let context_id = bind_evidence_scope(statement, all_contexts, &context.id);
                output.evidence.push(EvidenceItem {
                    id: format!("EV_{}", output.evidence.len() + 1),
                    statement: statement.trim().to_string(),
                    category: item["category"].as_str().unwrap_or("general").to_string(),
                    specificity: item["specificity"].as_str().unwrap_or("general").to_string(),
                    source_id: source.id.clone(),
                    source_url: source.url.clone(),
                    source_title: source.title.clone(),
                    source_excerpt: item["source_excerpt"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    claim_direction: parse_enum(item, "claim_direction", EvidenceDirection::Neutral),
                    probative_value: parse_enum(item, "probative_value", ProbativeValue::Medium),
                    evidence_scope: EvidenceScope {
                        name: scope_field(item, "name"),
                        methodology: scope_field(item, "methodology"),
                        temporal: scope_field(item, "temporal"),
                        geographic: scope_field(item, "geographic"),
                    },
                    claim_boundary_id: None,
                    relevant_claim_ids: item["relevant_claim_ids"]
                        .as_array()
                        .map(|ids| {
                            ids.iter()
                                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                                .collect()
                        })
                        .unwrap_or_default(),
                    context_id,
                });
            }
        }
        Ok(())
    }

    fn evidence_target_met(
        &self,
        evidence: &[EvidenceItem],
        context_claims: &[&AtomicClaim],
    ) -> bool {
        context_claims.iter().all(|claim| {
            evidence
                .iter()
                .filter(|e| e.relevant_claim_ids.iter().any(|id| id == &claim.id))
                .count()
                >= EVIDENCE_PER_CLAIM_TARGET
        })
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(
    value: &serde_json::Value,
    key: &str,
    default: T,
) -> T {
    value
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(default)
}

fn scope_field(item: &serde_json::Value, key: &str) -> String {
    item["evidence_scope"][key]
        .as_str()
        .unwrap_or_default()
        .to_string()
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
