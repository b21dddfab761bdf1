//! Stage orchestration
//!
//! Composes extraction, research, clustering, debate, and aggregation
//! under budget and provider-health constraints. Stage failures convert
//! to structured `StageError`s; pause and budget exhaustion terminate the
//! run with a partial result instead of throwing.

use crate::aggregation::AggregationStage;
use crate::clustering::ClusteringStage;
use crate::deterministic::{freeze_ordering, to_canonical_json};
use crate::events::EventSink;
use crate::gates::run_quality_gates;
use crate::research::{ResearchOutput, ResearchStage, SourceFetcher};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;
use veridex_contracts::{
    AnalysisContext, AnalysisInput, AnalysisResult, AtomicClaim, ClaimVerdict, CoverageMatrix,
    EvidenceItem, InputKind, PipelineConfig, QualityGates, ResearchStats, ResultMeta, RunStatus,
    SearchQueryRecord, Stage, StageError, StageEvent, Understanding, VerdictLabel, VerdictScale,
    Warning, WarningType,
};
use veridex_debate::{enforce_harm_confidence_floor, DebateEngine, DebateInput};
use veridex_extraction::{
    canonicalize_contexts, detect_scope_hints, ensure_at_least_one_context,
    validate_thesis_relevance, ClaimExtractor,
};
use veridex_llm::LlmClient;
use veridex_reliability::ReliabilityService;
use veridex_resilience::{BudgetTracker, ProviderHealth};
use veridex_search::SearchOrchestrator;

/// Crash signature that earns one silent retry, inherited from a known
/// upstream model-output corruption.
const KNOWN_CRASH_SIGNATURE: &str = "Cannot read properties of undefined (reading 'value')";

/// Version of the result envelope schema.
const SCHEMA_VERSION: &str = "1.0";

/// Everything a run needs, constructed once per process and shared.
#[derive(Debug)]
pub struct PipelineRuntime {
    pub config: PipelineConfig,
    pub llm: LlmClient,
    pub search: Arc<SearchOrchestrator>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub reliability: Arc<ReliabilityService>,
    pub health: Arc<ProviderHealth>,
    pub budget: Arc<BudgetTracker>,
    pub events: Arc<dyn EventSink>,
}

/// Ingress: run the full claim-boundary analysis for one input.
///
/// Stage exceptions surface as `StageError` for the caller to record.
/// Pause and budget exhaustion return a partial result instead.
pub async fn run_claim_boundary_analysis(
    input: &AnalysisInput,
    runtime: &PipelineRuntime,
) -> Result<AnalysisResult, StageError> {
    let job_id = Uuid::new_v4();
    info!("job {job_id} starting for {:?} input", input.kind);
    let scale = match input.kind {
        InputKind::Claim => VerdictScale::Statement,
        InputKind::Question => VerdictScale::Question,
    };
    let mut run = RunState::new(runtime, scale, input.deterministic);

    // Stage 1: extraction plus canonicalization.
    let stage_start = Instant::now();
    let extracted = {
        let extractor = ClaimExtractor::new(runtime.llm.clone());
        let hints = detect_scope_hints(&input.text);
        let attempt = extractor.extract(&input.text, input.kind, &hints).await;
        match attempt {
            Ok(output) => output,
            Err(error) if error.to_string().contains(KNOWN_CRASH_SIGNATURE) => {
                warn!("stage 1 retried after known crash signature");
                extractor
                    .extract(&input.text, input.kind, &hints)
                    .await
                    .map_err(|e| stage_error(Stage::Extraction, &e.to_string()))?
            }
            Err(error) => return Err(stage_error(Stage::Extraction, &error.to_string())),
        }
    };
    run.implied_claim = extracted.implied_claim;
    run.claims = extracted.claims;
    run.warnings.extend(extracted.warnings);
    validate_thesis_relevance(&mut run.claims, &runtime.config.extraction);
    let canonical = canonicalize_contexts(extracted.contexts, &input.text, &mut run.claims);
    run.contexts = canonical.contexts;
    ensure_at_least_one_context(&mut run.contexts);
    run.emit_stage(Stage::Extraction, stage_start);

    if run.check_interrupted(runtime) {
        return Ok(run.into_partial_result(runtime));
    }

    // Stage 2: evidence research plus reliability prefetch.
    let stage_start = Instant::now();
    let research_stage = ResearchStage::new(
        runtime.llm.clone(),
        runtime.search.clone(),
        runtime.fetcher.clone(),
        runtime.budget.clone(),
        runtime.health.clone(),
    );
    let research: ResearchOutput = research_stage
        .run(&run.implied_claim, &run.contexts, &run.claims)
        .await
        .map_err(|e| stage_error(Stage::Research, &e.to_string()))?;
    run.sources = research.sources;
    run.evidence = research.evidence;
    run.queries = research.queries;
    run.research_stats = research.stats;
    run.warnings.extend(research.warnings);

    let fetched_urls: Vec<String> = run
        .sources
        .iter()
        .filter(|s| s.fetch_success)
        .map(|s| s.url.clone())
        .collect();
    let (_prefetch_stats, prefetch_warnings) =
        runtime.reliability.prefetch(&fetched_urls, None).await;
    run.warnings.extend(prefetch_warnings);
    for source in run.sources.iter_mut() {
        source.track_record_score = runtime.reliability.track_record_score(&source.url);
    }
    run.emit_stage(Stage::Research, stage_start);

    if run.check_interrupted(runtime) {
        return Ok(run.into_partial_result(runtime));
    }

    // Stage 3: boundary clustering.
    let stage_start = Instant::now();
    let clustering = ClusteringStage::new(runtime.llm.clone());
    let clustered = match clustering.run(&run.claims, &mut run.evidence).await {
        Ok(output) => output,
        Err(error) if error.to_string().contains(KNOWN_CRASH_SIGNATURE) => {
            warn!("stage 3 retried after known crash signature");
            clustering
                .run(&run.claims, &mut run.evidence)
                .await
                .map_err(|e| stage_error(Stage::Clustering, &e.to_string()))?
        }
        Err(error) => return Err(stage_error(Stage::Clustering, &error.to_string())),
    };
    run.boundaries = clustered.boundaries;
    run.coverage = Some(clustered.coverage);
    run.warnings.extend(clustered.warnings);
    run.emit_stage(Stage::Clustering, stage_start);

    if run.check_interrupted(runtime) {
        return Ok(run.into_partial_result(runtime));
    }

    // Stage 4: the verdict debate plus evidence weighting.
    let stage_start = Instant::now();
    if let Some(requested) = &runtime.config.debate.provider {
        if runtime.config.llm_provider.as_ref() != Some(requested) {
            run.warnings.push(
                Warning::new(
                    WarningType::DebateProviderFallback,
                    format!("debate provider `{requested}` unavailable; using the global default"),
                )
                .with_details(serde_json::json!({ "requested": requested })),
            );
        }
    }
    let engine = DebateEngine::new(runtime.llm.clone(), runtime.config.debate.clone());
    let coverage = run.coverage.as_ref().cloned().unwrap_or_else(empty_coverage);
    let debate_input = DebateInput {
        claims: &run.claims,
        evidence: &run.evidence,
        boundaries: &run.boundaries,
        coverage: &coverage,
    };
    let outcome = match engine.run(debate_input).await {
        Ok(outcome) => outcome,
        Err(error) if error.to_string().contains(KNOWN_CRASH_SIGNATURE) => {
            warn!("stage 4 retried after known crash signature");
            engine.run(debate_input).await.map_err(|e| {
                stage_error(Stage::Verdict, &e.to_string()).with_side(e.side.to_string())
            })?
        }
        Err(error) => {
            return Err(
                stage_error(Stage::Verdict, &error.to_string()).with_side(error.side.to_string())
            )
        }
    };
    run.verdicts = outcome.verdicts;
    run.warnings.extend(outcome.warnings);
    apply_reliability_weighting(
        &mut run.verdicts,
        &run.evidence,
        &runtime.reliability,
        &runtime.config,
        &mut run.warnings,
    );
    run.emit_stage(Stage::Verdict, stage_start);

    if run.check_interrupted(runtime) {
        return Ok(run.into_partial_result(runtime));
    }

    // Stage 5: aggregation, gates, and envelope assembly.
    let stage_start = Instant::now();
    let aggregation = AggregationStage::new(runtime.llm.clone(), runtime.config.aggregation.clone());
    let (assessment, pruned) = aggregation
        .run(&run.claims, &run.evidence, &run.verdicts, scale)
        .await
        .map_err(|e| stage_error(Stage::Aggregation, &e.to_string()))?;
    run.warnings.extend(assessment.warnings.clone());
    let gates = run_quality_gates(&run.claims, &run.verdicts, &pruned);
    run.emit_stage(Stage::Aggregation, stage_start);

    let mut result = run.into_result(runtime, Some(assessment), gates, RunStatus::Complete);
    if input.deterministic {
        freeze_ordering(&mut result);
    }
    info!(
        "job {job_id} finished: {} at {:.0} confidence",
        result.overall_verdict, result.confidence
    );
    Ok(result)
}

/// Ingress variant returning the canonical JSON string alongside the
/// typed result, for embedders that persist raw output.
pub async fn run_claim_boundary_analysis_json(
    input: &AnalysisInput,
    runtime: &PipelineRuntime,
) -> Result<(AnalysisResult, String), StageError> {
    let result = run_claim_boundary_analysis(input, runtime).await?;
    let json = to_canonical_json(&result)
        .map_err(|e| stage_error(Stage::Aggregation, &format!("serialization failed: {e}")))?;
    Ok((result, json))
}

/// Apply per-verdict evidence weighting from cited source reliability,
/// then re-derive labels and re-check the harm floor against the
/// adjusted confidence.
fn apply_reliability_weighting(
    verdicts: &mut [ClaimVerdict],
    evidence: &[EvidenceItem],
    reliability: &ReliabilityService,
    config: &PipelineConfig,
    warnings: &mut Vec<Warning>,
) {
    let url_by_evidence: HashMap<&str, &str> = evidence
        .iter()
        .map(|e| (e.id.as_str(), e.source_url.as_str()))
        .collect();

    for verdict in verdicts.iter_mut() {
        let cited_urls: Vec<String> = verdict
            .cited_evidence_ids()
            .filter_map(|id| url_by_evidence.get(id.as_str()))
            .map(|url| url.to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if cited_urls.is_empty() {
            continue;
        }
        let was_floored = verdict.verdict == VerdictLabel::Unverified
            && VerdictLabel::for_percentage(verdict.truth_percentage) != VerdictLabel::Unverified;

        let weighted = reliability.apply_evidence_weight(
            verdict.truth_percentage,
            verdict.confidence,
            &cited_urls,
        );
        verdict.truth_percentage = weighted.adjusted_truth;
        verdict.confidence = weighted.adjusted_confidence;
        verdict.evidence_weight = Some(weighted.evidence_weight);
        verdict.source_reliability_meta = Some(weighted.meta);
        if !was_floored {
            verdict.verdict = VerdictLabel::for_percentage(verdict.truth_percentage);
        }
        if let Some(warning) = enforce_harm_confidence_floor(verdict, &config.debate) {
            warnings.push(warning);
        }
    }
}

fn stage_error(stage: Stage, message: &str) -> StageError {
    StageError::new(stage, message.to_string())
}

fn empty_coverage() -> CoverageMatrix {
    CoverageMatrix::build(&[], &[], &[])
}

/// Accumulated run state, convertible to a (possibly partial) result at
/// any stage boundary.
struct RunState {
    scale: VerdictScale,
    deterministic: bool,
    implied_claim: String,
    claims: Vec<AtomicClaim>,
    contexts: Vec<AnalysisContext>,
    evidence: Vec<EvidenceItem>,
    sources: Vec<veridex_contracts::FetchedSource>,
    queries: Vec<SearchQueryRecord>,
    boundaries: Vec<veridex_contracts::ClaimBoundary>,
    coverage: Option<CoverageMatrix>,
    verdicts: Vec<ClaimVerdict>,
    warnings: Vec<Warning>,
    research_stats: ResearchStats,
    events: Arc<dyn EventSink>,
    tokens_at_stage_start: u64,
    budget: Arc<BudgetTracker>,
    started: Instant,
    /// Per-run wall-clock budget: the sum of the per-stage budgets.
    run_deadline: std::time::Duration,
}

impl RunState {
    fn new(runtime: &PipelineRuntime, scale: VerdictScale, deterministic: bool) -> Self {
        Self {
            scale,
            deterministic,
            implied_claim: String::new(),
            claims: Vec::new(),
            contexts: Vec::new(),
            evidence: Vec::new(),
            sources: Vec::new(),
            queries: Vec::new(),
            boundaries: Vec::new(),
            coverage: None,
            verdicts: Vec::new(),
            warnings: Vec::new(),
            research_stats: ResearchStats::default(),
            events: runtime.events.clone(),
            tokens_at_stage_start: 0,
            budget: runtime.budget.clone(),
            started: Instant::now(),
            run_deadline: std::time::Duration::from_secs(
                runtime.config.timeouts.per_stage_budget_secs * 5,
            ),
        }
    }

    fn emit_stage(&mut self, stage: Stage, started: Instant) {
        let tokens_now = self.budget.stats().total_tokens;
        self.events.emit(StageEvent {
            stage,
            name: stage.name().to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            tokens_used: tokens_now.saturating_sub(self.tokens_at_stage_start),
            warnings_count: self.warnings.len(),
        });
        self.tokens_at_stage_start = tokens_now;
    }

    /// Pause or hard budget exhaustion interrupts the run. The matching
    /// warning is recorded exactly once.
    fn check_interrupted(&mut self, runtime: &PipelineRuntime) -> bool {
        if runtime.health.is_paused() {
            if !self
                .warnings
                .iter()
                .any(|w| w.warning_type == WarningType::SystemPaused)
            {
                let reason = runtime
                    .health
                    .pause_reason()
                    .unwrap_or_else(|| "unknown".to_string());
                self.warnings.push(
                    Warning::new(
                        WarningType::SystemPaused,
                        format!("run terminated early: {reason}"),
                    )
                    .with_details(serde_json::json!({ "reason": reason })),
                );
            }
            return true;
        }
        if self.started.elapsed() > self.run_deadline {
            if !self
                .warnings
                .iter()
                .any(|w| w.warning_type == WarningType::BudgetExceeded)
            {
                self.warnings.push(
                    Warning::new(
                        WarningType::BudgetExceeded,
                        format!(
                            "run exceeded its time budget of {}s",
                            self.run_deadline.as_secs()
                        ),
                    )
                    .with_details(serde_json::json!({
                        "elapsed_secs": self.started.elapsed().as_secs(),
                        "deadline_secs": self.run_deadline.as_secs(),
                    })),
                );
            }
            return true;
        }
        if runtime.budget.is_exceeded() && runtime.budget.config().enforce_hard {
            if !self
                .warnings
                .iter()
                .any(|w| w.warning_type == WarningType::BudgetExceeded)
            {
                let stats = runtime.budget.stats();
                self.warnings.push(
                    Warning::new(
                        WarningType::BudgetExceeded,
                        stats
                            .exceeded_reason
                            .clone()
                            .unwrap_or_else(|| "budget exhausted".to_string()),
                    )
                    .with_details(serde_json::to_value(&stats).unwrap_or_default()),
                );
            }
            return true;
        }
        false
    }

    fn into_partial_result(self, runtime: &PipelineRuntime) -> AnalysisResult {
        let result = self.into_result(runtime, None, QualityGates::default(), RunStatus::Partial);
        warn!(
            "returning partial result with {} warnings",
            result.warnings.len()
        );
        result
    }

    fn into_result(
        self,
        runtime: &PipelineRuntime,
        assessment: Option<veridex_contracts::FinalAssessment>,
        gates: QualityGates,
        status: RunStatus,
    ) -> AnalysisResult {
        let coverage = self.coverage.unwrap_or_else(empty_coverage);
        let budget_stats = self.budget.stats();
        let mut research_stats = self.research_stats;
        research_stats.llm_calls = budget_stats.llm_calls;
        research_stats.total_tokens = budget_stats.total_tokens;

        let (truth, confidence, overall, narrative, verdicts) = match assessment {
            Some(assessment) => (
                assessment.overall_truth_percentage,
                assessment.confidence,
                assessment.overall_verdict,
                assessment.verdict_narrative,
                assessment.claim_verdicts,
            ),
            None => (
                50.0,
                0.0,
                VerdictLabel::Unverified.render(self.scale).to_string(),
                None,
                self.verdicts,
            ),
        };

        let mut result = AnalysisResult {
            meta: ResultMeta {
                pipeline: "claim-boundary".to_string(),
                model: runtime
                    .config
                    .llm_provider
                    .clone()
                    .unwrap_or_else(|| "default".to_string()),
                provider: runtime
                    .config
                    .llm_provider
                    .clone()
                    .unwrap_or_else(|| "default".to_string()),
                schema_version: SCHEMA_VERSION.to_string(),
                search_providers: runtime.search.provider_names(),
                llm_call_count: budget_stats.llm_calls,
                config_hash: runtime.config.content_hash(),
            },
            understanding: Understanding {
                implied_claim: self.implied_claim,
                analysis_contexts: self.contexts,
                sub_claims: self.claims.iter().map(|c| c.statement.clone()).collect(),
                atomic_claims: self.claims,
            },
            facts: self.evidence,
            sources: self.sources,
            search_queries: self.queries,
            claim_boundaries: self.boundaries,
            coverage_matrix: coverage,
            claim_verdicts: verdicts,
            verdict_narrative: narrative,
            quality_gates: gates,
            truth_percentage: truth,
            confidence,
            overall_verdict: overall,
            warnings: self.warnings,
            research_stats,
            status,
        };
        if self.deterministic {
            freeze_ordering(&mut result);
        }
        result
    }
}
