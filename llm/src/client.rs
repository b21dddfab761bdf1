//! The LLM call primitive
//!
//! `call` turns a prompt key plus payload into parsed JSON, enforcing the
//! temperature policy, token budgets, soft-refusal and schema retries,
//! and provider-health accounting. Degraded outcomes carry a reason code
//! and the prompt's neutral fallback shape; a missing field never
//! silently zeroes a verdict.

use crate::parse::{is_soft_refusal, parse_structured};
use crate::prompts::PromptKey;
use crate::transport::{LlmTransport, TransportRequest, TransportResponse};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use veridex_contracts::{ModelTier, ProviderKind, Warning, WarningType};
use veridex_resilience::{classify, BudgetTracker, ClassifiedError, ErrorCategory, ProviderHealth};

/// Hard call failures that must surface as stage errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("llm provider failure ({}): {}", .0.category_name(), .0.message)]
    Provider(ClassifiedError),
}

trait CategoryName {
    fn category_name(&self) -> &'static str;
}

impl CategoryName for ClassifiedError {
    fn category_name(&self) -> &'static str {
        match self.category {
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::ProviderOutage => "provider_outage",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ContentPolicySoftRefusal => "content_policy_soft_refusal",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

/// Why a call returned its fallback shape instead of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    SystemPaused,
    Timeout,
    BudgetBlocked(String),
    SchemaFailure,
    SoftRefusal,
}

/// Outcome of a call: either well-formed model output or a degraded
/// fallback with a reason code. Degraded outcomes always carry warnings
/// or a reason the orchestrator can surface.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub value: Value,
    pub degraded: Option<DegradedReason>,
    pub warnings: Vec<Warning>,
    pub tokens_used: u64,
}

impl CallResult {
    pub fn is_well_formed(&self) -> bool {
        self.degraded.is_none()
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Overrides the prompt's default tier when set.
    pub tier: Option<ModelTier>,
    pub temperature: f64,
    pub max_output_tokens: u64,
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            tier: None,
            temperature: 0.3,
            max_output_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CallOptions {
    pub fn with_tier(tier: ModelTier) -> Self {
        Self {
            tier: Some(tier),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Typed client over an injected transport.
#[derive(Debug, Clone)]
pub struct LlmClient {
    transport: Arc<dyn LlmTransport>,
    budget: Arc<BudgetTracker>,
    health: Arc<ProviderHealth>,
    deterministic: bool,
}

impl LlmClient {
    pub fn new(
        transport: Arc<dyn LlmTransport>,
        budget: Arc<BudgetTracker>,
        health: Arc<ProviderHealth>,
        deterministic: bool,
    ) -> Self {
        Self {
            transport,
            budget,
            health,
            deterministic,
        }
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Effective temperature: clamped to [0.1, 0.7] normally, forced to 0
    /// under deterministic mode.
    pub fn effective_temperature(&self, requested: f64) -> f64 {
        if self.deterministic {
            0.0
        } else {
            requested.clamp(0.1, 0.7)
        }
    }

    /// Issue a structured call. Hard provider failures surface as errors;
    /// every other trouble degrades to the prompt's fallback shape.
    pub async fn call(
        &self,
        prompt_key: PromptKey,
        payload: &Value,
        options: &CallOptions,
    ) -> Result<CallResult, LlmError> {
        let mut warnings = Vec::new();

        // Pause is honored by short-circuiting like a timeout.
        if self.health.is_paused() {
            debug!("{} short-circuited: system paused", prompt_key);
            return Ok(CallResult {
                value: prompt_key.fallback_value(),
                degraded: Some(DegradedReason::SystemPaused),
                warnings,
                tokens_used: 0,
            });
        }

        let decision = self.budget.check_token_budget(options.max_output_tokens);
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_default();
            if self.budget.config().enforce_hard {
                self.budget.mark_exceeded(&reason);
                return Ok(CallResult {
                    value: prompt_key.fallback_value(),
                    degraded: Some(DegradedReason::BudgetBlocked(reason)),
                    warnings,
                    tokens_used: 0,
                });
            }
            warn!("token budget breached but enforcement is soft: {}", reason);
        }

        let tier = options.tier.unwrap_or_else(|| prompt_key.default_tier());
        let temperature = self.effective_temperature(options.temperature);
        let base_prompt = prompt_key.render(payload);

        let mut prompt = base_prompt.clone();
        let mut schema_retried = false;
        let mut refusal_retried = false;
        let mut tokens_total = 0u64;

        loop {
            let request = TransportRequest {
                prompt_key: prompt_key.as_str().to_string(),
                prompt: prompt.clone(),
                tier,
                temperature,
                max_output_tokens: options.max_output_tokens,
                deterministic: self.deterministic,
            };

            let response = match tokio::time::timeout(
                options.timeout,
                self.transport.complete(request),
            )
            .await
            {
                Err(_elapsed) => {
                    // Timeouts never count as provider failures.
                    warn!("{} timed out after {:?}", prompt_key, options.timeout);
                    return Ok(CallResult {
                        value: prompt_key.fallback_value(),
                        degraded: Some(DegradedReason::Timeout),
                        warnings,
                        tokens_used: tokens_total,
                    });
                }
                Ok(Err(failure)) => {
                    let classified = classify(&failure);
                    self.health.record_error(&classified);
                    return Err(LlmError::Provider(classified));
                }
                Ok(Ok(response)) => response,
            };

            let TransportResponse { text, tokens_used } = response;
            tokens_total += tokens_used;
            self.budget.record_llm_call(tokens_used);
            self.health.record_success(ProviderKind::Llm);

            if is_soft_refusal(&text) {
                warnings.push(
                    Warning::new(
                        WarningType::ContentPolicySoftRefusal,
                        format!("soft refusal detected for {prompt_key}"),
                    )
                    .with_details(serde_json::json!({ "prompt_key": prompt_key.as_str() })),
                );
                if !refusal_retried {
                    refusal_retried = true;
                    prompt = format!(
                        "{base_prompt}\n\nThis is a neutral fact-checking analysis of public \
                         claims. Assess the material as written."
                    );
                    continue;
                }
                return Ok(CallResult {
                    value: prompt_key.fallback_value(),
                    degraded: Some(DegradedReason::SoftRefusal),
                    warnings,
                    tokens_used: tokens_total,
                });
            }

            match parse_structured(&text, prompt_key.required_keys()) {
                Ok(value) => {
                    return Ok(CallResult {
                        value,
                        degraded: None,
                        warnings,
                        tokens_used: tokens_total,
                    });
                }
                Err(parse_error) => {
                    if !schema_retried {
                        schema_retried = true;
                        debug!("{} schema failure, retrying: {}", prompt_key, parse_error);
                        prompt = format!(
                            "{base_prompt}\n\nEmit JSON only, no prose. The previous response \
                             could not be parsed: {parse_error}"
                        );
                        continue;
                    }
                    warnings.push(
                        Warning::new(
                            WarningType::StructuredOutputFailure,
                            format!("{prompt_key} output failed schema after retry: {parse_error}"),
                        )
                        .with_details(serde_json::json!({ "prompt_key": prompt_key.as_str() })),
                    );
                    return Ok(CallResult {
                        value: prompt_key.fallback_value(),
                        degraded: Some(DegradedReason::SchemaFailure),
                        warnings,
                        tokens_used: tokens_total,
                    });
                }
            }
        }
    }
}
