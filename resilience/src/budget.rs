//! Per-job iteration and token budgets
//!
//! Counters are monotone non-decreasing. Per-context and global iteration
//! caps are tracked independently; a per-context cap of K does not imply a
//! global cap of K.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use veridex_contracts::BudgetConfig;

/// Outcome of a budget check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl BudgetDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Budget usage snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStats {
    pub iterations_by_context: HashMap<String, u32>,
    pub total_iterations: u32,
    pub total_tokens: u64,
    pub llm_calls: u64,
    pub exceeded_reason: Option<String>,
}

/// Per-job budget tracker. Not shared across jobs.
#[derive(Debug)]
pub struct BudgetTracker {
    config: BudgetConfig,
    context_iterations: Mutex<HashMap<String, u32>>,
    total_iterations: AtomicU64,
    total_tokens: AtomicU64,
    llm_calls: AtomicU64,
    exceeded_reason: Mutex<Option<String>>,
}

impl BudgetTracker {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            context_iterations: Mutex::new(HashMap::new()),
            total_iterations: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
            llm_calls: AtomicU64::new(0),
            exceeded_reason: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// May another research iteration run for this context? Blocks when
    /// either the per-context or the global cap is reached.
    pub fn check_context_iteration_budget(&self, context_id: &str) -> BudgetDecision {
        let total = self.total_iterations.load(Ordering::SeqCst) as u32;
        if total >= self.config.max_total_iterations {
            return BudgetDecision::blocked(format!(
                "total iteration cap reached ({}/{})",
                total, self.config.max_total_iterations
            ));
        }
        let per_context = *self
            .context_iterations
            .lock()
            .get(context_id)
            .unwrap_or(&0);
        if per_context >= self.config.max_iterations_per_context {
            return BudgetDecision::blocked(format!(
                "iteration cap for {} reached ({}/{})",
                context_id, per_context, self.config.max_iterations_per_context
            ));
        }
        BudgetDecision::allowed()
    }

    /// May a call requesting this many tokens proceed?
    pub fn check_token_budget(&self, requested_tokens: u64) -> BudgetDecision {
        if requested_tokens > self.config.max_tokens_per_call {
            return BudgetDecision::blocked(format!(
                "requested {} tokens exceeds per-call cap {}",
                requested_tokens, self.config.max_tokens_per_call
            ));
        }
        let used = self.total_tokens.load(Ordering::SeqCst);
        if used.saturating_add(requested_tokens) > self.config.max_total_tokens {
            return BudgetDecision::blocked(format!(
                "token budget exhausted ({}/{} used, {} requested)",
                used, self.config.max_total_tokens, requested_tokens
            ));
        }
        BudgetDecision::allowed()
    }

    pub fn record_iteration(&self, context_id: &str) {
        *self
            .context_iterations
            .lock()
            .entry(context_id.to_string())
            .or_insert(0) += 1;
        self.total_iterations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_tokens(&self, tokens: u64) {
        self.total_tokens.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn record_llm_call(&self, tokens: u64) {
        self.llm_calls.fetch_add(1, Ordering::SeqCst);
        self.record_tokens(tokens);
    }

    /// Record that the run hit a hard budget stop.
    pub fn mark_exceeded(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("budget exceeded: {}", reason);
        let mut slot = self.exceeded_reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded_reason.lock().is_some()
    }

    pub fn stats(&self) -> BudgetStats {
        BudgetStats {
            iterations_by_context: self.context_iterations.lock().clone(),
            total_iterations: self.total_iterations.load(Ordering::SeqCst) as u32,
            total_tokens: self.total_tokens.load(Ordering::SeqCst),
            llm_calls: self.llm_calls.load(Ordering::SeqCst),
            exceeded_reason: self.exceeded_reason.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_budget() -> BudgetConfig {
        BudgetConfig {
            max_iterations_per_context: 2,
            max_total_iterations: 3,
            max_total_tokens: 1000,
            max_tokens_per_call: 400,
            enforce_hard: true,
        }
    }

    #[test]
    fn per_context_cap_blocks_independently() {
        let tracker = BudgetTracker::new(small_budget());
        tracker.record_iteration("CTX_1");
        tracker.record_iteration("CTX_1");
        assert!(!tracker.check_context_iteration_budget("CTX_1").allowed);
        // A different context still has room.
        assert!(tracker.check_context_iteration_budget("CTX_2").allowed);
    }

    #[test]
    fn global_cap_blocks_all_contexts() {
        let tracker = BudgetTracker::new(small_budget());
        tracker.record_iteration("CTX_1");
        tracker.record_iteration("CTX_2");
        tracker.record_iteration("CTX_3");
        let decision = tracker.check_context_iteration_budget("CTX_4");
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("total iteration cap"));
    }

    #[test]
    fn token_caps() {
        let tracker = BudgetTracker::new(small_budget());
        assert!(!tracker.check_token_budget(500).allowed); // over per-call cap
        assert!(tracker.check_token_budget(400).allowed);
        tracker.record_llm_call(400);
        tracker.record_llm_call(400);
        assert!(!tracker.check_token_budget(300).allowed); // would exceed total
        assert_eq!(tracker.stats().llm_calls, 2);
        assert_eq!(tracker.stats().total_tokens, 800);
    }

    #[test]
    fn counters_are_monotone() {
        let tracker = BudgetTracker::new(small_budget());
        tracker.record_tokens(100);
        tracker.record_tokens(50);
        assert_eq!(tracker.stats().total_tokens, 150);
    }

    #[test]
    fn mark_exceeded_keeps_first_reason() {
        let tracker = BudgetTracker::new(small_budget());
        assert!(!tracker.is_exceeded());
        tracker.mark_exceeded("token budget exhausted");
        tracker.mark_exceeded("iteration cap");
        assert_eq!(
            tracker.stats().exceeded_reason.as_deref(),
            Some("token budget exhausted")
        );
    }
}
