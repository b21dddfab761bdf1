//! Per-provider health tracking and system pause state
//!
//! Each provider keeps a consecutive-failure counter. Any success resets
//! it. The N-th consecutive counted failure opens that provider's circuit
//! and pauses the system. Opening one provider's circuit does not open
//! another's. Pause is recoverable without data loss: the runner consults
//! the flag before dequeueing work, and `resume` closes all circuits.

use crate::classifier::ClassifiedError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use veridex_contracts::ProviderKind;

/// Snapshot of one provider's health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthSnapshot {
    pub provider: ProviderKind,
    pub consecutive_failures: u32,
    pub circuit_open: bool,
}

#[derive(Debug, Default)]
struct ProviderCounters {
    consecutive_failures: AtomicU32,
    circuit_open: AtomicBool,
}

/// Process-wide provider health tracker with a pause flag.
///
/// Constructed once at startup and shared; tests inject their own
/// instance.
#[derive(Debug)]
pub struct ProviderHealth {
    failure_threshold: u32,
    search: ProviderCounters,
    llm: ProviderCounters,
    paused: AtomicBool,
    pause_reason: Mutex<Option<String>>,
}

impl ProviderHealth {
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

    pub fn new(failure_threshold: u32) -> Arc<Self> {
        Arc::new(Self {
            failure_threshold: failure_threshold.max(1),
            search: ProviderCounters::default(),
            llm: ProviderCounters::default(),
            paused: AtomicBool::new(false),
            pause_reason: Mutex::new(None),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(Self::DEFAULT_FAILURE_THRESHOLD)
    }

    fn counters(&self, provider: ProviderKind) -> &ProviderCounters {
        match provider {
            ProviderKind::Search => &self.search,
            ProviderKind::Llm => &self.llm,
        }
    }

    /// Record a successful provider interaction.
    pub fn record_success(&self, provider: ProviderKind) {
        self.counters(provider)
            .consecutive_failures
            .store(0, Ordering::SeqCst);
    }

    /// Feed a classified error into the tracker. Returns true when this
    /// failure opened the provider's circuit.
    pub fn record_error(&self, error: &ClassifiedError) -> bool {
        if !error.should_count_as_failure {
            return false;
        }
        let Some(provider) = error.provider else {
            return false;
        };
        let counters = self.counters(provider);
        let failures = counters.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold && !counters.circuit_open.swap(true, Ordering::SeqCst)
        {
            warn!(
                "{} circuit opened after {} consecutive failures: {}",
                provider, failures, error.message
            );
            self.pause(format!("{provider} circuit open: {}", error.message));
            return true;
        }
        false
    }

    pub fn is_circuit_open(&self, provider: ProviderKind) -> bool {
        self.counters(provider).circuit_open.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self, provider: ProviderKind) -> u32 {
        self.counters(provider)
            .consecutive_failures
            .load(Ordering::SeqCst)
    }

    /// Set the process-wide paused flag. Honored at the next yield point;
    /// an in-flight call is allowed to complete.
    pub fn pause(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("system paused: {}", reason);
        *self.pause_reason.lock() = Some(reason);
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Close all circuits, zero all counters, clear the pause flag.
    pub fn resume(&self) {
        for provider in [ProviderKind::Search, ProviderKind::Llm] {
            let counters = self.counters(provider);
            counters.consecutive_failures.store(0, Ordering::SeqCst);
            counters.circuit_open.store(false, Ordering::SeqCst);
        }
        *self.pause_reason.lock() = None;
        self.paused.store(false, Ordering::SeqCst);
        info!("system resumed; all circuits closed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn pause_reason(&self) -> Option<String> {
        self.pause_reason.lock().clone()
    }

    pub fn snapshot(&self, provider: ProviderKind) -> ProviderHealthSnapshot {
        ProviderHealthSnapshot {
            provider,
            consecutive_failures: self.consecutive_failures(provider),
            circuit_open: self.is_circuit_open(provider),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, ProviderFailure};

    fn counted_error(provider: ProviderKind) -> ClassifiedError {
        classify(&ProviderFailure::from_status(provider, 429, "rate limited"))
    }

    #[test]
    fn circuit_opens_on_third_consecutive_failure() {
        let health = ProviderHealth::with_defaults();
        assert!(!health.record_error(&counted_error(ProviderKind::Search)));
        assert!(!health.record_error(&counted_error(ProviderKind::Search)));
        assert!(health.record_error(&counted_error(ProviderKind::Search)));
        assert!(health.is_circuit_open(ProviderKind::Search));
        assert!(health.is_paused());
        assert!(health.pause_reason().unwrap().contains("circuit open"));
    }

    #[test]
    fn success_resets_counter() {
        let health = ProviderHealth::with_defaults();
        health.record_error(&counted_error(ProviderKind::Llm));
        health.record_error(&counted_error(ProviderKind::Llm));
        health.record_success(ProviderKind::Llm);
        assert_eq!(health.consecutive_failures(ProviderKind::Llm), 0);
        health.record_error(&counted_error(ProviderKind::Llm));
        assert!(!health.is_circuit_open(ProviderKind::Llm));
    }

    #[test]
    fn one_circuit_does_not_open_another() {
        let health = ProviderHealth::with_defaults();
        for _ in 0..3 {
            health.record_error(&counted_error(ProviderKind::Search));
        }
        assert!(health.is_circuit_open(ProviderKind::Search));
        assert!(!health.is_circuit_open(ProviderKind::Llm));
    }

    #[test]
    fn timeouts_never_count() {
        let health = ProviderHealth::with_defaults();
        let timeout = classify(&ProviderFailure::from_message(
            ProviderKind::Search,
            "request timed out",
        ));
        for _ in 0..10 {
            health.record_error(&timeout);
        }
        assert!(!health.is_circuit_open(ProviderKind::Search));
        assert!(!health.is_paused());
    }

    #[test]
    fn resume_clears_everything() {
        let health = ProviderHealth::with_defaults();
        for _ in 0..3 {
            health.record_error(&counted_error(ProviderKind::Search));
        }
        assert!(health.is_paused());

        health.resume();
        assert!(!health.is_paused());
        assert!(!health.is_circuit_open(ProviderKind::Search));
        assert_eq!(health.consecutive_failures(ProviderKind::Search), 0);
        assert!(health.pause_reason().is_none());
    }
}
