//! Shape-based error classification
//!
//! Classification never depends on concrete error types from provider
//! SDKs: an error either carries explicit fields, or is identified by its
//! HTTP status, or by a small set of stable message substrings.

use serde::{Deserialize, Serialize};
use veridex_contracts::ProviderKind;

/// Category of a classified provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimit,
    ProviderOutage,
    Timeout,
    ContentPolicySoftRefusal,
    Unknown,
}

impl ErrorCategory {
    /// Only rate limits and outages count toward circuit breakers.
    /// Timeouts and soft refusals never do.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, ErrorCategory::RateLimit | ErrorCategory::ProviderOutage)
    }
}

/// A provider failure in duck-typed shape, as raised by collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub name: Option<String>,
    pub provider: Option<ProviderKind>,
    pub status: Option<u16>,
    pub fatal: Option<bool>,
    pub message: String,
}

impl ProviderFailure {
    pub fn from_message(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self {
            provider: Some(provider),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn from_status(provider: ProviderKind, status: u16, message: impl Into<String>) -> Self {
        Self {
            provider: Some(provider),
            status: Some(status),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Classification output fed into provider health tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub provider: Option<ProviderKind>,
    pub should_count_as_failure: bool,
    pub message: String,
}

/// Substrings that identify rate limiting in provider messages.
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "quota", "too many requests", "429"];

/// Substrings that identify provider outages.
const OUTAGE_MARKERS: &[&str] = &[
    "overloaded",
    "service unavailable",
    "internal server error",
    "bad gateway",
    "connection refused",
];

/// Substrings that identify timeouts.
const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout", "deadline exceeded"];

/// Substrings that identify content-policy soft refusals.
const REFUSAL_MARKERS: &[&str] = &["i can't", "i cannot", "i'm unable to", "i am unable to"];

/// Classify a provider failure by shape.
pub fn classify(failure: &ProviderFailure) -> ClassifiedError {
    let category = classify_category(failure);
    ClassifiedError {
        category,
        provider: failure.provider,
        should_count_as_failure: category.counts_as_failure(),
        message: failure.message.clone(),
    }
}

fn classify_category(failure: &ProviderFailure) -> ErrorCategory {
    // Explicit name wins over everything else.
    if let Some(name) = failure.name.as_deref() {
        match name {
            "rate_limit" => return ErrorCategory::RateLimit,
            "provider_outage" => return ErrorCategory::ProviderOutage,
            "timeout" => return ErrorCategory::Timeout,
            "content_policy_soft_refusal" => return ErrorCategory::ContentPolicySoftRefusal,
            _ => {}
        }
    }

    if let Some(status) = failure.status {
        return match status {
            401 | 403 | 429 => ErrorCategory::RateLimit,
            500..=599 => ErrorCategory::ProviderOutage,
            408 => ErrorCategory::Timeout,
            _ => ErrorCategory::Unknown,
        };
    }

    let lowered = failure.message.to_lowercase();
    if REFUSAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorCategory::ContentPolicySoftRefusal;
    }
    if RATE_LIMIT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorCategory::RateLimit;
    }
    if TIMEOUT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorCategory::Timeout;
    }
    if OUTAGE_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorCategory::ProviderOutage;
    }
    ErrorCategory::Unknown
}
