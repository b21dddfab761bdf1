//! Retry with exponential backoff and jitter

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// 0.0 = no jitter, 1.0 = full jitter.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// The single-retry policy used by search queries: one extra attempt
    /// with ~250 ms jittered delay.
    pub fn single_retry() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 250,
            max_delay_ms: 500,
            backoff_multiplier: 1.0,
            jitter_factor: 0.5,
        }
    }

    /// Delay before the given retry attempt (1-based), jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let jitter = if self.jitter_factor > 0.0 {
            let spread = capped * self.jitter_factor;
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// Run an async operation with retries. `is_retryable` decides whether a
/// given error warrants another attempt; fatal errors surface immediately.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= config.max_attempts || !is_retryable(&error) {
                    return Err(error);
                }
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "attempt {}/{} failed ({}); retrying in {:?}",
                    attempt, config.max_attempts, error, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
