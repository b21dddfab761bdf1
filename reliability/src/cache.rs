//! Reliability cache seam
//!
//! The cache is process-wide and read-mostly. External stores implement
//! the trait; the in-memory implementation backs embedding and tests.
//! Writes for the same domain are idempotent.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cached per-domain reliability record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedReliability {
    /// Normalized score in [0,1]; None for insufficient data.
    pub score: Option<f64>,
    pub confidence: f64,
    pub consensus_achieved: bool,
}

/// Pluggable reliability cache.
#[async_trait]
pub trait ReliabilityCache: Send + Sync + std::fmt::Debug {
    async fn batch_get(&self, domains: &[String]) -> HashMap<String, CachedReliability>;

    async fn set(&self, domain: &str, record: CachedReliability);
}

/// In-memory cache backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryReliabilityCache {
    entries: DashMap<String, CachedReliability>,
}

impl MemoryReliabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seed a record synchronously, for tests and fixtures.
    pub fn seed(&self, domain: &str, score: f64, confidence: f64) {
        self.entries.insert(
            domain.to_string(),
            CachedReliability {
                score: Some(score),
                confidence,
                consensus_achieved: true,
            },
        );
    }
}

#[async_trait]
impl ReliabilityCache for MemoryReliabilityCache {
    async fn batch_get(&self, domains: &[String]) -> HashMap<String, CachedReliability> {
        domains
            .iter()
            .filter_map(|d| self.entries.get(d).map(|r| (d.clone(), r.clone())))
            .collect()
    }

    async fn set(&self, domain: &str, record: CachedReliability) {
        self.entries.insert(domain.to_string(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_get_returns_only_hits() {
        let cache = MemoryReliabilityCache::new();
        cache.seed("reuters.com", 0.95, 0.9);

        let found = cache
            .batch_get(&["reuters.com".to_string(), "unknown.org".to_string()])
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found["reuters.com"].score, Some(0.95));
    }

    #[tokio::test]
    async fn set_is_idempotent() {
        let cache = MemoryReliabilityCache::new();
        let record = CachedReliability {
            score: Some(0.6),
            confidence: 0.7,
            consensus_achieved: false,
        };
        cache.set("example.com", record.clone()).await;
        cache.set("example.com", record).await;
        assert_eq!(cache.len(), 1);
    }
}
