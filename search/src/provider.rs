//! Search provider abstraction and selection
//!
//! Providers yield `{url, title, snippet}` tuples. Selection honors the
//! configured choice; `auto` tries providers in registration order and
//! fails over when one raises a fatal error.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use veridex_contracts::{DateRestrict, SearchProviderChoice};
use veridex_resilience::ProviderFailure;

/// A single search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
    pub date_restrict: DateRestrict,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub provider: String,
}

/// Pluggable search provider.
#[async_trait]
pub trait SearchProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, ProviderFailure>;
}

/// Registry of configured providers with choice-based selection.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) {
        self.providers.push(provider);
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Providers to try in order for the given choice. `auto` yields the
    /// full registration order for failover.
    pub fn select(&self, choice: SearchProviderChoice) -> Vec<Arc<dyn SearchProvider>> {
        match choice {
            SearchProviderChoice::Auto => self.providers.clone(),
            SearchProviderChoice::Serpapi => self.named("serpapi"),
            SearchProviderChoice::GoogleCse => self.named("google-cse"),
        }
    }

    fn named(&self, name: &str) -> Vec<Arc<dyn SearchProvider>> {
        self.providers
            .iter()
            .filter(|p| p.name() == name)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// In-memory provider for tests and offline runs. Hits are returned for
/// any query containing a registered needle (case-insensitive); queued
/// failures are raised first.
#[derive(Debug, Default)]
pub struct StaticSearchProvider {
    name: String,
    corpus: Mutex<HashMap<String, Vec<SearchHit>>>,
    failures: Mutex<Vec<ProviderFailure>>,
    queries_seen: Mutex<Vec<String>>,
}

impl StaticSearchProvider {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Register hits for queries containing `needle`.
    pub fn add_results(&self, needle: &str, hits: Vec<SearchHit>) {
        self.corpus
            .lock()
            .insert(needle.to_lowercase(), hits);
    }

    pub fn push_failure(&self, failure: ProviderFailure) {
        self.failures.lock().push(failure);
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.queries_seen.lock().clone()
    }

    pub fn hit(url: &str, title: &str, snippet: &str, provider: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
            provider: provider.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, ProviderFailure> {
        self.queries_seen.lock().push(request.query.clone());
        if let Some(failure) = self.failures.lock().pop() {
            warn!("static provider {} raising queued failure", self.name);
            return Err(failure);
        }
        let lowered = request.query.to_lowercase();
        let corpus = self.corpus.lock();
        let mut hits: Vec<SearchHit> = corpus
            .iter()
            .filter(|(needle, _)| lowered.contains(needle.as_str()))
            .flat_map(|(_, hits)| hits.iter().cloned())
            .collect();
        hits.truncate(request.max_results);
        Ok(hits)
    }
}
