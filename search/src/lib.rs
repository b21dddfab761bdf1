//! Veridex Search
//!
//! Adaptive multi-query web search: provider abstraction with failover,
//! brand-variant generation, phased query plans, relevance filtering,
//! self-citation exclusion, URL de-duplication, and article fetching.

pub mod fetcher;
pub mod orchestrator;
pub mod provider;
pub mod queries;
pub mod variants;

pub use fetcher::*;
pub use orchestrator::*;
pub use provider::*;
pub use queries::*;
pub use variants::*;
