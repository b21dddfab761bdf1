//! Veridex Reliability
//!
//! Per-domain source reliability: an importance filter over candidate
//! domains, a prefetch-then-sync-lookup lifecycle backed by a pluggable
//! cache, an LLM evaluator with post-processing caps, and the evidence
//! weighting applied to verdicts.

pub mod cache;
pub mod domains;
pub mod evaluator;
pub mod service;

pub use cache::*;
pub use domains::*;
pub use evaluator::*;
pub use service::*;
