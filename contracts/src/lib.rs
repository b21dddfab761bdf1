//! Veridex Contracts
//!
//! Shared data model for the fact-checking pipeline: atomic claims, analysis
//! contexts, evidence, claim boundaries, verdicts, the warning taxonomy, the
//! result envelope, and the typed configuration surface.
//!
//! Entities cross-reference each other by string id, never by pointer. The
//! orchestrator owns the run's object graph; components receive immutable
//! views or return deltas.

pub mod claims;
pub mod config;
pub mod evidence;
pub mod result;
pub mod verdicts;
pub mod warnings;

pub use claims::*;
pub use config::*;
pub use evidence::*;
pub use result::*;
pub use verdicts::*;
pub use warnings::*;

use serde::{Deserialize, Serialize};

/// Kind of input submitted for analysis. Advisory: a question form and its
/// statement form must produce equivalent verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Claim,
    Question,
}

/// A single analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub text: String,
    pub kind: InputKind,
    /// Fix seeds, temperatures, and orderings so identical input yields
    /// identical output.
    #[serde(default)]
    pub deterministic: bool,
}

impl AnalysisInput {
    pub fn claim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: InputKind::Claim,
            deterministic: false,
        }
    }

    pub fn question(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: InputKind::Question,
            deterministic: false,
        }
    }
}

/// Model tier for an LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Haiku,
    Sonnet,
    Opus,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Haiku => write!(f, "haiku"),
            ModelTier::Sonnet => write!(f, "sonnet"),
            ModelTier::Opus => write!(f, "opus"),
        }
    }
}

/// Which external provider family an error or record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Search,
    Llm,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Search => write!(f, "search"),
            ProviderKind::Llm => write!(f, "llm"),
        }
    }
}
