//! Veridex Resilience
//!
//! Error classification, per-provider health tracking with circuit
//! breakers, process-wide pause/resume, retry with jitter, and per-job
//! iteration/token budgets.

pub mod budget;
pub mod classifier;
pub mod health;
pub mod retry;

pub use budget::*;
pub use classifier::*;
pub use health::*;
pub use retry::*;
