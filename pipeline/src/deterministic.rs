//! Deterministic-run harness
//!
//! Under deterministic mode: temperature is forced to zero by the call
//! primitive, entity orderings are fixed by a lexicographic sort pass,
//! and the result serializes as canonical JSON with sorted object keys so
//! identical inputs produce byte-identical output.

use serde_json::Value;
use veridex_contracts::AnalysisResult;

/// Fixed seed used wherever deterministic runs need randomness.
pub const DETERMINISTIC_SEED: u64 = 0x5eed_cafe;

/// Sort every entity list by its stable id so output ordering cannot
/// depend on join timing, and zero wall-clock timestamps. Insertion order
/// is already deterministic for a deterministic transport; this pins it
/// against concurrency.
pub fn freeze_ordering(result: &mut AnalysisResult) {
    result.facts.sort_by(|a, b| a.id.cmp(&b.id));
    result.sources.sort_by(|a, b| a.id.cmp(&b.id));
    for source in result.sources.iter_mut() {
        source.fetched_at = chrono::DateTime::UNIX_EPOCH;
    }
    result.claim_boundaries.sort_by(|a, b| a.id.cmp(&b.id));
    result.claim_verdicts.sort_by(|a, b| a.claim_id.cmp(&b.claim_id));
    result
        .understanding
        .analysis_contexts
        .sort_by(|a, b| a.id.cmp(&b.id));
    result
        .understanding
        .atomic_claims
        .sort_by(|a, b| a.id.cmp(&b.id));
    result.warnings.sort_by(|a, b| {
        (a.warning_type as u8, a.message.clone()).cmp(&(b.warning_type as u8, b.message.clone()))
    });
}

/// Canonical JSON: object keys sorted recursively. serde_json's default
/// map is ordered, so round-tripping through `Value` sorts every object.
pub fn to_canonical_json(result: &AnalysisResult) -> serde_json::Result<String> {
    let value = serde_json::to_value(result)?;
    serde_json::to_string(&sort_value(value))
}

fn sort_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sort_value(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}
