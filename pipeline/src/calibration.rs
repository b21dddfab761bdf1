//! Calibration runner
//!
//! Measures directional skew over mirrored claim pairs that differ only
//! in political valence. A calibrated engine scores both sides of a pair
//! within the allowed skew, and the mean signed skew across the suite
//! stays near zero.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use veridex_contracts::{CalibrationConfig, StageError};

/// A mirrored input pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasPair {
    pub id: String,
    pub left: String,
    pub right: String,
}

/// Scoring seam: anything that can turn a claim into a truth percentage.
/// The production implementation runs the full pipeline; tests inject a
/// deterministic probe.
#[async_trait]
pub trait TruthProbe: Send + Sync {
    async fn truth_percentage(&self, claim_text: &str) -> Result<f64, StageError>;
}

/// Result for one pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairResult {
    pub id: String,
    pub left_mean: f64,
    pub right_mean: f64,
    /// Signed: positive when the left side scores higher.
    pub directional_skew: f64,
    pub pair_skew: f64,
    pub passed: bool,
}

/// Full calibration report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub pairs: Vec<PairResult>,
    pub mean_directional_skew: f64,
    pub max_pair_skew: f64,
    pub pass_rate: f64,
    pub passed: bool,
}

/// The bundled mirrored-pair fixture.
pub fn bundled_bias_pairs() -> Vec<BiasPair> {
    serde_json::from_str(include_str!("../fixtures/bias_pairs.json"))
        .expect("bundled bias-pair fixture parses")
}

/// Run the calibration suite: each side of each pair is scored
/// `runs_per_side` times and the means compared.
pub async fn run_calibration(
    probe: &dyn TruthProbe,
    pairs: &[BiasPair],
    runs_per_side: usize,
    config: &CalibrationConfig,
) -> Result<CalibrationReport, StageError> {
    let runs_per_side = runs_per_side.max(1);
    let mut results = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let left_mean = mean_truth(probe, &pair.left, runs_per_side).await?;
        let right_mean = mean_truth(probe, &pair.right, runs_per_side).await?;
        let directional_skew = left_mean - right_mean;
        let pair_skew = directional_skew.abs();
        results.push(PairResult {
            id: pair.id.clone(),
            left_mean,
            right_mean,
            directional_skew,
            pair_skew,
            passed: pair_skew <= config.max_pair_skew,
        });
    }

    let mean_directional_skew = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.directional_skew).sum::<f64>() / results.len() as f64
    };
    let max_pair_skew = results.iter().map(|r| r.pair_skew).fold(0.0, f64::max);
    let pass_rate = if results.is_empty() {
        1.0
    } else {
        results.iter().filter(|r| r.passed).count() as f64 / results.len() as f64
    };
    let passed = mean_directional_skew.abs() <= config.max_mean_directional_skew
        && max_pair_skew <= config.max_pair_skew
        && pass_rate >= config.min_pass_rate;

    info!(
        "calibration: mean skew {:.1}, max pair skew {:.1}, pass rate {:.0}%",
        mean_directional_skew,
        max_pair_skew,
        pass_rate * 100.0
    );
    Ok(CalibrationReport {
        pairs: results,
        mean_directional_skew,
        max_pair_skew,
        pass_rate,
        passed,
    })
}

async fn mean_truth(
    probe: &dyn TruthProbe,
    text: &str,
    runs: usize,
) -> Result<f64, StageError> {
    let mut total = 0.0;
    for _ in 0..runs {
        total += probe.truth_percentage(text).await?;
    }
    Ok(total / runs as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct TableProbe {
        scores: HashMap<String, f64>,
    }

    #[async_trait]
    impl TruthProbe for TableProbe {
        async fn truth_percentage(&self, claim_text: &str) -> Result<f64, StageError> {
            Ok(*self.scores.get(claim_text).unwrap_or(&50.0))
        }
    }

    fn pair(id: &str, left: &str, right: &str) -> BiasPair {
        BiasPair {
            id: id.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    #[test]
    fn bundled_fixture_has_enough_pairs() {
        let pairs = bundled_bias_pairs();
        assert!(pairs.len() >= 10, "fixture has {} pairs", pairs.len());
        for pair in &pairs {
            assert!(!pair.left.is_empty());
            assert!(!pair.right.is_empty());
            assert_ne!(pair.left, pair.right);
        }
    }

    #[tokio::test]
    async fn balanced_probe_passes() {
        let mut scores = HashMap::new();
        scores.insert("L1".to_string(), 70.0);
        scores.insert("R1".to_string(), 68.0);
        scores.insert("L2".to_string(), 40.0);
        scores.insert("R2".to_string(), 45.0);
        let probe = TableProbe { scores };
        let pairs = vec![pair("p1", "L1", "R1"), pair("p2", "L2", "R2")];

        let report = run_calibration(&probe, &pairs, 2, &CalibrationConfig::default())
            .await
            .unwrap();
        assert!(report.passed);
        assert_eq!(report.pass_rate, 1.0);
        // Mean of +2 and -5.
        assert!((report.mean_directional_skew - (-1.5)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn skewed_probe_fails() {
        let mut scores = HashMap::new();
        scores.insert("L1".to_string(), 85.0);
        scores.insert("R1".to_string(), 40.0);
        let probe = TableProbe { scores };
        let pairs = vec![pair("p1", "L1", "R1")];

        let report = run_calibration(&probe, &pairs, 2, &CalibrationConfig::default())
            .await
            .unwrap();
        assert!(!report.passed);
        assert_eq!(report.max_pair_skew, 45.0);
        assert_eq!(report.pass_rate, 0.0);
    }
}
