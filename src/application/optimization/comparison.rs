//! Full-data backtests of tuned parameter sets against the configured baseline.

use super::fitness::FitnessEvaluator;
use crate::domain::errors::StrategyError;
use crate::domain::market::Bar;
use crate::domain::optimization::{EvaluationResult, ParameterSet};
use crate::domain::ports::StrategyModule;
use serde::Serialize;
use tracing::{info, warn};

/// Relative change of `score` over `baseline`, in percent.
///
/// `None` when the baseline is not a positive finite number, since the ratio
/// is then meaningless.
pub fn improvement_pct(baseline: f64, score: f64) -> Option<f64> {
    if baseline.is_finite() && baseline > 0.0 && score.is_finite() {
        Some((score - baseline) / baseline * 100.0)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodScore {
    pub method: String,
    pub params: ParameterSet,
    pub evaluation: EvaluationResult,
    pub improvement_pct: Option<f64>,
}

/// Methods ranked by full-data score, best first
#[derive(Debug, Clone, Serialize)]
pub struct MethodComparison {
    pub baseline: EvaluationResult,
    pub methods: Vec<MethodScore>,
}

impl MethodComparison {
    pub fn new(baseline: EvaluationResult) -> Self {
        Self {
            baseline,
            methods: Vec::new(),
        }
    }

    /// Inserts keeping the ranking; ties keep recording order.
    pub fn record(&mut self, method: impl Into<String>, params: ParameterSet, evaluation: EvaluationResult) {
        let entry = MethodScore {
            method: method.into(),
            params,
            improvement_pct: improvement_pct(self.baseline.score, evaluation.score),
            evaluation,
        };
        let at = self
            .methods
            .partition_point(|m| m.evaluation.score >= entry.evaluation.score);
        self.methods.insert(at, entry);
    }

    /// Top method when it strictly beats the baseline; `None` means the
    /// configured parameters are still the best choice.
    pub fn best(&self) -> Option<&MethodScore> {
        self.methods
            .first()
            .filter(|m| m.evaluation.score > self.baseline.score)
    }
}

/// Backtests the current parameters and each candidate on the full data.
///
/// Candidates the strategy rejects are logged and left out; a baseline the
/// strategy cannot evaluate is an error.
pub fn compare_methods<S, I>(strategy: S, data: &[Bar], candidates: I) -> Result<MethodComparison, StrategyError>
where
    S: StrategyModule,
    I: IntoIterator<Item = (String, ParameterSet)>,
{
    let evaluator = FitnessEvaluator::new(strategy, data);
    let baseline = evaluator.evaluate_detailed(&ParameterSet::new())?;
    info!(
        "Comparison: Baseline {} points, success {:.2}%, score {:.4}",
        baseline.total_points,
        baseline.success_rate * 100.0,
        baseline.score
    );

    let mut comparison = MethodComparison::new(baseline);
    for (method, params) in candidates {
        match evaluator.evaluate_detailed(&params) {
            Ok(evaluation) => {
                info!("Comparison: {} scored {:.4} with {}", method, evaluation.score, params);
                comparison.record(method, params, evaluation);
            }
            Err(e) => warn!("Comparison: {} parameters rejected: {}", method, e),
        }
    }
    Ok(comparison)
}
