use crate::domain::errors::StrategyError;
use crate::domain::market::{Bar, DetectionEvent};
use crate::domain::optimization::{EvaluationResult, ParameterSet};
use anyhow::Result;
use chrono::NaiveDate;

/// Source of cleaned, chronologically ordered daily bars.
pub trait DataModule: Send + Sync {
    fn history(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>>;
}

/// Low-point detection rule plus its backtest reduction.
///
/// Implementations are cloned by the evaluators: a clone receives the
/// candidate parameters, runs, and is dropped, so the caller's instance is
/// never mutated during a search.
pub trait StrategyModule: Clone + Send + Sync {
    /// Current parameter values, including fixed ones
    fn params(&self) -> ParameterSet;

    /// Overwrites the named parameters; names absent from `params` keep
    /// their current value.
    fn apply_params(&mut self, params: &ParameterSet) -> Result<(), StrategyError>;

    /// One event per bar of `data`, indexed by position in `data`
    fn backtest(&self, data: &[Bar]) -> Vec<DetectionEvent>;

    /// Reduces events to counts and a single score
    fn evaluate(&self, events: &[DetectionEvent]) -> EvaluationResult;

    /// Bars after an event that its outcome label may look at
    fn label_horizon(&self) -> usize {
        0
    }

    fn name(&self) -> &str;
}
