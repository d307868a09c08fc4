use super::cross_validation::{Fold, walk_forward_folds};
use crate::domain::errors::{OptimizationError, StrategyError};
use crate::domain::market::Bar;
use crate::domain::optimization::{EvaluationResult, ParameterSet};
use crate::domain::ports::StrategyModule;
use tracing::debug;

/// Scalar objective that optimizers maximize.
///
/// Implemented for plain closures, so any `Fn(&ParameterSet) -> f64` can be
/// searched, not only strategy backtests.
pub trait Objective: Sync {
    fn score(&self, params: &ParameterSet) -> f64;
}

impl<F> Objective for F
where
    F: Fn(&ParameterSet) -> f64 + Sync,
{
    fn score(&self, params: &ParameterSet) -> f64 {
        self(params)
    }
}

/// Maps NaN and infinities to the worst possible score.
pub fn normalize_score(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        f64::NEG_INFINITY
    }
}

/// Strategy + dataset wrapped into `params -> score`.
///
/// Each call clones the strategy, applies the candidate to the clone,
/// backtests and drops it, so no state survives between calls.
pub struct FitnessEvaluator<'a, S: StrategyModule> {
    strategy: S,
    data: &'a [Bar],
}

impl<'a, S: StrategyModule> FitnessEvaluator<'a, S> {
    pub fn new(strategy: S, data: &'a [Bar]) -> Self {
        Self { strategy, data }
    }

    pub fn evaluate_detailed(&self, params: &ParameterSet) -> Result<EvaluationResult, StrategyError> {
        let mut candidate = self.strategy.clone();
        candidate.apply_params(params)?;
        let events = candidate.backtest(self.data);
        Ok(candidate.evaluate(&events))
    }

    pub fn evaluate(&self, params: &ParameterSet) -> f64 {
        match self.evaluate_detailed(params) {
            Ok(result) => normalize_score(result.score),
            Err(e) => {
                debug!("Fitness: rejected {}: {}", params, e);
                f64::NEG_INFINITY
            }
        }
    }
}

impl<S: StrategyModule> Objective for FitnessEvaluator<'_, S> {
    fn score(&self, params: &ParameterSet) -> f64 {
        self.evaluate(params)
    }
}

/// Mean strategy score over walk-forward test windows.
///
/// For each fold the strategy only sees bars up to the end of the test
/// window, and only events inside the window are scored.
pub struct CrossValidatedFitness<'a, S: StrategyModule> {
    strategy: S,
    data: &'a [Bar],
    folds: Vec<Fold>,
}

impl<'a, S: StrategyModule> CrossValidatedFitness<'a, S> {
    pub fn new(
        strategy: S,
        data: &'a [Bar],
        folds: usize,
        min_train_fraction: f64,
    ) -> Result<Self, OptimizationError> {
        let folds = walk_forward_folds(data.len(), folds, min_train_fraction)?;
        Ok(Self {
            strategy,
            data,
            folds,
        })
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    /// Per-fold scores, in fold order.
    pub fn fold_scores(&self, params: &ParameterSet) -> Result<Vec<f64>, StrategyError> {
        let mut candidate = self.strategy.clone();
        candidate.apply_params(params)?;

        Ok(self
            .folds
            .iter()
            .map(|fold| {
                let events = candidate.backtest(&self.data[..fold.test.end]);
                let window: Vec<_> = events
                    .into_iter()
                    .filter(|e| fold.test.contains(&e.index))
                    .collect();
                candidate.evaluate(&window).score
            })
            .collect())
    }

    pub fn evaluate(&self, params: &ParameterSet) -> f64 {
        match self.fold_scores(params) {
            Ok(scores) if !scores.is_empty() => {
                normalize_score(scores.iter().sum::<f64>() / scores.len() as f64)
            }
            Ok(_) => f64::NEG_INFINITY,
            Err(e) => {
                debug!("CrossValidation: rejected {}: {}", params, e);
                f64::NEG_INFINITY
            }
        }
    }
}

impl<S: StrategyModule> Objective for CrossValidatedFitness<'_, S> {
    fn score(&self, params: &ParameterSet) -> f64 {
        self.evaluate(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::DetectionEvent;
    use chrono::{Duration, NaiveDate};

    /// Scores a backtest by the configured `k` times the number of events.
    #[derive(Clone)]
    struct CountingStrategy {
        k: f64,
    }

    impl StrategyModule for CountingStrategy {
        fn params(&self) -> ParameterSet {
            ParameterSet::new().with("k", self.k)
        }

        fn apply_params(&mut self, params: &ParameterSet) -> Result<(), StrategyError> {
            for (name, value) in params.iter() {
                if name != "k" {
                    return Err(StrategyError::UnknownParameter {
                        name: name.to_string(),
                    });
                }
                self.k = value.as_f64().unwrap_or(f64::NAN);
            }
            Ok(())
        }

        fn backtest(&self, data: &[Bar]) -> Vec<DetectionEvent> {
            data.iter()
                .enumerate()
                .map(|(i, b)| DetectionEvent {
                    index: i,
                    date: b.date,
                    price: b.close,
                    is_low_point: true,
                    confidence: 1.0,
                    max_rise: Some(0.0),
                    days_to_target: None,
                    success: Some(false),
                })
                .collect()
        }

        fn evaluate(&self, events: &[DetectionEvent]) -> EvaluationResult {
            EvaluationResult {
                total_points: events.len(),
                success_rate: 0.0,
                avg_rise: 0.0,
                score: self.k * events.len() as f64,
            }
        }

        fn name(&self) -> &str {
            "Counting"
        }
    }

    fn data(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| Bar::new(start + Duration::days(i as i64), 1.0, 1.0, 1.0, 1.0, 1.0))
            .collect()
    }

    #[test]
    fn test_evaluator_does_not_leak_params() {
        let bars = data(10);
        let strategy = CountingStrategy { k: 1.0 };
        let evaluator = FitnessEvaluator::new(strategy.clone(), &bars);

        assert_eq!(evaluator.evaluate(&ParameterSet::new().with("k", 2.0)), 20.0);
        // Empty set keeps the base strategy's k
        assert_eq!(evaluator.evaluate(&ParameterSet::new()), 10.0);
        assert_eq!(strategy.k, 1.0);
    }

    #[test]
    fn test_invalid_or_non_finite_scores_are_worst() {
        let bars = data(10);
        let evaluator = FitnessEvaluator::new(CountingStrategy { k: 1.0 }, &bars);

        assert_eq!(
            evaluator.evaluate(&ParameterSet::new().with("other", 1.0)),
            f64::NEG_INFINITY
        );
        assert_eq!(
            evaluator.evaluate(&ParameterSet::new().with("k", "text")),
            f64::NEG_INFINITY
        );
        assert_eq!(normalize_score(f64::INFINITY), f64::NEG_INFINITY);
    }

    #[test]
    fn test_cross_validated_score_is_mean_of_test_windows() {
        let bars = data(100);
        let cv = CrossValidatedFitness::new(CountingStrategy { k: 1.0 }, &bars, 4, 0.2).unwrap();

        let scores = cv.fold_scores(&ParameterSet::new()).unwrap();
        // Windows of 20 rows each after 20 training rows
        assert_eq!(scores, vec![20.0, 20.0, 20.0, 20.0]);
        assert_eq!(cv.evaluate(&ParameterSet::new().with("k", 0.5)), 10.0);
    }

    #[test]
    fn test_closure_objective() {
        let objective = |p: &ParameterSet| p.get_f64("x").unwrap_or(0.0) * 2.0;
        assert_eq!(objective.score(&ParameterSet::new().with("x", 3)), 6.0);
    }
}
