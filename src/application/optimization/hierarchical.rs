//! Two-stage coarse-to-fine optimization.
//!
//! The coarse stage searches the full space against walk-forward
//! cross-validated fitness. The refine stage searches a narrowed space
//! around the coarse winner against the advanced objective (full-data
//! strategy score blended with classifier F1).

use super::fitness::{CrossValidatedFitness, FitnessEvaluator, Objective};
use super::genetic::{GeneticOptimizer, GeneticSettings};
use super::optimizer::{GridSearchOptimizer, GridSearchSettings};
use crate::application::ml::classifier_pipeline::{ClassifierPipeline, ClassifierSettings};
use crate::domain::errors::OptimizationError;
use crate::domain::market::Bar;
use crate::domain::market::bar::is_chronological;
use crate::domain::optimization::{
    OptimizationResult, ParameterSet, ParameterSpace, SearchMethod, StageReport,
};
use crate::domain::ports::StrategyModule;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalSettings {
    pub coarse_method: SearchMethod,
    pub cv_folds: usize,
    /// Leading share of the data that only ever trains
    pub min_train_fraction: f64,
    /// Share of each numeric span kept on either side of the coarse winner
    pub refine_ratio: f64,
    pub backtest_weight: f64,
    /// 0 skips the classifier entirely
    pub model_weight: f64,
    pub genetic: GeneticSettings,
    pub grid: GridSearchSettings,
    pub classifier: ClassifierSettings,
}

impl Default for HierarchicalSettings {
    fn default() -> Self {
        Self {
            coarse_method: SearchMethod::Genetic,
            cv_folds: 3,
            min_train_fraction: 0.4,
            refine_ratio: 0.25,
            backtest_weight: 0.7,
            model_weight: 0.3,
            genetic: GeneticSettings::default(),
            grid: GridSearchSettings::default(),
            classifier: ClassifierSettings::default(),
        }
    }
}

impl HierarchicalSettings {
    pub fn validate(&self) -> Result<(), OptimizationError> {
        let invalid = |reason: String| Err(OptimizationError::InvalidSettings { reason });
        if !(self.refine_ratio.is_finite() && self.refine_ratio > 0.0) {
            return invalid(format!("refine_ratio must be > 0, got {}", self.refine_ratio));
        }
        for (name, w) in [
            ("backtest_weight", self.backtest_weight),
            ("model_weight", self.model_weight),
        ] {
            if !(w.is_finite() && w >= 0.0) {
                return invalid(format!("{} must be >= 0, got {}", name, w));
            }
        }
        self.genetic.validate()
    }

    /// Half-sized genetic run used when the narrowed grid is too large.
    fn refine_genetic(&self) -> GeneticSettings {
        GeneticSettings {
            population_size: (self.genetic.population_size / 2).max(2),
            generations: (self.genetic.generations / 2).max(1),
            seed: self.genetic.seed.map(|s| s.wrapping_add(1)),
            ..self.genetic.clone()
        }
    }
}

/// Refine-stage objective:
/// `backtest_weight * strategy score + model_weight * classifier F1`.
pub struct AdvancedObjective<'a, S: StrategyModule> {
    evaluator: FitnessEvaluator<'a, S>,
    strategy: S,
    data: &'a [Bar],
    backtest_weight: f64,
    model_weight: f64,
    classifier: ClassifierSettings,
}

impl<'a, S: StrategyModule> AdvancedObjective<'a, S> {
    pub fn new(strategy: S, data: &'a [Bar], settings: &HierarchicalSettings) -> Self {
        Self {
            evaluator: FitnessEvaluator::new(strategy.clone(), data),
            strategy,
            data,
            backtest_weight: settings.backtest_weight,
            model_weight: settings.model_weight,
            classifier: settings.classifier.clone(),
        }
    }

    /// Validation F1 of a classifier trained on labels from `params`;
    /// 0 when training or validation fails.
    fn model_score(&self, params: &ParameterSet) -> f64 {
        let mut strategy = self.strategy.clone();
        if strategy.apply_params(params).is_err() {
            return 0.0;
        }
        let mut pipeline = ClassifierPipeline::new(self.classifier.clone());
        if !pipeline.train(self.data, &strategy).success {
            return 0.0;
        }
        let validation = pipeline.validate(self.data, &strategy);
        if validation.success { validation.f1_score } else { 0.0 }
    }
}

impl<S: StrategyModule> Objective for AdvancedObjective<'_, S> {
    fn score(&self, params: &ParameterSet) -> f64 {
        let strategy_score = self.evaluator.evaluate(params);
        if !strategy_score.is_finite() {
            return f64::NEG_INFINITY;
        }
        let model_score = if self.model_weight == 0.0 {
            0.0
        } else {
            self.model_score(params)
        };
        debug!(
            "Advanced: {} strategy={:.4} model={:.4}",
            params, strategy_score, model_score
        );
        self.backtest_weight * strategy_score + self.model_weight * model_score
    }
}

struct StageOutcome {
    best: ParameterSet,
    score: f64,
    evaluations: usize,
    method: SearchMethod,
}

pub struct HierarchicalOptimizer<S: StrategyModule> {
    strategy: S,
    settings: HierarchicalSettings,
}

impl<S: StrategyModule> HierarchicalOptimizer<S> {
    pub fn new(strategy: S, settings: HierarchicalSettings) -> Result<Self, OptimizationError> {
        settings.validate()?;
        Ok(Self { strategy, settings })
    }

    pub fn settings(&self) -> &HierarchicalSettings {
        &self.settings
    }

    pub fn run(&self, data: &[Bar], space: &ParameterSpace) -> Result<OptimizationResult, OptimizationError> {
        space.validate()?;
        if space.is_empty() {
            return Err(OptimizationError::InvalidParameterSpace {
                reason: "no parameters to optimize".to_string(),
            });
        }
        if data.is_empty() {
            return Err(OptimizationError::EmptyDataset {
                reason: "no bars to optimize on".to_string(),
            });
        }
        if !is_chronological(data) {
            return Err(OptimizationError::UnorderedDataset {
                reason: "walk-forward folds need strictly increasing dates".to_string(),
            });
        }

        let started = Instant::now();
        info!(
            "Hierarchical: Starting {} coarse search over {} parameters ({} bars, {} folds)",
            self.settings.coarse_method,
            space.len(),
            data.len(),
            self.settings.cv_folds
        );

        // Coarse stage
        let coarse_started = Instant::now();
        let cv = CrossValidatedFitness::new(
            self.strategy.clone(),
            data,
            self.settings.cv_folds,
            self.settings.min_train_fraction,
        )?;
        let coarse = self.search(
            self.settings.coarse_method,
            space,
            &cv,
            &self.settings.genetic,
            "coarse",
        )?;
        let coarse_report = StageReport {
            stage: "coarse".to_string(),
            method: coarse.method,
            evaluations: coarse.evaluations,
            elapsed_secs: coarse_started.elapsed().as_secs_f64(),
            best_score: coarse.score,
        };
        info!(
            "Hierarchical: Coarse winner {} with CV score {:.4}",
            coarse.best, coarse.score
        );

        // Refine stage
        let refine_started = Instant::now();
        let narrowed = space.narrowed_around(&coarse.best, self.settings.refine_ratio);
        let advanced = AdvancedObjective::new(self.strategy.clone(), data, &self.settings);
        let coarse_advanced = advanced.score(&coarse.best);

        let method = if narrowed.combination_count() <= self.settings.grid.max_combinations {
            SearchMethod::Grid
        } else {
            SearchMethod::Genetic
        };
        let refine = match self.search(method, &narrowed, &advanced, &self.settings.refine_genetic(), "refine") {
            Ok(outcome) => Some(outcome),
            Err(OptimizationError::NoValidCandidate { .. }) => None,
            Err(e) => return Err(e),
        };

        let evaluations = 1 + refine.as_ref().map_or(0, |r| r.evaluations);
        let (params, advanced_score) = match refine {
            Some(r) if !coarse_advanced.is_finite() || r.score > coarse_advanced => (r.best, r.score),
            _ if coarse_advanced.is_finite() => (coarse.best.clone(), coarse_advanced),
            _ => {
                return Err(OptimizationError::NoValidCandidate {
                    stage: "refine".to_string(),
                });
            }
        };

        let refine_report = StageReport {
            stage: "refine".to_string(),
            method,
            evaluations,
            elapsed_secs: refine_started.elapsed().as_secs_f64(),
            best_score: advanced_score,
        };

        let result = OptimizationResult::new(
            params,
            coarse.score,
            advanced_score,
            started.elapsed().as_secs_f64(),
            vec![coarse_report, refine_report],
        );
        info!(
            "Hierarchical: Final {} cv={:.4} advanced={:.4} best={:.4} in {:.2}s",
            result.params, result.cv_score, result.advanced_score, result.best_score, result.total_time
        );
        Ok(result)
    }

    fn search<O>(
        &self,
        method: SearchMethod,
        space: &ParameterSpace,
        objective: &O,
        genetic: &GeneticSettings,
        stage: &str,
    ) -> Result<StageOutcome, OptimizationError>
    where
        O: Objective + ?Sized,
    {
        let no_candidate = || OptimizationError::NoValidCandidate {
            stage: stage.to_string(),
        };
        let rename_stage = |e: OptimizationError| match e {
            OptimizationError::NoValidCandidate { .. } => no_candidate(),
            other => other,
        };

        let (best, score, evaluations) = match method {
            SearchMethod::Grid => {
                let outcome = GridSearchOptimizer::new(space.clone(), self.settings.grid.clone())?
                    .run_optimization(objective)
                    .map_err(rename_stage)?;
                (outcome.best, outcome.best_score, outcome.evaluations)
            }
            SearchMethod::Genetic => {
                let outcome = GeneticOptimizer::new(space.clone(), genetic.clone())?
                    .run(objective)
                    .map_err(rename_stage)?;
                (outcome.best, outcome.best_score, outcome.evaluations)
            }
        };

        if !score.is_finite() {
            warn!("Hierarchical: {} stage found no finite candidate", stage);
            return Err(no_candidate());
        }
        Ok(StageOutcome {
            best,
            score,
            evaluations,
            method,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::StrategyError;
    use crate::domain::market::DetectionEvent;
    use crate::domain::optimization::{EvaluationResult, ParameterValue, combine_scores};
    use chrono::{Duration, NaiveDate};

    /// Score peaks at x = 6 regardless of data.
    #[derive(Clone)]
    struct PeakStrategy {
        x: f64,
    }

    impl StrategyModule for PeakStrategy {
        fn params(&self) -> ParameterSet {
            ParameterSet::new().with("x", self.x)
        }

        fn apply_params(&mut self, params: &ParameterSet) -> Result<(), StrategyError> {
            if let Some(v) = params.get("x") {
                self.x = v.as_f64().ok_or_else(|| StrategyError::WrongType {
                    name: "x".to_string(),
                    expected: "number".to_string(),
                })?;
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
                    is_low_point: false,
                    confidence: 0.0,
                    max_rise: None,
                    days_to_target: None,
                    success: None,
                })
                .collect()
        }

        fn evaluate(&self, _events: &[DetectionEvent]) -> EvaluationResult {
            EvaluationResult {
                score: 1.0 - (self.x - 6.0).powi(2) / 100.0,
                ..EvaluationResult::empty()
            }
        }

        fn name(&self) -> &str {
            "Peak"
        }
    }

    fn data(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        (0..n)
            .map(|i| Bar::new(start + Duration::days(i as i64), 10.0, 10.0, 10.0, 10.0, 1.0))
            .collect()
    }

    fn settings() -> HierarchicalSettings {
        HierarchicalSettings {
            model_weight: 0.0,
            backtest_weight: 1.0,
            genetic: GeneticSettings {
                population_size: 10,
                generations: 15,
                mutation_rate: 0.3,
                seed: Some(9),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_finds_peak_and_combines_scores() {
        let bars = data(50);
        let space = ParameterSpace::new().with_range("x", 0.0, 20.0, 1.0);
        let optimizer = HierarchicalOptimizer::new(PeakStrategy { x: 0.0 }, settings()).unwrap();
        let result = optimizer.run(&bars, &space).unwrap();

        assert_eq!(result.params.get("x"), Some(&ParameterValue::Int(6)));
        // Coarse search may land next to the peak; refine recovers it
        assert!(result.cv_score > 0.9 && result.cv_score <= 1.0);
        assert!((result.advanced_score - 1.0).abs() < 1e-12);
        assert_eq!(result.best_score, combine_scores(result.cv_score, result.advanced_score));
        assert_eq!(result.stages.len(), 2);
        assert_eq!(result.stages[1].method, SearchMethod::Grid);
        assert!(result.total_time >= 0.0);
    }

    #[test]
    fn test_grid_coarse_stage() {
        let bars = data(50);
        let space = ParameterSpace::new().with_range("x", 0.0, 10.0, 0.5);
        let optimizer = HierarchicalOptimizer::new(
            PeakStrategy { x: 0.0 },
            HierarchicalSettings {
                coarse_method: SearchMethod::Grid,
                ..settings()
            },
        )
        .unwrap();
        let result = optimizer.run(&bars, &space).unwrap();
        assert_eq!(result.params.get("x"), Some(&ParameterValue::Float(6.0)));
        assert_eq!(result.stages[0].evaluations, 21);
    }

    #[test]
    fn test_empty_space_is_input_error() {
        let optimizer = HierarchicalOptimizer::new(PeakStrategy { x: 0.0 }, settings()).unwrap();
        assert!(matches!(
            optimizer.run(&data(50), &ParameterSpace::new()),
            Err(OptimizationError::InvalidParameterSpace { .. })
        ));
    }

    #[test]
    fn test_categorical_only_space_fails_cleanly() {
        // Every candidate is rejected by the strategy
        let optimizer = HierarchicalOptimizer::new(PeakStrategy { x: 0.0 }, settings()).unwrap();
        let space = ParameterSpace::new().with_categorical("x", ["a", "b"]);
        assert!(matches!(
            optimizer.run(&data(50), &space),
            Err(OptimizationError::NoValidCandidate { .. })
        ));
    }

    #[test]
    fn test_genetic_coarse_failure_names_the_stage() {
        let optimizer = HierarchicalOptimizer::new(PeakStrategy { x: 0.0 }, settings()).unwrap();
        let space = ParameterSpace::new().with_categorical("x", ["a", "b"]);
        match optimizer.run(&data(50), &space) {
            Err(OptimizationError::NoValidCandidate { stage }) => assert_eq!(stage, "coarse"),
            other => panic!("expected coarse NoValidCandidate, got {:?}", other.map(|r| r.best_score)),
        }
    }

    #[test]
    fn test_unordered_bars_rejected() {
        let mut bars = data(50);
        bars.swap(10, 11);
        let optimizer = HierarchicalOptimizer::new(PeakStrategy { x: 0.0 }, settings()).unwrap();
        let space = ParameterSpace::new().with_range("x", 0.0, 20.0, 1.0);
        assert!(matches!(
            optimizer.run(&bars, &space),
            Err(OptimizationError::UnorderedDataset { .. })
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let bad = HierarchicalSettings {
            refine_ratio: 0.0,
            ..settings()
        };
        assert!(HierarchicalOptimizer::new(PeakStrategy { x: 0.0 }, bad).is_err());
    }

    #[test]
    fn test_failed_classifier_contributes_zero() {
        let bars = data(50);
        let objective = AdvancedObjective::new(
            PeakStrategy { x: 0.0 },
            &bars,
            &HierarchicalSettings {
                backtest_weight: 0.7,
                model_weight: 0.3,
                ..settings()
            },
        );
        // No resolved labels, so training fails and only the backtest term counts
        let score = objective.score(&ParameterSet::new().with("x", 6));
        assert!((score - 0.7).abs() < 1e-12);
    }
}
