use super::fitness::Objective;
use super::worker_pool::WorkerPool;
use crate::domain::errors::OptimizationError;
use crate::domain::optimization::{ParameterSet, ParameterSpace, ParameterValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Grid search limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchSettings {
    /// Grids larger than this are rejected before any evaluation
    pub max_combinations: usize,
    pub workers: usize,
    /// How many ranked candidates the outcome keeps
    pub top_n: usize,
}

impl Default for GridSearchSettings {
    fn default() -> Self {
        Self {
            max_combinations: 10_000,
            workers: 1,
            top_n: 10,
        }
    }
}

/// Single scored combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub params: ParameterSet,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchOutcome {
    pub best: ParameterSet,
    pub best_score: f64,
    pub evaluations: usize,
    /// Best finite candidates, descending; ties in enumeration order
    pub ranked: Vec<RankedCandidate>,
}

/// Exhaustive stepped search over a parameter space
pub struct GridSearchOptimizer {
    space: ParameterSpace,
    settings: GridSearchSettings,
}

impl GridSearchOptimizer {
    pub fn new(space: ParameterSpace, settings: GridSearchSettings) -> Result<Self, OptimizationError> {
        space.validate()?;
        Ok(Self { space, settings })
    }

    /// Generate all parameter combinations from the grid.
    ///
    /// Parameters vary in declaration order with the last one varying
    /// fastest.
    pub fn generate_combinations(&self) -> Result<Vec<ParameterSet>, OptimizationError> {
        if self.space.is_empty() {
            return Ok(Vec::new());
        }

        let count = self.space.combination_count();
        if count > self.settings.max_combinations {
            return Err(OptimizationError::TooManyCombinations {
                count,
                limit: self.settings.max_combinations,
            });
        }

        let axes: Vec<(&str, Vec<ParameterValue>)> = self
            .space
            .specs()
            .iter()
            .map(|s| (s.name.as_str(), s.grid_values()))
            .collect();

        let mut combinations = Vec::with_capacity(count);
        let mut digits = vec![0usize; axes.len()];
        for _ in 0..count {
            combinations.push(
                axes.iter()
                    .zip(&digits)
                    .map(|((name, values), &d)| (name.to_string(), values[d].clone()))
                    .collect(),
            );
            // Odometer increment, last axis first
            for axis in (0..axes.len()).rev() {
                digits[axis] += 1;
                if digits[axis] < axes[axis].1.len() {
                    break;
                }
                digits[axis] = 0;
            }
        }
        Ok(combinations)
    }

    /// Run grid search optimization
    pub fn run_optimization<O>(&self, objective: &O) -> Result<GridSearchOutcome, OptimizationError>
    where
        O: Objective + ?Sized,
    {
        let combinations = self.generate_combinations()?;
        if combinations.is_empty() {
            info!("GridSearch: Empty parameter space, nothing to evaluate");
            return Ok(GridSearchOutcome {
                best: ParameterSet::new(),
                best_score: f64::NEG_INFINITY,
                evaluations: 0,
                ranked: Vec::new(),
            });
        }

        let pool = WorkerPool::new(self.settings.workers)?;
        info!(
            "GridSearch: Starting optimization with {} parameter combinations ({} workers)",
            combinations.len(),
            pool.workers()
        );

        let scores = pool.evaluate(objective, &combinations);

        let mut best: Option<usize> = None;
        for (i, &score) in scores.iter().enumerate() {
            debug!(
                "GridSearch: Combination {}/{} {} -> {:.4}",
                i + 1,
                combinations.len(),
                combinations[i],
                score
            );
            if score.is_finite() && best.is_none_or(|b| score > scores[b]) {
                best = Some(i);
            }
        }

        let Some(best) = best else {
            return Err(OptimizationError::NoValidCandidate {
                stage: "grid".to_string(),
            });
        };

        let evaluations = scores.len();
        let best_score = scores[best];
        let best_params = combinations[best].clone();
        info!("GridSearch: Best {} with score {:.4}", best_params, best_score);

        let ranked = self.rank_results(
            combinations
                .into_iter()
                .zip(scores)
                .map(|(params, score)| RankedCandidate { params, score })
                .collect(),
        );

        Ok(GridSearchOutcome {
            best: best_params,
            best_score,
            evaluations,
            ranked,
        })
    }

    /// Rank and return the top N finite results
    pub fn rank_results(&self, results: Vec<RankedCandidate>) -> Vec<RankedCandidate> {
        let mut finite: Vec<RankedCandidate> =
            results.into_iter().filter(|r| r.score.is_finite()).collect();
        // Stable sort keeps enumeration order among equal scores
        finite.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        finite.truncate(self.settings.top_n);
        finite
    }
}
