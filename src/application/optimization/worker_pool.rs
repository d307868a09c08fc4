use super::fitness::{Objective, normalize_score};
use crate::domain::errors::OptimizationError;
use crate::domain::optimization::ParameterSet;
use rayon::prelude::*;

/// Evaluates candidate batches either inline or on a fixed-size rayon pool.
///
/// Scores come back in candidate order whatever the thread count, so
/// callers can select sequentially and stay deterministic.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    /// `workers <= 1` evaluates on the calling thread.
    pub fn new(workers: usize) -> Result<Self, OptimizationError> {
        if workers <= 1 {
            return Ok(Self { pool: None });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| OptimizationError::WorkerPool {
                reason: e.to_string(),
            })?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, |p| p.current_num_threads())
    }

    /// One normalized score per candidate.
    pub fn evaluate<O>(&self, objective: &O, candidates: &[ParameterSet]) -> Vec<f64>
    where
        O: Objective + ?Sized,
    {
        match &self.pool {
            Some(pool) => pool.install(|| {
                candidates
                    .par_iter()
                    .map(|c| normalize_score(objective.score(c)))
                    .collect()
            }),
            None => candidates
                .iter()
                .map(|c| normalize_score(objective.score(c)))
                .collect(),
        }
    }
}
