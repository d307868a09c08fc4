use super::parameter_set::ParameterSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Weight of the cross-validated score in `best_score`
pub const CV_SCORE_WEIGHT: f64 = 0.5;
/// Weight of the refine-stage score in `best_score`
pub const ADVANCED_SCORE_WEIGHT: f64 = 0.5;

/// Summary of a strategy backtest, reduced to one comparable score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub total_points: usize,
    /// Fraction of flagged points whose rise met the threshold (0..1)
    pub success_rate: f64,
    pub avg_rise: f64,
    pub score: f64,
}

impl EvaluationResult {
    /// Result for a backtest that flagged no points.
    pub fn empty() -> Self {
        Self {
            total_points: 0,
            success_rate: 0.0,
            avg_rise: 0.0,
            score: 0.0,
        }
    }
}

/// Search strategy used by an optimization stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Grid,
    #[default]
    Genetic,
}

impl FromStr for SearchMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grid" => Ok(SearchMethod::Grid),
            "genetic" | "ga" => Ok(SearchMethod::Genetic),
            _ => anyhow::bail!("Invalid search method: {}. Valid: grid, genetic", s),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::Grid => write!(f, "Grid"),
            SearchMethod::Genetic => write!(f, "Genetic"),
        }
    }
}

/// Provenance of one hierarchical stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub method: SearchMethod,
    pub evaluations: usize,
    pub elapsed_secs: f64,
    pub best_score: f64,
}

/// Terminal output of hierarchical optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub params: ParameterSet,
    pub cv_score: f64,
    pub advanced_score: f64,
    pub best_score: f64,
    /// Wall-clock seconds for both stages
    pub total_time: f64,
    pub stages: Vec<StageReport>,
}

impl OptimizationResult {
    pub fn new(
        params: ParameterSet,
        cv_score: f64,
        advanced_score: f64,
        total_time: f64,
        stages: Vec<StageReport>,
    ) -> Self {
        Self {
            params,
            cv_score,
            advanced_score,
            best_score: combine_scores(cv_score, advanced_score),
            total_time,
            stages,
        }
    }
}

/// Final score of a hierarchical run. Depends only on the two stage scores.
pub fn combine_scores(cv_score: f64, advanced_score: f64) -> f64 {
    CV_SCORE_WEIGHT * cv_score + ADVANCED_SCORE_WEIGHT * advanced_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_scores_is_fixed_weighted_sum() {
        assert!((combine_scores(0.8, 0.4) - 0.6).abs() < 1e-12);
        assert!((combine_scores(0.0, 1.0) - ADVANCED_SCORE_WEIGHT).abs() < 1e-12);
        assert!((CV_SCORE_WEIGHT + ADVANCED_SCORE_WEIGHT - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_result_derives_best_score() {
        let result = OptimizationResult::new(ParameterSet::new(), 0.3, 0.5, 1.2, Vec::new());
        assert!((result.best_score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_best_score_uses_combined_formula_in_either_order() {
        let cv_heavy = OptimizationResult::new(ParameterSet::new(), 0.9, 0.1, 0.0, Vec::new());
        let adv_heavy = OptimizationResult::new(ParameterSet::new(), 0.1, 0.9, 0.0, Vec::new());
        assert_eq!(cv_heavy.best_score, combine_scores(0.9, 0.1));
        assert_eq!(adv_heavy.best_score, combine_scores(0.1, 0.9));
        // Neither the larger nor the later score is taken as best
        assert!(cv_heavy.best_score < 0.9);
        assert!(adv_heavy.best_score < 0.9);
        assert!((cv_heavy.best_score - adv_heavy.best_score).abs() < 1e-12);
    }

    #[test]
    fn test_search_method_parsing() {
        assert_eq!(SearchMethod::from_str("GRID").unwrap(), SearchMethod::Grid);
        assert_eq!(SearchMethod::from_str("ga").unwrap(), SearchMethod::Genetic);
        assert!(SearchMethod::from_str("annealing").is_err());
    }
}
