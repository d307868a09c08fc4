// Optimization domain
pub mod parameter_routes;
pub mod parameter_set;
pub mod parameter_space;
pub mod results;

pub use parameter_set::{ParameterSet, ParameterValue};
pub use parameter_space::{ParameterDomain, ParameterSpace, ParameterSpec};
pub use results::{
    ADVANCED_SCORE_WEIGHT, CV_SCORE_WEIGHT, EvaluationResult, OptimizationResult, SearchMethod,
    StageReport, combine_scores,
};
