// Parameter search: fitness, grid, genetic and two-stage search
pub mod comparison;
pub mod cross_validation;
pub mod fitness;
pub mod genetic;
pub mod hierarchical;
pub mod optimizer;
pub mod worker_pool;

pub use comparison::{MethodComparison, MethodScore, compare_methods, improvement_pct};
pub use fitness::{CrossValidatedFitness, FitnessEvaluator, Objective};
pub use genetic::{GeneticOptimizer, GeneticOutcome, GeneticSettings, Individual};
pub use hierarchical::{AdvancedObjective, HierarchicalOptimizer, HierarchicalSettings};
pub use optimizer::{GridSearchOptimizer, GridSearchOutcome, GridSearchSettings, RankedCandidate};
