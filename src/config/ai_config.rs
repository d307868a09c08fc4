//! `[ai]` section: classifier and hierarchical optimization settings.

use crate::application::ml::ClassifierSettings;
use crate::domain::optimization::SearchMethod;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub classifier: ClassifierSettings,
    pub advanced_optimization: AdvancedOptimizationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedOptimizationConfig {
    /// Run coarse-to-fine search instead of a single genetic run
    pub use_hierarchical: bool,
    pub coarse_method: SearchMethod,
    pub cv_folds: usize,
    pub min_train_fraction: f64,
    pub refine_ratio: f64,
    pub backtest_weight: f64,
    pub model_weight: f64,
}

impl Default for AdvancedOptimizationConfig {
    fn default() -> Self {
        Self {
            use_hierarchical: true,
            coarse_method: SearchMethod::Genetic,
            cv_folds: 3,
            min_train_fraction: 0.4,
            refine_ratio: 0.25,
            backtest_weight: 0.7,
            model_weight: 0.3,
        }
    }
}
