//! Configuration module for the low-point tuner.
//!
//! Configuration is a single TOML document organized by concern: data,
//! strategy, optimization and ai. Every section falls back to defaults, so
//! an empty file (or no file at all) is a valid configuration.

mod ai_config;
mod data_config;
mod optimization_config;
mod strategy_config;

pub use ai_config::{AdvancedOptimizationConfig, AiConfig};
pub use data_config::DataConfig;
pub use optimization_config::{GeneticAlgorithmConfig, OptimizationConfig};
pub use strategy_config::{ConfidenceWeights, StrategyConfig};

use crate::application::optimization::HierarchicalSettings;
use crate::domain::errors::OptimizationError;
use crate::domain::optimization::parameter_routes::{PARAMETER_ROUTES, fixed_names, is_tunable};
use crate::domain::optimization::{ParameterSpace, ParameterSpec};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "LOWPOINT_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub strategy: StrategyConfig,
    pub optimization: OptimizationConfig,
    pub ai: AiConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Loads `path` when given, otherwise the file named by
    /// `LOWPOINT_CONFIG`, otherwise defaults.
    pub fn from_env(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let resolved = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        match resolved {
            Some(p) => {
                info!("Config: Loading {:?}", p);
                Ok((Self::load(&p)?, Some(p)))
            }
            None => {
                info!("Config: No config file given, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Search space built from `[optimization.param_ranges]`.
    ///
    /// Ranges follow the routing table order. Fixed parameters and names the
    /// routing table does not know are left out.
    pub fn parameter_space(&self) -> Result<ParameterSpace, OptimizationError> {
        let ranges = &self.optimization.param_ranges;
        for name in ranges.keys().filter(|n| !is_tunable(n)) {
            if fixed_names().any(|f| f == name.as_str()) {
                debug!("Config: Ignoring range for fixed parameter {}", name);
            } else {
                warn!("Config: Ignoring range for unknown parameter {}", name);
            }
        }

        let mut space = ParameterSpace::new();
        for route in PARAMETER_ROUTES.iter().filter(|r| is_tunable(r.name)) {
            if let Some(domain) = ranges.get(route.name) {
                space.push(ParameterSpec {
                    name: route.name.to_string(),
                    domain: domain.clone(),
                });
            }
        }
        space.validate()?;
        Ok(space)
    }

    pub fn hierarchical_settings(&self) -> HierarchicalSettings {
        let adv = &self.ai.advanced_optimization;
        HierarchicalSettings {
            coarse_method: adv.coarse_method,
            cv_folds: adv.cv_folds,
            min_train_fraction: adv.min_train_fraction,
            refine_ratio: adv.refine_ratio,
            backtest_weight: adv.backtest_weight,
            model_weight: adv.model_weight,
            genetic: self.optimization.genetic_settings(),
            grid: self.optimization.grid_settings(),
            classifier: self.ai.classifier.clone(),
        }
    }
}
