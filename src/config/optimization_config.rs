//! `[optimization]` section: search ranges and genetic algorithm settings.

use crate::application::optimization::{GeneticSettings, GridSearchSettings};
use crate::domain::optimization::ParameterDomain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Declared ranges keyed by parameter name; fixed keys are ignored
    pub param_ranges: BTreeMap<String, ParameterDomain>,
    pub genetic_algorithm: GeneticAlgorithmConfig,
    pub max_combinations: usize,
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticAlgorithmConfig {
    pub population_size: usize,
    pub generations: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub elite_ratio: f64,
    pub tournament_size: usize,
    pub seed: Option<u64>,
    /// Wall-clock limit in seconds, checked between generations
    pub time_budget_secs: Option<u64>,
}

fn range(min: f64, max: f64, step: f64) -> ParameterDomain {
    ParameterDomain::Range { min, max, step }
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        let param_ranges = [
            ("rsi_oversold_threshold", range(25.0, 35.0, 1.0)),
            ("rsi_low_threshold", range(35.0, 45.0, 1.0)),
            ("final_threshold", range(0.3, 0.7, 0.05)),
            ("dynamic_confidence_adjustment", range(0.05, 0.25, 0.05)),
            ("market_sentiment_weight", range(0.1, 0.25, 0.05)),
            ("trend_strength_weight", range(0.08, 0.16, 0.02)),
        ]
        .into_iter()
        .map(|(name, domain)| (name.to_string(), domain))
        .collect();

        Self {
            param_ranges,
            genetic_algorithm: GeneticAlgorithmConfig::default(),
            max_combinations: GridSearchSettings::default().max_combinations,
            workers: 1,
        }
    }
}

impl Default for GeneticAlgorithmConfig {
    fn default() -> Self {
        let defaults = GeneticSettings::default();
        Self {
            population_size: defaults.population_size,
            generations: defaults.generations,
            crossover_rate: defaults.crossover_rate,
            mutation_rate: defaults.mutation_rate,
            elite_ratio: defaults.elite_ratio,
            tournament_size: defaults.tournament_size,
            seed: None,
            time_budget_secs: None,
        }
    }
}

impl OptimizationConfig {
    pub fn genetic_settings(&self) -> GeneticSettings {
        let ga = &self.genetic_algorithm;
        GeneticSettings {
            population_size: ga.population_size,
            generations: ga.generations,
            crossover_rate: ga.crossover_rate,
            mutation_rate: ga.mutation_rate,
            elite_ratio: ga.elite_ratio,
            tournament_size: ga.tournament_size,
            seed: ga.seed,
            workers: self.workers,
            time_budget: ga.time_budget_secs.map(std::time::Duration::from_secs),
        }
    }

    pub fn grid_settings(&self) -> GridSearchSettings {
        GridSearchSettings {
            max_combinations: self.max_combinations,
            workers: self.workers,
            ..GridSearchSettings::default()
        }
    }
}
