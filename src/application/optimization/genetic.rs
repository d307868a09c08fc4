//! Population-based search over a [`ParameterSpace`].
//!
//! Every generation is evaluated as one batch (optionally on a rayon pool);
//! selection, crossover and mutation run sequentially on a single seeded
//! RNG, so a fixed seed reproduces the run whatever the worker count.

use super::fitness::Objective;
use super::worker_pool::WorkerPool;
use crate::domain::errors::OptimizationError;
use crate::domain::optimization::{
    ParameterDomain, ParameterSet, ParameterSpace, ParameterSpec, ParameterValue,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Share of a numeric span a single mutation may move
const MUTATION_SPAN: f64 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticSettings {
    pub population_size: usize,
    /// Breeding rounds after the initial population; 0 only evaluates it
    pub generations: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub elite_ratio: f64,
    pub tournament_size: usize,
    pub seed: Option<u64>,
    pub workers: usize,
    /// Checked between generations only
    pub time_budget: Option<Duration>,
}

impl Default for GeneticSettings {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 10,
            crossover_rate: 0.8,
            mutation_rate: 0.1,
            elite_ratio: 0.1,
            tournament_size: 3,
            seed: None,
            workers: 1,
            time_budget: None,
        }
    }
}

impl GeneticSettings {
    pub fn validate(&self) -> Result<(), OptimizationError> {
        let invalid = |reason: &str| {
            Err(OptimizationError::InvalidSettings {
                reason: reason.to_string(),
            })
        };
        if self.population_size < 2 {
            return invalid("population_size must be >= 2");
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return invalid("crossover_rate must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return invalid("mutation_rate must be in [0, 1]");
        }
        if !(0.0..1.0).contains(&self.elite_ratio) {
            return invalid("elite_ratio must be in [0, 1)");
        }
        if self.tournament_size == 0 {
            return invalid("tournament_size must be >= 1");
        }
        Ok(())
    }

    /// max(1, round(pop * elite_ratio)), never the whole population.
    pub fn elite_count(&self) -> usize {
        let raw = (self.population_size as f64 * self.elite_ratio).round() as usize;
        raw.max(1).min(self.population_size.saturating_sub(1))
    }
}

/// Candidate with its cached fitness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub params: ParameterSet,
    pub fitness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticOutcome {
    pub best: ParameterSet,
    pub best_score: f64,
    /// Best finite score of each evaluated generation, starting with the
    /// initial population
    pub generation_best: Vec<f64>,
    pub evaluations: usize,
    pub generations_run: usize,
    pub seed: u64,
}

pub struct GeneticOptimizer {
    space: ParameterSpace,
    settings: GeneticSettings,
}

impl GeneticOptimizer {
    pub fn new(space: ParameterSpace, settings: GeneticSettings) -> Result<Self, OptimizationError> {
        space.validate()?;
        settings.validate()?;
        Ok(Self { space, settings })
    }

    pub fn settings(&self) -> &GeneticSettings {
        &self.settings
    }

    pub fn run<O>(&self, objective: &O) -> Result<GeneticOutcome, OptimizationError>
    where
        O: Objective + ?Sized,
    {
        let seed = match self.settings.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::rng().random::<u64>();
                info!("Genetic: No seed configured, drew {}", seed);
                seed
            }
        };

        if self.space.is_empty() {
            info!("Genetic: Empty parameter space, nothing to evaluate");
            return Ok(GeneticOutcome {
                best: ParameterSet::new(),
                best_score: f64::NEG_INFINITY,
                generation_best: Vec::new(),
                evaluations: 0,
                generations_run: 0,
                seed,
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let pool = WorkerPool::new(self.settings.workers)?;
        let started = Instant::now();

        info!(
            "Genetic: Starting search (population={}, generations={}, workers={}, seed={})",
            self.settings.population_size,
            self.settings.generations,
            pool.workers(),
            seed
        );

        let initial = self.random_population(&mut rng);
        let mut population = self.evaluate(&pool, objective, initial);
        let mut evaluations = population.len();

        let mut best = population[0].clone();
        track_best(&mut best, &population);
        let mut generation_best = vec![generation_max(&population)];
        let mut generations_run = 0;

        for generation in 1..=self.settings.generations {
            if self.settings.time_budget.is_some_and(|b| started.elapsed() >= b) {
                info!(
                    "Genetic: Time budget reached after {} generations",
                    generations_run
                );
                break;
            }

            let (elites, children) = self.breed(&population, &mut rng);
            evaluations += children.len();

            let mut next = elites;
            next.extend(self.evaluate(&pool, objective, children));
            population = next;

            track_best(&mut best, &population);
            generation_best.push(generation_max(&population));
            generations_run = generation;

            debug!(
                "Genetic: Generation {}/{} best {:.4}, overall {:.4}",
                generation,
                self.settings.generations,
                generation_best[generation],
                best.fitness
            );
        }

        info!(
            "Genetic: Finished {} generations, {} evaluations, best {} with score {:.4}",
            generations_run, evaluations, best.params, best.fitness
        );

        if !best.fitness.is_finite() {
            warn!(
                "Genetic: No candidate scored finitely in {} evaluations",
                evaluations
            );
            return Err(OptimizationError::NoValidCandidate {
                stage: "genetic".to_string(),
            });
        }

        Ok(GeneticOutcome {
            best: best.params,
            best_score: best.fitness,
            generation_best,
            evaluations,
            generations_run,
            seed,
        })
    }

    fn random_population(&self, rng: &mut StdRng) -> Vec<ParameterSet> {
        (0..self.settings.population_size)
            .map(|_| self.space.sample(rng))
            .collect()
    }

    fn evaluate<O>(&self, pool: &WorkerPool, objective: &O, candidates: Vec<ParameterSet>) -> Vec<Individual>
    where
        O: Objective + ?Sized,
    {
        let scores = pool.evaluate(objective, &candidates);
        candidates
            .into_iter()
            .zip(scores)
            .map(|(params, fitness)| Individual { params, fitness })
            .collect()
    }

    /// Returns the carried-over elites (already scored) and the unscored
    /// offspring that fill the rest of the next generation.
    fn breed(&self, population: &[Individual], rng: &mut StdRng) -> (Vec<Individual>, Vec<ParameterSet>) {
        let mut ranked: Vec<&Individual> = population.iter().filter(|i| i.fitness.is_finite()).collect();
        if ranked.is_empty() {
            warn!("Genetic: No finite individual in generation, re-sampling population");
            return (Vec::new(), self.random_population(rng));
        }
        ranked.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let elites: Vec<Individual> = ranked
            .iter()
            .take(self.settings.elite_count())
            .map(|i| (*i).clone())
            .collect();

        let children = (elites.len()..self.settings.population_size)
            .map(|_| {
                let first = self.tournament(&ranked, rng);
                let second = self.tournament(&ranked, rng);
                let child = if rng.random_bool(self.settings.crossover_rate) {
                    self.crossover(&first.params, &second.params, rng)
                } else {
                    first.params.clone()
                };
                self.mutate(&child, rng)
            })
            .collect();

        (elites, children)
    }

    fn tournament<'p>(&self, pool: &[&'p Individual], rng: &mut StdRng) -> &'p Individual {
        let mut winner = pool[rng.random_range(0..pool.len())];
        for _ in 1..self.settings.tournament_size {
            let challenger = pool[rng.random_range(0..pool.len())];
            if challenger.fitness > winner.fitness {
                winner = challenger;
            }
        }
        winner
    }

    fn crossover(&self, a: &ParameterSet, b: &ParameterSet, rng: &mut StdRng) -> ParameterSet {
        self.space
            .specs()
            .iter()
            .map(|spec| {
                let value = match (&spec.domain, a.get(&spec.name), b.get(&spec.name)) {
                    (ParameterDomain::Range { .. }, Some(va), Some(vb)) => {
                        match (va.as_f64(), vb.as_f64()) {
                            (Some(x), Some(y)) => {
                                let alpha: f64 = rng.random();
                                spec.quantize(alpha * x + (1.0 - alpha) * y)
                            }
                            _ => None,
                        }
                    }
                    (ParameterDomain::Categorical { .. }, Some(va), Some(vb)) => {
                        Some(if rng.random_bool(0.5) { va.clone() } else { vb.clone() })
                    }
                    _ => None,
                };
                let value = value.unwrap_or_else(|| spec.sample(rng));
                (spec.name.clone(), value)
            })
            .collect()
    }

    fn mutate(&self, params: &ParameterSet, rng: &mut StdRng) -> ParameterSet {
        self.space
            .specs()
            .iter()
            .map(|spec| {
                let current = params.get(&spec.name);
                let value = if rng.random_bool(self.settings.mutation_rate) {
                    mutate_gene(spec, current, rng)
                } else {
                    match current {
                        Some(v) => v.clone(),
                        None => spec.sample(rng),
                    }
                };
                (spec.name.clone(), value)
            })
            .collect()
    }
}

fn mutate_gene(spec: &ParameterSpec, current: Option<&ParameterValue>, rng: &mut StdRng) -> ParameterValue {
    match (&spec.domain, current.and_then(ParameterValue::as_f64)) {
        (ParameterDomain::Range { min, max, step }, Some(x)) => {
            let amplitude = ((max - min) * MUTATION_SPAN).max(*step);
            let jitter = rng.random_range(-amplitude..=amplitude);
            spec.quantize(x + jitter).unwrap_or_else(|| spec.sample(rng))
        }
        _ => spec.sample(rng),
    }
}

/// Replaces `best` only on a strictly better finite score.
fn track_best(best: &mut Individual, population: &[Individual]) {
    for individual in population {
        if individual.fitness.is_finite()
            && (!best.fitness.is_finite() || individual.fitness > best.fitness)
        {
            *best = individual.clone();
        }
    }
}

fn generation_max(population: &[Individual]) -> f64 {
    population
        .iter()
        .map(|i| i.fitness)
        .filter(|f| f.is_finite())
        .fold(f64::NEG_INFINITY, f64::max)
}
