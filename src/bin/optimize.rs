//! Low-point parameter tuner
//!
//! Loads bars, searches the confidence parameters, trains the low-point
//! classifier and writes the winning parameters back into the config file.
//! `compare` ranks the search methods against the configured parameters
//! without touching the file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lowpoint::application::ml::ClassifierPipeline;
use lowpoint::application::optimization::{
    CrossValidatedFitness, FitnessEvaluator, GeneticOptimizer, GeneticOutcome,
    GridSearchOptimizer, GridSearchOutcome, HierarchicalOptimizer, MethodComparison,
    compare_methods, improvement_pct,
};
use lowpoint::application::strategies::ConfidenceLowPointStrategy;
use lowpoint::config::{AppConfig, DataConfig};
use lowpoint::domain::market::Bar;
use lowpoint::domain::ml::{FeatureImportance, PredictionResult, TrainingResult, ValidationResult};
use lowpoint::domain::optimization::{EvaluationResult, OptimizationResult, ParameterSet};
use lowpoint::domain::ports::{DataModule, StrategyModule};
use lowpoint::infrastructure::{
    ConfigDocumentEditor, CsvDataModule, PersistReport, SyntheticDataModule,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about = "Relative low-point parameter tuner", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to $LOWPOINT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print result records as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Keep the config file untouched after optimizing
    #[arg(long, global = true)]
    no_persist: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize, train, validate, predict and persist
    Run,
    /// Exhaustive search over the configured ranges
    Grid {
        /// Number of ranked candidates to show
        #[arg(short, long, default_value_t = 10)]
        top_n: usize,
    },
    /// Genetic search over the configured ranges
    Genetic {
        /// Overrides optimization.genetic_algorithm.seed
        #[arg(long)]
        seed: Option<u64>,

        /// Score candidates with walk-forward cross-validation
        #[arg(long)]
        cross_validate: bool,
    },
    /// Train and validate the classifier with the configured parameters
    Train,
    /// Rank grid, genetic and hierarchical search against the configured parameters
    Compare,
}

/// Everything a command produced, emitted at the end.
#[derive(Debug, Default, Serialize)]
struct Report {
    /// Full-data backtest of the configured parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    baseline: Option<EvaluationResult>,
    /// Full-data backtest of the optimized parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    optimized: Option<EvaluationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comparison: Option<MethodComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optimization: Option<OptimizationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grid: Option<GridSearchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    genetic: Option<GeneticOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    training: Option<TrainingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<PredictionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feature_importance: Option<FeatureImportance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    persisted: Option<PersistReport>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let (config, config_path) = AppConfig::from_env(cli.config.as_deref())?;
    let data = load_bars(&config.data)?;
    let strategy = ConfidenceLowPointStrategy::new(config.strategy.to_params());

    let report = match cli.command {
        Commands::Run => {
            let persist_to = if cli.no_persist { None } else { config_path.as_deref() };
            run_full(&config, &data, strategy, persist_to)?
        }
        Commands::Grid { top_n } => run_grid(&config, &data, strategy, top_n)?,
        Commands::Genetic {
            seed,
            cross_validate,
        } => run_genetic(&config, &data, strategy, seed, cross_validate)?,
        Commands::Train => {
            let mut report = Report::default();
            train_classifier(&config, &data, &strategy, &mut report);
            report
        }
        Commands::Compare => run_compare(&config, &data, strategy)?,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn load_bars(config: &DataConfig) -> Result<Vec<Bar>> {
    let module: Box<dyn DataModule> = match &config.csv_path {
        Some(path) => {
            info!("CsvData: Reading {:?}", path);
            Box::new(CsvDataModule::new(path))
        }
        None => {
            info!(
                "Synthetic: No csv_path configured, generating {} with seed {}",
                config.index_code, config.synthetic_seed
            );
            Box::new(SyntheticDataModule::new(config.synthetic_seed))
        }
    };

    let bars = module
        .history(config.start_date, config.end_date)
        .with_context(|| format!("Failed to load bars for {}", config.index_code))?;
    if bars.is_empty() {
        warn!(
            "No bars between {} and {}",
            config.start_date, config.end_date
        );
    } else {
        info!(
            "Loaded {} {} bars for {} ({} to {})",
            bars.len(),
            config.frequency,
            config.index_code,
            config.start_date,
            config.end_date
        );
    }
    Ok(bars)
}

fn run_full(
    config: &AppConfig,
    data: &[Bar],
    strategy: ConfidenceLowPointStrategy,
    persist_to: Option<&Path>,
) -> Result<Report> {
    let mut report = Report::default();
    let space = config.parameter_space()?;
    let backtest = FitnessEvaluator::new(strategy.clone(), data);
    report.baseline = Some(
        backtest
            .evaluate_detailed(&ParameterSet::new())
            .context("Configured parameters were rejected by the strategy")?,
    );

    let optimized: Option<ParameterSet> = if config.ai.advanced_optimization.use_hierarchical {
        let optimizer = HierarchicalOptimizer::new(strategy.clone(), config.hierarchical_settings())?;
        match optimizer.run(data, &space) {
            Ok(result) => {
                let params = result.params.clone();
                report.optimization = Some(result);
                Some(params)
            }
            Err(e) => {
                error!("Hierarchical optimization failed: {}", e);
                None
            }
        }
    } else {
        let optimizer = GeneticOptimizer::new(space, config.optimization.genetic_settings())?;
        let fitness = FitnessEvaluator::new(strategy.clone(), data);
        match optimizer.run(&fitness) {
            Ok(outcome) => {
                let params = outcome.best.clone();
                report.genetic = Some(outcome);
                Some(params)
            }
            Err(e) => {
                error!("Genetic optimization failed: {}", e);
                None
            }
        }
    };

    let mut tuned = strategy;
    if let Some(params) = &optimized {
        tuned
            .apply_params(params)
            .context("Optimized parameters were rejected by the strategy")?;
        report.optimized = Some(
            backtest
                .evaluate_detailed(params)
                .context("Optimized parameters were rejected by the strategy")?,
        );
    }

    train_classifier(config, data, &tuned, &mut report);

    match (optimized, persist_to) {
        (Some(params), Some(path)) => match ConfigDocumentEditor::persist(path, &params) {
            Ok(persisted) => report.persisted = Some(persisted),
            Err(e) => error!("Failed to persist parameters: {:#}", e),
        },
        (Some(_), None) => info!("No config file to update, parameters not persisted"),
        (None, _) => warn!("Optimization failed, config file left untouched"),
    }
    Ok(report)
}

fn run_grid(
    config: &AppConfig,
    data: &[Bar],
    strategy: ConfidenceLowPointStrategy,
    top_n: usize,
) -> Result<Report> {
    let mut settings = config.optimization.grid_settings();
    settings.top_n = top_n;
    let optimizer = GridSearchOptimizer::new(config.parameter_space()?, settings)?;
    let fitness = FitnessEvaluator::new(strategy, data);
    let outcome = optimizer.run_optimization(&fitness)?;
    Ok(Report {
        grid: Some(outcome),
        ..Report::default()
    })
}

fn run_genetic(
    config: &AppConfig,
    data: &[Bar],
    strategy: ConfidenceLowPointStrategy,
    seed: Option<u64>,
    cross_validate: bool,
) -> Result<Report> {
    let mut settings = config.optimization.genetic_settings();
    if seed.is_some() {
        settings.seed = seed;
    }
    let optimizer = GeneticOptimizer::new(config.parameter_space()?, settings)?;

    let outcome = if cross_validate {
        let adv = &config.ai.advanced_optimization;
        let fitness =
            CrossValidatedFitness::new(strategy, data, adv.cv_folds, adv.min_train_fraction)?;
        optimizer.run(&fitness)?
    } else {
        optimizer.run(&FitnessEvaluator::new(strategy, data))?
    };
    Ok(Report {
        genetic: Some(outcome),
        ..Report::default()
    })
}

/// Runs every search method that fits and backtests each winner on the full
/// data. A method that fails is logged and left out of the ranking.
fn run_compare(config: &AppConfig, data: &[Bar], strategy: ConfidenceLowPointStrategy) -> Result<Report> {
    let space = config.parameter_space()?;
    let fitness = FitnessEvaluator::new(strategy.clone(), data);
    let mut candidates: Vec<(String, ParameterSet)> = Vec::new();

    let grid_settings = config.optimization.grid_settings();
    if space.combination_count() <= grid_settings.max_combinations {
        match GridSearchOptimizer::new(space.clone(), grid_settings)?.run_optimization(&fitness) {
            Ok(outcome) => candidates.push(("grid".to_string(), outcome.best)),
            Err(e) => error!("Grid search failed: {}", e),
        }
    } else {
        info!(
            "Skipping grid search: {} combinations exceed the limit of {}",
            space.combination_count(),
            grid_settings.max_combinations
        );
    }

    match GeneticOptimizer::new(space.clone(), config.optimization.genetic_settings())?.run(&fitness) {
        Ok(outcome) => candidates.push(("genetic".to_string(), outcome.best)),
        Err(e) => error!("Genetic optimization failed: {}", e),
    }

    let hierarchical = HierarchicalOptimizer::new(strategy.clone(), config.hierarchical_settings())?;
    match hierarchical.run(data, &space) {
        Ok(result) => candidates.push(("hierarchical".to_string(), result.params)),
        Err(e) => error!("Hierarchical optimization failed: {}", e),
    }

    let comparison = compare_methods(strategy, data, candidates)
        .context("Configured parameters were rejected by the strategy")?;
    Ok(Report {
        baseline: Some(comparison.baseline.clone()),
        comparison: Some(comparison),
        ..Report::default()
    })
}

/// Training failures are recorded in the report, never returned.
fn train_classifier(
    config: &AppConfig,
    data: &[Bar],
    strategy: &ConfidenceLowPointStrategy,
    report: &mut Report,
) {
    let mut pipeline = ClassifierPipeline::new(config.ai.classifier.clone());
    let training = pipeline.train(data, strategy);
    let trained = training.success;
    if !trained {
        warn!(
            "Classifier training failed: {}",
            training.error.as_deref().unwrap_or("unknown error")
        );
    }
    report.training = Some(training);
    if !trained {
        return;
    }

    report.validation = Some(pipeline.validate(data, strategy));
    match pipeline.predict(data) {
        Ok(prediction) => report.prediction = Some(prediction),
        Err(e) => warn!("Prediction on latest bar failed: {}", e),
    }
    report.feature_importance = Some(pipeline.get_feature_importance());
}

fn print_evaluation(label: &str, evaluation: &EvaluationResult) {
    println!(
        "  {:<14} {:>4} points  success {:>6.2}%  avg rise {:>6.2}%  score {:.4}",
        label,
        evaluation.total_points,
        evaluation.success_rate * 100.0,
        evaluation.avg_rise * 100.0,
        evaluation.score
    );
}

fn format_improvement(pct: Option<f64>) -> String {
    pct.map_or_else(|| "n/a".to_string(), |p| format!("{:+.2}%", p))
}

fn print_report(report: &Report) {
    println!("{}", "=".repeat(80));

    if let Some(baseline) = &report.baseline {
        println!("BACKTEST");
        print_evaluation("Baseline:", baseline);
        if let Some(optimized) = &report.optimized {
            print_evaluation("Optimized:", optimized);
            println!(
                "  Score change:  {:+.4} ({})",
                optimized.score - baseline.score,
                format_improvement(improvement_pct(baseline.score, optimized.score))
            );
        }
        println!();
    }

    if let Some(comparison) = &report.comparison {
        println!("METHOD COMPARISON");
        println!("{:<6} {:<14} {:<10} {:<10} Parameters", "Rank", "Method", "Score", "Change");
        for (rank, entry) in comparison.methods.iter().enumerate() {
            println!(
                "{:<6} {:<14} {:<10.4} {:<10} {}",
                rank + 1,
                entry.method,
                entry.evaluation.score,
                format_improvement(entry.improvement_pct),
                entry.params
            );
        }
        match comparison.best() {
            Some(best) => println!("  Best method: {} ({:.4})\n", best.method, best.evaluation.score),
            None => println!(
                "  Best method: configured parameters ({:.4})\n",
                comparison.baseline.score
            ),
        }
    }

    if let Some(result) = &report.optimization {
        println!("HIERARCHICAL OPTIMIZATION");
        println!("  Parameters:     {}", result.params);
        println!("  CV score:       {:.4}", result.cv_score);
        println!("  Advanced score: {:.4}", result.advanced_score);
        println!("  Best score:     {:.4}", result.best_score);
        println!("  Total time:     {:.1}s", result.total_time);
        for stage in &result.stages {
            println!(
                "  - {:<7} {:<8} {:>5} evaluations  {:>7.1}s  best {:.4}",
                stage.stage,
                stage.method.to_string(),
                stage.evaluations,
                stage.elapsed_secs,
                stage.best_score
            );
        }
        println!();
    }

    if let Some(grid) = &report.grid {
        println!("GRID SEARCH ({} evaluations)", grid.evaluations);
        println!("{:<6} {:<10} Parameters", "Rank", "Score");
        for (rank, candidate) in grid.ranked.iter().enumerate() {
            println!("{:<6} {:<10.4} {}", rank + 1, candidate.score, candidate.params);
        }
        println!("  Best: {} ({:.4})\n", grid.best, grid.best_score);
    }

    if let Some(genetic) = &report.genetic {
        println!(
            "GENETIC SEARCH (seed {}, {} generations, {} evaluations)",
            genetic.seed, genetic.generations_run, genetic.evaluations
        );
        let history: Vec<String> = genetic
            .generation_best
            .iter()
            .map(|s| format!("{:.3}", s))
            .collect();
        println!("  Best per generation: {}", history.join(" "));
        println!("  Best: {} ({:.4})\n", genetic.best, genetic.best_score);
    }

    if let Some(training) = &report.training {
        match &training.error {
            None => println!(
                "CLASSIFIER: trained on {} samples, {} features",
                training.train_samples, training.feature_count
            ),
            Some(e) => println!("CLASSIFIER: training failed: {}", e),
        }
    }

    if let Some(validation) = &report.validation {
        match &validation.error {
            None => println!(
                "  Validation: accuracy {:.3}  precision {:.3}  recall {:.3}  f1 {:.3}  ({} samples, {} positive)",
                validation.accuracy,
                validation.precision,
                validation.recall,
                validation.f1_score,
                validation.test_samples,
                validation.positive_samples_test
            ),
            Some(e) => println!("  Validation failed: {}", e),
        }
    }

    if let Some(prediction) = &report.prediction {
        println!(
            "  Latest bar: {} (confidence {:.3})",
            if prediction.is_low_point {
                "LOW POINT"
            } else {
                "no signal"
            },
            prediction.confidence
        );
    }

    if let Some(importance) = &report.feature_importance {
        println!("  Top features:");
        for (name, weight) in importance.top(5) {
            println!("    {:<16} {:.4}", name, weight);
        }
    }

    if let Some(persisted) = &report.persisted {
        println!("\nPERSISTED: updated {:?}", persisted.updated);
        if !persisted.skipped_fixed.is_empty() {
            println!("  Kept fixed: {:?}", persisted.skipped_fixed);
        }
        if !persisted.skipped_unknown.is_empty() {
            println!("  Skipped unknown: {:?}", persisted.skipped_unknown);
        }
    }

    println!("{}", "=".repeat(80));
}
