use chrono::NaiveDate;
use lowpoint::application::ml::ClassifierSettings;
use lowpoint::application::optimization::{
    FitnessEvaluator, GeneticSettings, GridSearchOptimizer, GridSearchSettings,
    HierarchicalOptimizer, HierarchicalSettings, compare_methods,
};
use lowpoint::application::strategies::{ConfidenceLowPointStrategy, LowPointParams};
use lowpoint::domain::errors::OptimizationError;
use lowpoint::domain::market::Bar;
use lowpoint::domain::optimization::{ParameterSpace, SearchMethod};
use lowpoint::domain::ports::DataModule;
use lowpoint::infrastructure::SyntheticDataModule;

fn synthetic_bars() -> Vec<Bar> {
    SyntheticDataModule::new(7)
        .history(
            NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 29).unwrap(),
        )
        .unwrap()
}

fn small_space() -> ParameterSpace {
    ParameterSpace::new()
        .with_range("final_threshold", 0.3, 0.7, 0.1)
        .with_range("rsi_oversold_threshold", 25.0, 35.0, 5.0)
}

fn fast_settings() -> HierarchicalSettings {
    HierarchicalSettings {
        genetic: GeneticSettings {
            population_size: 6,
            generations: 2,
            seed: Some(11),
            ..Default::default()
        },
        classifier: ClassifierSettings {
            n_trees: 5,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_default_parameters_score_in_unit_interval() {
    let data = synthetic_bars();
    let strategy = ConfidenceLowPointStrategy::new(LowPointParams::default());
    let fitness = FitnessEvaluator::new(strategy, &data);

    let result = fitness
        .evaluate_detailed(&lowpoint::domain::optimization::ParameterSet::new())
        .unwrap();
    assert!((0.0..=1.0).contains(&result.score));
    assert!((0.0..=1.0).contains(&result.success_rate));
}

#[test]
fn test_hierarchical_run_on_synthetic_index() {
    let data = synthetic_bars();
    let strategy = ConfidenceLowPointStrategy::new(LowPointParams::default());
    let optimizer = HierarchicalOptimizer::new(strategy, fast_settings()).unwrap();

    let result = optimizer.run(&data, &small_space()).unwrap();

    assert!(small_space().contains(&result.params));
    assert!(!result.params.contains_key("rise_threshold"));
    assert!(!result.params.contains_key("max_days"));

    assert!((0.0..=1.0).contains(&result.cv_score));
    assert!((0.0..=1.0).contains(&result.advanced_score));
    assert!((result.best_score - (0.5 * result.cv_score + 0.5 * result.advanced_score)).abs() < 1e-12);

    let names: Vec<&str> = result.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(names, vec!["coarse", "refine"]);
    assert_eq!(result.stages[0].method, SearchMethod::Genetic);
    assert_eq!(result.stages[1].method, SearchMethod::Grid);
    assert!(result.stages.iter().all(|s| s.evaluations > 0));
    assert!(result.total_time >= 0.0);
}

#[test]
fn test_hierarchical_rejects_empty_data() {
    let strategy = ConfidenceLowPointStrategy::new(LowPointParams::default());
    let optimizer = HierarchicalOptimizer::new(strategy, fast_settings()).unwrap();
    assert!(matches!(
        optimizer.run(&[], &small_space()),
        Err(OptimizationError::EmptyDataset { .. })
    ));
}

#[test]
fn test_grid_winner_never_trails_configured_parameters() {
    // The configured values sit on the small lattice, so the exhaustive
    // winner must match or beat them on the same data
    let data = synthetic_bars();
    let strategy = ConfidenceLowPointStrategy::new(LowPointParams::default());
    let fitness = FitnessEvaluator::new(strategy.clone(), &data);
    let grid = GridSearchOptimizer::new(small_space(), GridSearchSettings::default())
        .unwrap()
        .run_optimization(&fitness)
        .unwrap();
    let hierarchical = HierarchicalOptimizer::new(strategy.clone(), fast_settings())
        .unwrap()
        .run(&data, &small_space())
        .unwrap();

    let comparison = compare_methods(
        strategy,
        &data,
        [
            ("grid".to_string(), grid.best.clone()),
            ("hierarchical".to_string(), hierarchical.params),
        ],
    )
    .unwrap();

    assert_eq!(comparison.methods.len(), 2);
    assert!(comparison.methods[0].evaluation.score >= comparison.methods[1].evaluation.score);
    let grid_entry = comparison.methods.iter().find(|m| m.method == "grid").unwrap();
    assert_eq!(grid_entry.params, grid.best);
    assert!((grid_entry.evaluation.score - grid.best_score).abs() < 1e-12);
    assert!(grid_entry.evaluation.score >= comparison.baseline.score);
}
