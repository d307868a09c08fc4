//! Supervised low-point classifier.
//!
//! Samples are the warmed-up feature rows of bars whose outcome the strategy
//! could resolve. The split is chronological: the first `train_ratio` of the
//! samples train, the remainder validates. Training samples whose label
//! horizon reaches the first validation bar are purged. A random forest
//! regressor is fitted on 0/1 targets and its output read as the
//! positive-class probability.

use super::feature_engineering::{feature_row, feature_rows};
use crate::application::market_data::indicator_series::IndicatorSeries;
use crate::domain::errors::ModelError;
use crate::domain::market::Bar;
use crate::domain::ml::{
    FEATURE_NAMES, FeatureImportance, PredictionResult, TrainingResult, ValidationResult,
    features_to_vector,
};
use crate::domain::ports::StrategyModule;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::{debug, info, warn};

type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub train_ratio: f64,
    pub min_train_samples: usize,
    pub min_validation_samples: usize,
    pub decision_threshold: f64,
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    /// Seeds the column shuffles of permutation importance
    pub importance_seed: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            min_train_samples: 30,
            min_validation_samples: 5,
            decision_threshold: 0.5,
            n_trees: 50,
            max_depth: 8,
            min_samples_split: 5,
            importance_seed: 42,
        }
    }
}

struct TrainedModel {
    model: ForestModel,
    importance: FeatureImportance,
}

/// Feature matrix with 0/1 targets, in bar order
#[derive(Debug, Default)]
struct LabeledSamples {
    /// Bar index of each row
    index: Vec<usize>,
    x: Vec<Vec<f64>>,
    y: Vec<f64>,
}

impl LabeledSamples {
    fn len(&self) -> usize {
        self.y.len()
    }

    /// Number of leading samples before `split` whose label window
    /// `[index, index + horizon]` ends before the first validation bar.
    fn purged_train_len(&self, split: usize, horizon: usize) -> usize {
        match self.index.get(split) {
            Some(&first_validation) => self.index[..split]
                .partition_point(|&i| i.saturating_add(horizon) < first_validation),
            None => split,
        }
    }
}

pub struct ClassifierPipeline {
    settings: ClassifierSettings,
    trained: Option<TrainedModel>,
}

impl ClassifierPipeline {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self {
            settings,
            trained: None,
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Fits a fresh model, discarding any previous one even on failure.
    pub fn train<S: StrategyModule>(&mut self, data: &[Bar], strategy: &S) -> TrainingResult {
        self.trained = None;
        match self.fit(data, strategy) {
            Ok((trained, train_samples)) => {
                info!(
                    "Classifier: Trained on {} samples with {} features",
                    train_samples,
                    FEATURE_NAMES.len()
                );
                self.trained = Some(trained);
                TrainingResult {
                    success: true,
                    train_samples,
                    feature_count: FEATURE_NAMES.len(),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Classifier: Training failed: {}", e);
                TrainingResult::failed(e)
            }
        }
    }

    /// Scores the model on the chronological validation segment.
    pub fn validate<S: StrategyModule>(&self, data: &[Bar], strategy: &S) -> ValidationResult {
        match self.try_validate(data, strategy) {
            Ok(result) => result,
            Err(e) => {
                warn!("Classifier: Validation failed: {}", e);
                ValidationResult::failed(e)
            }
        }
    }

    /// Classifies the most recent bar of `data`.
    pub fn predict(&self, data: &[Bar]) -> Result<PredictionResult, ModelError> {
        let trained = self.trained.as_ref().ok_or(ModelError::NotTrained)?;
        let series = IndicatorSeries::compute(data).map_err(|e| ModelError::NoFeatures {
            reason: e.to_string(),
        })?;
        let last = series.len().checked_sub(1).ok_or_else(|| ModelError::NoFeatures {
            reason: "no bars".to_string(),
        })?;
        let row = feature_row(&series, last).ok_or_else(|| ModelError::NoFeatures {
            reason: format!("latest bar is not warmed up ({} bars)", series.len()),
        })?;

        let probability = probabilities(&trained.model, &[features_to_vector(&row)])?
            .first()
            .copied()
            .ok_or_else(|| ModelError::Model {
                reason: "no prediction returned".to_string(),
            })?;

        Ok(PredictionResult {
            is_low_point: probability >= self.settings.decision_threshold,
            confidence: probability,
        })
    }

    /// Permutation importance captured at training time; empty when untrained.
    pub fn get_feature_importance(&self) -> FeatureImportance {
        self.trained
            .as_ref()
            .map(|t| t.importance.clone())
            .unwrap_or_default()
    }

    fn fit<S: StrategyModule>(&self, data: &[Bar], strategy: &S) -> Result<(TrainedModel, usize), ModelError> {
        if data.is_empty() {
            return Err(ModelError::InsufficientSamples {
                available: 0,
                required: self.settings.min_train_samples,
            });
        }

        let samples = labeled_samples(data, strategy)?;
        let split = self.split_point(samples.len());
        let train_len = samples.purged_train_len(split, strategy.label_horizon());
        if train_len < split {
            debug!(
                "Classifier: Purged {} training samples overlapping the validation window",
                split - train_len
            );
        }
        let x = &samples.x[..train_len];
        let y = &samples.y[..train_len];

        if train_len < self.settings.min_train_samples {
            return Err(ModelError::InsufficientSamples {
                available: train_len,
                required: self.settings.min_train_samples,
            });
        }
        require_both_classes(y)?;

        let matrix = DenseMatrix::from_2d_vec(&x.to_vec()).map_err(|e| ModelError::Model {
            reason: format!("Matrix error: {}", e),
        })?;
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(self.settings.n_trees)
            .with_max_depth(self.settings.max_depth)
            .with_min_samples_split(self.settings.min_samples_split);
        let targets = y.to_vec();
        let model = RandomForestRegressor::fit(&matrix, &targets, params).map_err(|e| ModelError::Model {
            reason: format!("Training error: {}", e),
        })?;

        let importance = self.permutation_importance(&model, x, y)?;
        Ok((TrainedModel { model, importance }, train_len))
    }

    fn try_validate<S: StrategyModule>(&self, data: &[Bar], strategy: &S) -> Result<ValidationResult, ModelError> {
        let trained = self.trained.as_ref().ok_or(ModelError::NotTrained)?;
        let samples = labeled_samples(data, strategy)?;
        let split = self.split_point(samples.len());
        let x = &samples.x[split..];
        let y = &samples.y[split..];

        let required = self.settings.min_validation_samples.max(1);
        if y.len() < required {
            return Err(ModelError::InsufficientSamples {
                available: y.len(),
                required,
            });
        }
        require_both_classes(y)?;

        let predicted: Vec<bool> = probabilities(&trained.model, x)?
            .into_iter()
            .map(|p| p >= self.settings.decision_threshold)
            .collect();
        let actual: Vec<bool> = y.iter().map(|&t| t >= 0.5).collect();
        let metrics = ConfusionCounts::from_predictions(&predicted, &actual);

        debug!("Classifier: Validation counts {:?}", metrics);

        Ok(ValidationResult {
            success: true,
            accuracy: metrics.accuracy(),
            precision: metrics.precision(),
            recall: metrics.recall(),
            f1_score: metrics.f1(),
            test_samples: y.len(),
            positive_samples_test: actual.iter().filter(|&&a| a).count(),
            error: None,
        })
    }

    fn split_point(&self, len: usize) -> usize {
        ((len as f64 * self.settings.train_ratio).floor() as usize).min(len)
    }

    /// Accuracy drop when one feature column is shuffled, normalized to sum 1.
    fn permutation_importance(
        &self,
        model: &ForestModel,
        x: &[Vec<f64>],
        y: &[f64],
    ) -> Result<FeatureImportance, ModelError> {
        let actual: Vec<bool> = y.iter().map(|&t| t >= 0.5).collect();
        let baseline = self.accuracy(model, x, &actual)?;
        let mut rng = StdRng::seed_from_u64(self.settings.importance_seed);

        let mut drops = Vec::with_capacity(FEATURE_NAMES.len());
        for column in 0..FEATURE_NAMES.len() {
            let mut shuffled: Vec<f64> = x.iter().map(|row| row[column]).collect();
            shuffled.shuffle(&mut rng);
            let permuted: Vec<Vec<f64>> = x
                .iter()
                .zip(&shuffled)
                .map(|(row, &v)| {
                    let mut row = row.clone();
                    row[column] = v;
                    row
                })
                .collect();
            let accuracy = self.accuracy(model, &permuted, &actual)?;
            drops.push((baseline - accuracy).max(0.0));
        }

        let total: f64 = drops.iter().sum();
        if total > 0.0 {
            drops.iter_mut().for_each(|d| *d /= total);
        }
        Ok(FeatureImportance::from_weights(
            FEATURE_NAMES.iter().copied().zip(drops),
        ))
    }

    fn accuracy(&self, model: &ForestModel, x: &[Vec<f64>], actual: &[bool]) -> Result<f64, ModelError> {
        let predicted: Vec<bool> = probabilities(model, x)?
            .into_iter()
            .map(|p| p >= self.settings.decision_threshold)
            .collect();
        Ok(ConfusionCounts::from_predictions(&predicted, actual).accuracy())
    }
}

/// One sample per warmed-up bar whose outcome is resolved.
fn labeled_samples<S: StrategyModule>(data: &[Bar], strategy: &S) -> Result<LabeledSamples, ModelError> {
    let rows = feature_rows(data).map_err(|e| ModelError::NoFeatures {
        reason: e.to_string(),
    })?;

    let mut labels: Vec<Option<bool>> = vec![None; data.len()];
    for event in strategy.backtest(data) {
        if let Some(slot) = labels.get_mut(event.index) {
            *slot = event.label();
        }
    }

    let mut samples = LabeledSamples::default();
    for (i, row) in rows {
        if let Some(label) = labels[i] {
            samples.index.push(i);
            samples.x.push(features_to_vector(&row));
            samples.y.push(if label { 1.0 } else { 0.0 });
        }
    }
    Ok(samples)
}

fn require_both_classes(y: &[f64]) -> Result<(), ModelError> {
    let positives = y.iter().filter(|&&t| t >= 0.5).count();
    if positives == 0 {
        return Err(ModelError::SingleClass { class: "negative" });
    }
    if positives == y.len() {
        return Err(ModelError::SingleClass { class: "positive" });
    }
    Ok(())
}

/// Positive-class probabilities clamped to [0, 1].
fn probabilities(model: &ForestModel, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
    let matrix = DenseMatrix::from_2d_vec(&x.to_vec()).map_err(|e| ModelError::Model {
        reason: format!("Matrix error: {}", e),
    })?;
    let predictions: Vec<f64> = model.predict(&matrix).map_err(|e| ModelError::Model {
        reason: format!("Predict error: {}", e),
    })?;
    Ok(predictions
        .into_iter()
        .map(|p| if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 })
        .collect())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ConfusionCounts {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl ConfusionCounts {
    fn from_predictions(predicted: &[bool], actual: &[bool]) -> Self {
        let mut counts = Self::default();
        for (&p, &a) in predicted.iter().zip(actual) {
            match (p, a) {
                (true, true) => counts.tp += 1,
                (true, false) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (false, true) => counts.fn_ += 1,
            }
        }
        counts
    }

    fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    fn accuracy(&self) -> f64 {
        safe_div(self.tp + self.tn, self.total())
    }

    fn precision(&self) -> f64 {
        safe_div(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        safe_div(self.tp, self.tp + self.fn_)
    }

    fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 }
    }
}

fn safe_div(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::StrategyError;
    use crate::domain::market::DetectionEvent;
    use crate::domain::optimization::{EvaluationResult, ParameterSet};
    use chrono::{Duration, NaiveDate};

    /// Labels a bar positive when it closed below the previous close.
    #[derive(Clone)]
    struct DownCloseStrategy;

    impl StrategyModule for DownCloseStrategy {
        fn params(&self) -> ParameterSet {
            ParameterSet::new()
        }

        fn apply_params(&mut self, _params: &ParameterSet) -> Result<(), StrategyError> {
            Ok(())
        }

        fn backtest(&self, data: &[Bar]) -> Vec<DetectionEvent> {
            data.iter()
                .enumerate()
                .map(|(i, b)| {
                    let down = i > 0 && b.close < data[i - 1].close;
                    DetectionEvent {
                        index: i,
                        date: b.date,
                        price: b.close,
                        is_low_point: down,
                        confidence: if down { 1.0 } else { 0.0 },
                        max_rise: Some(0.0),
                        days_to_target: None,
                        success: Some(true),
                    }
                })
                .collect()
        }

        fn evaluate(&self, _events: &[DetectionEvent]) -> EvaluationResult {
            EvaluationResult::empty()
        }

        fn name(&self) -> &str {
            "DownClose"
        }
    }

    fn wave(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 / 6.0).sin() * 8.0 + ((i * 37) % 11) as f64 * 0.4;
                Bar::new(start + Duration::days(i as i64), c, c + 1.0, c - 1.0, c, 10_000.0)
            })
            .collect()
    }

    #[test]
    fn test_train_validate_predict() {
        let data = wave(320);
        let mut pipeline = ClassifierPipeline::new(ClassifierSettings {
            n_trees: 20,
            ..Default::default()
        });

        let training = pipeline.train(&data, &DownCloseStrategy);
        assert!(training.success, "{:?}", training.error);
        assert_eq!(training.feature_count, 12);
        assert_eq!(training.train_samples, ((320 - 59) as f64 * 0.8).floor() as usize);

        let validation = pipeline.validate(&data, &DownCloseStrategy);
        assert!(validation.success, "{:?}", validation.error);
        for metric in [
            validation.accuracy,
            validation.precision,
            validation.recall,
            validation.f1_score,
        ] {
            assert!((0.0..=1.0).contains(&metric));
        }
        assert!(validation.positive_samples_test <= validation.test_samples);

        let prediction = pipeline.predict(&data).unwrap();
        assert!((0.0..=1.0).contains(&prediction.confidence));

        let importance = pipeline.get_feature_importance();
        assert_eq!(importance.len(), 12);
        let total: f64 = importance.entries().iter().map(|(_, w)| w).sum();
        assert!(total == 0.0 || (total - 1.0).abs() < 1e-9);
    }

    /// Same labels, but each one claims to look 10 bars ahead.
    #[derive(Clone)]
    struct LookAheadStrategy;

    impl StrategyModule for LookAheadStrategy {
        fn params(&self) -> ParameterSet {
            ParameterSet::new()
        }

        fn apply_params(&mut self, _params: &ParameterSet) -> Result<(), StrategyError> {
            Ok(())
        }

        fn backtest(&self, data: &[Bar]) -> Vec<DetectionEvent> {
            DownCloseStrategy.backtest(data)
        }

        fn evaluate(&self, _events: &[DetectionEvent]) -> EvaluationResult {
            EvaluationResult::empty()
        }

        fn label_horizon(&self) -> usize {
            10
        }

        fn name(&self) -> &str {
            "LookAhead"
        }
    }

    #[test]
    fn test_training_rows_overlapping_validation_are_purged() {
        let data = wave(320);
        let mut pipeline = ClassifierPipeline::new(ClassifierSettings {
            n_trees: 10,
            ..Default::default()
        });
        let split = ((320 - 59) as f64 * 0.8).floor() as usize;

        let training = pipeline.train(&data, &LookAheadStrategy);
        assert!(training.success, "{:?}", training.error);
        assert_eq!(training.train_samples, split - 10);

        // Validation segment is unchanged by the purge
        let validation = pipeline.validate(&data, &LookAheadStrategy);
        assert!(validation.success, "{:?}", validation.error);
        assert_eq!(validation.test_samples, (320 - 59) - split);
    }

    #[test]
    fn test_purge_respects_index_gaps() {
        let samples = LabeledSamples {
            index: vec![0, 1, 2, 3, 10, 20],
            x: vec![Vec::new(); 6],
            y: vec![0.0; 6],
        };
        // First validation bar is 10: rows 0..3 end by bar 8 with horizon 5
        assert_eq!(samples.purged_train_len(4, 5), 4);
        assert_eq!(samples.purged_train_len(4, 7), 3);
        assert_eq!(samples.purged_train_len(4, 0), 4);
        assert_eq!(samples.purged_train_len(5, 100), 0);
        assert_eq!(samples.purged_train_len(6, 100), 6);
    }

    #[test]
    fn test_untrained_pipeline_refuses_work() {
        let pipeline = ClassifierPipeline::new(ClassifierSettings::default());
        let data = wave(100);
        assert!(!pipeline.validate(&data, &DownCloseStrategy).success);
        assert!(matches!(pipeline.predict(&data), Err(ModelError::NotTrained)));
        assert!(pipeline.get_feature_importance().is_empty());
    }

    #[test]
    fn test_train_on_empty_data_fails() {
        let mut pipeline = ClassifierPipeline::new(ClassifierSettings::default());
        let result = pipeline.train(&[], &DownCloseStrategy);
        assert!(!result.success);
        assert!(result.error.is_some_and(|e| !e.is_empty()));
        assert!(!pipeline.is_trained());
    }

    #[test]
    fn test_failed_train_discards_previous_model() {
        let mut pipeline = ClassifierPipeline::new(ClassifierSettings {
            n_trees: 5,
            ..Default::default()
        });
        assert!(pipeline.train(&wave(320), &DownCloseStrategy).success);
        assert!(!pipeline.train(&wave(70), &DownCloseStrategy).success);
        assert!(!pipeline.is_trained());
    }

    #[test]
    fn test_confusion_metrics() {
        let predicted = [true, true, false, false, true];
        let actual = [true, false, false, true, true];
        let c = ConfusionCounts::from_predictions(&predicted, &actual);
        assert_eq!((c.tp, c.fp, c.tn, c.fn_), (2, 1, 1, 1));
        assert!((c.accuracy() - 0.6).abs() < 1e-12);
        assert!((c.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((c.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((c.f1() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(ConfusionCounts::default().f1(), 0.0);
    }

    #[test]
    fn test_single_class_rejected() {
        assert!(matches!(
            require_both_classes(&[0.0, 0.0]),
            Err(ModelError::SingleClass { class: "negative" })
        ));
        assert!(require_both_classes(&[0.0, 1.0]).is_ok());
    }
}
