use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub success: bool,
    pub train_samples: usize,
    pub feature_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrainingResult {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            train_samples: 0,
            feature_count: 0,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub test_samples: usize,
    pub positive_samples_test: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            test_samples: 0,
            positive_samples_test: 0,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub is_low_point: bool,
    /// Probability of the positive class (0..1)
    pub confidence: f64,
}

/// Feature weights, most important first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureImportance {
    entries: Vec<(String, f64)>,
}

impl FeatureImportance {
    /// Builds a ranking from raw weights. Negative or non-finite weights
    /// count as zero; ties keep the input order.
    pub fn from_weights<S: Into<String>>(weights: impl IntoIterator<Item = (S, f64)>) -> Self {
        let mut entries: Vec<(String, f64)> = weights
            .into_iter()
            .map(|(name, w)| (name.into(), if w.is_finite() { w.max(0.0) } else { 0.0 }))
            .collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, w)| *w)
    }

    pub fn top(&self, n: usize) -> &[(String, f64)] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
