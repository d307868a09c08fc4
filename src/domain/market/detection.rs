use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-bar output of a strategy backtest.
///
/// `index` is the bar position in the backtested slice. The outcome fields
/// look forward from the bar, so they are `None` while the bar is too close
/// to the end of the data for the success condition to be decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub index: usize,
    pub date: NaiveDate,
    pub price: f64,
    pub is_low_point: bool,
    pub confidence: f64,
    /// Largest close-to-close rise within the look-ahead horizon
    pub max_rise: Option<f64>,
    /// Bars until the rise threshold was first reached
    pub days_to_target: Option<usize>,
    pub success: Option<bool>,
}

impl DetectionEvent {
    /// Classifier label: a flagged low point whose rise met the threshold.
    /// `None` until the outcome is known.
    pub fn label(&self) -> Option<bool> {
        self.success.map(|s| s && self.is_low_point)
    }
}
