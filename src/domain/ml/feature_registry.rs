use serde::{Deserialize, Serialize};

/// Ordered list of feature names.
/// This order MUST match `features_to_vector`; importances and model inputs
/// are indexed by it.
pub const FEATURE_NAMES: &[&str] = &[
    "rsi",
    "macd_hist",
    "bb_position",
    "bb_width",
    "price_to_ma5",
    "price_to_ma20",
    "price_to_ma60",
    "return_1d",
    "return_5d",
    "return_20d",
    "volatility_20d",
    "volume_ratio",
];

/// Engineered features for one bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub rsi: f64,
    pub macd_hist: f64,
    /// Position within the Bollinger band (0 = lower, 1 = upper)
    pub bb_position: f64,
    pub bb_width: f64,
    pub price_to_ma5: f64,
    pub price_to_ma20: f64,
    pub price_to_ma60: f64,
    pub return_1d: f64,
    pub return_5d: f64,
    pub return_20d: f64,
    pub volatility_20d: f64,
    pub volume_ratio: f64,
}

/// Flattens a row into model input order.
pub fn features_to_vector(row: &FeatureRow) -> Vec<f64> {
    vec![
        row.rsi,
        row.macd_hist,
        row.bb_position,
        row.bb_width,
        row.price_to_ma5,
        row.price_to_ma20,
        row.price_to_ma60,
        row.return_1d,
        row.return_5d,
        row.return_20d,
        row.volatility_20d,
        row.volume_ratio,
    ]
}
