//! `[strategy]` section: the success condition and confidence weights of the
//! reference low-point strategy.

use crate::application::strategies::LowPointParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Rise that makes a low point a success
    pub rise_threshold: f64,
    /// Look-ahead horizon in bars
    pub max_days: usize,
    pub confidence_weights: ConfidenceWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub rsi_oversold_threshold: f64,
    pub rsi_low_threshold: f64,
    pub final_threshold: f64,
    pub dynamic_confidence_adjustment: f64,
    pub market_sentiment_weight: f64,
    pub trend_strength_weight: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let p = LowPointParams::default();
        Self {
            rise_threshold: p.rise_threshold,
            max_days: p.max_days,
            confidence_weights: ConfidenceWeights::default(),
        }
    }
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        let p = LowPointParams::default();
        Self {
            rsi_oversold_threshold: p.rsi_oversold_threshold,
            rsi_low_threshold: p.rsi_low_threshold,
            final_threshold: p.final_threshold,
            dynamic_confidence_adjustment: p.dynamic_confidence_adjustment,
            market_sentiment_weight: p.market_sentiment_weight,
            trend_strength_weight: p.trend_strength_weight,
        }
    }
}

impl StrategyConfig {
    pub fn to_params(&self) -> LowPointParams {
        let w = &self.confidence_weights;
        LowPointParams {
            rise_threshold: self.rise_threshold,
            max_days: self.max_days,
            rsi_oversold_threshold: w.rsi_oversold_threshold,
            rsi_low_threshold: w.rsi_low_threshold,
            final_threshold: w.final_threshold,
            dynamic_confidence_adjustment: w.dynamic_confidence_adjustment,
            market_sentiment_weight: w.market_sentiment_weight,
            trend_strength_weight: w.trend_strength_weight,
        }
    }
}
