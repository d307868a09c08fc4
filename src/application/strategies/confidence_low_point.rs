use crate::application::market_data::indicator_series::IndicatorSeries;
use crate::domain::errors::StrategyError;
use crate::domain::market::{Bar, DetectionEvent};
use crate::domain::optimization::{EvaluationResult, ParameterSet, ParameterValue};
use crate::domain::ports::StrategyModule;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Rise that earns the full average-rise component of the score
const FULL_RISE_REFERENCE: f64 = 0.10;
/// Drawdown from the 60-bar high that saturates the sentiment component
const FULL_DRAWDOWN_REFERENCE: f64 = 0.10;
/// 5-bar MA20 decline that saturates the trend component
const FULL_SLOPE_REFERENCE: f64 = 0.05;
/// Daily return volatility above which the market counts as turbulent
const TURBULENT_VOLATILITY: f64 = 0.03;

/// Tunable and fixed parameters of the confidence rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowPointParams {
    /// Rise (fraction) a point must reach to count as a success
    pub rise_threshold: f64,
    /// Look-ahead horizon in bars
    pub max_days: usize,
    pub rsi_oversold_threshold: f64,
    pub rsi_low_threshold: f64,
    /// Minimum confidence for a bar to be flagged
    pub final_threshold: f64,
    pub dynamic_confidence_adjustment: f64,
    pub market_sentiment_weight: f64,
    pub trend_strength_weight: f64,
}

impl Default for LowPointParams {
    fn default() -> Self {
        Self {
            rise_threshold: 0.04,
            max_days: 20,
            rsi_oversold_threshold: 30.0,
            rsi_low_threshold: 40.0,
            final_threshold: 0.5,
            dynamic_confidence_adjustment: 0.1,
            market_sentiment_weight: 0.15,
            trend_strength_weight: 0.12,
        }
    }
}

/// Confidence-weighted relative low point detector.
///
/// Each warmed-up bar collects evidence (price below MA20/MA60, oversold RSI,
/// lower Bollinger band touch, drawdown from the 60-bar high, falling MA20,
/// momentum turn) into a confidence in [0, 1]. A bar is a low point when the
/// confidence reaches `final_threshold`; it succeeds when the close rises by
/// `rise_threshold` within `max_days` bars.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceLowPointStrategy {
    params: LowPointParams,
}

impl ConfidenceLowPointStrategy {
    pub fn new(params: LowPointParams) -> Self {
        Self { params }
    }

    pub fn settings(&self) -> &LowPointParams {
        &self.params
    }

    fn confidence(&self, s: &IndicatorSeries, i: usize) -> f64 {
        let p = &self.params;
        let close = s.close[i];
        let mut confidence = 0.0;

        if close < s.ma20[i] {
            confidence += 0.2;
        }
        if close < s.ma60[i] {
            confidence += 0.1;
        }

        let rsi = s.rsi[i];
        if rsi < p.rsi_oversold_threshold {
            confidence += 0.3;
        } else if rsi < p.rsi_low_threshold {
            confidence += 0.15;
        }

        if close <= s.bb_lower[i] * 1.02 {
            confidence += 0.2;
        }

        if s.high60[i] > 0.0 {
            let drawdown = (1.0 - close / s.high60[i]).max(0.0);
            confidence += p.market_sentiment_weight * (drawdown / FULL_DRAWDOWN_REFERENCE).min(1.0);
        }

        if i >= 5 && s.ma20[i - 5] > 0.0 {
            let slope = s.ma20[i] / s.ma20[i - 5] - 1.0;
            if slope < 0.0 {
                confidence += p.trend_strength_weight * (-slope / FULL_SLOPE_REFERENCE).min(1.0);
            }
        }

        // Momentum turning up inside a weak zone raises confidence; turbulence lowers it
        if i >= 1 && s.macd_hist[i] > s.macd_hist[i - 1] && rsi < p.rsi_low_threshold {
            confidence += p.dynamic_confidence_adjustment;
        }
        if s.volatility20[i] > TURBULENT_VOLATILITY {
            confidence -= p.dynamic_confidence_adjustment;
        }

        confidence.clamp(0.0, 1.0)
    }

    fn outcome(&self, closes: &[f64], i: usize) -> (Option<f64>, Option<usize>, Option<bool>) {
        let p = &self.params;
        let base = closes[i];
        let last = closes.len() - 1;
        let horizon_end = (i + p.max_days).min(last);

        let mut max_rise = f64::NEG_INFINITY;
        let mut days_to_target = None;
        for (offset, &c) in closes[i + 1..=horizon_end.max(i)].iter().enumerate() {
            let rise = c / base - 1.0;
            max_rise = max_rise.max(rise);
            if days_to_target.is_none() && rise >= p.rise_threshold {
                days_to_target = Some(offset + 1);
            }
        }

        let resolved = days_to_target.is_some() || i + p.max_days <= last;
        if !resolved {
            return (None, None, None);
        }
        let max_rise = if max_rise.is_finite() { max_rise } else { 0.0 };
        (Some(max_rise), days_to_target, Some(days_to_target.is_some()))
    }
}

fn numeric(name: &str, value: &ParameterValue) -> Result<f64, StrategyError> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| StrategyError::WrongType {
            name: name.to_string(),
            expected: "finite number".to_string(),
        })
}

fn in_range(name: &str, value: f64, lo: f64, hi: f64) -> Result<f64, StrategyError> {
    if value < lo || value > hi {
        return Err(StrategyError::OutOfRange {
            name: name.to_string(),
            value,
        });
    }
    Ok(value)
}

impl StrategyModule for ConfidenceLowPointStrategy {
    fn params(&self) -> ParameterSet {
        let p = &self.params;
        ParameterSet::new()
            .with("rise_threshold", p.rise_threshold)
            .with("max_days", p.max_days)
            .with("rsi_oversold_threshold", p.rsi_oversold_threshold)
            .with("rsi_low_threshold", p.rsi_low_threshold)
            .with("final_threshold", p.final_threshold)
            .with("dynamic_confidence_adjustment", p.dynamic_confidence_adjustment)
            .with("market_sentiment_weight", p.market_sentiment_weight)
            .with("trend_strength_weight", p.trend_strength_weight)
    }

    fn apply_params(&mut self, params: &ParameterSet) -> Result<(), StrategyError> {
        let mut next = self.params.clone();
        for (name, value) in params.iter() {
            let v = numeric(name, value)?;
            match name {
                "rise_threshold" => next.rise_threshold = in_range(name, v, 1e-6, 10.0)?,
                "max_days" => {
                    if v.fract() != 0.0 {
                        return Err(StrategyError::WrongType {
                            name: name.to_string(),
                            expected: "integer".to_string(),
                        });
                    }
                    next.max_days = in_range(name, v, 1.0, 10_000.0)? as usize;
                }
                "rsi_oversold_threshold" => {
                    next.rsi_oversold_threshold = in_range(name, v, 0.0, 100.0)?
                }
                "rsi_low_threshold" => next.rsi_low_threshold = in_range(name, v, 0.0, 100.0)?,
                "final_threshold" => next.final_threshold = in_range(name, v, 0.0, 1.0)?,
                "dynamic_confidence_adjustment" => {
                    next.dynamic_confidence_adjustment = in_range(name, v, 0.0, 1.0)?
                }
                "market_sentiment_weight" => {
                    next.market_sentiment_weight = in_range(name, v, 0.0, 1.0)?
                }
                "trend_strength_weight" => {
                    next.trend_strength_weight = in_range(name, v, 0.0, 1.0)?
                }
                _ => {
                    return Err(StrategyError::UnknownParameter {
                        name: name.to_string(),
                    });
                }
            }
        }
        self.params = next;
        Ok(())
    }

    fn backtest(&self, data: &[Bar]) -> Vec<DetectionEvent> {
        let series = match IndicatorSeries::compute(data) {
            Ok(s) => s,
            Err(e) => {
                error!("ConfidenceLowPoint: indicator computation failed: {}", e);
                return Vec::new();
            }
        };

        data.iter()
            .enumerate()
            .map(|(i, bar)| {
                let confidence = if series.is_warm(i) {
                    self.confidence(&series, i)
                } else {
                    0.0
                };
                let (max_rise, days_to_target, success) = self.outcome(&series.close, i);
                DetectionEvent {
                    index: i,
                    date: bar.date,
                    price: bar.close,
                    is_low_point: series.is_warm(i) && confidence >= self.params.final_threshold,
                    confidence,
                    max_rise,
                    days_to_target,
                    success,
                }
            })
            .collect()
    }

    fn evaluate(&self, events: &[DetectionEvent]) -> EvaluationResult {
        let points: Vec<&DetectionEvent> = events
            .iter()
            .filter(|e| e.is_low_point && e.success.is_some())
            .collect();
        if points.is_empty() {
            return EvaluationResult::empty();
        }

        let total = points.len() as f64;
        let successes: Vec<&&DetectionEvent> =
            points.iter().filter(|e| e.success == Some(true)).collect();
        let success_rate = successes.len() as f64 / total;
        let avg_rise = points.iter().filter_map(|e| e.max_rise).sum::<f64>() / total;

        let speed = if successes.is_empty() {
            0.0
        } else {
            let avg_days = successes
                .iter()
                .filter_map(|e| e.days_to_target)
                .sum::<usize>() as f64
                / successes.len() as f64;
            (1.0 - avg_days / self.params.max_days as f64).max(0.0)
        };

        let score = 0.5 * success_rate
            + 0.3 * (avg_rise / FULL_RISE_REFERENCE).clamp(0.0, 1.0)
            + 0.2 * speed;

        EvaluationResult {
            total_points: points.len(),
            success_rate,
            avg_rise,
            score,
        }
    }

    fn label_horizon(&self) -> usize {
        self.params.max_days
    }

    fn name(&self) -> &str {
        "ConfidenceLowPoint"
    }
}
