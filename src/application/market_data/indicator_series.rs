//! Per-bar technical indicators shared by the reference strategy and the
//! classifier's feature extraction.

use crate::domain::market::Bar;
use anyhow::{Result, anyhow};
use ta::Next;
use ta::indicators::{
    BollingerBands, Maximum, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage, StandardDeviation,
};

/// Bars needed before every indicator has a full window.
pub const WARMUP_BARS: usize = 60;

/// Indicator values aligned with the input bars (index `i` describes bar `i`).
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub rsi: Vec<f64>,
    pub macd_hist: Vec<f64>,
    pub bb_upper: Vec<f64>,
    pub bb_middle: Vec<f64>,
    pub bb_lower: Vec<f64>,
    pub ma5: Vec<f64>,
    pub ma20: Vec<f64>,
    pub ma60: Vec<f64>,
    /// Highest close over the last 60 bars
    pub high60: Vec<f64>,
    /// Standard deviation of daily returns over 20 bars
    pub volatility20: Vec<f64>,
    pub volume_ma20: Vec<f64>,
}

struct IndicatorSet {
    rsi: RelativeStrengthIndex,
    macd: MovingAverageConvergenceDivergence,
    bb: BollingerBands,
    sma_5: SimpleMovingAverage,
    sma_20: SimpleMovingAverage,
    sma_60: SimpleMovingAverage,
    max_60: Maximum,
    ret_std_20: StandardDeviation,
    volume_sma_20: SimpleMovingAverage,
}

impl IndicatorSet {
    fn new() -> Result<Self> {
        let err = |e| anyhow!("Indicator init failed: {:?}", e);
        Ok(Self {
            rsi: RelativeStrengthIndex::new(14).map_err(err)?,
            macd: MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(err)?,
            bb: BollingerBands::new(20, 2.0).map_err(err)?,
            sma_5: SimpleMovingAverage::new(5).map_err(err)?,
            sma_20: SimpleMovingAverage::new(20).map_err(err)?,
            sma_60: SimpleMovingAverage::new(WARMUP_BARS).map_err(err)?,
            max_60: Maximum::new(WARMUP_BARS).map_err(err)?,
            ret_std_20: StandardDeviation::new(20).map_err(err)?,
            volume_sma_20: SimpleMovingAverage::new(20).map_err(err)?,
        })
    }
}

impl IndicatorSeries {
    pub fn compute(bars: &[Bar]) -> Result<Self> {
        let mut set = IndicatorSet::new()?;
        let n = bars.len();
        let mut series = IndicatorSeries {
            close: Vec::with_capacity(n),
            volume: Vec::with_capacity(n),
            rsi: Vec::with_capacity(n),
            macd_hist: Vec::with_capacity(n),
            bb_upper: Vec::with_capacity(n),
            bb_middle: Vec::with_capacity(n),
            bb_lower: Vec::with_capacity(n),
            ma5: Vec::with_capacity(n),
            ma20: Vec::with_capacity(n),
            ma60: Vec::with_capacity(n),
            high60: Vec::with_capacity(n),
            volatility20: Vec::with_capacity(n),
            volume_ma20: Vec::with_capacity(n),
        };

        let mut prev_close: Option<f64> = None;
        for bar in bars {
            let close = bar.close;
            let daily_return = match prev_close {
                Some(p) if p > 0.0 => close / p - 1.0,
                _ => 0.0,
            };
            prev_close = Some(close);

            let macd = set.macd.next(close);
            let bb = set.bb.next(close);

            series.close.push(close);
            series.volume.push(bar.volume);
            series.rsi.push(set.rsi.next(close));
            series.macd_hist.push(macd.histogram);
            series.bb_upper.push(bb.upper);
            series.bb_middle.push(bb.average);
            series.bb_lower.push(bb.lower);
            series.ma5.push(set.sma_5.next(close));
            series.ma20.push(set.sma_20.next(close));
            series.ma60.push(set.sma_60.next(close));
            series.high60.push(set.max_60.next(close));
            series.volatility20.push(set.ret_std_20.next(daily_return));
            series.volume_ma20.push(set.volume_sma_20.next(bar.volume));
        }

        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// True once bar `i` has a full 60-bar history behind it.
    pub fn is_warm(&self, i: usize) -> bool {
        i + 1 >= WARMUP_BARS && i < self.len()
    }

    /// Close-to-close return over `lag` bars ending at `i`; 0 without history.
    pub fn trailing_return(&self, i: usize, lag: usize) -> f64 {
        if i < lag || i >= self.len() {
            return 0.0;
        }
        let base = self.close[i - lag];
        if base > 0.0 { self.close[i] / base - 1.0 } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(start + Duration::days(i as i64), c, c, c, c, 1000.0))
            .collect()
    }

    #[test]
    fn test_series_aligned_with_bars() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let series = IndicatorSeries::compute(&bars(&closes)).unwrap();
        assert_eq!(series.len(), 80);
        assert_eq!(series.rsi.len(), 80);
        assert_eq!(series.volume_ma20.len(), 80);
        assert!(!series.is_warm(58));
        assert!(series.is_warm(59));
    }

    #[test]
    fn test_rising_series_indicators() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let series = IndicatorSeries::compute(&bars(&closes)).unwrap();
        let last = series.len() - 1;
        assert!(series.rsi[last] > 70.0);
        assert!(series.close[last] > series.ma20[last]);
        assert_eq!(series.high60[last], closes[last]);
        assert!((series.trailing_return(last, 1) - (179.0 / 178.0 - 1.0)).abs() < 1e-12);
        assert_eq!(series.trailing_return(0, 5), 0.0);
    }

    #[test]
    fn test_empty_input() {
        let series = IndicatorSeries::compute(&[]).unwrap();
        assert!(series.is_empty());
        assert!(!series.is_warm(0));
    }
}
