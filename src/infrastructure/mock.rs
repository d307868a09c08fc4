//! Deterministic synthetic market for demos and tests.

use crate::domain::market::Bar;
use crate::domain::ports::DataModule;
use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Seeded random walk over weekdays with periodic sell-offs and rebounds.
///
/// The same seed and start date always produce the same bars, so the
/// low points a strategy finds are reproducible across runs.
#[derive(Debug, Clone)]
pub struct SyntheticDataModule {
    pub seed: u64,
    pub start_price: f64,
    /// Daily drift of the walk
    pub drift: f64,
    /// Half-width of the uniform daily noise
    pub volatility: f64,
    /// Bars between the start of two sell-offs
    pub dip_period: usize,
    pub dip_days: usize,
    pub dip_step: f64,
    pub rebound_days: usize,
    pub rebound_step: f64,
}

impl SyntheticDataModule {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_price: 5_000.0,
            drift: 0.0002,
            volatility: 0.012,
            dip_period: 45,
            dip_days: 5,
            dip_step: -0.022,
            rebound_days: 8,
            rebound_step: 0.012,
        }
    }

    /// Cycle-driven return component for the bar at `i`.
    fn regime_return(&self, i: usize) -> f64 {
        if self.dip_period == 0 {
            return 0.0;
        }
        // Leave the first cycle quiet so indicators warm up on a plain walk
        let phase = i % self.dip_period;
        if i < self.dip_period {
            0.0
        } else if phase < self.dip_days {
            self.dip_step
        } else if phase < self.dip_days + self.rebound_days {
            self.rebound_step
        } else {
            0.0
        }
    }

    pub fn generate(&self, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut bars = Vec::new();
        let mut close = self.start_price;

        for date in start.iter_days().take_while(|d| *d <= end) {
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            let i = bars.len();
            let noise = rng.random_range(-self.volatility..=self.volatility);
            let open = close;
            close = (open * (1.0 + self.drift + noise + self.regime_return(i))).max(0.01);

            let wick = rng.random_range(0.0..=self.volatility / 2.0);
            let high = open.max(close) * (1.0 + wick);
            let low = open.min(close) * (1.0 - wick);
            let stressed = self.regime_return(i) < 0.0;
            let volume = 1_000_000.0 * rng.random_range(0.8..1.2) * if stressed { 1.5 } else { 1.0 };

            bars.push(Bar::new(date, open, high, low, close, volume));
        }

        debug!("Synthetic: Generated {} bars from {} to {}", bars.len(), start, end);
        bars
    }
}

impl Default for SyntheticDataModule {
    fn default() -> Self {
        Self::new(42)
    }
}

impl DataModule for SyntheticDataModule {
    fn history(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
        if start > end {
            bail!("Start date {} is after end date {}", start, end);
        }
        Ok(self.generate(start, end))
    }
}
