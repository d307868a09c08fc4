// Market data processing
pub mod indicator_series;

pub use indicator_series::{IndicatorSeries, WARMUP_BARS};
