use crate::application::market_data::indicator_series::IndicatorSeries;
use crate::domain::market::Bar;
use crate::domain::ml::FeatureRow;
use anyhow::Result;

/// Feature row for bar `i`, or `None` while indicators are warming up or a
/// value is not finite.
pub fn feature_row(series: &IndicatorSeries, i: usize) -> Option<FeatureRow> {
    if !series.is_warm(i) {
        return None;
    }

    let close = series.close[i];
    let band = series.bb_upper[i] - series.bb_lower[i];
    let row = FeatureRow {
        rsi: series.rsi[i],
        macd_hist: ratio(series.macd_hist[i], close),
        bb_position: if band > 0.0 {
            (close - series.bb_lower[i]) / band
        } else {
            0.5
        },
        bb_width: ratio(band, series.bb_middle[i]),
        price_to_ma5: ratio(close, series.ma5[i]) - 1.0,
        price_to_ma20: ratio(close, series.ma20[i]) - 1.0,
        price_to_ma60: ratio(close, series.ma60[i]) - 1.0,
        return_1d: series.trailing_return(i, 1),
        return_5d: series.trailing_return(i, 5),
        return_20d: series.trailing_return(i, 20),
        volatility_20d: series.volatility20[i],
        volume_ratio: if series.volume_ma20[i] > 0.0 {
            series.volume[i] / series.volume_ma20[i]
        } else {
            1.0
        },
    };

    is_finite(&row).then_some(row)
}

/// All warmed-up rows with the index of the bar they describe.
pub fn feature_rows(bars: &[Bar]) -> Result<Vec<(usize, FeatureRow)>> {
    let series = IndicatorSeries::compute(bars)?;
    Ok((0..series.len())
        .filter_map(|i| feature_row(&series, i).map(|row| (i, row)))
        .collect())
}

fn ratio(num: f64, den: f64) -> f64 {
    if den != 0.0 { num / den } else { 0.0 }
}

fn is_finite(row: &FeatureRow) -> bool {
    crate::domain::ml::features_to_vector(row)
        .iter()
        .all(|v| v.is_finite())
}
