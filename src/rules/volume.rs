// Volume rules

use super::helpers::{column_to_f64, pad_series, shift_one, RuleFn};
use polars::prelude::*;
use rust_ti::standard_indicators::bulk as sti;

/// Rule: unusual volume confirming a real price move. True when volume
/// exceeds `spike_multiplier` times its trailing average and the absolute
/// daily close change exceeds `price_change_threshold`.
pub struct VolumeSpike {
    pub period: usize,
    pub spike_multiplier: f64,
    pub price_change_threshold: f64,
}

impl RuleFn for VolumeSpike {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let volume = column_to_f64(df, "volume")?;
        let close = column_to_f64(df, "close")?;
        let n = volume.len();
        if n <= self.period {
            return Ok(BooleanChunked::new("volume_spike".into(), vec![false; n]).into_series());
        }
        let avg_volume = shift_one(&pad_series(
            &sti::simple_moving_average(&volume, self.period),
            n,
        ));
        let mut bools = vec![false; n];
        for i in 1..n {
            if avg_volume[i].is_nan() || close[i - 1] <= 0.0 {
                continue;
            }
            let pct_change = (close[i] - close[i - 1]) / close[i - 1];
            bools[i] = volume[i] > self.spike_multiplier * avg_volume[i]
                && pct_change.abs() > self.price_change_threshold;
        }
        Ok(BooleanChunked::new("volume_spike".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "volume_spike"
    }
}
