// Candlestick pattern rules

use super::helpers::{column_to_f64, RuleFn};
use polars::prelude::*;

/// Rule: hammer candle - small real body near the top of the range with a
/// long lower shadow. `body_ratio` caps body/range; `shadow_ratio` is the
/// minimum lower-shadow/body multiple.
pub struct HammerPattern {
    pub body_ratio: f64,
    pub shadow_ratio: f64,
}

impl RuleFn for HammerPattern {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let open = column_to_f64(df, "open")?;
        let high = column_to_f64(df, "high")?;
        let low = column_to_f64(df, "low")?;
        let close = column_to_f64(df, "close")?;
        let n = close.len();
        let mut bools = vec![false; n];
        for i in 0..n {
            let range = high[i] - low[i];
            if range <= 0.0 {
                continue;
            }
            let body = (close[i] - open[i]).abs();
            let lower_shadow = open[i].min(close[i]) - low[i];
            let upper_shadow = high[i] - open[i].max(close[i]);
            bools[i] = body > 0.0
                && body <= self.body_ratio * range
                && lower_shadow >= self.shadow_ratio * body
                && upper_shadow <= body;
        }
        Ok(BooleanChunked::new("hammer_pattern".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "hammer_pattern"
    }
}

/// Rule: bullish engulfing - a down candle followed by an up candle whose
/// body engulfs the previous body and is at least `min_body_ratio` times
/// its size.
pub struct EngulfingPattern {
    pub min_body_ratio: f64,
}

impl RuleFn for EngulfingPattern {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let open = column_to_f64(df, "open")?;
        let close = column_to_f64(df, "close")?;
        let n = close.len();
        let mut bools = vec![false; n];
        for i in 1..n {
            let prev_body = open[i - 1] - close[i - 1];
            let curr_body = close[i] - open[i];
            // previous bar bearish, current bullish
            if prev_body <= 0.0 || curr_body <= 0.0 {
                continue;
            }
            bools[i] = curr_body >= self.min_body_ratio * prev_body
                && open[i] <= close[i - 1]
                && close[i] >= open[i - 1];
        }
        Ok(BooleanChunked::new("engulfing_pattern".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "engulfing_pattern"
    }
}
