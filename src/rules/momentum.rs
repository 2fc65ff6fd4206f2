// Momentum rules: RSI, MACD

use super::helpers::{column_to_f64, cross_above, cross_below, pad_series, shift_one, wilder_rsi, RuleFn};
use polars::prelude::*;
use rust_ti::standard_indicators::bulk as sti;

/// Rule: Wilder RSI crosses from at-or-above the threshold to below it.
/// A level condition alone would fire on every oversold bar; the crossing
/// form fires once per dip.
pub struct RsiOversold {
    pub period: usize,
    pub oversold_threshold: f64,
}

impl RuleFn for RsiOversold {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let prices = column_to_f64(df, "close")?;
        let n = prices.len();
        if n < self.period + 2 {
            return Ok(BooleanChunked::new("rsi_oversold".into(), vec![false; n]).into_series());
        }
        let rsi = shift_one(&wilder_rsi(&prices, self.period));
        let threshold = vec![self.oversold_threshold; n];
        let bools = cross_below(&rsi, &threshold);
        Ok(BooleanChunked::new("rsi_oversold".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "rsi_oversold"
    }
}

/// Rule: MACD line crosses strictly above its signal line.
/// MACD line = EMA(fast) - EMA(slow); signal line = EMA(signal) of the MACD
/// line. Warmup is `slow + signal` bars.
pub struct MacdCrossover {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl RuleFn for MacdCrossover {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let prices = column_to_f64(df, "close")?;
        let n = prices.len();
        if n < self.slow + self.signal {
            return Ok(BooleanChunked::new("macd_crossover".into(), vec![false; n]).into_series());
        }
        let fast_ema = pad_series(&sti::exponential_moving_average(&prices, self.fast), n);
        let slow_ema = pad_series(&sti::exponential_moving_average(&prices, self.slow), n);
        let macd_line: Vec<f64> = fast_ema
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();
        let macd_valid: Vec<f64> = macd_line.iter().copied().filter(|v| !v.is_nan()).collect();
        let signal_line = pad_series(
            &sti::exponential_moving_average(&macd_valid, self.signal),
            n,
        );
        let bools = cross_above(&shift_one(&macd_line), &shift_one(&signal_line));
        Ok(BooleanChunked::new("macd_crossover".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "macd_crossover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_df(close: &[f64]) -> DataFrame {
        df! { "close" => close }.unwrap()
    }

    #[test]
    fn rsi_oversold_fires_on_cross_not_level() {
        // Ramp up, sharp sell-off, then grind lower: RSI crosses below 30
        // once and stays oversold - only the crossing bar fires.
        let mut close: Vec<f64> = (0..30).map(|i| 100.0 + f64::from(i)).collect();
        for i in 0..20 {
            close.push(129.0 - 4.0 * f64::from(i));
        }
        let df = close_df(&close);
        let rule = RsiOversold {
            period: 14,
            oversold_threshold: 30.0,
        };
        let result = rule.evaluate(&df).unwrap();
        let bools = result.bool().unwrap();
        let fired: Vec<usize> = bools
            .into_no_null_iter()
            .enumerate()
            .filter_map(|(i, b)| b.then_some(i))
            .collect();
        assert_eq!(fired.len(), 1, "crossing rule fires exactly once, got {fired:?}");
        assert!(fired[0] > 30, "cross happens after the sell-off starts");
    }

    #[test]
    fn rsi_insufficient_data_all_false() {
        let df = close_df(&[100.0, 101.0, 99.0]);
        let rule = RsiOversold {
            period: 14,
            oversold_threshold: 30.0,
        };
        let result = rule.evaluate(&df).unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.bool().unwrap().into_no_null_iter().all(|b| !b));
    }

    #[test]
    fn macd_crossover_length_and_warmup() {
        let close: Vec<f64> = (0..60)
            .map(|i| 100.0 + (f64::from(i) * 0.4).sin() * 5.0 + f64::from(i) * 0.1)
            .collect();
        let df = close_df(&close);
        let rule = MacdCrossover {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        let result = rule.evaluate(&df).unwrap();
        assert_eq!(result.len(), 60);
        let bools = result.bool().unwrap();
        for i in 0..(26 + 9) {
            assert!(!bools.get(i).unwrap(), "bar {i} is inside MACD warmup");
        }
    }

    #[test]
    fn macd_fires_after_downtrend_reverses() {
        // Long decline then strong recovery: the MACD line must cross above
        // its signal line somewhere in the recovery.
        let mut close: Vec<f64> = (0..50).map(|i| 200.0 - 2.0 * f64::from(i)).collect();
        for i in 0..40 {
            close.push(102.0 + 3.0 * f64::from(i));
        }
        let df = close_df(&close);
        let rule = MacdCrossover {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        let result = rule.evaluate(&df).unwrap();
        let bools = result.bool().unwrap();
        let fired: Vec<usize> = bools
            .into_no_null_iter()
            .enumerate()
            .filter_map(|(i, b)| b.then_some(i))
            .collect();
        assert!(
            fired.iter().any(|&i| i >= 50),
            "expected a bullish MACD cross in the recovery leg, got {fired:?}"
        );
    }

    #[test]
    fn macd_insufficient_data_all_false() {
        let close: Vec<f64> = (0..20).map(|i| 100.0 + f64::from(i)).collect();
        let df = close_df(&close);
        let rule = MacdCrossover {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        let result = rule.evaluate(&df).unwrap();
        assert!(result.bool().unwrap().into_no_null_iter().all(|b| !b));
    }
}
