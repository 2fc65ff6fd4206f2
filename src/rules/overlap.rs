// Moving-average rules: SMA/EMA crossovers

use super::helpers::{column_to_f64, cross_above, cross_below, pad_series, shift_one, RuleFn};
use polars::prelude::*;
use rust_ti::standard_indicators::bulk as sti;

/// Rule: fast SMA crosses strictly above slow SMA (golden cross).
/// Indicators are read over completed bars, so the earliest possible signal
/// lands one bar after the raw crossing; warmup equals `slow_period`.
pub struct SmaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl RuleFn for SmaCrossover {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let prices = column_to_f64(df, "close")?;
        let n = prices.len();
        if n <= self.slow_period {
            return Ok(BooleanChunked::new("sma_crossover".into(), vec![false; n]).into_series());
        }
        let fast = shift_one(&pad_series(
            &sti::simple_moving_average(&prices, self.fast_period),
            n,
        ));
        let slow = shift_one(&pad_series(
            &sti::simple_moving_average(&prices, self.slow_period),
            n,
        ));
        let bools = cross_above(&fast, &slow);
        Ok(BooleanChunked::new("sma_crossover".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "sma_crossover"
    }
}

/// Rule: fast SMA crosses strictly below slow SMA (death cross).
/// The bearish mirror of [`SmaCrossover`], used as an indicator exit.
pub struct SmaCrossUnder {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl RuleFn for SmaCrossUnder {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let prices = column_to_f64(df, "close")?;
        let n = prices.len();
        if n <= self.slow_period {
            return Ok(BooleanChunked::new("sma_cross_under".into(), vec![false; n]).into_series());
        }
        let fast = shift_one(&pad_series(
            &sti::simple_moving_average(&prices, self.fast_period),
            n,
        ));
        let slow = shift_one(&pad_series(
            &sti::simple_moving_average(&prices, self.slow_period),
            n,
        ));
        let bools = cross_below(&fast, &slow);
        Ok(BooleanChunked::new("sma_cross_under".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "sma_cross_under"
    }
}

/// Rule: fast EMA crosses strictly above slow EMA.
pub struct EmaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl RuleFn for EmaCrossover {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let prices = column_to_f64(df, "close")?;
        let n = prices.len();
        if n <= self.slow_period {
            return Ok(BooleanChunked::new("ema_crossover".into(), vec![false; n]).into_series());
        }
        let fast = shift_one(&pad_series(
            &sti::exponential_moving_average(&prices, self.fast_period),
            n,
        ));
        let slow = shift_one(&pad_series(
            &sti::exponential_moving_average(&prices, self.slow_period),
            n,
        ));
        let bools = cross_above(&fast, &slow);
        Ok(BooleanChunked::new("ema_crossover".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "ema_crossover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_df(close: &[f64]) -> DataFrame {
        df! { "close" => close }.unwrap()
    }

    #[test]
    fn sma_crossover_fires_at_index_six() {
        // Five flat bars then a steady ramp: the 2-bar SMA overtakes the
        // 5-bar SMA on completed data first visible at index 6.
        let df = close_df(&[10.0, 10.0, 10.0, 10.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        let rule = SmaCrossover {
            fast_period: 2,
            slow_period: 5,
        };
        let result = rule.evaluate(&df).unwrap();
        let bools = result.bool().unwrap();
        let fired: Vec<usize> = bools
            .into_no_null_iter()
            .enumerate()
            .filter_map(|(i, b)| b.then_some(i))
            .collect();
        assert_eq!(fired, vec![6]);
    }

    #[test]
    fn sma_crossover_output_length_matches_input() {
        let df = close_df(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0]);
        let rule = SmaCrossover {
            fast_period: 2,
            slow_period: 5,
        };
        assert_eq!(rule.evaluate(&df).unwrap().len(), 8);
    }

    #[test]
    fn sma_cross_under_mirrors_crossover() {
        let df = close_df(&[15.0, 15.0, 15.0, 15.0, 15.0, 14.0, 13.0, 12.0, 11.0, 10.0]);
        let rule = SmaCrossUnder {
            fast_period: 2,
            slow_period: 5,
        };
        let result = rule.evaluate(&df).unwrap();
        let bools = result.bool().unwrap();
        let fired: Vec<usize> = bools
            .into_no_null_iter()
            .enumerate()
            .filter_map(|(i, b)| b.then_some(i))
            .collect();
        assert_eq!(fired, vec![6]);
    }

    #[test]
    fn sma_double_window_is_mean_of_two_half_windows() {
        // SMA(2n)[i] must equal the mean of SMA(n)[i-n] and SMA(n)[i].
        let prices: Vec<f64> = (0..40)
            .map(|i| 100.0 + (f64::from(i) * 0.7).sin() * 9.0)
            .collect();
        let n = 5;
        let len = prices.len();
        let half = pad_series(&sti::simple_moving_average(&prices, n), len);
        let full = pad_series(&sti::simple_moving_average(&prices, 2 * n), len);
        for i in (2 * n - 1)..len {
            let expected = (half[i - n] + half[i]) / 2.0;
            assert!(
                (full[i] - expected).abs() < 1e-9,
                "SMA alignment broken at {i}: {} vs {expected}",
                full[i]
            );
        }
    }

    #[test]
    fn insufficient_data_returns_all_false() {
        let df = close_df(&[10.0, 11.0]);
        let rule = EmaCrossover {
            fast_period: 2,
            slow_period: 5,
        };
        let result = rule.evaluate(&df).unwrap();
        let bools = result.bool().unwrap();
        assert_eq!(result.len(), 2);
        assert!(bools.into_no_null_iter().all(|b| !b));
    }

    #[test]
    fn warmup_bars_are_false() {
        let df = close_df(&[10.0, 10.0, 10.0, 10.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        let rule = SmaCrossover {
            fast_period: 2,
            slow_period: 5,
        };
        let result = rule.evaluate(&df).unwrap();
        let bools = result.bool().unwrap();
        for i in 0..=5 {
            assert!(!bools.get(i).unwrap(), "bar {i} is inside warmup");
        }
    }
}
