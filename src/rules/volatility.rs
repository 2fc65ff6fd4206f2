// Volatility rules: Bollinger squeeze breakout, ATR helper

use super::helpers::{column_to_f64, pad_series, wilder_atr, RuleFn};
use polars::prelude::*;

/// Wilder-smoothed ATR over a full OHLC frame, aligned to the frame height.
/// Shared by the position sizer, the trailing-stop simulator and the
/// position lifecycle; warmup bars are NaN.
pub fn calculate_atr(df: &DataFrame, period: usize) -> Result<Vec<f64>, PolarsError> {
    let high = column_to_f64(df, "high")?;
    let low = column_to_f64(df, "low")?;
    let close = column_to_f64(df, "close")?;
    Ok(wilder_atr(&high, &low, &close, period))
}

/// Rule: volatility contraction then breakout. True when the previous bar's
/// normalized Bollinger band width `(upper - lower) / middle` was below the
/// squeeze threshold and the current close breaks above the band formed by
/// completed bars.
pub struct BollingerSqueeze {
    pub period: usize,
    pub std_dev: f64,
    pub squeeze_threshold: f64,
}

impl RuleFn for BollingerSqueeze {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let prices = column_to_f64(df, "close")?;
        let n = prices.len();
        if n <= self.period {
            return Ok(
                BooleanChunked::new("bollinger_squeeze".into(), vec![false; n]).into_series()
            );
        }
        let bands = rust_ti::candle_indicators::bulk::moving_constant_bands(
            &prices,
            rust_ti::ConstantModelType::SimpleMovingAverage,
            rust_ti::DeviationModel::StandardDeviation,
            self.std_dev,
            self.period,
        );
        let lower = pad_series(&bands.iter().map(|t| t.0).collect::<Vec<f64>>(), n);
        let middle = pad_series(&bands.iter().map(|t| t.1).collect::<Vec<f64>>(), n);
        let upper = pad_series(&bands.iter().map(|t| t.2).collect::<Vec<f64>>(), n);

        let mut bools = vec![false; n];
        for i in 1..n {
            let prev_valid =
                !upper[i - 1].is_nan() && !lower[i - 1].is_nan() && middle[i - 1] > 0.0;
            if !prev_valid {
                continue;
            }
            let width = (upper[i - 1] - lower[i - 1]) / middle[i - 1];
            bools[i] = width < self.squeeze_threshold && prices[i] > upper[i - 1];
        }
        Ok(BooleanChunked::new("bollinger_squeeze".into(), &bools).into_series())
    }
    fn name(&self) -> &'static str {
        "bollinger_squeeze"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atr_aligned_to_frame_height() {
        let df = df! {
            "high" => &[105.0, 108.0, 109.0, 112.0, 113.0],
            "low" => &[98.0, 101.0, 104.0, 105.0, 108.0],
            "close" => &[103.0, 106.0, 107.0, 110.0, 111.0],
        }
        .unwrap();
        let atr = calculate_atr(&df, 3).unwrap();
        assert_eq!(atr.len(), 5);
        assert!(atr[1].is_nan());
        assert!((atr[2] - 17.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn squeeze_fires_on_breakout_from_tight_range() {
        // 20 bars pinned in a 0.2% range, then a hard breakout bar.
        let mut close = vec![100.0; 20];
        for (i, c) in close.iter_mut().enumerate() {
            *c += if i % 2 == 0 { 0.1 } else { -0.1 };
        }
        close.push(104.0);
        let df = df! { "close" => &close }.unwrap();
        let rule = BollingerSqueeze {
            period: 10,
            std_dev: 2.0,
            squeeze_threshold: 0.05,
        };
        let result = rule.evaluate(&df).unwrap();
        let bools = result.bool().unwrap();
        assert!(bools.get(20).unwrap(), "breakout bar should fire");
    }

    #[test]
    fn squeeze_quiet_range_never_fires() {
        let mut close = vec![100.0; 30];
        for (i, c) in close.iter_mut().enumerate() {
            *c += if i % 2 == 0 { 0.1 } else { -0.1 };
        }
        let df = df! { "close" => &close }.unwrap();
        let rule = BollingerSqueeze {
            period: 10,
            std_dev: 2.0,
            squeeze_threshold: 0.05,
        };
        let result = rule.evaluate(&df).unwrap();
        assert!(result.bool().unwrap().into_no_null_iter().all(|b| !b));
    }

    #[test]
    fn squeeze_insufficient_data_all_false() {
        let df = df! { "close" => &[100.0, 100.1, 99.9] }.unwrap();
        let rule = BollingerSqueeze {
            period: 20,
            std_dev: 2.0,
            squeeze_threshold: 0.1,
        };
        let result = rule.evaluate(&df).unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.bool().unwrap().into_no_null_iter().all(|b| !b));
    }
}
