use polars::prelude::*;

/// A rule takes an OHLCV `DataFrame` and returns a boolean Series indicating
/// which bars meet the rule criteria. Pure: no I/O, no hidden state.
pub trait RuleFn: Send + Sync {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError>;
    fn name(&self) -> &str;
}

/// Extract a column as `Vec<f64>`, casting integer columns (e.g. volume).
/// Nulls become NaN so downstream comparisons yield `false`, never panic.
pub fn column_to_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>, PolarsError> {
    let col = df.column(name)?.cast(&DataType::Float64)?;
    let ca = col.f64()?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Left-pad a bulk indicator output with NaN to length `n`.
/// `rust_ti` bulk functions return `n - period + 1` values aligned at the end.
pub fn pad_series(values: &[f64], n: usize) -> Vec<f64> {
    let pad = n.saturating_sub(values.len());
    let mut out = vec![f64::NAN; pad];
    out.extend_from_slice(values);
    out
}

/// Shift a series one bar to the right (NaN in front, last value dropped).
///
/// Rule predicates compare indicators over completed bars only: a signal on
/// bar t may read data up to bar t-1. Shifting the indicator series once and
/// then applying the condition gives exactly that.
pub fn shift_one(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(f64::NAN);
    out.extend_from_slice(&values[..values.len() - 1]);
    out
}

/// True on bars where `fast` crosses strictly above `slow`
/// (fast > slow now, fast <= slow on the previous bar). NaN bars are false.
pub fn cross_above(fast: &[f64], slow: &[f64]) -> Vec<bool> {
    let n = fast.len().min(slow.len());
    let mut bools = vec![false; n];
    for i in 1..n {
        let prev_valid = !fast[i - 1].is_nan() && !slow[i - 1].is_nan();
        let curr_valid = !fast[i].is_nan() && !slow[i].is_nan();
        if prev_valid && curr_valid {
            bools[i] = fast[i] > slow[i] && fast[i - 1] <= slow[i - 1];
        }
    }
    bools
}

/// True on bars where `fast` crosses strictly below `slow`.
pub fn cross_below(fast: &[f64], slow: &[f64]) -> Vec<bool> {
    let n = fast.len().min(slow.len());
    let mut bools = vec![false; n];
    for i in 1..n {
        let prev_valid = !fast[i - 1].is_nan() && !slow[i - 1].is_nan();
        let curr_valid = !fast[i].is_nan() && !slow[i].is_nan();
        if prev_valid && curr_valid {
            bools[i] = fast[i] < slow[i] && fast[i - 1] >= slow[i - 1];
        }
    }
    bools
}

/// True Range per bar: `max(high-low, |high-prev_close|, |low-prev_close|)`.
/// The first bar uses `high - low` (no previous close).
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut tr = Vec::with_capacity(n);
    for i in 0..n {
        if i == 0 {
            tr.push(high[0] - low[0]);
        } else {
            let prev_close = close[i - 1];
            let hl = high[i] - low[i];
            let hc = (high[i] - prev_close).abs();
            let lc = (low[i] - prev_close).abs();
            tr.push(hl.max(hc).max(lc));
        }
    }
    tr
}

/// Wilder's smoothing: NaN until a full first window, SMA seed at index
/// `period - 1`, then `s[t] = (s[t-1]·(period-1) + x[t]) / period`.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    for i in period..n {
        out[i] = (out[i - 1] * (period as f64 - 1.0) + values[i]) / period as f64;
    }
    out
}

/// Wilder-smoothed Average True Range, aligned to the input length.
pub fn wilder_atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    wilder_smooth(&true_range(high, low, close), period)
}

/// Wilder-smoothed RSI, aligned to the input length.
/// First defined value lands at index `period` (the smoothing seed needs
/// `period` price changes). Flat windows (no losses) read as 100.
pub fn wilder_rsi(close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return out;
    }
    let mut gains = Vec::with_capacity(n - 1);
    let mut losses = Vec::with_capacity(n - 1);
    for i in 1..n {
        let delta = close[i] - close[i - 1];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }
    let avg_gain = wilder_smooth(&gains, period);
    let avg_loss = wilder_smooth(&losses, period);
    for i in 0..gains.len() {
        if avg_gain[i].is_nan() || avg_loss[i].is_nan() {
            continue;
        }
        let rsi = if avg_loss[i] == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain[i] / avg_loss[i])
        };
        out[i + 1] = rsi;
    }
    out
}
