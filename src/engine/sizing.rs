use tracing::warn;

use crate::data::PriceFrame;
use crate::error::Result;
use crate::rules::volatility::calculate_atr;
use crate::rules::RulesConfig;

/// ATR lookback for risk sizing.
pub const SIZING_ATR_PERIOD: usize = 22;

/// ATR multiplier used when the exit conditions carry no ATR-based stop.
const DEFAULT_ATR_MULTIPLIER: f64 = 2.0;

/// Per-bar share sizes aligned to the frame: NaN on non-entry bars, whole
/// shares on entry bars sized so that one ATR-stop's worth of adverse move
/// risks `risk_per_trade_pct` of capital.
///
/// Risk per share is `ATR(22) x k`, where `k` comes from the trailing-stop
/// rule in the exit conditions when present, else 2.0. Zero shares when ATR
/// is zero or not yet defined - no trade.
pub fn size_series(
    price_data: &PriceFrame,
    entry_signals: &[bool],
    exit_conditions: &RulesConfig,
    initial_capital: f64,
    risk_per_trade_pct: f64,
) -> Result<Vec<f64>> {
    let atr = calculate_atr(price_data.df(), SIZING_ATR_PERIOD)?;
    let multiplier = exit_conditions
        .trailing_stop()
        .map_or(DEFAULT_ATR_MULTIPLIER, |(_, m)| m);
    let risk_amount = initial_capital * risk_per_trade_pct;

    let mut sizes = vec![f64::NAN; entry_signals.len()];
    for (t, &is_entry) in entry_signals.iter().enumerate() {
        if !is_entry {
            continue;
        }
        let risk_per_share = atr.get(t).copied().unwrap_or(f64::NAN) * multiplier;
        sizes[t] = if risk_per_share.is_finite() && risk_per_share > 0.0 {
            (risk_amount / risk_per_share).floor()
        } else {
            0.0
        };
    }
    Ok(sizes)
}

/// Debug-only replacement for the legacy unlimited-size mode: every entry
/// is sized at full capital. Metrics produced this way are not realistic.
pub fn debug_full_capital_sizes(
    price_data: &PriceFrame,
    entry_signals: &[bool],
    initial_capital: f64,
) -> Result<Vec<f64>> {
    warn!("debug unlimited sizing enabled; resulting metrics are not realistic");
    let close = price_data.column("close")?;
    let mut sizes = vec![f64::NAN; entry_signals.len()];
    for (t, &is_entry) in entry_signals.iter().enumerate() {
        if is_entry && close[t] > 0.0 {
            sizes[t] = (initial_capital / close[t]).floor();
        }
    }
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::registry::RuleSpec;
    use crate::rules::RuleDef;
    use chrono::NaiveDate;

    /// Frame with constant true range `tr` per bar, long enough for ATR(22).
    fn frame_with_tr(tr: f64, n: usize) -> PriceFrame {
        let dates: Vec<NaiveDate> = (0..n)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64))
            .collect();
        let close = vec![100.0; n];
        let open = close.clone();
        let high: Vec<f64> = close.iter().map(|c| c + tr / 2.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - tr / 2.0).collect();
        PriceFrame::from_parts("TEST", dates, open, high, low, close, vec![1000.0; n]).unwrap()
    }

    fn entry_at(n: usize, idx: usize) -> Vec<bool> {
        let mut entries = vec![false; n];
        entries[idx] = true;
        entries
    }

    #[test]
    fn hand_calc_atr_two_gives_250_shares() {
        // ATR = 2.0, default multiplier 2.0 → risk/share 4.0;
        // 100k x 1% = 1000 → floor(1000/4) = 250
        let frame = frame_with_tr(2.0, 40);
        let entries = entry_at(40, 30);
        let sizes = size_series(&frame, &entries, &RulesConfig::default(), 100_000.0, 0.01).unwrap();
        assert_eq!(sizes[30], 250.0);
        assert!(sizes[29].is_nan(), "non-entry bars stay NaN");
    }

    #[test]
    fn higher_atr_means_fewer_shares() {
        let volatile = frame_with_tr(10.0, 40);
        let entries = entry_at(40, 30);
        let sizes =
            size_series(&volatile, &entries, &RulesConfig::default(), 100_000.0, 0.01).unwrap();
        assert_eq!(sizes[30], 20.0);
    }

    #[test]
    fn chandelier_multiplier_overrides_default() {
        let frame = frame_with_tr(2.0, 40);
        let entries = entry_at(40, 30);
        let rules = RulesConfig {
            exit_conditions: vec![RuleDef::new(
                "trail",
                RuleSpec::ChandelierExit {
                    atr_period: 22,
                    atr_multiplier: 4.0,
                },
            )],
            ..RulesConfig::default()
        }
        .bind()
        .unwrap();
        let sizes = size_series(&frame, &entries, &rules, 100_000.0, 0.01).unwrap();
        // risk/share = 2.0 x 4.0 = 8.0 → floor(1000/8) = 125
        assert_eq!(sizes[30], 125.0);
    }

    #[test]
    fn zero_atr_sizes_zero() {
        let frame = frame_with_tr(0.0, 40);
        let entries = entry_at(40, 30);
        let sizes = size_series(&frame, &entries, &RulesConfig::default(), 100_000.0, 0.01).unwrap();
        assert_eq!(sizes[30], 0.0);
    }

    #[test]
    fn entry_inside_atr_warmup_sizes_zero() {
        let frame = frame_with_tr(2.0, 40);
        let entries = entry_at(40, 5);
        let sizes = size_series(&frame, &entries, &RulesConfig::default(), 100_000.0, 0.01).unwrap();
        assert_eq!(sizes[5], 0.0, "ATR undefined during warmup");
    }

    #[test]
    fn dollar_risk_within_one_share_of_target() {
        let frame = frame_with_tr(3.0, 40);
        let entries = entry_at(40, 30);
        let sizes = size_series(&frame, &entries, &RulesConfig::default(), 100_000.0, 0.01).unwrap();
        let risk_per_share = 3.0 * 2.0;
        let actual_risk = sizes[30] * risk_per_share;
        assert!(actual_risk <= 1000.0);
        assert!(1000.0 - actual_risk < risk_per_share);
    }

    #[test]
    fn debug_sizing_uses_full_capital() {
        let frame = frame_with_tr(2.0, 40);
        let entries = entry_at(40, 30);
        let sizes = debug_full_capital_sizes(&frame, &entries, 100_000.0).unwrap();
        assert_eq!(sizes[30], 1000.0);
    }
}
