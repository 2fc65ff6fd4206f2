use crate::data::PriceFrame;
use crate::error::Result;

use super::types::{ExitReason, Trade};

/// Chandelier trailing stop: exit level at bar t is
/// `max(high since entry) - multiplier x ATR[t]`.
pub struct TrailingSpec<'a> {
    pub multiplier: f64,
    pub atr: &'a [f64],
}

/// Everything the bar loop needs besides prices. Signal and size vectors
/// are aligned to the frame; bars before `window_start` never trade (they
/// exist only to warm up indicators).
pub struct SimInputs<'a> {
    pub entries: &'a [bool],
    /// Indicator exits by rule name; the first firing rule names the exit.
    pub named_exits: &'a [(String, Vec<bool>)],
    pub sizes: &'a [f64],
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub trailing: Option<TrailingSpec<'a>>,
    pub hold_period: usize,
    pub window_start: usize,
    pub initial_capital: f64,
}

pub struct SimOutcome {
    pub trades: Vec<Trade>,
    /// Daily mark-to-market returns from `window_start` onward.
    pub daily_returns: Vec<f64>,
    pub final_equity: f64,
}

struct OpenPosition {
    entry_bar: usize,
    entry_price: f64,
    shares: f64,
    peak_high: f64,
}

/// Run the bar loop: at most one open position at a time, entries at the
/// signal bar's close, exits by fixed priority
/// stop-loss > take-profit > trailing > indicator > time.
///
/// The entry bar is protected: stops are evaluated from the next bar
/// onward. Stop-loss and take-profit fill at their level (stop-loss checked
/// against the bar low, conservatively); every other exit fills at the bar
/// close. A position still open on the last bar closes there.
pub fn simulate(price: &PriceFrame, inputs: &SimInputs) -> Result<SimOutcome> {
    let n = price.len();
    let high = price.column("high")?;
    let low = price.column("low")?;
    let close = price.column("close")?;
    let dates = price.dates();

    let mut cash = inputs.initial_capital;
    let mut position: Option<OpenPosition> = None;
    let mut trades = Vec::new();
    let mut equity = Vec::with_capacity(n);

    for t in 0..n {
        let mut exited_this_bar = false;

        let mut fill: Option<(f64, ExitReason)> = None;
        if let Some(pos) = position.as_mut() {
            if t > pos.entry_bar {
                pos.peak_high = pos.peak_high.max(high[t]);
                fill = decide_exit(pos, t, &high, &low, &close, inputs);
            }
        }
        if let Some((exit_price, reason)) = fill {
            let pos = position.take().expect("fill implies an open position");
            cash += pos.shares * exit_price;
            trades.push(Trade {
                entry_date: dates[pos.entry_bar],
                exit_date: dates[t],
                entry_price: pos.entry_price,
                exit_price,
                shares: pos.shares,
                pnl: pos.shares * (exit_price - pos.entry_price),
                return_pct: exit_price / pos.entry_price - 1.0,
                bars_held: t - pos.entry_bar,
                exit_reason: reason,
            });
            exited_this_bar = true;
        }

        if position.is_none()
            && !exited_this_bar
            && t >= inputs.window_start
            && inputs.entries.get(t).copied().unwrap_or(false)
        {
            let shares = inputs.sizes.get(t).copied().unwrap_or(0.0);
            if shares.is_finite() && shares > 0.0 {
                cash -= shares * close[t];
                position = Some(OpenPosition {
                    entry_bar: t,
                    entry_price: close[t],
                    shares,
                    peak_high: high[t],
                });
            }
        }

        let marked = position
            .as_ref()
            .map_or(cash, |p| cash + p.shares * close[t]);
        equity.push(marked);
    }

    // Force-close anything still open at the end of data.
    if let Some(pos) = position.take() {
        let t = n - 1;
        let exit_price = close[t];
        cash += pos.shares * exit_price;
        trades.push(Trade {
            entry_date: dates[pos.entry_bar],
            exit_date: dates[t],
            entry_price: pos.entry_price,
            exit_price,
            shares: pos.shares,
            pnl: pos.shares * (exit_price - pos.entry_price),
            return_pct: exit_price / pos.entry_price - 1.0,
            bars_held: t - pos.entry_bar,
            exit_reason: ExitReason::EndOfData,
        });
        equity[t] = cash;
    }

    let mut daily_returns = Vec::new();
    for t in (inputs.window_start + 1)..n {
        if equity[t - 1] > 0.0 {
            daily_returns.push(equity[t] / equity[t - 1] - 1.0);
        }
    }

    Ok(SimOutcome {
        trades,
        daily_returns,
        final_equity: equity.last().copied().unwrap_or(inputs.initial_capital),
    })
}

fn decide_exit(
    pos: &OpenPosition,
    t: usize,
    high: &[f64],
    low: &[f64],
    close: &[f64],
    inputs: &SimInputs,
) -> Option<(f64, ExitReason)> {
    if let Some(sl) = inputs.stop_loss_pct {
        let stop_level = pos.entry_price * (1.0 - sl);
        if low[t] <= stop_level {
            return Some((stop_level, ExitReason::StopLoss { pct: sl }));
        }
    }
    if let Some(tp) = inputs.take_profit_pct {
        let target_level = pos.entry_price * (1.0 + tp);
        if high[t] >= target_level {
            return Some((target_level, ExitReason::TakeProfit { pct: tp }));
        }
    }
    if let Some(trailing) = &inputs.trailing {
        let atr = trailing.atr.get(t).copied().unwrap_or(f64::NAN);
        if atr.is_finite() {
            let level = pos.peak_high - trailing.multiplier * atr;
            if close[t] <= level {
                return Some((close[t], ExitReason::TrailingStop));
            }
        }
    }
    for (name, bools) in inputs.named_exits {
        if bools.get(t).copied().unwrap_or(false) {
            return Some((close[t], ExitReason::Rule { name: name.clone() }));
        }
    }
    if t - pos.entry_bar >= inputs.hold_period {
        return Some((
            close[t],
            ExitReason::TimeLimit {
                days: inputs.hold_period,
            },
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn frame(open: Vec<f64>, high: Vec<f64>, low: Vec<f64>, close: Vec<f64>) -> PriceFrame {
        let n = close.len();
        let dates: Vec<NaiveDate> = (0..n)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64))
            .collect();
        PriceFrame::from_parts("TEST", dates, open, high, low, close, vec![1000.0; n]).unwrap()
    }

    fn inputs<'a>(entries: &'a [bool], sizes: &'a [f64]) -> SimInputs<'a> {
        SimInputs {
            entries,
            named_exits: &[],
            sizes,
            stop_loss_pct: None,
            take_profit_pct: None,
            trailing: None,
            hold_period: 100,
            window_start: 0,
            initial_capital: 100_000.0,
        }
    }

    #[test]
    fn stop_loss_beats_take_profit_on_same_bar() {
        // Entry at 100; next bar spans 94..111 so both stop (95) and target
        // (110) are touched - the stop wins and fills at its level.
        let price = frame(
            vec![100.0, 100.0],
            vec![100.0, 111.0],
            vec![100.0, 94.0],
            vec![100.0, 100.0],
        );
        let entries = vec![true, false];
        let sizes = vec![10.0, f64::NAN];
        let mut inp = inputs(&entries, &sizes);
        inp.stop_loss_pct = Some(0.05);
        inp.take_profit_pct = Some(0.10);
        let out = simulate(&price, &inp).unwrap();
        assert_eq!(out.trades.len(), 1);
        let trade = &out.trades[0];
        assert!((trade.exit_price - 95.0).abs() < 1e-12);
        assert_eq!(trade.exit_reason.to_string(), "Stop-loss at -5.0%");
    }

    #[test]
    fn entry_bar_is_protected_from_stops() {
        // The entry bar itself dips below the stop level; no same-bar exit.
        let price = frame(
            vec![100.0, 100.0, 100.0],
            vec![100.0, 101.0, 101.0],
            vec![90.0, 99.0, 99.0],
            vec![100.0, 100.5, 101.0],
        );
        let entries = vec![true, false, false];
        let sizes = vec![10.0, f64::NAN, f64::NAN];
        let mut inp = inputs(&entries, &sizes);
        inp.stop_loss_pct = Some(0.05);
        let out = simulate(&price, &inp).unwrap();
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].exit_reason, ExitReason::EndOfData);
    }

    #[test]
    fn indicator_exit_beats_time_exit_on_same_bar() {
        let price = frame(
            vec![100.0; 4],
            vec![101.0; 4],
            vec![99.0; 4],
            vec![100.0, 100.0, 100.0, 102.0],
        );
        let entries = vec![true, false, false, false];
        let sizes = vec![10.0, f64::NAN, f64::NAN, f64::NAN];
        let named = vec![("death_cross".to_string(), vec![false, false, false, true])];
        let mut inp = inputs(&entries, &sizes);
        inp.named_exits = &named;
        inp.hold_period = 3;
        let out = simulate(&price, &inp).unwrap();
        assert_eq!(out.trades.len(), 1);
        assert_eq!(
            out.trades[0].exit_reason,
            ExitReason::Rule {
                name: "death_cross".into()
            }
        );
    }

    #[test]
    fn time_exit_fires_after_hold_period() {
        let n = 8;
        let price = frame(
            vec![100.0; n],
            vec![101.0; n],
            vec![99.0; n],
            vec![100.0; n],
        );
        let mut entries = vec![false; n];
        entries[1] = true;
        let mut sizes = vec![f64::NAN; n];
        sizes[1] = 10.0;
        let mut inp = inputs(&entries, &sizes);
        inp.hold_period = 3;
        let out = simulate(&price, &inp).unwrap();
        assert_eq!(out.trades.len(), 1);
        let trade = &out.trades[0];
        assert_eq!(trade.bars_held, 3);
        assert_eq!(trade.exit_reason, ExitReason::TimeLimit { days: 3 });
    }

    #[test]
    fn chandelier_exit_triggers_after_peak_fades() {
        // Rally to 120 then a slide: close falls under peak - 3xATR.
        let close = vec![100.0, 110.0, 120.0, 118.0, 112.0, 104.0];
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let price = frame(close.clone(), high, low, close);
        let entries = vec![true, false, false, false, false, false];
        let sizes = vec![10.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN];
        let atr = vec![2.0; 6];
        let trailing = TrailingSpec {
            multiplier: 3.0,
            atr: &atr,
        };
        let mut inp = inputs(&entries, &sizes);
        inp.trailing = Some(trailing);
        let out = simulate(&price, &inp).unwrap();
        assert_eq!(out.trades.len(), 1);
        let trade = &out.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TrailingStop);
        // peak high 121, level 115: first close at or below is 112 (bar 4)
        assert!((trade.exit_price - 112.0).abs() < 1e-12);
    }

    #[test]
    fn zero_size_entry_is_skipped() {
        let price = frame(
            vec![100.0, 100.0],
            vec![101.0, 101.0],
            vec![99.0, 99.0],
            vec![100.0, 100.0],
        );
        let entries = vec![true, false];
        let sizes = vec![0.0, f64::NAN];
        let out = simulate(&price, &inputs(&entries, &sizes)).unwrap();
        assert!(out.trades.is_empty());
        assert!((out.final_equity - 100_000.0).abs() < 1e-9);
    }

    #[test]
    fn entries_before_window_start_are_ignored() {
        let n = 6;
        let price = frame(
            vec![100.0; n],
            vec![101.0; n],
            vec![99.0; n],
            vec![100.0; n],
        );
        let entries = vec![true, false, false, true, false, false];
        let sizes = vec![10.0, f64::NAN, f64::NAN, 10.0, f64::NAN, f64::NAN];
        let mut inp = inputs(&entries, &sizes);
        inp.window_start = 2;
        let out = simulate(&price, &inp).unwrap();
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].entry_date, price.dates()[3]);
    }

    #[test]
    fn equity_reflects_stop_fill_not_close() {
        // Stop fill at 95 while the bar closes back at 100: the realized
        // equity keeps the conservative fill.
        let price = frame(
            vec![100.0, 100.0],
            vec![100.0, 100.0],
            vec![100.0, 94.0],
            vec![100.0, 100.0],
        );
        let entries = vec![true, false];
        let sizes = vec![10.0, f64::NAN];
        let mut inp = inputs(&entries, &sizes);
        inp.stop_loss_pct = Some(0.05);
        let out = simulate(&price, &inp).unwrap();
        assert!((out.final_equity - (100_000.0 - 10.0 * 5.0)).abs() < 1e-9);
    }

    #[test]
    fn reentry_allowed_on_later_bar() {
        let n = 8;
        let price = frame(
            vec![100.0; n],
            vec![101.0; n],
            vec![99.0; n],
            vec![100.0; n],
        );
        let entries = vec![true, false, false, false, true, false, false, false];
        let mut sizes = vec![f64::NAN; n];
        sizes[0] = 10.0;
        sizes[4] = 10.0;
        let mut inp = inputs(&entries, &sizes);
        inp.hold_period = 2;
        let out = simulate(&price, &inp).unwrap();
        assert_eq!(out.trades.len(), 2);
    }
}
