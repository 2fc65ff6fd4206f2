use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::Config;
use crate::data::{PriceDataProvider, PriceFrame};
use crate::engine::types::ExitReason;
use crate::error::Result;
use crate::persistence::{ClosedFill, NewPosition, Position};
use crate::rules::volatility::calculate_atr;
use crate::rules::{evaluate_rule, RuleDef, RulesConfig};

/// A fresh entry signal produced from current-day evaluation.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub symbol: String,
    pub rule_stack: Vec<RuleDef>,
    pub signal_date: NaiveDate,
    pub entry_price: f64,
}

/// Mark-to-market diagnostics for a position that stays open. Computed for
/// reporting, never persisted.
#[derive(Debug, Clone)]
pub struct HoldDiagnostics {
    pub current_price: f64,
    pub return_pct: f64,
    pub days_held: i64,
    pub nifty_return_pct: Option<f64>,
}

/// A position the reconcile pass keeps open.
#[derive(Debug, Clone)]
pub struct HeldPosition {
    pub position: Position,
    pub diagnostics: Option<HoldDiagnostics>,
}

/// Outcome of one daily reconcile pass; persisted in one transaction.
#[derive(Debug)]
pub struct ReconcilePlan {
    pub to_hold: Vec<HeldPosition>,
    pub to_close: Vec<ClosedFill>,
    pub to_open: Vec<NewPosition>,
}

/// Evaluate every open position against today's bar and open positions for
/// new signals.
///
/// Exit checks run in fixed priority order: stop-loss (against the bar low,
/// filled at the stop level), take-profit, chandelier trailing stop,
/// indicator exits, time limit. A position whose price data is unavailable
/// is held untouched. New signals for symbols that already have an open
/// position are logged no-ops.
#[allow(clippy::too_many_arguments)]
pub fn reconcile(
    today: NaiveDate,
    new_signals: &[NewSignal],
    open_positions: &[Position],
    provider: &dyn PriceDataProvider,
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
    created_at: &str,
) -> Result<ReconcilePlan> {
    let mut plan = ReconcilePlan {
        to_hold: Vec::new(),
        to_close: Vec::new(),
        to_open: Vec::new(),
    };

    for position in open_positions {
        match evaluate_position(position, today, provider, index, rules, config) {
            Ok(PositionVerdict::Close(fill)) => {
                info!(
                    symbol = %position.symbol,
                    exit_reason = %fill.exit_reason,
                    exit_price = fill.exit_price,
                    "closing position"
                );
                plan.to_close.push(fill);
            }
            Ok(PositionVerdict::Hold(diagnostics)) => {
                plan.to_hold.push(HeldPosition {
                    position: position.clone(),
                    diagnostics,
                });
            }
            Err(e) => {
                warn!(
                    symbol = %position.symbol,
                    stage = "lifecycle",
                    error = %e,
                    "position left untouched: price data failed"
                );
                plan.to_hold.push(HeldPosition {
                    position: position.clone(),
                    diagnostics: None,
                });
            }
        }
    }

    let mut taken: Vec<&str> = open_positions.iter().map(|p| p.symbol.as_str()).collect();
    for signal in new_signals {
        if taken.contains(&signal.symbol.as_str()) {
            info!(symbol = %signal.symbol, "new signal skipped: position already open");
            continue;
        }
        taken.push(signal.symbol.as_str());
        plan.to_open.push(NewPosition {
            symbol: signal.symbol.clone(),
            entry_date: signal.signal_date,
            entry_price: signal.entry_price,
            rule_stack: signal.rule_stack.clone(),
            created_at: created_at.to_string(),
        });
    }

    Ok(plan)
}

enum PositionVerdict {
    Close(ClosedFill),
    Hold(Option<HoldDiagnostics>),
}

fn evaluate_position(
    position: &Position,
    today: NaiveDate,
    provider: &dyn PriceDataProvider,
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
) -> Result<PositionVerdict> {
    let history = provider.get_price_data(&position.symbol, None, Some(today), None)?;
    let bar = history.len() - 1;
    let bar_date = history.dates()[bar];
    if bar_date <= position.entry_date {
        // entry bar is protected; nothing to evaluate yet
        return Ok(PositionVerdict::Hold(None));
    }

    let high = history.column("high")?;
    let low = history.column("low")?;
    let close = history.column("close")?;
    let entry = position.entry_price;
    let days_held = (bar_date - position.entry_date).num_days();

    let close_fill = |price: f64, reason: &ExitReason| ClosedFill {
        position_id: position.id,
        exit_date: bar_date,
        exit_price: price,
        final_return_pct: price / entry - 1.0,
        final_nifty_return_pct: index
            .and_then(|ix| index_return(ix, position.entry_date, bar_date)),
        days_held,
        exit_reason: reason.to_string(),
    };

    if let Some(pct) = rules.stop_loss_pct() {
        let stop_level = entry * (1.0 - pct);
        if low[bar] <= stop_level {
            return Ok(PositionVerdict::Close(
                close_fill(stop_level, &ExitReason::StopLoss { pct }),
            ));
        }
    }

    if let Some(pct) = rules.take_profit_pct() {
        let target_level = entry * (1.0 + pct);
        if high[bar] >= target_level {
            return Ok(PositionVerdict::Close(
                close_fill(target_level, &ExitReason::TakeProfit { pct }),
            ));
        }
    }

    if let Some((atr_period, multiplier)) = rules.trailing_stop() {
        let since_entry = history.bars_before(position.entry_date);
        let peak_high = high[since_entry..]
            .iter()
            .fold(f64::MIN, |acc, h| acc.max(*h));
        let atr = calculate_atr(history.df(), atr_period)?;
        let atr_today = atr[bar];
        if atr_today.is_finite() {
            let exit_level = peak_high - multiplier * atr_today;
            if close[bar] <= exit_level {
                return Ok(PositionVerdict::Close(
                    close_fill(close[bar], &ExitReason::TrailingStop),
                ));
            }
        }
    }

    for def in rules.indicator_exits() {
        let signal = evaluate_rule(&def.spec, history.df())?;
        if signal[bar] {
            return Ok(PositionVerdict::Close(close_fill(
                close[bar],
                &ExitReason::Rule {
                    name: def.name.clone(),
                },
            )));
        }
    }

    if days_held >= config.hold_period as i64 {
        return Ok(PositionVerdict::Close(close_fill(
            close[bar],
            &ExitReason::TimeLimit {
                days: config.hold_period,
            },
        )));
    }

    Ok(PositionVerdict::Hold(Some(HoldDiagnostics {
        current_price: close[bar],
        return_pct: close[bar] / entry - 1.0,
        days_held,
        nifty_return_pct: index.and_then(|ix| index_return(ix, position.entry_date, bar_date)),
    })))
}

/// Benchmark return between two dates, using the last index bar at or
/// before each date.
fn index_return(index: &PriceFrame, from: NaiveDate, to: NaiveDate) -> Option<f64> {
    let close = index.column("close").ok()?;
    let from_bar = index.bars_before(from + chrono::Duration::days(1)).checked_sub(1)?;
    let to_bar = index.bars_before(to + chrono::Duration::days(1)).checked_sub(1)?;
    (close[from_bar] > 0.0).then(|| close[to_bar] / close[from_bar] - 1.0)
}
