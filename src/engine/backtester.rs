use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::config::Config;
use crate::data::PriceFrame;
use crate::error::{Error, Result};
use crate::rules::volatility::calculate_atr;
use crate::rules::{evaluate_rule, RuleDef, RulesConfig};

use super::metrics;
use super::simulator::{simulate, SimInputs, TrailingSpec};
use super::sizing;
use super::types::BacktestRun;

/// One backtest of one rule combination over one window of one symbol.
pub struct BacktestRequest<'a> {
    pub price: &'a PriceFrame,
    /// Market index history, required when context filters are configured.
    pub index: Option<&'a PriceFrame>,
    pub entry_rules: &'a [RuleDef],
    pub rules: &'a RulesConfig,
    pub config: &'a Config,
    pub symbol: &'a str,
    /// Half-open date window `[start, end)`. `None` runs the whole history.
    /// Bars before the window warm up indicators but never trade, and no
    /// indicator reads a bar at or past `end`.
    pub window: Option<(NaiveDate, NaiveDate)>,
    /// Minimum completed trades below which the combination is rejected.
    pub min_trades: usize,
}

/// Run one rule combination over one price window.
///
/// Returns `None` when a precondition never passes inside the window or the
/// completed trade count falls below `min_trades`. Entries are the AND of
/// all entry rules, gated by preconditions and (index-aligned) context
/// filters; exits are assembled from the exit conditions and resolved by
/// the simulator's fixed priority order.
pub fn backtest_combination(req: &BacktestRequest<'_>) -> Result<Option<BacktestRun>> {
    if req.entry_rules.is_empty() {
        return Err(Error::config("entry rule combination is empty"));
    }

    let (frame, window_start) = match req.window {
        Some((start, end)) => {
            let end_idx = req.price.bars_before(end);
            let frame = req.price.truncated(end_idx);
            let start_idx = frame.bars_before(start);
            (frame, start_idx)
        }
        None => (req.price.clone(), 0),
    };
    let n = frame.len();
    if n == 0 || window_start >= n {
        return Ok(None);
    }

    let mut gate = vec![true; n];
    for def in &req.rules.preconditions {
        let signal = evaluate_rule(&def.spec, frame.df())?;
        if !signal[window_start..].iter().any(|b| *b) {
            debug!(
                symbol = req.symbol,
                rule = %def.name,
                "precondition never passes inside window; combination skipped"
            );
            return Ok(None);
        }
        for (g, s) in gate.iter_mut().zip(&signal) {
            *g &= s;
        }
    }

    if !req.rules.context_filters.is_empty() {
        let index = req.index.ok_or_else(|| {
            Error::data(
                req.symbol,
                "context filters configured but no market index data supplied",
            )
        })?;
        let index_frame = index.up_to(frame.last_date());
        if index_frame.is_empty() {
            return Err(Error::data(req.symbol, "market index has no overlapping bars"));
        }
        for def in &req.rules.context_filters {
            let signal = evaluate_rule(&def.spec, index_frame.df())?;
            let by_date: HashMap<NaiveDate, bool> = index_frame
                .dates()
                .iter()
                .copied()
                .zip(signal)
                .collect();
            for (t, g) in gate.iter_mut().enumerate() {
                // a date the index never traded fails the filter
                *g &= by_date.get(&frame.dates()[t]).copied().unwrap_or(false);
            }
        }
    }

    let mut entries = vec![true; n];
    for def in req.entry_rules {
        let signal = evaluate_rule(&def.spec, frame.df())?;
        for (e, s) in entries.iter_mut().zip(&signal) {
            *e &= s;
        }
    }
    for (e, g) in entries.iter_mut().zip(&gate) {
        *e &= g;
    }

    let named_exits: Vec<(String, Vec<bool>)> = req
        .rules
        .indicator_exits()
        .into_iter()
        .map(|def| Ok((def.name.clone(), evaluate_rule(&def.spec, frame.df())?)))
        .collect::<Result<_>>()?;

    let trailing_atr;
    let trailing = match req.rules.trailing_stop() {
        Some((period, multiplier)) => {
            trailing_atr = calculate_atr(frame.df(), period)?;
            Some(TrailingSpec {
                multiplier,
                atr: &trailing_atr,
            })
        }
        None => None,
    };

    let sizes = if req.config.debug_unlimited_size {
        sizing::debug_full_capital_sizes(
            &frame,
            &entries,
            req.config.portfolio_initial_capital,
        )?
    } else {
        sizing::size_series(
            &frame,
            &entries,
            req.rules,
            req.config.portfolio_initial_capital,
            req.config.risk_per_trade_pct,
        )?
    };

    let outcome = simulate(
        &frame,
        &SimInputs {
            entries: &entries,
            named_exits: &named_exits,
            sizes: &sizes,
            stop_loss_pct: req.rules.stop_loss_pct(),
            take_profit_pct: req.rules.take_profit_pct(),
            trailing,
            hold_period: req.config.hold_period,
            window_start,
            initial_capital: req.config.portfolio_initial_capital,
        },
    )?;

    if outcome.trades.len() < req.min_trades {
        debug!(
            symbol = req.symbol,
            trades = outcome.trades.len(),
            min_trades = req.min_trades,
            "combination rejected: too few trades"
        );
        return Ok(None);
    }

    let summary = metrics::summarize(
        &outcome.trades,
        &outcome.daily_returns,
        outcome.final_equity,
        req.config.portfolio_initial_capital,
        &req.config.edge_score_weights,
    );
    Ok(Some(BacktestRun {
        trades: outcome.trades,
        daily_returns: outcome.daily_returns,
        final_equity: outcome.final_equity,
        summary,
    }))
}
