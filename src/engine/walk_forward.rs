use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::PriceFrame;
use crate::error::Result;
use crate::rules::{RuleDef, RulesConfig};

use super::backtester::{backtest_combination, BacktestRequest};
use super::metrics;
use super::types::{rule_stack_json, BacktestRun, RunContext, StrategyResult, Trade};

/// One train/test window pair: train on `[train_start, test_start)`, test
/// out-of-sample on `[test_start, test_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpan {
    pub train_start: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

/// Roll the window schedule: starting at `t0`, advance by `step_days` while
/// a full train+test span still fits before `end_of_data`.
pub fn window_schedule(
    t0: NaiveDate,
    end_of_data: NaiveDate,
    training_days: i64,
    testing_days: i64,
    step_days: i64,
) -> Vec<WindowSpan> {
    let mut spans = Vec::new();
    let mut tk = t0;
    loop {
        let test_start = tk + Duration::days(training_days);
        let test_end = test_start + Duration::days(testing_days);
        if test_end > end_of_data + Duration::days(1) {
            break;
        }
        spans.push(WindowSpan {
            train_start: tk,
            test_start,
            test_end,
        });
        tk += Duration::days(step_days);
    }
    spans
}

/// Walk-forward validation of candidate rule combinations on one symbol.
///
/// Per window: every candidate is backtested on the training span, the
/// winner by edge score (ties: more trades, then lexicographic rule stack)
/// is applied once to the testing span, and only those out-of-sample trades
/// count. Trade logs and daily returns from all accepted windows are
/// concatenated and the reported metrics recomputed on the concatenation -
/// in-sample performance never reaches the result.
///
/// Returns `None` when no window produces an acceptable out-of-sample run
/// or the aggregate trade count stays below `min_trades_threshold`.
pub fn walk_forward(
    price: &PriceFrame,
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
    symbol: &str,
    candidates: &[Vec<RuleDef>],
    ctx: &RunContext,
) -> Result<Option<StrategyResult>> {
    if candidates.is_empty() {
        return Ok(None);
    }
    if !config.walk_forward.enabled {
        warn!(
            symbol,
            "walk-forward disabled: in-sample metrics are not reliable for live trading"
        );
        return in_sample_best(price, index, rules, config, symbol, candidates, ctx);
    }

    let warmup = rules.max_warmup();
    if warmup >= price.len() {
        debug!(symbol, warmup, bars = price.len(), "history shorter than warmup");
        return Ok(None);
    }
    let spans = window_schedule(
        price.dates()[warmup],
        price.last_date(),
        config.walk_forward.training_period_days,
        config.walk_forward.testing_period_days,
        config.walk_forward.step_days,
    );

    let mut oos_trades: Vec<Trade> = Vec::new();
    let mut oos_returns: Vec<f64> = Vec::new();
    let mut winner_stacks: Vec<Vec<RuleDef>> = Vec::new();

    for span in &spans {
        let Some((winner_stack, _train_run)) = select_training_winner(
            price,
            index,
            rules,
            config,
            symbol,
            candidates,
            span.train_start,
            span.test_start,
        )?
        else {
            debug!(symbol, train_start = %span.train_start, "no candidate survived training");
            continue;
        };

        let oos = backtest_combination(&BacktestRequest {
            price,
            index,
            entry_rules: &winner_stack,
            rules,
            config,
            symbol,
            window: Some((span.test_start, span.test_end)),
            min_trades: config.walk_forward.min_trades_per_period,
        })?;
        match oos {
            Some(run) => {
                debug!(
                    symbol,
                    test_start = %span.test_start,
                    trades = run.summary.total_trades,
                    edge_score = run.summary.edge_score,
                    "out-of-sample window accepted"
                );
                oos_trades.extend(run.trades);
                oos_returns.extend(run.daily_returns);
                winner_stacks.push(winner_stack);
            }
            None => {
                debug!(
                    symbol,
                    test_start = %span.test_start,
                    "out-of-sample window discarded: too few trades"
                );
            }
        }
    }

    if winner_stacks.is_empty() || oos_trades.len() < config.min_trades_threshold {
        return Ok(None);
    }

    let stack = most_frequent_stack(winner_stacks);
    let total_return: f64 = oos_returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
    let final_equity = config.portfolio_initial_capital * (1.0 + total_return);
    let summary = metrics::summarize(
        &oos_trades,
        &oos_returns,
        final_equity,
        config.portfolio_initial_capital,
        &config.edge_score_weights,
    );
    info!(
        symbol,
        rule_stack = %rule_stack_json(&stack),
        windows = spans.len(),
        oos_trades = summary.total_trades,
        edge_score = summary.edge_score,
        "walk-forward aggregate"
    );
    Ok(Some(ctx.strategy_result(symbol, stack, summary)))
}

/// Debug-only path: score every candidate on the full history and report
/// the best. Selection and evaluation share the same data, so the result
/// is in-sample by construction.
fn in_sample_best(
    price: &PriceFrame,
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
    symbol: &str,
    candidates: &[Vec<RuleDef>],
    ctx: &RunContext,
) -> Result<Option<StrategyResult>> {
    let mut best: Option<(Vec<RuleDef>, BacktestRun)> = None;
    for stack in candidates {
        let run = backtest_combination(&BacktestRequest {
            price,
            index,
            entry_rules: stack,
            rules,
            config,
            symbol,
            window: None,
            min_trades: config.min_trades_threshold,
        })?;
        if let Some(run) = run {
            let replace = match &best {
                None => true,
                Some((best_stack, best_run)) => {
                    beats(&run, stack, best_run, best_stack)
                }
            };
            if replace {
                best = Some((stack.clone(), run));
            }
        }
    }
    Ok(best.map(|(stack, run)| ctx.strategy_result(symbol, stack, run.summary)))
}

/// Train every candidate on the training span and pick the winner.
#[allow(clippy::too_many_arguments)]
fn select_training_winner(
    price: &PriceFrame,
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
    symbol: &str,
    candidates: &[Vec<RuleDef>],
    train_start: NaiveDate,
    train_end: NaiveDate,
) -> Result<Option<(Vec<RuleDef>, BacktestRun)>> {
    let mut winner: Option<(Vec<RuleDef>, BacktestRun)> = None;
    for stack in candidates {
        let run = backtest_combination(&BacktestRequest {
            price,
            index,
            entry_rules: stack,
            rules,
            config,
            symbol,
            window: Some((train_start, train_end)),
            min_trades: config.min_trades_threshold,
        })?;
        if let Some(run) = run {
            let replace = match &winner {
                None => true,
                Some((win_stack, win_run)) => beats(&run, stack, win_run, win_stack),
            };
            if replace {
                winner = Some((stack.clone(), run));
            }
        }
    }
    Ok(winner)
}

/// Ordering for training winners: higher edge score, then more trades,
/// then lexicographically smaller rule stack for determinism.
fn beats(a: &BacktestRun, a_stack: &[RuleDef], b: &BacktestRun, b_stack: &[RuleDef]) -> bool {
    if a.summary.edge_score != b.summary.edge_score {
        return a.summary.edge_score > b.summary.edge_score;
    }
    if a.summary.total_trades != b.summary.total_trades {
        return a.summary.total_trades > b.summary.total_trades;
    }
    rule_stack_json(a_stack) < rule_stack_json(b_stack)
}

fn most_frequent_stack(stacks: Vec<Vec<RuleDef>>) -> Vec<RuleDef> {
    let mut counts: Vec<(String, usize, Vec<RuleDef>)> = Vec::new();
    for stack in stacks {
        let key = rule_stack_json(&stack);
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, count, _)) => *count += 1,
            None => counts.push((key, 1, stack)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.remove(0).2
}
