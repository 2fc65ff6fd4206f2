use tracing::{error, info, warn};

use crate::config::Config;
use crate::data::PriceFrame;
use crate::error::Result;
use crate::rules::{RuleDef, RulesConfig};

use super::types::{rule_stack_json, RunContext, StrategyResult};
use super::walk_forward::walk_forward;

/// Disciplined forward search for one symbol. Returns at most one strategy.
///
/// Phase 1 walks the entry rules in declaration order, one rule per
/// candidate, and stops at the first acceptable result. Phase 2 pairs the
/// best individual rule with each remaining rule. If nothing clears the
/// acceptance thresholds the best-scored candidate observed is returned
/// anyway; the result is empty only when no candidate was viable at all.
///
/// Data and computation failures are caught here, at the symbol boundary:
/// the symbol yields no strategies and the run continues.
pub fn find_strategies(
    price: &PriceFrame,
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
    symbol: &str,
    ctx: &RunContext,
) -> Vec<StrategyResult> {
    match seek(price, index, rules, config, symbol, ctx) {
        Ok(results) => results,
        Err(e) => {
            error!(symbol, stage = "seeker", error = %e, "symbol failed; skipping");
            Vec::new()
        }
    }
}

fn seek(
    price: &PriceFrame,
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
    symbol: &str,
    ctx: &RunContext,
) -> Result<Vec<StrategyResult>> {
    if rules.entry_signals.is_empty() {
        warn!(symbol, "no entry signals configured; nothing to seek");
        return Ok(Vec::new());
    }

    let accepts = |r: &StrategyResult| {
        r.edge_score >= config.seeker_min_edge_score && r.total_trades >= config.seeker_min_trades
    };
    let mut best: Option<StrategyResult> = None;

    // Phase 1: individual rules, declaration order, early stop.
    for (i, def) in rules.entry_signals.iter().enumerate() {
        let stack = vec![def.clone()];
        match try_candidate(price, index, rules, config, symbol, &stack, ctx)? {
            Some(result) => {
                let accepted = accepts(&result);
                log_candidate(symbol, &result, accepted);
                if accepted {
                    info!(
                        symbol,
                        skipped = rules.entry_signals.len() - i - 1,
                        "individual rule accepted; remaining candidates skipped"
                    );
                    return Ok(vec![result]);
                }
                if best.as_ref().is_none_or(|b| result.edge_score > b.edge_score) {
                    best = Some(result);
                }
            }
            None => {
                info!(symbol, rule = %def.name, decision = "not_viable", "seeker candidate");
            }
        }
    }

    // Phase 2: confirm the best individual rule with each remaining rule.
    if rules.entry_signals.len() > 1 {
        if let Some(base) = best.clone() {
            let base_rule = base.rule_stack[0].clone();
            for def in rules
                .entry_signals
                .iter()
                .filter(|d| d.name != base_rule.name)
            {
                let stack = vec![base_rule.clone(), def.clone()];
                match try_candidate(price, index, rules, config, symbol, &stack, ctx)? {
                    Some(result) => {
                        let accepted = accepts(&result);
                        log_candidate(symbol, &result, accepted);
                        if accepted {
                            info!(symbol, "pair confirmation accepted");
                            return Ok(vec![result]);
                        }
                        if best.as_ref().is_none_or(|b| result.edge_score > b.edge_score) {
                            best = Some(result);
                        }
                    }
                    None => {
                        info!(
                            symbol,
                            rule = %def.name,
                            base = %base_rule.name,
                            decision = "not_viable",
                            "seeker pair candidate"
                        );
                    }
                }
            }
        }
    }

    // Fallback: report the best observed even below threshold.
    if let Some(result) = &best {
        info!(
            symbol,
            rule_stack = %rule_stack_json(&result.rule_stack),
            edge_score = result.edge_score,
            decision = "fallback_best",
            "no candidate met thresholds; returning best observed"
        );
    }
    Ok(best.into_iter().collect())
}

fn try_candidate(
    price: &PriceFrame,
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
    symbol: &str,
    stack: &[RuleDef],
    ctx: &RunContext,
) -> Result<Option<StrategyResult>> {
    walk_forward(price, index, rules, config, symbol, &[stack.to_vec()], ctx).map_err(|e| {
        error!(
            symbol,
            rule_stack = %rule_stack_json(stack),
            stage = "walk_forward",
            error = %e,
            "candidate evaluation failed"
        );
        e
    })
}

fn log_candidate(symbol: &str, result: &StrategyResult, accepted: bool) {
    info!(
        symbol,
        rule_stack = %rule_stack_json(&result.rule_stack),
        edge_score = result.edge_score,
        win_pct = result.win_pct,
        sharpe = result.sharpe,
        trades = result.total_trades,
        decision = if accepted { "accepted" } else { "rejected" },
        "seeker candidate"
    );
}
