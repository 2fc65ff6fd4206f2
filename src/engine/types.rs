use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::fingerprint::{self, ConfigSnapshot, RunParameters};
use crate::rules::{RuleDef, RulesConfig};

/// Why a position was closed. Priority when several fire on the same bar:
/// stop-loss > take-profit > trailing > indicator > time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss { pct: f64 },
    TakeProfit { pct: f64 },
    TrailingStop,
    Rule { name: String },
    TimeLimit { days: usize },
    EndOfData,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss { pct } => write!(f, "Stop-loss at -{:.1}%", pct * 100.0),
            Self::TakeProfit { pct } => write!(f, "Take-profit at +{:.1}%", pct * 100.0),
            Self::TrailingStop => write!(f, "Trailing: Chandelier"),
            Self::Rule { name } => write!(f, "Rule: {name}"),
            Self::TimeLimit { days } => write!(f, "Time limit: {days} days"),
            Self::EndOfData => write!(f, "End of data"),
        }
    }
}

/// One completed round trip in a backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub shares: f64,
    pub pnl: f64,
    pub return_pct: f64,
    pub bars_held: usize,
    pub exit_reason: ExitReason,
}

/// Aggregated backtest metrics for one rule stack on one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub edge_score: f64,
    pub win_pct: f64,
    pub sharpe: f64,
    pub total_return: f64,
    pub avg_return: f64,
    pub total_trades: usize,
}

/// Raw output of one simulated window: the trade log plus the daily return
/// series the Sharpe ratio is computed from. Walk-forward concatenates
/// these across out-of-sample windows before computing final metrics.
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub trades: Vec<Trade>,
    pub daily_returns: Vec<f64>,
    pub final_equity: f64,
    pub summary: Summary,
}

/// The persisted outcome of strategy discovery for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub symbol: String,
    pub rule_stack: Vec<RuleDef>,
    pub edge_score: f64,
    pub win_pct: f64,
    pub sharpe: f64,
    pub total_return: f64,
    pub total_trades: usize,
    pub avg_return: f64,
    pub run_timestamp: String,
    pub config_snapshot: String,
    pub config_hash: String,
}

/// Per-run provenance shared by every result the run produces. Building it
/// once keeps the backtester deterministic: identical inputs (including the
/// supplied timestamp) produce identical results.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_timestamp: String,
    pub config_hash: String,
    pub config_snapshot: String,
}

impl RunContext {
    pub fn new(
        rules: &RulesConfig,
        config: &Config,
        universe_path: &str,
        run_parameters: RunParameters,
        run_timestamp: impl Into<String>,
    ) -> Self {
        let run_timestamp = run_timestamp.into();
        let snapshot =
            ConfigSnapshot::new(rules, universe_path, run_parameters, run_timestamp.clone());
        Self {
            run_timestamp,
            config_hash: fingerprint::config_hash(rules, config),
            config_snapshot: serde_json::to_string(&snapshot).unwrap_or_default(),
        }
    }

    pub fn strategy_result(
        &self,
        symbol: &str,
        rule_stack: Vec<RuleDef>,
        summary: Summary,
    ) -> StrategyResult {
        StrategyResult {
            symbol: symbol.to_string(),
            rule_stack,
            edge_score: summary.edge_score,
            win_pct: summary.win_pct,
            sharpe: summary.sharpe,
            total_return: summary.total_return,
            total_trades: summary.total_trades,
            avg_return: summary.avg_return,
            run_timestamp: self.run_timestamp.clone(),
            config_snapshot: self.config_snapshot.clone(),
            config_hash: self.config_hash.clone(),
        }
    }
}

/// Serialize a rule stack to its canonical JSON form (stable field order,
/// used for persistence keys and deduplication).
pub fn rule_stack_json(stack: &[RuleDef]) -> String {
    serde_json::to_string(stack).unwrap_or_default()
}
