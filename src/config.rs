use std::path::Path;

use chrono::NaiveDate;
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Weights combining win rate and normalized Sharpe into the edge score.
/// Must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct EdgeScoreWeights {
    #[garde(range(min = 0.0, max = 1.0))]
    pub win_pct: f64,
    #[garde(range(min = 0.0, max = 1.0), custom(validate_weights_sum(&self.win_pct)))]
    pub sharpe: f64,
}

fn validate_weights_sum(win_pct: &f64) -> impl FnOnce(&f64, &()) -> garde::Result + '_ {
    move |sharpe: &f64, (): &()| {
        if (win_pct + sharpe - 1.0).abs() > 1e-9 {
            return Err(garde::Error::new(format!(
                "edge score weights must sum to 1 (win_pct={win_pct}, sharpe={sharpe})"
            )));
        }
        Ok(())
    }
}

impl Default for EdgeScoreWeights {
    fn default() -> Self {
        Self {
            win_pct: 0.6,
            sharpe: 0.4,
        }
    }
}

/// Rolling train/test validation windows, in calendar days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct WalkForwardParams {
    /// Disabled only for debugging; in-sample metrics are not reliable.
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub enabled: bool,
    #[garde(range(min = 1))]
    pub training_period_days: i64,
    #[garde(range(min = 1))]
    pub testing_period_days: i64,
    #[garde(range(min = 1))]
    pub step_days: i64,
    #[serde(default)]
    #[garde(skip)]
    pub min_trades_per_period: usize,
}

fn default_true() -> bool {
    true
}

impl Default for WalkForwardParams {
    fn default() -> Self {
        Self {
            enabled: true,
            training_period_days: 365,
            testing_period_days: 90,
            step_days: 90,
            min_trades_per_period: 1,
        }
    }
}

/// Scalar application parameters consumed by the engine.
/// Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Maximum bars a position may remain open.
    #[garde(range(min = 1))]
    pub hold_period: usize,
    /// Strategies with fewer completed trades are rejected outright.
    #[garde(range(min = 1))]
    pub min_trades_threshold: usize,
    #[serde(default)]
    #[garde(dive)]
    pub edge_score_weights: EdgeScoreWeights,
    #[garde(range(min = 0.0, max = 1.0))]
    pub seeker_min_edge_score: f64,
    #[garde(skip)]
    pub seeker_min_trades: usize,
    #[garde(range(min = 0.01))]
    pub portfolio_initial_capital: f64,
    /// Fraction of capital risked per trade; capped at 10%.
    #[garde(range(min = 0.0001, max = 0.1))]
    pub risk_per_trade_pct: f64,
    #[serde(default)]
    #[garde(dive)]
    pub walk_forward: WalkForwardParams,
    /// Caps all analysis at this date for reproducible runs.
    #[serde(default)]
    #[garde(skip)]
    pub freeze_date: Option<NaiveDate>,
    /// Debug-only: size every entry at full capital instead of ATR risk.
    /// Metrics produced under this flag are not realistic.
    #[serde(default)]
    #[garde(skip)]
    pub debug_unlimited_size: bool,
}

impl Config {
    /// Load and validate an application config file (TOML).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let parsed: Self = toml::from_str(&raw)
            .map_err(|e| Error::config(format!("invalid config file {}: {e}", path.display())))?;
        parsed.checked()
    }

    /// Validate an in-memory config.
    pub fn checked(self) -> Result<Self> {
        self.validate()
            .map_err(|report| Error::config(report.to_string()))?;
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hold_period: 20,
            min_trades_threshold: 10,
            edge_score_weights: EdgeScoreWeights::default(),
            seeker_min_edge_score: 0.50,
            seeker_min_trades: 10,
            portfolio_initial_capital: 100_000.0,
            risk_per_trade_pct: 0.01,
            walk_forward: WalkForwardParams::default(),
            freeze_date: None,
            debug_unlimited_size: false,
        }
    }
}
