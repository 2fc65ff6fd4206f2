#![allow(dead_code)]

use chrono::NaiveDate;

use edgefinder::config::Config;
use edgefinder::data::PriceFrame;
use edgefinder::engine::types::RunContext;
use edgefinder::fingerprint::RunParameters;
use edgefinder::rules::registry::RuleSpec;
use edgefinder::rules::{RuleDef, RulesConfig};

/// Two years of daily bars: a gentle uptrend with a sine swing wide enough
/// that a short/long SMA pair crosses regularly. Every run over this frame
/// is fully deterministic.
pub fn swinging_frame(symbol: &str, n: usize) -> PriceFrame {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let dates: Vec<NaiveDate> = (0..n)
        .map(|i| start + chrono::Duration::days(i as i64))
        .collect();
    let close: Vec<f64> = (0..n)
        .map(|i| 100.0 + 0.02 * i as f64 + 8.0 * (i as f64 / 6.0).sin())
        .collect();
    let open = close.clone();
    let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
    let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
    PriceFrame::from_parts(symbol, dates, open, high, low, close, vec![10_000.0; n]).unwrap()
}

/// Entry rules in declaration order: a frequently-firing SMA cross first,
/// then an EMA cross.
pub fn two_entry_rules() -> RulesConfig {
    RulesConfig {
        entry_signals: vec![
            RuleDef::new(
                "swing_sma",
                RuleSpec::SmaCrossover {
                    fast_period: 2,
                    slow_period: 5,
                },
            ),
            RuleDef::new(
                "swing_ema",
                RuleSpec::EmaCrossover {
                    fast_period: 3,
                    slow_period: 8,
                },
            ),
        ],
        ..RulesConfig::default()
    }
    .bind()
    .unwrap()
}

pub fn fast_config() -> Config {
    Config {
        hold_period: 4,
        min_trades_threshold: 2,
        seeker_min_edge_score: 0.0,
        seeker_min_trades: 1,
        ..Config::default()
    }
    .checked()
    .unwrap()
}

pub fn run_context(rules: &RulesConfig, config: &Config) -> RunContext {
    RunContext::new(
        rules,
        config,
        "universe.txt",
        RunParameters::default(),
        "2025-07-01T00:00:00Z",
    )
}
