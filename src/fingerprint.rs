use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::rules::RulesConfig;

/// Scalars that shaped a run, captured alongside results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunParameters {
    pub freeze_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Configuration provenance persisted with every strategy row. Enables the
/// intelligent-clear operation and comparative analysis across rule
/// revisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// SHA-256 of the normalized rules configuration.
    pub rules_hash: String,
    pub universe_path: String,
    pub run_parameters: RunParameters,
    /// Capture time (RFC 3339). Not part of the hash.
    pub timestamp: String,
}

impl ConfigSnapshot {
    pub fn new(
        rules: &RulesConfig,
        universe_path: impl Into<String>,
        run_parameters: RunParameters,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            rules_hash: rules_hash(rules),
            universe_path: universe_path.into(),
            run_parameters,
            timestamp: timestamp.into(),
        }
    }
}

/// SHA-256 over the canonical JSON form of a bound rules config.
/// Whitespace and key order in the source file cannot affect it: the parsed
/// value serializes with a fixed field order.
pub fn rules_hash(rules: &RulesConfig) -> String {
    let canonical = serde_json::to_string(rules).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// Deterministic 8-character fingerprint over the snapshot essentials:
/// the rules hash plus the scalar parameters that change backtest results.
/// Identical inputs always produce the identical hash.
pub fn config_hash(rules: &RulesConfig, config: &Config) -> String {
    let essentials = format!(
        "{}|hold={}|risk={}|wf={}/{}/{}|freeze={}",
        rules_hash(rules),
        config.hold_period,
        config.risk_per_trade_pct,
        config.walk_forward.training_period_days,
        config.walk_forward.testing_period_days,
        config.walk_forward.step_days,
        config
            .freeze_date
            .map_or_else(|| "none".to_string(), |d| d.to_string()),
    );
    let digest = Sha256::digest(essentials.as_bytes());
    hex::encode(digest)[..8].to_string()
}
