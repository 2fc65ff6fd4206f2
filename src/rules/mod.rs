pub mod candles;
pub mod exits;
pub mod helpers;
pub mod momentum;
pub mod overlap;
pub mod registry;
pub mod volatility;
pub mod volume;

use std::collections::HashSet;
use std::path::Path;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use helpers::RuleFn;
use registry::{build_rule, RuleSpec};

/// A named, immutable rule definition: a display name plus the typed
/// parameters selecting and configuring a rule from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,
    #[serde(flatten)]
    pub spec: RuleSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RuleDef {
    pub fn new(name: impl Into<String>, spec: RuleSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            description: None,
        }
    }
}

/// The five ordered rule sections of a run's rules file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub preconditions: Vec<RuleDef>,
    #[serde(default)]
    pub context_filters: Vec<RuleDef>,
    #[serde(default)]
    pub entry_signals: Vec<RuleDef>,
    #[serde(default)]
    pub exit_conditions: Vec<RuleDef>,
    #[serde(default)]
    pub validation: Vec<ValidationRange>,
}

/// Advisory per-type parameter range metadata. Carried for provenance and
/// reporting; not enforced beyond the registry's own declared ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRange {
    pub rule_type: String,
    pub param: String,
    pub min: f64,
    pub max: f64,
}

impl RulesConfig {
    /// Load a rules file (TOML) and bind it: every rule type must exist in
    /// the registry, every parameter must be in range, names must be unique
    /// within a section, and single-slot exit rules are deduplicated with a
    /// warning (first occurrence wins).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read rules file {}: {e}", path.display())))?;
        let parsed: Self = toml::from_str(&raw)
            .map_err(|e| Error::config(format!("invalid rules file {}: {e}", path.display())))?;
        parsed.bind()
    }

    /// Validate and normalize an in-memory config. Returns the bound config
    /// with duplicate single-slot exit rules removed.
    pub fn bind(mut self) -> Result<Self> {
        for (section, defs) in [
            ("preconditions", &self.preconditions),
            ("context_filters", &self.context_filters),
            ("entry_signals", &self.entry_signals),
            ("exit_conditions", &self.exit_conditions),
        ] {
            let mut seen = HashSet::new();
            for def in defs {
                if def.name.trim().is_empty() {
                    return Err(Error::config(format!("{section}: rule with empty name")));
                }
                if !seen.insert(def.name.clone()) {
                    return Err(Error::config(format!(
                        "{section}: duplicate rule name '{}'",
                        def.name
                    )));
                }
                def.spec.validate()?;
            }
        }
        self.exit_conditions = dedupe_single_slots(std::mem::take(&mut self.exit_conditions));
        Ok(self)
    }

    /// First `stop_loss_pct` percentage among exit conditions, if any.
    pub fn stop_loss_pct(&self) -> Option<f64> {
        self.exit_conditions.iter().find_map(|d| match d.spec {
            RuleSpec::StopLossPct { percentage } => Some(percentage),
            _ => None,
        })
    }

    /// First `take_profit_pct` percentage among exit conditions, if any.
    pub fn take_profit_pct(&self) -> Option<f64> {
        self.exit_conditions.iter().find_map(|d| match d.spec {
            RuleSpec::TakeProfitPct { percentage } => Some(percentage),
            _ => None,
        })
    }

    /// First trailing-stop spec among exit conditions, if any.
    pub fn trailing_stop(&self) -> Option<(usize, f64)> {
        self.exit_conditions.iter().find_map(|d| match d.spec {
            RuleSpec::ChandelierExit {
                atr_period,
                atr_multiplier,
            } => Some((atr_period, atr_multiplier)),
            _ => None,
        })
    }

    /// Exit conditions that evaluate as bar predicates (everything except
    /// the stop/target/trailing slots).
    pub fn indicator_exits(&self) -> Vec<&RuleDef> {
        self.exit_conditions
            .iter()
            .filter(|d| {
                !matches!(
                    d.spec,
                    RuleSpec::StopLossPct { .. }
                        | RuleSpec::TakeProfitPct { .. }
                        | RuleSpec::ChandelierExit { .. }
                )
            })
            .collect()
    }

    /// The longest warmup over every bound rule. Walk-forward windows start
    /// after this many bars of usable data.
    pub fn max_warmup(&self) -> usize {
        self.preconditions
            .iter()
            .chain(&self.context_filters)
            .chain(&self.entry_signals)
            .chain(&self.exit_conditions)
            .map(|d| d.spec.warmup())
            .max()
            .unwrap_or(0)
    }
}

/// Keep only the first occurrence of each single-slot exit rule
/// (stop-loss, take-profit, trailing stop); warn about the rest.
fn dedupe_single_slots(defs: Vec<RuleDef>) -> Vec<RuleDef> {
    let mut have_stop = false;
    let mut have_target = false;
    let mut have_trailing = false;
    let mut kept = Vec::with_capacity(defs.len());
    for def in defs {
        let slot = match def.spec {
            RuleSpec::StopLossPct { .. } => Some(&mut have_stop),
            RuleSpec::TakeProfitPct { .. } => Some(&mut have_target),
            RuleSpec::ChandelierExit { .. } => Some(&mut have_trailing),
            _ => None,
        };
        if let Some(taken) = slot {
            if *taken {
                warn!(
                    rule = %def.name,
                    rule_type = def.spec.type_name(),
                    "duplicate single-slot exit rule ignored; first occurrence wins"
                );
                continue;
            }
            *taken = true;
        }
        kept.push(def);
    }
    kept
}

/// Evaluate one rule over an OHLCV frame into a boolean vector aligned to
/// the frame height.
pub fn evaluate_rule(spec: &RuleSpec, df: &DataFrame) -> Result<Vec<bool>> {
    let rule: Box<dyn RuleFn> = build_rule(spec);
    let series = rule
        .evaluate(df)
        .map_err(|e| Error::computation(format!("rule '{}': {e}", rule.name())))?;
    let ca = series
        .bool()
        .map_err(|e| Error::computation(format!("rule '{}': {e}", rule.name())))?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(false)).collect())
}
