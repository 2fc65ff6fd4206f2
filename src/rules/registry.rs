use serde::{Deserialize, Serialize};

use super::candles::{EngulfingPattern, HammerPattern};
use super::exits::{ChandelierExit, StopLossPct, TakeProfitPct};
use super::helpers::RuleFn;
use super::momentum::{MacdCrossover, RsiOversold};
use super::overlap::{EmaCrossover, SmaCrossUnder, SmaCrossover};
use super::volatility::BollingerSqueeze;
use super::volume::VolumeSpike;
use crate::error::{Error, Result};

/// Serializable rule specification. Each variant maps 1:1 to a `RuleFn`
/// struct; the `type` tag in config files selects the variant.
/// Use `build_rule` to convert a `RuleSpec` into a concrete `Box<dyn RuleFn>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSpec {
    SmaCrossover {
        fast_period: usize,
        slow_period: usize,
    },
    SmaCrossUnder {
        fast_period: usize,
        slow_period: usize,
    },
    EmaCrossover {
        fast_period: usize,
        slow_period: usize,
    },
    RsiOversold {
        #[serde(default = "default_rsi_period")]
        period: usize,
        #[serde(default = "default_rsi_threshold")]
        oversold_threshold: f64,
    },
    MacdCrossover {
        #[serde(default = "default_macd_fast")]
        fast: usize,
        #[serde(default = "default_macd_slow")]
        slow: usize,
        #[serde(default = "default_macd_signal")]
        signal: usize,
    },
    BollingerSqueeze {
        #[serde(default = "default_bollinger_period")]
        period: usize,
        #[serde(default = "default_bollinger_std_dev")]
        std_dev: f64,
        #[serde(default = "default_squeeze_threshold")]
        squeeze_threshold: f64,
    },
    HammerPattern {
        #[serde(default = "default_hammer_body_ratio")]
        body_ratio: f64,
        #[serde(default = "default_hammer_shadow_ratio")]
        shadow_ratio: f64,
    },
    EngulfingPattern {
        #[serde(default = "default_engulfing_body_ratio")]
        min_body_ratio: f64,
    },
    VolumeSpike {
        #[serde(default = "default_volume_period")]
        period: usize,
        #[serde(default = "default_spike_multiplier")]
        spike_multiplier: f64,
        #[serde(default = "default_price_change_threshold")]
        price_change_threshold: f64,
    },
    StopLossPct {
        percentage: f64,
    },
    TakeProfitPct {
        percentage: f64,
    },
    ChandelierExit {
        #[serde(default = "default_atr_period")]
        atr_period: usize,
        #[serde(default = "default_atr_multiplier")]
        atr_multiplier: f64,
    },
}

fn default_rsi_period() -> usize {
    14
}
fn default_rsi_threshold() -> f64 {
    30.0
}
fn default_macd_fast() -> usize {
    12
}
fn default_macd_slow() -> usize {
    26
}
fn default_macd_signal() -> usize {
    9
}
fn default_bollinger_period() -> usize {
    20
}
fn default_bollinger_std_dev() -> f64 {
    2.0
}
fn default_squeeze_threshold() -> f64 {
    0.1
}
fn default_hammer_body_ratio() -> f64 {
    0.3
}
fn default_hammer_shadow_ratio() -> f64 {
    2.0
}
fn default_engulfing_body_ratio() -> f64 {
    1.2
}
fn default_volume_period() -> usize {
    20
}
fn default_spike_multiplier() -> f64 {
    2.0
}
fn default_price_change_threshold() -> f64 {
    0.01
}
fn default_atr_period() -> usize {
    22
}
fn default_atr_multiplier() -> f64 {
    3.0
}

const MAX_PERIOD: usize = 500;

fn check_period(rule: &str, name: &str, value: usize) -> Result<()> {
    if value == 0 || value > MAX_PERIOD {
        return Err(Error::config(format!(
            "{rule}: {name} must be in 1..={MAX_PERIOD}, got {value}"
        )));
    }
    Ok(())
}

fn check_positive(rule: &str, name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::config(format!(
            "{rule}: {name} must be a positive finite number, got {value}"
        )));
    }
    Ok(())
}

fn check_fast_slow(rule: &str, fast: usize, slow: usize) -> Result<()> {
    if fast >= slow {
        return Err(Error::config(format!(
            "{rule}: fast period ({fast}) must be less than slow period ({slow})"
        )));
    }
    Ok(())
}

impl RuleSpec {
    /// The `type` tag this variant serializes to.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SmaCrossover { .. } => "sma_crossover",
            Self::SmaCrossUnder { .. } => "sma_cross_under",
            Self::EmaCrossover { .. } => "ema_crossover",
            Self::RsiOversold { .. } => "rsi_oversold",
            Self::MacdCrossover { .. } => "macd_crossover",
            Self::BollingerSqueeze { .. } => "bollinger_squeeze",
            Self::HammerPattern { .. } => "hammer_pattern",
            Self::EngulfingPattern { .. } => "engulfing_pattern",
            Self::VolumeSpike { .. } => "volume_spike",
            Self::StopLossPct { .. } => "stop_loss_pct",
            Self::TakeProfitPct { .. } => "take_profit_pct",
            Self::ChandelierExit { .. } => "chandelier_exit",
        }
    }

    /// Leading bars during which this rule cannot fire.
    pub fn warmup(&self) -> usize {
        match self {
            Self::SmaCrossover { slow_period, .. }
            | Self::SmaCrossUnder { slow_period, .. }
            | Self::EmaCrossover { slow_period, .. } => *slow_period,
            Self::RsiOversold { period, .. } => period + 1,
            Self::MacdCrossover { slow, signal, .. } => slow + signal,
            Self::BollingerSqueeze { period, .. } | Self::VolumeSpike { period, .. } => *period,
            Self::HammerPattern { .. } | Self::EngulfingPattern { .. } => 2,
            Self::StopLossPct { .. } | Self::TakeProfitPct { .. } => 0,
            Self::ChandelierExit { atr_period, .. } => *atr_period,
        }
    }

    /// Validate parameters against their declared ranges.
    /// Raised at config-binding time, before any computation.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SmaCrossover {
                fast_period,
                slow_period,
            }
            | Self::SmaCrossUnder {
                fast_period,
                slow_period,
            }
            | Self::EmaCrossover {
                fast_period,
                slow_period,
            } => {
                let rule = self.type_name();
                check_period(rule, "fast_period", *fast_period)?;
                check_period(rule, "slow_period", *slow_period)?;
                check_fast_slow(rule, *fast_period, *slow_period)
            }
            Self::RsiOversold {
                period,
                oversold_threshold,
            } => {
                check_period("rsi_oversold", "period", *period)?;
                if !(0.0..=100.0).contains(oversold_threshold) {
                    return Err(Error::config(format!(
                        "rsi_oversold: oversold_threshold must be in 0..=100, got {oversold_threshold}"
                    )));
                }
                Ok(())
            }
            Self::MacdCrossover { fast, slow, signal } => {
                check_period("macd_crossover", "fast", *fast)?;
                check_period("macd_crossover", "slow", *slow)?;
                check_period("macd_crossover", "signal", *signal)?;
                check_fast_slow("macd_crossover", *fast, *slow)
            }
            Self::BollingerSqueeze {
                period,
                std_dev,
                squeeze_threshold,
            } => {
                check_period("bollinger_squeeze", "period", *period)?;
                check_positive("bollinger_squeeze", "std_dev", *std_dev)?;
                check_positive("bollinger_squeeze", "squeeze_threshold", *squeeze_threshold)
            }
            Self::HammerPattern {
                body_ratio,
                shadow_ratio,
            } => {
                check_positive("hammer_pattern", "body_ratio", *body_ratio)?;
                if *body_ratio > 1.0 {
                    return Err(Error::config(format!(
                        "hammer_pattern: body_ratio must be at most 1, got {body_ratio}"
                    )));
                }
                check_positive("hammer_pattern", "shadow_ratio", *shadow_ratio)
            }
            Self::EngulfingPattern { min_body_ratio } => {
                check_positive("engulfing_pattern", "min_body_ratio", *min_body_ratio)
            }
            Self::VolumeSpike {
                period,
                spike_multiplier,
                price_change_threshold,
            } => {
                check_period("volume_spike", "period", *period)?;
                check_positive("volume_spike", "spike_multiplier", *spike_multiplier)?;
                check_positive(
                    "volume_spike",
                    "price_change_threshold",
                    *price_change_threshold,
                )
            }
            Self::StopLossPct { percentage } | Self::TakeProfitPct { percentage } => {
                let rule = self.type_name();
                check_positive(rule, "percentage", *percentage)?;
                if *percentage >= 1.0 {
                    return Err(Error::config(format!(
                        "{rule}: percentage is a fraction of entry price and must be below 1, got {percentage}"
                    )));
                }
                Ok(())
            }
            Self::ChandelierExit {
                atr_period,
                atr_multiplier,
            } => {
                check_period("chandelier_exit", "atr_period", *atr_period)?;
                check_positive("chandelier_exit", "atr_multiplier", *atr_multiplier)
            }
        }
    }
}

/// Convert a `RuleSpec` into a concrete `Box<dyn RuleFn>`.
pub fn build_rule(spec: &RuleSpec) -> Box<dyn RuleFn> {
    match spec {
        RuleSpec::SmaCrossover {
            fast_period,
            slow_period,
        } => Box::new(SmaCrossover {
            fast_period: *fast_period,
            slow_period: *slow_period,
        }),
        RuleSpec::SmaCrossUnder {
            fast_period,
            slow_period,
        } => Box::new(SmaCrossUnder {
            fast_period: *fast_period,
            slow_period: *slow_period,
        }),
        RuleSpec::EmaCrossover {
            fast_period,
            slow_period,
        } => Box::new(EmaCrossover {
            fast_period: *fast_period,
            slow_period: *slow_period,
        }),
        RuleSpec::RsiOversold {
            period,
            oversold_threshold,
        } => Box::new(RsiOversold {
            period: *period,
            oversold_threshold: *oversold_threshold,
        }),
        RuleSpec::MacdCrossover { fast, slow, signal } => Box::new(MacdCrossover {
            fast: *fast,
            slow: *slow,
            signal: *signal,
        }),
        RuleSpec::BollingerSqueeze {
            period,
            std_dev,
            squeeze_threshold,
        } => Box::new(BollingerSqueeze {
            period: *period,
            std_dev: *std_dev,
            squeeze_threshold: *squeeze_threshold,
        }),
        RuleSpec::HammerPattern {
            body_ratio,
            shadow_ratio,
        } => Box::new(HammerPattern {
            body_ratio: *body_ratio,
            shadow_ratio: *shadow_ratio,
        }),
        RuleSpec::EngulfingPattern { min_body_ratio } => Box::new(EngulfingPattern {
            min_body_ratio: *min_body_ratio,
        }),
        RuleSpec::VolumeSpike {
            period,
            spike_multiplier,
            price_change_threshold,
        } => Box::new(VolumeSpike {
            period: *period,
            spike_multiplier: *spike_multiplier,
            price_change_threshold: *price_change_threshold,
        }),
        RuleSpec::StopLossPct { percentage } => Box::new(StopLossPct {
            percentage: *percentage,
        }),
        RuleSpec::TakeProfitPct { percentage } => Box::new(TakeProfitPct {
            percentage: *percentage,
        }),
        RuleSpec::ChandelierExit {
            atr_period,
            atr_multiplier,
        } => Box::new(ChandelierExit {
            atr_period: *atr_period,
            atr_multiplier: *atr_multiplier,
        }),
    }
}

/// Metadata about a rule for the catalog listing.
pub struct RuleInfo {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub params: &'static str,
}

pub const RULE_CATALOG: &[RuleInfo] = &[
    RuleInfo {
        name: "sma_crossover",
        category: "overlap",
        description: "Fast SMA crosses strictly above slow SMA (golden cross).",
        params: "fast_period, slow_period (fast < slow)",
    },
    RuleInfo {
        name: "sma_cross_under",
        category: "overlap",
        description: "Fast SMA crosses strictly below slow SMA; bearish exit signal.",
        params: "fast_period, slow_period (fast < slow)",
    },
    RuleInfo {
        name: "ema_crossover",
        category: "overlap",
        description: "Fast EMA crosses strictly above slow EMA.",
        params: "fast_period, slow_period (fast < slow)",
    },
    RuleInfo {
        name: "rsi_oversold",
        category: "momentum",
        description: "Wilder RSI crosses from at-or-above the threshold to below it.",
        params: "period (default 14), oversold_threshold (default 30)",
    },
    RuleInfo {
        name: "macd_crossover",
        category: "momentum",
        description: "MACD line crosses above its signal line.",
        params: "fast (12), slow (26), signal (9)",
    },
    RuleInfo {
        name: "bollinger_squeeze",
        category: "volatility",
        description: "Band width below threshold on the previous bar, close breaks the upper band.",
        params: "period (20), std_dev (2.0), squeeze_threshold (0.1)",
    },
    RuleInfo {
        name: "hammer_pattern",
        category: "candle",
        description: "Hammer candle: small body, long lower shadow.",
        params: "body_ratio (0.3), shadow_ratio (2.0)",
    },
    RuleInfo {
        name: "engulfing_pattern",
        category: "candle",
        description: "Bullish engulfing two-bar reversal.",
        params: "min_body_ratio (1.2)",
    },
    RuleInfo {
        name: "volume_spike",
        category: "volume",
        description: "Volume above its trailing average with a real price move.",
        params: "period (20), spike_multiplier (2.0), price_change_threshold (0.01)",
    },
    RuleInfo {
        name: "stop_loss_pct",
        category: "exit",
        description: "Fixed percentage stop-loss, filled at the stop level.",
        params: "percentage (fraction of entry price)",
    },
    RuleInfo {
        name: "take_profit_pct",
        category: "exit",
        description: "Fixed percentage take-profit, filled at the target level.",
        params: "percentage (fraction of entry price)",
    },
    RuleInfo {
        name: "chandelier_exit",
        category: "exit",
        description: "Trailing stop at peak high since entry minus a multiple of ATR.",
        params: "atr_period (22), atr_multiplier (3.0)",
    },
];
