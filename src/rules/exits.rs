// Exit-slot rules. Percentage stops and the chandelier trailing stop are
// not bar predicates: their parameters are consumed directly by the
// portfolio simulator and the position lifecycle, which need entry-anchored
// state (entry price, peak high) a pure per-bar rule cannot carry.
// Their `evaluate` therefore returns all-false.

use super::helpers::RuleFn;
use polars::prelude::*;

/// Placeholder rule for a fixed percentage stop-loss.
/// The simulator compares the bar's low against
/// `entry_price x (1 - percentage)` and fills at the stop level.
pub struct StopLossPct {
    pub percentage: f64,
}

impl RuleFn for StopLossPct {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let n = df.height();
        Ok(BooleanChunked::new("stop_loss_pct".into(), vec![false; n]).into_series())
    }
    fn name(&self) -> &'static str {
        "stop_loss_pct"
    }
}

/// Placeholder rule for a fixed percentage take-profit.
pub struct TakeProfitPct {
    pub percentage: f64,
}

impl RuleFn for TakeProfitPct {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let n = df.height();
        Ok(BooleanChunked::new("take_profit_pct".into(), vec![false; n]).into_series())
    }
    fn name(&self) -> &'static str {
        "take_profit_pct"
    }
}

/// Placeholder rule for the chandelier trailing stop:
/// exit level = peak high since entry - `atr_multiplier` x ATR(`atr_period`).
pub struct ChandelierExit {
    pub atr_period: usize,
    pub atr_multiplier: f64,
}

impl RuleFn for ChandelierExit {
    fn evaluate(&self, df: &DataFrame) -> Result<Series, PolarsError> {
        let n = df.height();
        Ok(BooleanChunked::new("chandelier_exit".into(), vec![false; n]).into_series())
    }
    fn name(&self) -> &'static str {
        "chandelier_exit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_all_false() {
        let df = df! { "close" => &[100.0, 101.0, 102.0] }.unwrap();
        for rule in [
            Box::new(StopLossPct { percentage: 0.05 }) as Box<dyn RuleFn>,
            Box::new(TakeProfitPct { percentage: 0.10 }),
            Box::new(ChandelierExit {
                atr_period: 22,
                atr_multiplier: 3.0,
            }),
        ] {
            let result = rule.evaluate(&df).unwrap();
            assert_eq!(result.len(), 3);
            assert!(result.bool().unwrap().into_no_null_iter().all(|b| !b));
        }
    }
}
