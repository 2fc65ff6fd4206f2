pub mod backtester;
pub mod metrics;
pub mod seeker;
pub mod simulator;
pub mod sizing;
pub mod types;
pub mod walk_forward;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::Config;
use crate::data::{PriceDataProvider, PriceFrame};
use crate::error::Error;
use crate::rules::RulesConfig;

use types::{RunContext, StrategyResult};

/// Run strategy discovery across a universe of symbols.
///
/// Symbols are independent: each worker gets the shared immutable inputs
/// plus its own price frame and emits results. A symbol whose data is
/// unavailable or invalid is logged and skipped; it never aborts the run.
/// Results come back sorted by symbol so repeated runs are directly
/// comparable, and the caller commits them in one transaction.
pub fn discover_universe(
    symbols: &[String],
    provider: &(dyn PriceDataProvider + Sync),
    index: Option<&PriceFrame>,
    rules: &RulesConfig,
    config: &Config,
    ctx: &RunContext,
) -> Vec<StrategyResult> {
    let mut results: Vec<StrategyResult> = symbols
        .par_iter()
        .flat_map_iter(|symbol| {
            let price = match provider.get_price_data(symbol, None, None, config.freeze_date) {
                Ok(frame) => frame,
                Err(Error::DataUnavailable(_)) => {
                    warn!(symbol = %symbol, "no price data; skipping symbol");
                    return Vec::new().into_iter();
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "price data rejected; skipping symbol");
                    return Vec::new().into_iter();
                }
            };
            seeker::find_strategies(&price, index, rules, config, symbol, ctx).into_iter()
        })
        .collect();
    results.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    info!(
        symbols = symbols.len(),
        strategies = results.len(),
        "universe discovery complete"
    );
    results
}
