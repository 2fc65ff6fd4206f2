// float_cmp: only in tests where assert_eq! on f64 is intentional.
#![cfg_attr(test, allow(clippy::float_cmp))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{self, EnvFilter};

use edgefinder::config::Config;
use edgefinder::data::{self, LocalStore, MarketIndexProvider, PriceDataProvider};
use edgefinder::engine::discover_universe;
use edgefinder::engine::types::{rule_stack_json, RunContext};
use edgefinder::fingerprint::{config_hash, RunParameters};
use edgefinder::lifecycle::{reconcile, NewSignal};
use edgefinder::persistence::Store;
use edgefinder::rules::registry::RULE_CATALOG;
use edgefinder::rules::{evaluate_rule, RulesConfig};

#[derive(Parser)]
#[command(name = "edgefinder", about = "Rule-based strategy discovery and validation")]
struct Cli {
    /// Application config file (TOML)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// Rules config file (TOML)
    #[arg(long, default_value = "rules.toml")]
    rules: PathBuf,
    /// SQLite database path
    #[arg(long, default_value = "edgefinder.db")]
    db: PathBuf,
    /// Directory of per-symbol parquet/CSV price files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    /// Market index symbol for context filters and benchmark returns
    #[arg(long)]
    index_symbol: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover strategies for every symbol in the universe and persist them
    Discover {
        /// Universe file: one symbol per line
        #[arg(long, default_value = "universe.txt")]
        universe: PathBuf,
        /// Delete current-config rows for active combinations before saving
        #[arg(long)]
        clear_current: bool,
    },
    /// Evaluate open positions and today's signals, persist the transitions
    Reconcile {
        /// Universe file: one symbol per line
        #[arg(long, default_value = "universe.txt")]
        universe: PathBuf,
        /// Evaluation date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List persisted strategies (deduplicated)
    Strategies {
        #[arg(long)]
        symbol: Option<String>,
        /// Print the rule catalog instead
        #[arg(long)]
        catalog: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("loading application config")?;
    let rules = RulesConfig::load(&cli.rules).context("loading rules config")?;
    let store_dir = LocalStore::new(&cli.data_dir);

    let index_frame = match &cli.index_symbol {
        Some(name) => Some(
            store_dir
                .get_index_data(name, None, None, config.freeze_date)
                .with_context(|| format!("loading market index '{name}'"))?,
        ),
        None => None,
    };

    match cli.command {
        Command::Discover {
            universe,
            clear_current,
        } => {
            let symbols = data::load_universe(&universe)?;
            let ctx = RunContext::new(
                &rules,
                &config,
                &universe.to_string_lossy(),
                RunParameters {
                    freeze_date: config.freeze_date,
                    start_date: None,
                    end_date: None,
                },
                Utc::now().to_rfc3339(),
            );
            let results =
                discover_universe(&symbols, &store_dir, index_frame.as_ref(), &rules, &config, &ctx);

            let mut store = Store::open(&cli.db)?;
            if clear_current {
                let active: Vec<String> = results
                    .iter()
                    .map(|r| rule_stack_json(&r.rule_stack))
                    .collect();
                let report =
                    store.clear_current_strategies(&config_hash(&rules, &config), &active)?;
                println!(
                    "cleared {} current rows ({} preserved)",
                    report.deleted, report.preserved
                );
            }
            let written = store.save_strategies(&results)?;
            println!("persisted {written} strategies for {} symbols", symbols.len());
        }
        Command::Reconcile { universe, date } => {
            let today = date.unwrap_or_else(|| Utc::now().date_naive());
            let today = config.freeze_date.map_or(today, |f| today.min(f));
            let mut store = Store::open(&cli.db)?;
            let open_positions = store.open_positions()?;
            let symbols = data::load_universe(&universe)?;
            let new_signals =
                todays_signals(&store, &store_dir, &symbols, &config, today)?;
            let plan = reconcile(
                today,
                &new_signals,
                &open_positions,
                &store_dir,
                index_frame.as_ref(),
                &rules,
                &config,
                &Utc::now().to_rfc3339(),
            )?;
            for held in &plan.to_hold {
                if let Some(diag) = &held.diagnostics {
                    println!(
                        "HOLD  {:10} {:>8.2} ({:+.2}% / {} days)",
                        held.position.symbol,
                        diag.current_price,
                        diag.return_pct * 100.0,
                        diag.days_held
                    );
                }
            }
            for fill in &plan.to_close {
                println!(
                    "CLOSE #{:<4} @ {:>8.2} ({})",
                    fill.position_id, fill.exit_price, fill.exit_reason
                );
            }
            for open in &plan.to_open {
                println!("OPEN  {:10} @ {:>8.2}", open.symbol, open.entry_price);
            }
            store.apply_reconciliation(&plan.to_close, &plan.to_open)?;
        }
        Command::Strategies { symbol, catalog } => {
            if catalog {
                for info in RULE_CATALOG {
                    println!("{:20} [{}] {} ({})", info.name, info.category, info.description, info.params);
                }
                return Ok(());
            }
            let store = Store::open(&cli.db)?;
            for row in store.query_strategies(symbol.as_deref())? {
                println!(
                    "{:10} edge={:.3} win={:.1}% sharpe={:.2} trades={:3} [{}] {}",
                    row.symbol,
                    row.edge_score,
                    row.win_pct * 100.0,
                    row.sharpe,
                    row.total_trades,
                    row.config_hash,
                    rule_stack_json(&row.rule_stack),
                );
            }
        }
    }
    Ok(())
}

/// Evaluate each persisted strategy's entry stack on history ending at
/// `today`; a stack whose combined signal fires on today's bar becomes a
/// new-position signal at that bar's close.
fn todays_signals(
    store: &Store,
    provider: &LocalStore,
    universe: &[String],
    config: &Config,
    today: NaiveDate,
) -> Result<Vec<NewSignal>> {
    let mut signals = Vec::new();
    for symbol in universe {
        let strategies = store.query_strategies(Some(symbol))?;
        let Some(best) = strategies.first() else {
            continue;
        };
        let frame = match provider.get_price_data(symbol, None, Some(today), config.freeze_date) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "no price data for signal evaluation");
                continue;
            }
        };
        if frame.last_date() != today {
            continue;
        }
        let last = frame.len() - 1;
        let mut fired = true;
        for def in &best.rule_stack {
            let signal = evaluate_rule(&def.spec, frame.df())?;
            fired &= signal[last];
        }
        if fired {
            let close = frame.column("close")?;
            signals.push(NewSignal {
                symbol: symbol.clone(),
                rule_stack: best.rule_stack.clone(),
                signal_date: today,
                entry_price: close[last],
            });
        }
    }
    Ok(signals)
}
