use std::path::Path;

use chrono::NaiveDate;
use refinery::embed_migrations;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::types::{rule_stack_json, StrategyResult};
use crate::error::{Error, Result};
use crate::rules::RuleDef;

embed_migrations!("migrations");

/// Lifecycle state of a position. `CLOSED` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => Err(Error::persistence(format!("unknown position status '{other}'"))),
        }
    }
}

/// A persisted position record. Created by the lifecycle on a new signal,
/// mutated only by the OPEN → CLOSED transition.
#[derive(Debug, Clone)]
pub struct Position {
    pub id: i64,
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub status: PositionStatus,
    pub rule_stack_used: Vec<RuleDef>,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<f64>,
    pub final_return_pct: Option<f64>,
    pub final_nifty_return_pct: Option<f64>,
    pub days_held: Option<i64>,
    pub exit_reason: Option<String>,
    pub created_at: String,
}

/// A position to open, produced by the lifecycle from a fresh signal.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub rule_stack: Vec<RuleDef>,
    pub created_at: String,
}

/// The terminal fill closing an existing position.
#[derive(Debug, Clone)]
pub struct ClosedFill {
    pub position_id: i64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub final_return_pct: f64,
    pub final_nifty_return_pct: Option<f64>,
    pub days_held: i64,
    pub exit_reason: String,
}

/// Outcome of an intelligent clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted: usize,
    pub preserved: usize,
}

/// SQLite-backed store for strategies and positions.
///
/// Migrations are embedded and applied on open; an existing database file
/// is backed up first. All multi-row writes run in one transaction.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path`, backing up an existing file
    /// before applying any pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            let backup = path.with_extension("db.bak");
            std::fs::copy(path, &backup).map_err(|e| {
                Error::persistence(format!("pre-migration backup {}: {e}", backup.display()))
            })?;
        }
        let mut conn = Connection::open(path)?;
        migrations::runner()
            .run(&mut conn)
            .map_err(|e| Error::persistence(format!("migration failed: {e}")))?;
        Ok(Self { conn })
    }

    /// In-memory store, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrations::runner()
            .run(&mut conn)
            .map_err(|e| Error::persistence(format!("migration failed: {e}")))?;
        Ok(Self { conn })
    }

    /// Insert-or-replace a batch of strategy results in one transaction.
    /// The unique key `(symbol, rule_stack, config_hash)` deduplicates:
    /// rewriting the same strategy leaves exactly one row, the newer one.
    pub fn save_strategies(&mut self, results: &[StrategyResult]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        for result in results {
            tx.execute(
                "INSERT OR REPLACE INTO strategies
                 (symbol, rule_stack, edge_score, win_pct, sharpe, total_return,
                  total_trades, avg_return, run_timestamp, config_snapshot, config_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    result.symbol,
                    rule_stack_json(&result.rule_stack),
                    result.edge_score,
                    result.win_pct,
                    result.sharpe,
                    result.total_return,
                    result.total_trades as i64,
                    result.avg_return,
                    result.run_timestamp,
                    result.config_snapshot,
                    result.config_hash,
                ],
            )?;
            written += 1;
        }
        tx.commit()?;
        Ok(written)
    }

    /// Read strategies, deduplicated: when several rows share
    /// `(symbol, rule_stack)` only the one with the highest id (latest
    /// insertion) is returned.
    pub fn query_strategies(&self, symbol: Option<&str>) -> Result<Vec<StrategyResult>> {
        let sql = "SELECT symbol, rule_stack, edge_score, win_pct, sharpe, total_return,
                          total_trades, avg_return, run_timestamp, config_snapshot, config_hash
                   FROM strategies
                   WHERE id IN (SELECT MAX(id) FROM strategies GROUP BY symbol, rule_stack)
                     AND (?1 IS NULL OR symbol = ?1)
                   ORDER BY symbol, edge_score DESC";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![symbol], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, Option<String>>(10)?,
            ))
        })?;
        let mut results = Vec::new();
        for row in rows {
            let (
                symbol,
                stack_json,
                edge_score,
                win_pct,
                sharpe,
                total_return,
                total_trades,
                avg_return,
                run_timestamp,
                config_snapshot,
                config_hash,
            ) = row?;
            let rule_stack: Vec<RuleDef> = serde_json::from_str(&stack_json)?;
            results.push(StrategyResult {
                symbol,
                rule_stack,
                edge_score,
                win_pct,
                sharpe,
                total_return,
                total_trades: total_trades.max(0) as usize,
                avg_return,
                run_timestamp,
                config_snapshot: config_snapshot.unwrap_or_else(|| "{\"legacy\": true}".into()),
                config_hash: config_hash.unwrap_or_else(|| "legacy".into()),
            });
        }
        Ok(results)
    }

    /// Delete only rows matching both the current config hash and one of
    /// the active rule stacks. Rows from other config revisions, deprecated
    /// combinations, and legacy rows are preserved.
    pub fn clear_current_strategies(
        &mut self,
        config_hash: &str,
        active_stacks: &[String],
    ) -> Result<ClearReport> {
        let tx = self.conn.transaction()?;
        let total: i64 =
            tx.query_row("SELECT COUNT(*) FROM strategies", [], |row| row.get(0))?;
        let mut deleted = 0usize;
        for stack in active_stacks {
            deleted += tx.execute(
                "DELETE FROM strategies
                 WHERE config_hash = ?1 AND rule_stack = ?2 AND config_hash != 'legacy'",
                params![config_hash, stack],
            )?;
        }
        tx.commit()?;
        let report = ClearReport {
            deleted,
            preserved: (total as usize).saturating_sub(deleted),
        };
        info!(
            config_hash,
            deleted = report.deleted,
            preserved = report.preserved,
            "cleared current strategies"
        );
        Ok(report)
    }

    /// All positions currently OPEN.
    pub fn open_positions(&self) -> Result<Vec<Position>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, symbol, entry_date, entry_price, status, rule_stack_used,
                    exit_date, exit_price, final_return_pct, final_nifty_return_pct,
                    days_held, exit_reason, created_at
             FROM positions WHERE status = 'OPEN' ORDER BY symbol",
        )?;
        let rows = stmt.query_map([], position_from_row)?;
        let mut positions = Vec::new();
        for row in rows {
            positions.push(row??);
        }
        Ok(positions)
    }

    /// Apply one reconciliation pass atomically: close filled positions and
    /// open new ones. A new position for a symbol that already has an OPEN
    /// row is a logged no-op.
    pub fn apply_reconciliation(
        &mut self,
        to_close: &[ClosedFill],
        to_open: &[NewPosition],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        for fill in to_close {
            let changed = tx.execute(
                "UPDATE positions
                 SET status = 'CLOSED', exit_date = ?2, exit_price = ?3,
                     final_return_pct = ?4, final_nifty_return_pct = ?5,
                     days_held = ?6, exit_reason = ?7
                 WHERE id = ?1 AND status = 'OPEN'",
                params![
                    fill.position_id,
                    fill.exit_date.to_string(),
                    fill.exit_price,
                    fill.final_return_pct,
                    fill.final_nifty_return_pct,
                    fill.days_held,
                    fill.exit_reason,
                ],
            )?;
            if changed == 0 {
                warn!(position_id = fill.position_id, "close skipped: position not OPEN");
            }
        }
        for new_position in to_open {
            let already_open: i64 = tx.query_row(
                "SELECT COUNT(*) FROM positions WHERE symbol = ?1 AND status = 'OPEN'",
                params![new_position.symbol],
                |row| row.get(0),
            )?;
            if already_open > 0 {
                warn!(
                    symbol = %new_position.symbol,
                    "open skipped: symbol already has an OPEN position"
                );
                continue;
            }
            tx.execute(
                "INSERT INTO positions
                 (symbol, entry_date, entry_price, status, rule_stack_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new_position.symbol,
                    new_position.entry_date.to_string(),
                    new_position.entry_price,
                    PositionStatus::Open.as_str(),
                    rule_stack_json(&new_position.rule_stack),
                    new_position.created_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

type PositionRow = (
    i64,
    String,
    String,
    f64,
    String,
    String,
    Option<String>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<i64>,
    Option<String>,
    String,
);

fn position_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Position>> {
    let raw: PositionRow = (
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    );
    Ok(build_position(raw))
}

fn build_position(raw: PositionRow) -> Result<Position> {
    let (
        id,
        symbol,
        entry_date,
        entry_price,
        status,
        stack_json,
        exit_date,
        exit_price,
        final_return_pct,
        final_nifty_return_pct,
        days_held,
        exit_reason,
        created_at,
    ) = raw;
    let parse_date = |s: &str| {
        s.parse::<NaiveDate>()
            .map_err(|e| Error::persistence(format!("bad date '{s}': {e}")))
    };
    Ok(Position {
        id,
        symbol,
        entry_date: parse_date(&entry_date)?,
        entry_price,
        status: PositionStatus::parse(&status)?,
        rule_stack_used: serde_json::from_str(&stack_json)?,
        exit_date: exit_date.as_deref().map(parse_date).transpose()?,
        exit_price,
        final_return_pct,
        final_nifty_return_pct,
        days_held,
        exit_reason,
        created_at,
    })
}
