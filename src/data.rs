use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::warn;

use crate::error::{Error, Result};

/// The canonical date column name used internally after normalization.
pub const DATE_COL: &str = "date";

const PRICE_COLS: [&str; 4] = ["open", "high", "low", "close"];

/// Calendar-day gap between consecutive bars above which the frame is
/// flagged (roughly a full trading week).
const GAP_FLAG_CALENDAR_DAYS: i64 = 7;

/// A validated, read-only OHLCV table with an ascending date index.
///
/// Invariants enforced at construction: required columns present, strictly
/// ascending unique dates, all-positive prices, non-negative volume. Large
/// gaps are flagged (advisory) but do not fail validation.
#[derive(Debug, Clone)]
pub struct PriceFrame {
    df: DataFrame,
    dates: Vec<NaiveDate>,
}

impl PriceFrame {
    pub fn new(df: DataFrame, symbol: &str) -> Result<Self> {
        if df.height() == 0 {
            return Err(Error::data(symbol, "empty price frame"));
        }
        let df = normalize_date_column(df)
            .map_err(|e| Error::data(symbol, format!("date column: {e}")))?;
        for name in PRICE_COLS.iter().chain(std::iter::once(&"volume")) {
            if df.column(name).is_err() {
                return Err(Error::data(symbol, format!("missing column '{name}'")));
            }
        }

        let date_col = df
            .column(DATE_COL)
            .map_err(|e| Error::data(symbol, e.to_string()))?;
        let mut dates = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            dates.push(
                extract_date(date_col, i).map_err(|e| Error::data(symbol, e.to_string()))?,
            );
        }
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(Error::data(
                    symbol,
                    format!("dates not strictly ascending at {} -> {}", pair[0], pair[1]),
                ));
            }
            let gap = (pair[1] - pair[0]).num_days();
            if gap > GAP_FLAG_CALENDAR_DAYS {
                warn!(symbol, from = %pair[0], to = %pair[1], gap_days = gap, "price history gap");
            }
        }

        for name in PRICE_COLS {
            let values = crate::rules::helpers::column_to_f64(&df, name)
                .map_err(|e| Error::data(symbol, e.to_string()))?;
            if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                return Err(Error::data(symbol, format!("non-positive value in '{name}'")));
            }
        }
        let volume = crate::rules::helpers::column_to_f64(&df, "volume")
            .map_err(|e| Error::data(symbol, e.to_string()))?;
        if volume.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::data(symbol, "negative volume"));
        }

        Ok(Self { df, dates })
    }

    /// Build a frame from column vectors (fixtures, tests).
    pub fn from_parts(
        symbol: &str,
        dates: Vec<NaiveDate>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        volume: Vec<f64>,
    ) -> Result<Self> {
        let df = df! {
            DATE_COL => DateChunked::from_naive_date(PlSmallStr::from(DATE_COL), dates),
            "open" => open,
            "high" => high,
            "low" => low,
            "close" => close,
            "volume" => volume,
        }
        .map_err(Error::from)?;
        Self::new(df, symbol)
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Extract a numeric column aligned to the date index.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        crate::rules::helpers::column_to_f64(&self.df, name).map_err(Error::from)
    }

    /// Index of the first bar on or after `date`, if any.
    pub fn first_bar_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.dates.partition_point(|d| *d < date);
        (idx < self.dates.len()).then_some(idx)
    }

    /// Number of bars strictly before `date`.
    pub fn bars_before(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d < date)
    }

    /// The first `n` bars as a new frame. Used to cap indicator visibility
    /// at a walk-forward window boundary.
    pub fn truncated(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            df: self.df.slice(0, n),
            dates: self.dates[..n].to_vec(),
        }
    }

    /// Bars up to and including `date` (empty result is an error upstream).
    pub fn up_to(&self, date: NaiveDate) -> Self {
        self.truncated(self.dates.partition_point(|d| *d <= date))
    }
}

/// Normalize the date column to a polars `Date` column named `date`.
/// Accepts `Date`, `Datetime`, or parseable `String` sources.
fn normalize_date_column(df: DataFrame) -> std::result::Result<DataFrame, PolarsError> {
    let dtype = df.column(DATE_COL)?.dtype().clone();
    match dtype {
        DataType::Date => Ok(df),
        DataType::Datetime(_, _) | DataType::String => df
            .lazy()
            .with_column(col(DATE_COL).cast(DataType::Date))
            .collect(),
        other => Err(PolarsError::ComputeError(
            format!("unsupported date column type {other:?}").into(),
        )),
    }
}

/// Extract a `NaiveDate` from a `Date` column value at a given index.
fn extract_date(col: &Column, idx: usize) -> std::result::Result<NaiveDate, PolarsError> {
    let days = col.date()?.phys.get(idx).ok_or_else(|| {
        PolarsError::ComputeError(format!("null date at index {idx}").into())
    })?;
    // epoch offset: days from CE to 1970-01-01
    NaiveDate::from_num_days_from_ce_opt(days + 719_163)
        .ok_or_else(|| PolarsError::ComputeError(format!("invalid date at index {idx}").into()))
}

/// Source of validated per-symbol price history. The engine treats returned
/// frames as values; `freeze_date` caps the history for reproducible runs.
pub trait PriceDataProvider: Send + Sync {
    fn get_price_data(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        freeze_date: Option<NaiveDate>,
    ) -> Result<PriceFrame>;
}

/// Source of market-index history (e.g. NIFTY 50) for context filters and
/// benchmark returns.
pub trait MarketIndexProvider: Send + Sync {
    fn get_index_data(
        &self,
        name: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        freeze_date: Option<NaiveDate>,
    ) -> Result<PriceFrame>;
}

/// Directory of per-symbol parquet or CSV files. Vendor fetching and cache
/// refresh live outside the engine; this store only reads what is on disk.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_frame(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        freeze_date: Option<NaiveDate>,
    ) -> Result<PriceFrame> {
        let parquet = self.root.join(format!("{symbol}.parquet"));
        let csv = self.root.join(format!("{symbol}.csv"));
        let df = if parquet.exists() {
            let path_str = parquet.to_string_lossy().to_string();
            LazyFrame::scan_parquet(path_str.as_str().into(), ScanArgsParquet::default())
                .and_then(LazyFrame::collect)
                .map_err(|e| Error::data(symbol, format!("parquet read: {e}")))?
        } else if csv.exists() {
            CsvReadOptions::default()
                .with_has_header(true)
                .try_into_reader_with_file_path(Some(csv))
                .and_then(|r| r.finish())
                .map_err(|e| Error::data(symbol, format!("csv read: {e}")))?
        } else {
            return Err(Error::DataUnavailable(symbol.to_string()));
        };

        let frame = PriceFrame::new(df, symbol)?;
        let mut dates_kept: Vec<usize> = (0..frame.len()).collect();
        let effective_end = match (end_date, freeze_date) {
            (Some(e), Some(f)) => Some(e.min(f)),
            (e, f) => e.or(f),
        };
        dates_kept.retain(|&i| {
            let d = frame.dates()[i];
            start_date.is_none_or(|s| d >= s) && effective_end.is_none_or(|e| d <= e)
        });
        if dates_kept.is_empty() {
            return Err(Error::data(symbol, "no bars in requested date range"));
        }
        let first = dates_kept[0];
        let len = dates_kept.len();
        Ok(PriceFrame {
            df: frame.df.slice(first as i64, len),
            dates: frame.dates[first..first + len].to_vec(),
        })
    }
}

impl PriceDataProvider for LocalStore {
    fn get_price_data(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        freeze_date: Option<NaiveDate>,
    ) -> Result<PriceFrame> {
        self.read_frame(symbol, start_date, end_date, freeze_date)
    }
}

impl MarketIndexProvider for LocalStore {
    fn get_index_data(
        &self,
        name: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        freeze_date: Option<NaiveDate>,
    ) -> Result<PriceFrame> {
        self.read_frame(name, start_date, end_date, freeze_date)
    }
}

/// Load a universe file: one symbol per line, `#` comments and blanks
/// ignored.
pub fn load_universe(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("cannot read universe file {}: {e}", path.display()))
    })?;
    let symbols: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(ToString::to_string)
        .collect();
    if symbols.is_empty() {
        return Err(Error::config(format!(
            "universe file {} contains no symbols",
            path.display()
        )));
    }
    Ok(symbols)
}
