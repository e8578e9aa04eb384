//! Board data provider trait and structured error types.
//!
//! The BoardProvider trait abstracts over the market-data source (EastMoney's
//! industry-board endpoints in production, scripted providers in tests) so the
//! retry and cache layers never know where rows come from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An industry board (sector) as listed by the provider's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Display name, e.g. "煤炭行业". This is the sector identifier.
    pub name: String,
    /// Provider-specific code, e.g. "BK0437".
    pub code: String,
}

/// One daily trading row for a board.
///
/// Percent-change, amplitude and turnover-rate are in percentage points
/// (2.5 means 2.5 %), exactly as the provider reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRow {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    /// Traded volume in lots (手).
    pub volume: f64,
    /// Turnover amount in yuan.
    pub amount: f64,
    pub amplitude: f64,
    pub pct_change: f64,
    pub change: f64,
    pub turnover_rate: f64,
}

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI output and warning lists.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from provider")]
    Http { status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("board not found: {board}")]
    BoardNotFound { board: String },

    #[error("no rows returned for '{board}' between {start} and {end}")]
    Empty {
        board: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("data error: {0}")]
    Other(String),
}

/// Trait for board data providers.
///
/// Implementations make exactly one remote call per method invocation; retry
/// and memoization sit above this trait.
pub trait BoardProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// List every industry board known to the provider.
    fn list_boards(&self) -> Result<Vec<Board>, DataError>;

    /// Fetch daily rows for a board over an inclusive date range, oldest first.
    fn fetch_history(
        &self,
        board: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradingRow>, DataError>;
}

impl<P: BoardProvider + ?Sized> BoardProvider for &P {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn list_boards(&self) -> Result<Vec<Board>, DataError> {
        (**self).list_boards()
    }

    fn fetch_history(
        &self,
        board: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradingRow>, DataError> {
        (**self).fetch_history(board, start, end)
    }
}

/// Progress callback for the all-boards aggregation pass.
pub trait FetchProgress {
    /// Called when starting to fetch a board.
    fn on_start(&self, board: &str, index: usize, total: usize);

    /// Called when a board reaches a terminal state.
    fn on_complete(&self, board: &str, index: usize, total: usize, result: &Result<(), DataError>);

    /// Called when the entire pass is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Simple progress reporter that prints to stdout.
pub struct StdoutProgress;

impl FetchProgress for StdoutProgress {
    fn on_start(&self, board: &str, index: usize, total: usize) {
        println!("[{}/{}] Fetching {board}...", index + 1, total);
    }

    fn on_complete(
        &self,
        board: &str,
        _index: usize,
        _total: usize,
        result: &Result<(), DataError>,
    ) {
        match result {
            Ok(()) => println!("  OK: {board}"),
            Err(e) => println!("  FAIL: {board}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("\nSnapshot complete: {succeeded}/{total} boards captured, {failed} failed");
    }
}

/// Progress reporter that reports nothing.
pub struct SilentProgress;

impl FetchProgress for SilentProgress {
    fn on_start(&self, _board: &str, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _board: &str,
        _index: usize,
        _total: usize,
        _result: &Result<(), DataError>,
    ) {
    }

    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}

/// Format a date the way the provider's query parameters expect (`YYYYMMDD`).
pub fn provider_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse a `YYYYMMDD` date string.
pub fn parse_provider_date(s: &str) -> Result<NaiveDate, DataError> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .map_err(|e| DataError::Other(format!("invalid date '{s}' (expected YYYYMMDD): {e}")))
}
