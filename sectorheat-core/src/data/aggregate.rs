//! All-boards snapshot: latest row per board over a trailing window.
//!
//! One pass lists the board directory, fetches every board through the
//! [`HistoryFetcher`], and keeps the last row of each window. A board that
//! fails (after retries) is recorded as a [`SectorFailure`] and skipped; the
//! pass itself only fails when the directory cannot be listed.
//!
//! Finished snapshots are held in a [`SnapshotCache`], so repeated calls within
//! the TTL reuse the same snapshot without touching the provider.

use super::acquisition::HistoryFetcher;
use super::cache::{Clock, SnapshotCache, SystemClock};
use super::provider::{BoardProvider, DataError, FetchProgress, TradingRow};
use super::retry::{Sleeper, ThreadSleeper};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trailing window length, in calendar days.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Lifetime of a cached snapshot.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(60 * 60);

/// A board's most recent row in the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardRow {
    pub board: String,
    #[serde(flatten)]
    pub row: TradingRow,
}

/// A board that produced no row in this pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorFailure {
    pub board: String,
    pub message: String,
}

/// Terminal state of one board within a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SectorOutcome {
    Captured(BoardRow),
    /// The error left after retries, or [`DataError::Empty`] for an empty window.
    Failed(DataError),
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// First day of the requested window.
    pub start: NaiveDate,
    /// Last day of the requested window.
    pub end: NaiveDate,
    pub rows: Vec<BoardRow>,
    pub failures: Vec<SectorFailure>,
    /// Local wall-clock time the pass finished.
    pub built_at: DateTime<Local>,
}

impl Snapshot {
    /// Number of boards the pass attempted.
    pub fn attempted(&self) -> usize {
        self.rows.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Window and snapshot-TTL settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationConfig {
    pub window_days: u32,
    pub snapshot_ttl: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
        }
    }
}

/// Builds and caches all-boards snapshots.
pub struct SnapshotAggregator<P, S = ThreadSleeper, C = SystemClock> {
    fetcher: HistoryFetcher<P, S>,
    clock: C,
    window_days: u32,
    snapshots: SnapshotCache<Snapshot>,
}

impl<P: BoardProvider, S: Sleeper> SnapshotAggregator<P, S> {
    pub fn new(fetcher: HistoryFetcher<P, S>, config: AggregationConfig) -> Self {
        Self::with_clock(fetcher, config, SystemClock)
    }
}

impl<P: BoardProvider, S: Sleeper, C: Clock> SnapshotAggregator<P, S, C> {
    pub fn with_clock(fetcher: HistoryFetcher<P, S>, config: AggregationConfig, clock: C) -> Self {
        Self {
            fetcher,
            clock,
            window_days: config.window_days,
            snapshots: SnapshotCache::new(config.snapshot_ttl),
        }
    }

    /// The snapshot for the window ending `today`, reused while fresh.
    ///
    /// A cached snapshot is returned as-is within the TTL even if `today` has
    /// moved on since it was built. The TTL starts when the pass finishes.
    pub fn snapshot(
        &mut self,
        today: NaiveDate,
        progress: &dyn FetchProgress,
    ) -> Result<Snapshot, DataError> {
        let now = self.clock.now();
        if let Some(cached) = self.snapshots.get(now) {
            tracing::debug!(
                rows = cached.rows.len(),
                age_secs = self.snapshots.age(now).unwrap_or_default().as_secs(),
                "snapshot cache hit"
            );
            return Ok(cached.clone());
        }

        let snapshot = self.build(today, progress)?;
        let stored_at = self.clock.now();
        self.snapshots.store(stored_at, snapshot.clone());
        Ok(snapshot)
    }

    /// Drop the cached snapshot and build a new one. The request memo is kept.
    pub fn refresh(
        &mut self,
        today: NaiveDate,
        progress: &dyn FetchProgress,
    ) -> Result<Snapshot, DataError> {
        self.snapshots.invalidate();
        self.snapshot(today, progress)
    }

    /// Run one uncached pass over every board in the directory.
    pub fn build(
        &mut self,
        today: NaiveDate,
        progress: &dyn FetchProgress,
    ) -> Result<Snapshot, DataError> {
        let (start, end) = self.window(today);
        let boards = self.fetcher.list_boards()?;
        let total = boards.len();

        let mut rows = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (i, board) in boards.iter().enumerate() {
            progress.on_start(&board.name, i, total);

            match self.outcome(&board.name, start, end) {
                SectorOutcome::Captured(row) => {
                    progress.on_complete(&board.name, i, total, &Ok(()));
                    rows.push(row);
                }
                SectorOutcome::Failed(error) => {
                    tracing::warn!(board = %board.name, %error, "board skipped");
                    let failure = SectorFailure {
                        board: board.name.clone(),
                        message: error.to_string(),
                    };
                    progress.on_complete(&board.name, i, total, &Err(error));
                    failures.push(failure);
                }
            }
        }

        progress.on_batch_complete(rows.len(), failures.len(), total);
        tracing::info!(
            %start,
            %end,
            captured = rows.len(),
            failed = failures.len(),
            "snapshot built"
        );

        Ok(Snapshot {
            start,
            end,
            rows,
            failures,
            built_at: Local::now(),
        })
    }

    /// Fetch one board and reduce it to its terminal state.
    pub fn outcome(&mut self, board: &str, start: NaiveDate, end: NaiveDate) -> SectorOutcome {
        let fetched = self.fetcher.fetch(board, start, end).and_then(|rows| {
            rows.into_iter().last().ok_or_else(|| DataError::Empty {
                board: board.to_string(),
                start,
                end,
            })
        });

        match fetched {
            Ok(row) => SectorOutcome::Captured(BoardRow {
                board: board.to_string(),
                row,
            }),
            Err(e) => SectorOutcome::Failed(e),
        }
    }

    /// `[today - window_days, today]`.
    pub fn window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today - ChronoDuration::days(i64::from(self.window_days)), today)
    }

    pub fn fetcher(&self) -> &HistoryFetcher<P, S> {
        &self.fetcher
    }

    pub fn fetcher_mut(&mut self) -> &mut HistoryFetcher<P, S> {
        &mut self.fetcher
    }

    /// Age of the cached snapshot, if any.
    pub fn snapshot_age(&self) -> Option<Duration> {
        self.snapshots.age(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::ManualClock;
    use crate::data::provider::{Board, SilentProgress};
    use crate::data::retry::{RecordingSleeper, RetryPolicy};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        broken: HashSet<&'static str>,
        history_calls: AtomicUsize,
    }

    impl BoardProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn list_boards(&self) -> Result<Vec<Board>, DataError> {
            Ok(["煤炭行业", "银行", "半导体"]
                .iter()
                .enumerate()
                .map(|(i, n)| Board {
                    name: n.to_string(),
                    code: format!("BK{i:04}"),
                })
                .collect())
        }

        fn fetch_history(
            &self,
            board: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<TradingRow>, DataError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.contains(board) {
                return Err(DataError::Http { status: 502 });
            }
            Ok([start, end]
                .iter()
                .enumerate()
                .map(|(i, &date)| TradingRow {
                    date,
                    open: 100.0,
                    close: 101.0 + i as f64,
                    high: 102.0,
                    low: 99.0,
                    volume: 5.0e5,
                    amount: 3.0e8,
                    amplitude: 3.0,
                    pct_change: 1.0 + i as f64,
                    change: 1.0,
                    turnover_rate: 0.8,
                })
                .collect())
        }
    }

    fn aggregator<'a>(
        broken: &[&'static str],
        clock: &'a ManualClock,
    ) -> SnapshotAggregator<Fixed, RecordingSleeper, &'a ManualClock> {
        let fetcher = HistoryFetcher::with_sleeper(
            Fixed {
                broken: broken.iter().copied().collect(),
                history_calls: AtomicUsize::new(0),
            },
            RetryPolicy::new(2, Duration::from_millis(10)),
            RecordingSleeper::new(),
        );
        SnapshotAggregator::with_clock(fetcher, AggregationConfig::default(), clock)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    #[test]
    fn window_is_seven_days_ending_today() {
        let clock = ManualClock::new();
        let agg = aggregator(&[], &clock);
        let (start, end) = agg.window(today());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 7).unwrap());
        assert_eq!(end, today());
    }

    #[test]
    fn keeps_last_row_per_board() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&[], &clock);
        let snap = agg.snapshot(today(), &SilentProgress).unwrap();

        assert_eq!(snap.rows.len(), 3);
        assert!(snap.failures.is_empty());
        for row in &snap.rows {
            assert_eq!(row.row.date, today());
            assert_eq!(row.row.pct_change, 2.0);
        }
        assert_eq!(snap.rows[1].board, "银行");
    }

    #[test]
    fn failing_board_is_skipped_with_warning() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&["银行"], &clock);
        let snap = agg.snapshot(today(), &SilentProgress).unwrap();

        assert_eq!(snap.rows.len(), 2);
        assert_eq!(snap.attempted(), 3);
        assert_eq!(snap.failures.len(), 1);
        assert_eq!(snap.failures[0].board, "银行");
        assert!(snap.failures[0].message.contains("502"));
        assert!(snap.rows.iter().all(|r| r.board != "银行"));
    }

    #[test]
    fn failed_outcome_keeps_provider_error() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&["银行"], &clock);
        let (start, end) = agg.window(today());
        assert_eq!(
            agg.outcome("银行", start, end),
            SectorOutcome::Failed(DataError::Http { status: 502 })
        );
    }

    #[test]
    fn progress_sees_the_original_error() {
        use std::cell::RefCell;

        #[derive(Default)]
        struct Errors(RefCell<Vec<DataError>>);

        impl FetchProgress for Errors {
            fn on_start(&self, _board: &str, _index: usize, _total: usize) {}
            fn on_complete(
                &self,
                _board: &str,
                _index: usize,
                _total: usize,
                result: &Result<(), DataError>,
            ) {
                if let Err(e) = result {
                    self.0.borrow_mut().push(e.clone());
                }
            }
            fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
        }

        let clock = ManualClock::new();
        let mut agg = aggregator(&["银行"], &clock);
        let errors = Errors::default();
        let snap = agg.snapshot(today(), &errors).unwrap();

        assert_eq!(*errors.0.borrow(), vec![DataError::Http { status: 502 }]);
        assert_eq!(snap.failures[0].message, "HTTP 502 from provider");
    }

    #[test]
    fn cached_snapshot_skips_provider_until_ttl() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&[], &clock);
        let first = agg.snapshot(today(), &SilentProgress).unwrap();
        let calls = agg.fetcher().provider().history_calls.load(Ordering::SeqCst);
        assert_eq!(calls, 3);

        clock.advance(Duration::from_secs(59 * 60));
        let second = agg.snapshot(today(), &SilentProgress).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            agg.fetcher().provider().history_calls.load(Ordering::SeqCst),
            3
        );

        clock.advance(Duration::from_secs(60));
        let next_day = today().succ_opt().unwrap();
        let third = agg.snapshot(next_day, &SilentProgress).unwrap();
        assert_eq!(third.end, next_day);
        assert_eq!(
            agg.fetcher().provider().history_calls.load(Ordering::SeqCst),
            6
        );
    }

    #[test]
    fn expired_snapshot_reuses_request_memo_for_same_window() {
        let clock = ManualClock::new();
        let mut agg = aggregator(&[], &clock);
        agg.snapshot(today(), &SilentProgress).unwrap();
        clock.advance(DEFAULT_SNAPSHOT_TTL);
        agg.snapshot(today(), &SilentProgress).unwrap();
        assert_eq!(
            agg.fetcher().provider().history_calls.load(Ordering::SeqCst),
            3
        );
    }

    #[test]
    fn empty_window_counts_as_failure() {
        struct Nothing;
        impl BoardProvider for Nothing {
            fn name(&self) -> &str {
                "nothing"
            }
            fn list_boards(&self) -> Result<Vec<Board>, DataError> {
                Ok(vec![Board {
                    name: "银行".into(),
                    code: "BK0475".into(),
                }])
            }
            fn fetch_history(
                &self,
                _board: &str,
                _start: NaiveDate,
                _end: NaiveDate,
            ) -> Result<Vec<TradingRow>, DataError> {
                Ok(vec![])
            }
        }

        let fetcher = HistoryFetcher::with_sleeper(
            Nothing,
            RetryPolicy::default(),
            RecordingSleeper::new(),
        );
        let mut agg = SnapshotAggregator::new(fetcher, AggregationConfig::default());
        let snap = agg.snapshot(today(), &SilentProgress).unwrap();
        assert!(snap.is_empty());
        assert_eq!(snap.failures.len(), 1);
        assert!(snap.failures[0].message.starts_with("no rows returned"));
    }
}
