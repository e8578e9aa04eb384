//! End-to-end tests for the all-boards snapshot pipeline with scripted providers.
//!
//! directory → retrying fetch per board → latest row → transform → view.

use chrono::NaiveDate;
use proptest::prelude::*;
use sectorheat_core::data::{
    AggregationConfig, Board, BoardProvider, DataError, FetchProgress, HistoryFetcher,
    ManualClock, RecordingSleeper, RetryPolicy, SilentProgress, SnapshotAggregator, TradingRow,
};
use sectorheat_core::view::{ColorMetric, HeatmapQuery, HeatmapView, ViewError};
use sectorheat_core::{table, transform};
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Market {
    boards: Vec<String>,
    broken: HashSet<String>,
    directory_down: bool,
    history_calls: AtomicUsize,
}

impl Market {
    fn new(n: usize, broken: &[usize]) -> Self {
        let boards: Vec<String> = (0..n).map(|i| format!("板块{i:02}")).collect();
        let broken = broken.iter().map(|&i| boards[i].clone()).collect();
        Self {
            boards,
            broken,
            directory_down: false,
            history_calls: AtomicUsize::new(0),
        }
    }
}

impl BoardProvider for Market {
    fn name(&self) -> &str {
        "market"
    }

    fn list_boards(&self) -> Result<Vec<Board>, DataError> {
        if self.directory_down {
            return Err(DataError::Http { status: 503 });
        }
        Ok(self
            .boards
            .iter()
            .enumerate()
            .map(|(i, name)| Board {
                name: name.clone(),
                code: format!("BK{:04}", 400 + i),
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
            return Err(DataError::Network(format!("connection reset ({board})")));
        }
        let idx = self.boards.iter().position(|b| b == board).unwrap_or(0) as f64;
        let mut rows = Vec::new();
        let mut date = start;
        while date <= end {
            let offset = (date - start).num_days() as f64;
            rows.push(TradingRow {
                date,
                open: 1000.0,
                close: 1000.0 + offset,
                high: 1010.0,
                low: 990.0,
                volume: 1.0e6 + idx,
                amount: 2.5e8,
                amplitude: 2.0,
                pct_change: idx - 2.0 + offset / 10.0,
                change: offset,
                turnover_rate: 3.0,
            });
            date = date.succ_opt().unwrap();
        }
        Ok(rows)
    }
}

#[derive(Default)]
struct RecordingProgress {
    started: RefCell<Vec<String>>,
    warnings: RefCell<Vec<String>>,
    batch: RefCell<Option<(usize, usize, usize)>>,
}

impl FetchProgress for RecordingProgress {
    fn on_start(&self, board: &str, _index: usize, _total: usize) {
        self.started.borrow_mut().push(board.to_string());
    }

    fn on_complete(&self, board: &str, _index: usize, _total: usize, result: &Result<(), DataError>) {
        if let Err(e) = result {
            self.warnings.borrow_mut().push(format!("{board}: {e}"));
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        *self.batch.borrow_mut() = Some((succeeded, failed, total));
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
}

fn aggregator<'c>(
    market: Market,
    clock: &'c ManualClock,
) -> SnapshotAggregator<Market, RecordingSleeper, &'c ManualClock> {
    let fetcher = HistoryFetcher::with_sleeper(
        market,
        RetryPolicy::new(3, Duration::from_secs(1)),
        RecordingSleeper::new(),
    );
    SnapshotAggregator::with_clock(fetcher, AggregationConfig::default(), clock)
}

#[test]
fn partial_failures_yield_remaining_rows_and_warnings() {
    let clock = ManualClock::new();
    let mut agg = aggregator(Market::new(5, &[1, 3]), &clock);
    let progress = RecordingProgress::default();

    let snap = agg.snapshot(today(), &progress).unwrap();

    assert_eq!(snap.rows.len(), 3);
    assert_eq!(snap.failures.len(), 2);
    assert_eq!(progress.warnings.borrow().len(), 2);
    assert_eq!(progress.started.borrow().len(), 5);
    assert_eq!(*progress.batch.borrow(), Some((3, 2, 5)));

    let names: Vec<&str> = snap.rows.iter().map(|r| r.board.as_str()).collect();
    assert_eq!(names, vec!["板块00", "板块02", "板块04"]);
    for row in &snap.rows {
        assert_eq!(row.row.date, today());
    }
    let failed: Vec<&str> = snap.failures.iter().map(|f| f.board.as_str()).collect();
    assert_eq!(failed, vec!["板块01", "板块03"]);
    assert!(snap.failures[0].message.contains("connection reset"));
    assert_eq!(
        progress.warnings.borrow()[0],
        "板块01: network error: connection reset (板块01)"
    );

    // 3 good boards once each, 2 broken boards three attempts each.
    assert_eq!(agg.fetcher().provider().history_calls.load(Ordering::SeqCst), 3 + 2 * 3);
    assert_eq!(agg.fetcher().sleeper().waits().len(), 2 * 2);
}

#[test]
fn all_failures_give_empty_snapshot_without_error() {
    let clock = ManualClock::new();
    let mut agg = aggregator(Market::new(4, &[0, 1, 2, 3]), &clock);
    let progress = RecordingProgress::default();

    let snap = agg.snapshot(today(), &progress).unwrap();

    assert!(snap.is_empty());
    assert_eq!(snap.failures.len(), 4);
    assert_eq!(progress.warnings.borrow().len(), 4);

    let rows = transform::transform(&snap.rows);
    assert_eq!(
        HeatmapView::build(&rows, HeatmapQuery::default(), today()),
        Err(ViewError::EmptyResult)
    );
}

#[test]
fn directory_failure_fails_the_pass() {
    let clock = ManualClock::new();
    let mut market = Market::new(3, &[]);
    market.directory_down = true;
    let mut agg = aggregator(market, &clock);

    let err = agg.snapshot(today(), &SilentProgress).unwrap_err();
    assert_eq!(err, DataError::Http { status: 503 });
    assert_eq!(agg.fetcher().provider().history_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn snapshot_is_reused_within_the_hour_then_rebuilt() {
    let clock = ManualClock::new();
    let mut agg = aggregator(Market::new(3, &[]), &clock);

    let first = agg.snapshot(today(), &SilentProgress).unwrap();
    clock.advance(Duration::from_secs(30 * 60));
    let progress = RecordingProgress::default();
    let second = agg.snapshot(today(), &progress).unwrap();

    assert_eq!(first, second);
    assert!(progress.started.borrow().is_empty());
    assert_eq!(agg.snapshot_age(), Some(Duration::from_secs(30 * 60)));

    clock.advance(Duration::from_secs(30 * 60));
    let progress = RecordingProgress::default();
    agg.snapshot(today(), &progress).unwrap();
    assert_eq!(progress.started.borrow().len(), 3);
}

#[test]
fn refresh_rebuilds_but_keeps_request_memo() {
    let clock = ManualClock::new();
    let mut agg = aggregator(Market::new(3, &[]), &clock);
    agg.snapshot(today(), &SilentProgress).unwrap();

    let progress = RecordingProgress::default();
    agg.refresh(today(), &progress).unwrap();
    assert_eq!(progress.started.borrow().len(), 3);
    assert_eq!(agg.fetcher().provider().history_calls.load(Ordering::SeqCst), 3);

    agg.fetcher_mut().clear_cache();
    agg.refresh(today(), &SilentProgress).unwrap();
    assert_eq!(agg.fetcher().provider().history_calls.load(Ordering::SeqCst), 6);
}

#[test]
fn snapshot_flows_through_transform_view_and_export() {
    let clock = ManualClock::new();
    let mut agg = aggregator(Market::new(4, &[2]), &clock);
    let snap = agg.snapshot(today(), &SilentProgress).unwrap();

    let rows = transform::transform(&snap.rows);
    assert_eq!(rows.len(), 3);
    for r in &rows {
        assert_eq!(r.amount_yi, 2.5);
        assert_eq!(r.volume_price_intensity, r.row.pct_change * 3.0);
        assert_eq!(r.pct_change_bps, r.row.pct_change * 100.0);
    }

    let query = HeatmapQuery {
        color_metric: ColorMetric::Intensity,
        ..HeatmapQuery::default()
    };
    let view = HeatmapView::build(&rows, query, today()).unwrap();
    let order: Vec<&str> = view.rows.iter().map(|r| r.board.as_str()).collect();
    assert_eq!(order, vec!["板块03", "板块01", "板块00"]);

    let (lo, hi) = view.color_range;
    assert!(lo < hi);
    let df = table::to_dataframe(&view.rows).unwrap();
    assert_eq!(df.height(), 3);
}

/// Every history call takes `per_call` of clock time.
struct SlowMarket<'c> {
    inner: Market,
    clock: &'c ManualClock,
    per_call: Duration,
}

impl BoardProvider for SlowMarket<'_> {
    fn name(&self) -> &str {
        "slow"
    }

    fn list_boards(&self) -> Result<Vec<Board>, DataError> {
        self.inner.list_boards()
    }

    fn fetch_history(
        &self,
        board: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradingRow>, DataError> {
        self.clock.advance(self.per_call);
        self.inner.fetch_history(board, start, end)
    }
}

#[test]
fn ttl_starts_when_a_slow_pass_finishes() {
    let clock = ManualClock::new();
    let market = SlowMarket {
        inner: Market::new(3, &[]),
        clock: &clock,
        per_call: Duration::from_secs(5 * 60),
    };
    let fetcher = HistoryFetcher::with_sleeper(
        market,
        RetryPolicy::default(),
        RecordingSleeper::new(),
    );
    let mut agg = SnapshotAggregator::with_clock(fetcher, AggregationConfig::default(), &clock);

    agg.snapshot(today(), &SilentProgress).unwrap();
    assert_eq!(agg.snapshot_age(), Some(Duration::ZERO));

    clock.advance(Duration::from_secs(50 * 60));
    agg.snapshot(today(), &SilentProgress).unwrap();
    let calls = agg.fetcher().provider().inner.history_calls.load(Ordering::SeqCst);
    assert_eq!(calls, 3);
}

/// Returns no rows for any board.
struct Closed {
    history_calls: AtomicUsize,
}

impl BoardProvider for Closed {
    fn name(&self) -> &str {
        "closed"
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
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }
}

#[test]
fn empty_window_is_not_retried_and_stays_memoized() {
    let clock = ManualClock::new();
    let fetcher = HistoryFetcher::with_sleeper(
        Closed {
            history_calls: AtomicUsize::new(0),
        },
        RetryPolicy::default(),
        RecordingSleeper::new(),
    );
    let mut agg = SnapshotAggregator::with_clock(fetcher, AggregationConfig::default(), &clock);

    let snap = agg.snapshot(today(), &SilentProgress).unwrap();
    assert_eq!(snap.failures.len(), 1);
    assert!(snap.failures[0].message.starts_with("no rows returned for '银行'"));
    assert!(agg.fetcher().sleeper().waits().is_empty());

    agg.refresh(today(), &SilentProgress).unwrap();
    assert_eq!(agg.fetcher().provider().history_calls.load(Ordering::SeqCst), 1);
    assert_eq!(agg.fetcher().cache().len(), 1);
}

proptest! {
    /// N boards, K broken: N - K rows tagged with their own names, K failures.
    #[test]
    fn rows_plus_failures_cover_every_board(
        (n, broken) in (1usize..12).prop_flat_map(|n| {
            (Just(n), prop::collection::hash_set(0..n, 0..=n))
        })
    ) {
        let broken: Vec<usize> = broken.into_iter().collect();
        let clock = ManualClock::new();
        let mut agg = aggregator(Market::new(n, &broken), &clock);
        let progress = RecordingProgress::default();

        let snap = agg.snapshot(today(), &progress).unwrap();

        prop_assert_eq!(snap.rows.len(), n - broken.len());
        prop_assert_eq!(snap.failures.len(), broken.len());
        prop_assert_eq!(progress.warnings.borrow().len(), broken.len());

        let tagged: HashSet<String> = snap.rows.iter().map(|r| r.board.clone()).collect();
        prop_assert_eq!(tagged.len(), snap.rows.len());
        for i in 0..n {
            let name = format!("板块{i:02}");
            prop_assert_eq!(tagged.contains(&name), !broken.contains(&i));
        }
    }
}
