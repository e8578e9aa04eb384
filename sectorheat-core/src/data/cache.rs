//! In-memory caches for board data.
//!
//! Two tiers with different invalidation policies:
//! - [`RequestCache`]: per-request memo keyed by (board, start, end). Entries
//!   never expire; only [`RequestCache::clear`] removes them.
//! - [`SnapshotCache`]: one whole aggregation snapshot with a time-to-live.
//!
//! Nothing is written to disk.

use super::provider::TradingRow;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Memoization key for a history request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub board: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RequestKey {
    pub fn new(board: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            board: board.into(),
            start,
            end,
        }
    }
}

/// Tier 1: unbounded, manual-clear-only memo of successful history fetches.
#[derive(Debug, Default)]
pub struct RequestCache {
    entries: HashMap<RequestKey, Vec<TradingRow>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RequestKey) -> Option<&[TradingRow]> {
        self.entries.get(key).map(|rows| rows.as_slice())
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Store rows for a key, replacing anything already there.
    pub fn insert(&mut self, key: RequestKey, rows: Vec<TradingRow>) {
        self.entries.insert(key, rows);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every memoized response.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Source of monotonic time for TTL checks.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Shareable across threads, so a scripted provider can advance it mid-pass.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Tier 2: a single value that is fresh for `ttl` after it was stored.
#[derive(Debug)]
pub struct SnapshotCache<T> {
    ttl: Duration,
    entry: Option<(Instant, T)>,
}

impl<T> SnapshotCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The stored value if it is younger than the TTL at `now`.
    pub fn get(&self, now: Instant) -> Option<&T> {
        match &self.entry {
            Some((stored_at, value)) if now.saturating_duration_since(*stored_at) < self.ttl => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Replace the stored value, stamping it with `now`.
    pub fn store(&mut self, now: Instant, value: T) -> &T {
        &self.entry.insert((now, value)).1
    }

    /// Age of the stored value, fresh or not.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.entry
            .as_ref()
            .map(|(stored_at, _)| now.saturating_duration_since(*stored_at))
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
