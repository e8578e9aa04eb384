//! History acquisition: provider calls wrapped in retry and the request memo.

use super::cache::{RequestCache, RequestKey};
use super::provider::{Board, BoardProvider, DataError, TradingRow};
use super::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use chrono::NaiveDate;

/// Fetches board history through a [`RetryPolicy`] and memoizes successes.
///
/// The fetcher owns its [`RequestCache`]; the cache lives as long as the
/// fetcher and is only emptied by [`HistoryFetcher::clear_cache`].
pub struct HistoryFetcher<P, S = ThreadSleeper> {
    provider: P,
    policy: RetryPolicy,
    sleeper: S,
    cache: RequestCache,
}

impl<P: BoardProvider> HistoryFetcher<P> {
    pub fn new(provider: P, policy: RetryPolicy) -> Self {
        Self::with_sleeper(provider, policy, ThreadSleeper)
    }
}

impl<P: BoardProvider, S: Sleeper> HistoryFetcher<P, S> {
    pub fn with_sleeper(provider: P, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            provider,
            policy,
            sleeper,
            cache: RequestCache::new(),
        }
    }

    /// Rows for `board` over `[start, end]`, from the memo when possible.
    ///
    /// On a miss the provider is called up to `policy.max_attempts` times.
    /// Only successful responses are memoized.
    pub fn fetch(
        &mut self,
        board: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradingRow>, DataError> {
        let key = RequestKey::new(board, start, end);
        if let Some(rows) = self.cache.get(&key) {
            tracing::debug!(board, %start, %end, rows = rows.len(), "request cache hit");
            return Ok(rows.to_vec());
        }

        let provider = &self.provider;
        let rows = self
            .policy
            .run(&self.sleeper, |_| provider.fetch_history(board, start, end))?;

        self.cache.insert(key, rows.clone());
        Ok(rows)
    }

    /// The provider's board directory, retried with the same policy. Not memoized.
    pub fn list_boards(&self) -> Result<Vec<Board>, DataError> {
        let provider = &self.provider;
        self.policy.run(&self.sleeper, |_| provider.list_boards())
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    /// Forget every memoized response.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}
