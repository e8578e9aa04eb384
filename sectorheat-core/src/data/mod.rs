//! Board data acquisition: provider, retry, caches, snapshot aggregation.

pub mod acquisition;
pub mod aggregate;
pub mod cache;
pub mod eastmoney;
pub mod provider;
pub mod retry;

pub use acquisition::HistoryFetcher;
pub use aggregate::{
    AggregationConfig, BoardRow, SectorFailure, SectorOutcome, Snapshot, SnapshotAggregator,
    DEFAULT_SNAPSHOT_TTL, DEFAULT_WINDOW_DAYS,
};
pub use cache::{Clock, ManualClock, RequestCache, RequestKey, SnapshotCache, SystemClock};
pub use eastmoney::{EastMoneyConfig, EastMoneyProvider};
pub use provider::{
    Board, BoardProvider, DataError, FetchProgress, SilentProgress, StdoutProgress, TradingRow,
};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
