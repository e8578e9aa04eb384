//! sectorheat core: industry-board snapshots for a sector heat-map.
//!
//! This crate contains:
//! - Board data provider trait and the EastMoney implementation
//! - Bounded retry with exponential backoff
//! - Two cache tiers: a permanent per-request memo and a TTL snapshot cache
//! - All-boards aggregation with per-board failure collection
//! - Derived heat-map metrics, view parameters and tabular export

pub mod config;
pub mod data;
pub mod table;
pub mod transform;
pub mod view;

pub use config::{AppConfig, ConfigError};
pub use data::{
    BoardProvider, DataError, HistoryFetcher, RetryPolicy, Snapshot, SnapshotAggregator,
};
pub use transform::{transform, HeatmapRow};
pub use view::{ColorMetric, ColorScale, HeatmapQuery, HeatmapView, SizeMetric, ViewError};
