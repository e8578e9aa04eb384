//! Derived heat-map columns over aggregated board rows.
//!
//! Units: `pct_change`, `turnover_rate` and `amplitude` stay in percentage
//! points as delivered. `pct_change_bps` is the same change in basis points.

use crate::data::{BoardRow, TradingRow};
use serde::{Deserialize, Serialize};

/// Yuan per 亿.
pub const YI: f64 = 1.0e8;
/// Lots per 万手.
pub const WAN: f64 = 1.0e4;

/// An aggregated row plus its derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRow {
    pub board: String,
    #[serde(flatten)]
    pub row: TradingRow,
    /// pct_change × turnover_rate.
    pub volume_price_intensity: f64,
    /// Turnover amount in 亿 (1e8 yuan).
    pub amount_yi: f64,
    /// Volume in 万手 (1e4 lots).
    pub volume_wan: f64,
    pub pct_change_bps: f64,
}

/// Compute derived columns for one row. No filtering.
pub fn derive(row: &BoardRow) -> HeatmapRow {
    let r = &row.row;
    HeatmapRow {
        board: row.board.clone(),
        row: r.clone(),
        volume_price_intensity: r.pct_change * r.turnover_rate,
        amount_yi: r.amount / YI,
        volume_wan: r.volume / WAN,
        pct_change_bps: r.pct_change * 100.0,
    }
}

/// Whether a derived row is usable: finite change and positive volume.
pub fn is_valid(row: &HeatmapRow) -> bool {
    row.row.pct_change.is_finite() && row.row.volume > 0.0
}

/// Derive every row and drop the unusable ones, keeping input order.
pub fn transform(rows: &[BoardRow]) -> Vec<HeatmapRow> {
    let out: Vec<HeatmapRow> = rows.iter().map(derive).filter(is_valid).collect();
    if out.len() < rows.len() {
        tracing::debug!(dropped = rows.len() - out.len(), "invalid rows dropped");
    }
    out
}
