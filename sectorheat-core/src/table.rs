//! Tabular export of heat-map rows: polars DataFrame, CSV detail table, treemap JSON.

use crate::transform::HeatmapRow;
use crate::view::HeatmapView;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("dataframe error: {0}")]
    Polars(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Column names, in DataFrame and CSV order.
pub const COLUMNS: [&str; 16] = [
    "board",
    "date",
    "open",
    "close",
    "high",
    "low",
    "volume",
    "amount",
    "amplitude",
    "pct_change",
    "change",
    "turnover_rate",
    "volume_price_intensity",
    "amount_yi",
    "volume_wan",
    "pct_change_bps",
];

fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Convert heat-map rows to a DataFrame with a `Date`-typed `date` column.
pub fn to_dataframe(rows: &[HeatmapRow]) -> Result<DataFrame, ExportError> {
    let col = |f: fn(&HeatmapRow) -> f64| -> Vec<f64> { rows.iter().map(f).collect() };

    let boards: Vec<String> = rows.iter().map(|r| r.board.clone()).collect();
    let dates: Vec<i32> = rows.iter().map(|r| epoch_days(r.row.date)).collect();

    DataFrame::new(vec![
        Column::new(COLUMNS[0].into(), boards),
        Column::new(COLUMNS[1].into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| ExportError::Polars(format!("date cast: {e}")))?,
        Column::new(COLUMNS[2].into(), col(|r| r.row.open)),
        Column::new(COLUMNS[3].into(), col(|r| r.row.close)),
        Column::new(COLUMNS[4].into(), col(|r| r.row.high)),
        Column::new(COLUMNS[5].into(), col(|r| r.row.low)),
        Column::new(COLUMNS[6].into(), col(|r| r.row.volume)),
        Column::new(COLUMNS[7].into(), col(|r| r.row.amount)),
        Column::new(COLUMNS[8].into(), col(|r| r.row.amplitude)),
        Column::new(COLUMNS[9].into(), col(|r| r.row.pct_change)),
        Column::new(COLUMNS[10].into(), col(|r| r.row.change)),
        Column::new(COLUMNS[11].into(), col(|r| r.row.turnover_rate)),
        Column::new(COLUMNS[12].into(), col(|r| r.volume_price_intensity)),
        Column::new(COLUMNS[13].into(), col(|r| r.amount_yi)),
        Column::new(COLUMNS[14].into(), col(|r| r.volume_wan)),
        Column::new(COLUMNS[15].into(), col(|r| r.pct_change_bps)),
    ])
    .map_err(|e| ExportError::Polars(format!("dataframe creation: {e}")))
}

#[derive(Serialize)]
struct DetailRecord<'a> {
    board: &'a str,
    date: NaiveDate,
    open: f64,
    close: f64,
    high: f64,
    low: f64,
    volume: f64,
    amount: f64,
    amplitude: f64,
    pct_change: f64,
    change: f64,
    turnover_rate: f64,
    volume_price_intensity: f64,
    amount_yi: f64,
    volume_wan: f64,
    pct_change_bps: f64,
}

impl<'a> From<&'a HeatmapRow> for DetailRecord<'a> {
    fn from(r: &'a HeatmapRow) -> Self {
        Self {
            board: &r.board,
            date: r.row.date,
            open: r.row.open,
            close: r.row.close,
            high: r.row.high,
            low: r.row.low,
            volume: r.row.volume,
            amount: r.row.amount,
            amplitude: r.row.amplitude,
            pct_change: r.row.pct_change,
            change: r.row.change,
            turnover_rate: r.row.turnover_rate,
            volume_price_intensity: r.volume_price_intensity,
            amount_yi: r.amount_yi,
            volume_wan: r.volume_wan,
            pct_change_bps: r.pct_change_bps,
        }
    }
}

/// Write the detail table as CSV with a header row.
pub fn write_csv<W: Write>(rows: &[HeatmapRow], writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(DetailRecord::from(row))?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct TreemapDocument<'a> {
    color_metric: String,
    color_label: &'static str,
    size_metric: String,
    size_label: &'static str,
    color_scale: &'static str,
    color_range: [f64; 2],
    nodes: Vec<crate::view::TreemapNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

/// Pretty JSON document a treemap renderer can consume directly.
pub fn treemap_json(view: &HeatmapView, title: Option<&str>) -> Result<String, ExportError> {
    let doc = TreemapDocument {
        color_metric: view.query.color_metric.to_string(),
        color_label: view.query.color_metric.label(),
        size_metric: view.query.size_metric.to_string(),
        size_label: view.query.size_metric.label(),
        color_scale: view.query.color_scale.name(),
        color_range: [view.color_range.0, view.color_range.1],
        nodes: view.treemap_nodes(),
        title,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}
