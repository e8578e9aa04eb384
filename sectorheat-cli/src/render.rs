//! Text rendering of snapshots and heat-map views, plus file exports.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sectorheat_core::data::Snapshot;
use sectorheat_core::{table, transform, HeatmapQuery, HeatmapRow, HeatmapView, ViewError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

pub const TITLE: &str = "行业板块资金流向热力图";

/// Header, then the filtered table or an advisory when there is nothing to draw.
///
/// Returns the view that was drawn, if any.
pub fn draw<W: Write>(
    out: &mut W,
    snapshot: &Snapshot,
    query: HeatmapQuery,
    today: NaiveDate,
    age: Option<Duration>,
) -> Result<Option<HeatmapView>> {
    write_header(out, snapshot, age)?;

    let rows = transform(&snapshot.rows);
    match HeatmapView::build(&rows, query, today) {
        Ok(view) => {
            write_view(out, &view)?;
            Ok(Some(view))
        }
        Err(e @ (ViewError::EmptyResult | ViewError::NoColorValues { .. })) => {
            writeln!(out)?;
            writeln!(out, "{e}")?;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn write_header<W: Write>(
    out: &mut W,
    snapshot: &Snapshot,
    age: Option<Duration>,
) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "=== {TITLE} ({} to {}) ===", snapshot.start, snapshot.end)?;
    write!(out, "数据更新: {}", snapshot.built_at.format("%Y-%m-%d %H:%M:%S"))?;
    match age {
        Some(age) if age >= Duration::from_secs(1) => {
            writeln!(out, " (cached {})", format_age(age))?
        }
        _ => writeln!(out)?,
    }
    writeln!(
        out,
        "Boards:   {} captured, {} failed",
        snapshot.rows.len(),
        snapshot.failures.len()
    )
}

pub fn write_view<W: Write>(out: &mut W, view: &HeatmapView) -> std::io::Result<()> {
    let q = &view.query;
    writeln!(out, "Colour:   {} ({})", q.color_metric.label(), q.color_scale)?;
    writeln!(out, "Size:     {}", q.size_metric.label())?;
    writeln!(out, "Days:     {}", q.trailing_days)?;
    writeln!(
        out,
        "Range:    [{:.2}, {:.2}]",
        view.color_range.0, view.color_range.1
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "{:<14} {:<10} {:>8} {:>8} {:>10} {:>10}",
        "Board", "Date", "Chg%", "Turn%", "Amt(亿)", "Intensity"
    )?;
    writeln!(out, "{}", "-".repeat(66))?;
    for r in &view.rows {
        write_row(out, r)?;
    }
    writeln!(out)
}

fn write_row<W: Write>(out: &mut W, r: &HeatmapRow) -> std::io::Result<()> {
    writeln!(
        out,
        "{:<14} {:<10} {:>8.2} {:>8.2} {:>10.2} {:>10.2}",
        r.board,
        r.row.date,
        r.row.pct_change,
        r.row.turnover_rate,
        r.amount_yi,
        r.volume_price_intensity
    )
}

pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs < 60 {
        format!("{secs}s ago")
    } else {
        format!("{}m {}s ago", secs / 60, secs % 60)
    }
}

pub fn export_json(view: &HeatmapView, path: &Path) -> Result<()> {
    let doc = table::treemap_json(view, Some(TITLE))?;
    std::fs::write(path, doc).with_context(|| format!("failed to write {}", path.display()))
}

pub fn export_csv(view: &HeatmapView, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    table::write_csv(&view.rows, BufWriter::new(file))?;
    Ok(())
}
