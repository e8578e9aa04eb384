//! Heat-map view: metric selection, trailing-days filter, colour range, ordering.
//!
//! This is everything a treemap renderer needs short of drawing: which value
//! drives tile area, which drives colour, the colour domain, and the detail
//! table order.

use crate::transform::HeatmapRow;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_TRAILING_DAYS: u32 = 1;
pub const MAX_TRAILING_DAYS: u32 = 30;
pub const DEFAULT_TRAILING_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewError {
    /// Nothing left after filtering. Advisory: there is no chart to draw.
    #[error("no valid rows after filtering; adjust the parameters")]
    EmptyResult,

    /// Rows survived filtering but none has a finite value for the colour metric.
    #[error("no finite {metric} values to colour; choose another colour metric")]
    NoColorValues { metric: ColorMetric },

    #[error("trailing days must be between 1 and 30, got {0}")]
    InvalidTrailingDays(u32),

    #[error("unknown {kind} '{value}' (expected one of: {expected})")]
    UnknownOption {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Value mapped to tile colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMetric {
    #[default]
    PctChange,
    TurnoverRate,
    Intensity,
}

impl ColorMetric {
    pub fn value(self, row: &HeatmapRow) -> f64 {
        match self {
            ColorMetric::PctChange => row.row.pct_change,
            ColorMetric::TurnoverRate => row.row.turnover_rate,
            ColorMetric::Intensity => row.volume_price_intensity,
        }
    }

    /// Column label, with a unit suffix where there is one.
    pub fn label(self) -> &'static str {
        match self {
            ColorMetric::PctChange => "涨跌幅 (%)",
            ColorMetric::TurnoverRate => "换手率 (%)",
            ColorMetric::Intensity => "量价强度",
        }
    }
}

impl fmt::Display for ColorMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColorMetric::PctChange => "pct_change",
            ColorMetric::TurnoverRate => "turnover_rate",
            ColorMetric::Intensity => "intensity",
        })
    }
}

impl FromStr for ColorMetric {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pct_change" => Ok(ColorMetric::PctChange),
            "turnover_rate" => Ok(ColorMetric::TurnoverRate),
            "intensity" => Ok(ColorMetric::Intensity),
            other => Err(ViewError::UnknownOption {
                kind: "color metric",
                value: other.to_string(),
                expected: "pct_change, turnover_rate, intensity",
            }),
        }
    }
}

/// Value mapped to tile area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeMetric {
    #[default]
    AmountYi,
    VolumeWan,
    TurnoverRate,
}

impl SizeMetric {
    pub fn value(self, row: &HeatmapRow) -> f64 {
        match self {
            SizeMetric::AmountYi => row.amount_yi,
            SizeMetric::VolumeWan => row.volume_wan,
            SizeMetric::TurnoverRate => row.row.turnover_rate,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SizeMetric::AmountYi => "成交额（亿）",
            SizeMetric::VolumeWan => "成交量（万手）",
            SizeMetric::TurnoverRate => "换手率",
        }
    }
}

impl fmt::Display for SizeMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SizeMetric::AmountYi => "amount_yi",
            SizeMetric::VolumeWan => "volume_wan",
            SizeMetric::TurnoverRate => "turnover_rate",
        })
    }
}

impl FromStr for SizeMetric {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amount_yi" => Ok(SizeMetric::AmountYi),
            "volume_wan" => Ok(SizeMetric::VolumeWan),
            "turnover_rate" => Ok(SizeMetric::TurnoverRate),
            other => Err(ViewError::UnknownOption {
                kind: "size metric",
                value: other.to_string(),
                expected: "amount_yi, volume_wan, turnover_rate",
            }),
        }
    }
}

/// Diverging colour scales, all reversed so that red means up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorScale {
    #[default]
    #[serde(rename = "RdYlGn_r")]
    RdYlGnR,
    #[serde(rename = "BrBG_r")]
    BrBgR,
    #[serde(rename = "PiYG_r")]
    PiYgR,
    #[serde(rename = "RdBu_r")]
    RdBuR,
}

impl ColorScale {
    pub fn name(self) -> &'static str {
        match self {
            ColorScale::RdYlGnR => "RdYlGn_r",
            ColorScale::BrBgR => "BrBG_r",
            ColorScale::PiYgR => "PiYG_r",
            ColorScale::RdBuR => "RdBu_r",
        }
    }
}

impl fmt::Display for ColorScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorScale {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RdYlGn_r" => Ok(ColorScale::RdYlGnR),
            "BrBG_r" => Ok(ColorScale::BrBgR),
            "PiYG_r" => Ok(ColorScale::PiYgR),
            "RdBu_r" => Ok(ColorScale::RdBuR),
            other => Err(ViewError::UnknownOption {
                kind: "color scale",
                value: other.to_string(),
                expected: "RdYlGn_r, BrBG_r, PiYG_r, RdBu_r",
            }),
        }
    }
}

/// Renderer-facing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapQuery {
    pub color_metric: ColorMetric,
    pub size_metric: SizeMetric,
    pub trailing_days: u32,
    pub color_scale: ColorScale,
}

impl Default for HeatmapQuery {
    fn default() -> Self {
        Self {
            color_metric: ColorMetric::default(),
            size_metric: SizeMetric::default(),
            trailing_days: DEFAULT_TRAILING_DAYS,
            color_scale: ColorScale::default(),
        }
    }
}

impl HeatmapQuery {
    pub fn validate(&self) -> Result<(), ViewError> {
        if !(MIN_TRAILING_DAYS..=MAX_TRAILING_DAYS).contains(&self.trailing_days) {
            return Err(ViewError::InvalidTrailingDays(self.trailing_days));
        }
        Ok(())
    }

    /// Earliest row date kept for `today`.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(i64::from(self.trailing_days))
    }
}

/// One treemap leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreemapNode {
    pub label: String,
    pub size: f64,
    pub color: f64,
    pub pct_change: f64,
    pub turnover_rate: f64,
    pub amount_yi: f64,
    pub volume_price_intensity: f64,
}

/// A filtered, ordered heat-map ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapView {
    pub query: HeatmapQuery,
    /// Sorted by percent-change, highest first.
    pub rows: Vec<HeatmapRow>,
    /// `[low, high]` colour domain.
    pub color_range: (f64, f64),
}

impl HeatmapView {
    /// Filter, order and compute the colour domain.
    pub fn build(
        rows: &[HeatmapRow],
        query: HeatmapQuery,
        today: NaiveDate,
    ) -> Result<Self, ViewError> {
        query.validate()?;
        let cutoff = query.cutoff(today);

        let mut kept: Vec<HeatmapRow> = rows
            .iter()
            .filter(|r| r.row.date >= cutoff)
            .cloned()
            .collect();
        if kept.is_empty() {
            return Err(ViewError::EmptyResult);
        }

        kept.sort_by(|a, b| b.row.pct_change.total_cmp(&a.row.pct_change));
        let color_range = color_range(kept.iter().map(|r| query.color_metric.value(r)))
            .ok_or(ViewError::NoColorValues {
                metric: query.color_metric,
            })?;

        Ok(Self {
            query,
            rows: kept,
            color_range,
        })
    }

    pub fn treemap_nodes(&self) -> Vec<TreemapNode> {
        self.rows
            .iter()
            .map(|r| TreemapNode {
                label: r.board.clone(),
                size: self.query.size_metric.value(r),
                color: self.query.color_metric.value(r),
                pct_change: r.row.pct_change,
                turnover_rate: r.row.turnover_rate,
                amount_yi: r.amount_yi,
                volume_price_intensity: r.volume_price_intensity,
            })
            .collect()
    }
}

/// Min/max over finite values, widened by one on each side when they coincide.
pub fn color_range(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;

    if lo == hi {
        Some((lo - 1.0, hi + 1.0))
    } else {
        Some((lo, hi))
    }
}
