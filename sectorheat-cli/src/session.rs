//! Interactive heat-map session.
//!
//! One [`SnapshotAggregator`] lives for the whole session, so changing the
//! colour, size, days or scale redraws from the cached snapshot. The provider
//! is only called again when the snapshot TTL runs out or on `refresh`, and
//! `refresh` still reuses memoized requests until `clear`.

use crate::render;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use sectorheat_core::data::{BoardProvider, Clock, FetchProgress, Sleeper, SnapshotAggregator};
use sectorheat_core::{ColorMetric, ColorScale, HeatmapQuery, HeatmapView, SizeMetric};
use std::io::{BufRead, Write};
use std::path::PathBuf;

const HELP: &str = "\
Commands:
  color <pct_change|turnover_rate|intensity>   set the colour metric
  size <amount_yi|volume_wan|turnover_rate>    set the size metric
  days <1-30>                                  set the trailing-days filter
  scale <RdYlGn_r|BrBG_r|PiYG_r|RdBu_r>        set the colour scale
  show                                         redraw
  refresh                                      rebuild the snapshot now
  clear                                        forget memoized requests
  status                                       cache state and current view
  json <path> | csv <path>                     export the current view
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Color(ColorMetric),
    Size(SizeMetric),
    Days(u32),
    Scale(ColorScale),
    Show,
    Refresh,
    Clear,
    Status,
    Json(PathBuf),
    Csv(PathBuf),
    Help,
    Quit,
    Blank,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(Command::Blank);
    };
    let arg = parts.next();
    if parts.next().is_some() {
        bail!("too many arguments for '{word}'");
    }

    Ok(match (word, arg) {
        ("color", Some(v)) => Command::Color(v.parse()?),
        ("size", Some(v)) => Command::Size(v.parse()?),
        ("days", Some(v)) => Command::Days(
            v.parse()
                .with_context(|| format!("invalid day count '{v}'"))?,
        ),
        ("scale", Some(v)) => Command::Scale(v.parse()?),
        ("json", Some(v)) => Command::Json(PathBuf::from(v)),
        ("csv", Some(v)) => Command::Csv(PathBuf::from(v)),
        ("color" | "size" | "days" | "scale" | "json" | "csv", None) => {
            bail!("'{word}' needs a value")
        }
        ("show", None) => Command::Show,
        ("refresh", None) => Command::Refresh,
        ("clear", None) => Command::Clear,
        ("status", None) => Command::Status,
        ("help" | "?", None) => Command::Help,
        ("quit" | "exit" | "q", None) => Command::Quit,
        ("show" | "refresh" | "clear" | "status" | "help" | "?" | "quit" | "exit" | "q", Some(_)) => {
            bail!("'{word}' takes no value")
        }
        (other, _) => bail!("unknown command '{other}' (try 'help')"),
    })
}

pub struct Session<P, S, C> {
    aggregator: SnapshotAggregator<P, S, C>,
    query: HeatmapQuery,
    today: fn() -> NaiveDate,
    view: Option<HeatmapView>,
}

impl<P: BoardProvider, S: Sleeper, C: Clock> Session<P, S, C> {
    pub fn new(
        aggregator: SnapshotAggregator<P, S, C>,
        query: HeatmapQuery,
        today: fn() -> NaiveDate,
    ) -> Self {
        Self {
            aggregator,
            query,
            today,
            view: None,
        }
    }

    /// Draw once, then execute one command per input line until `quit` or EOF.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        out: &mut W,
        progress: &dyn FetchProgress,
    ) -> Result<()> {
        self.redraw(out, progress)?;
        prompt(out)?;

        for line in input.lines() {
            let line = line?;
            match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(cmd) => {
                    if let Err(e) = self.execute(cmd, out, progress) {
                        writeln!(out, "error: {e:#}")?;
                    }
                }
                Err(e) => writeln!(out, "error: {e:#}")?,
            }
            prompt(out)?;
        }
        writeln!(out)?;
        Ok(())
    }

    pub fn execute<W: Write>(
        &mut self,
        cmd: Command,
        out: &mut W,
        progress: &dyn FetchProgress,
    ) -> Result<()> {
        let q = self.query;
        match cmd {
            Command::Color(color_metric) => {
                self.set_query(HeatmapQuery { color_metric, ..q }, out, progress)?
            }
            Command::Size(size_metric) => {
                self.set_query(HeatmapQuery { size_metric, ..q }, out, progress)?
            }
            Command::Days(trailing_days) => {
                self.set_query(HeatmapQuery { trailing_days, ..q }, out, progress)?
            }
            Command::Scale(color_scale) => {
                self.set_query(HeatmapQuery { color_scale, ..q }, out, progress)?
            }
            Command::Show => self.redraw(out, progress)?,
            Command::Refresh => {
                let snapshot = self.aggregator.refresh((self.today)(), progress)?;
                self.draw(out, &snapshot)?;
            }
            Command::Clear => {
                let n = self.aggregator.fetcher().cache().len();
                self.aggregator.fetcher_mut().clear_cache();
                writeln!(out, "Forgot {n} memoized requests.")?;
            }
            Command::Status => self.write_status(out)?,
            Command::Json(path) => {
                render::export_json(self.current_view()?, &path)?;
                writeln!(out, "Treemap JSON saved to: {}", path.display())?;
            }
            Command::Csv(path) => {
                render::export_csv(self.current_view()?, &path)?;
                writeln!(out, "Detail CSV saved to: {}", path.display())?;
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit | Command::Blank => {}
        }
        Ok(())
    }

    fn set_query<W: Write>(
        &mut self,
        query: HeatmapQuery,
        out: &mut W,
        progress: &dyn FetchProgress,
    ) -> Result<()> {
        query.validate()?;
        self.query = query;
        self.redraw(out, progress)
    }

    /// Draw from the cached snapshot, rebuilding it only once it has expired.
    fn redraw<W: Write>(&mut self, out: &mut W, progress: &dyn FetchProgress) -> Result<()> {
        let snapshot = self.aggregator.snapshot((self.today)(), progress)?;
        self.draw(out, &snapshot)
    }

    fn draw<W: Write>(
        &mut self,
        out: &mut W,
        snapshot: &sectorheat_core::Snapshot,
    ) -> Result<()> {
        let age = self.aggregator.snapshot_age();
        self.view = render::draw(out, snapshot, self.query, (self.today)(), age)?;
        Ok(())
    }

    fn current_view(&self) -> Result<&HeatmapView> {
        self.view
            .as_ref()
            .context("nothing to export: the current view is empty")
    }

    fn write_status<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self.aggregator.snapshot_age() {
            Some(age) => writeln!(out, "Snapshot: built {}", render::format_age(age))?,
            None => writeln!(out, "Snapshot: none")?,
        }
        writeln!(
            out,
            "Memo:     {} requests",
            self.aggregator.fetcher().cache().len()
        )?;
        let q = self.query;
        writeln!(
            out,
            "View:     color={} size={} days={} scale={}",
            q.color_metric, q.size_metric, q.trailing_days, q.color_scale
        )
    }
}

fn prompt<W: Write>(out: &mut W) -> std::io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}
