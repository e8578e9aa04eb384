//! sectorheat CLI: board directory, board history and heat-map snapshot commands.
//!
//! Commands:
//! - `boards`: list the industry-board directory
//! - `history`: fetch one board's daily rows through the retrying fetcher
//! - `snapshot`: aggregate every board, derive metrics and print the heat-map table
//! - `session`: interactive heat-map that redraws from the cached snapshot

mod render;
mod session;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sectorheat_core::data::provider::parse_provider_date;
use sectorheat_core::data::{
    EastMoneyProvider, HistoryFetcher, SnapshotAggregator, StdoutProgress, TradingRow,
};
use sectorheat_core::view::{ColorMetric, ColorScale, HeatmapQuery, SizeMetric};
use sectorheat_core::AppConfig;
use session::Session;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `--log-level` with a full filter directive.
const LOG_ENV: &str = "SECTORHEAT_LOG";

#[derive(Parser)]
#[command(
    name = "sectorheat",
    about = "sectorheat: industry-board fund-flow heat-map data"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. warn, info, sectorheat_core=debug). SECTORHEAT_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every industry board known to the provider.
    Boards,
    /// Fetch daily rows for one board.
    History {
        /// Board name (e.g. 半导体) or board code (e.g. BK0917).
        board: String,

        /// Start date (YYYYMMDD). Defaults to the configured window before --end.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYYMMDD). Defaults to today.
        #[arg(long)]
        end: Option<String>,
    },
    /// Aggregate the latest row of every board and print the heat-map table.
    Snapshot {
        #[command(flatten)]
        view: ViewArgs,

        /// Write the treemap document as JSON to this path.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write the detail table as CSV to this path.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Interactive heat-map: change metrics, days and scale without refetching.
    Session {
        #[command(flatten)]
        view: ViewArgs,
    },
}

/// Heat-map parameters; each overrides the `[view]` config value when given.
#[derive(Args)]
struct ViewArgs {
    /// Colour metric: pct_change, turnover_rate, intensity.
    #[arg(long)]
    color_metric: Option<ColorMetric>,

    /// Size metric: amount_yi, volume_wan, turnover_rate.
    #[arg(long)]
    size_metric: Option<SizeMetric>,

    /// Keep rows dated within this many days of today (1-30).
    #[arg(long)]
    days: Option<u32>,

    /// Colour scale: RdYlGn_r, BrBG_r, PiYG_r, RdBu_r.
    #[arg(long)]
    color_scale: Option<ColorScale>,
}

impl ViewArgs {
    fn apply(&self, base: HeatmapQuery) -> HeatmapQuery {
        HeatmapQuery {
            color_metric: self.color_metric.unwrap_or(base.color_metric),
            size_metric: self.size_metric.unwrap_or(base.size_metric),
            trailing_days: self.days.unwrap_or(base.trailing_days),
            color_scale: self.color_scale.unwrap_or(base.color_scale),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Boards => run_boards(&config),
        Commands::History { board, start, end } => run_history(&config, &board, start, end),
        Commands::Snapshot { view, json, csv } => {
            let query = view.apply(config.view);
            run_snapshot(&config, query, json.as_deref(), csv.as_deref())
        }
        Commands::Session { view } => run_session(&config, view.apply(config.view)),
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .with_context(|| format!("invalid log filter '{filter}'"))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => {
            let config = AppConfig::from_file(p)?;
            tracing::info!(path = %p.display(), "config loaded");
            Ok(config)
        }
        None => Ok(AppConfig::default()),
    }
}

fn fetcher(config: &AppConfig) -> Result<HistoryFetcher<EastMoneyProvider>> {
    let provider = EastMoneyProvider::new(config.provider.clone())?;
    Ok(HistoryFetcher::new(provider, config.retry_policy()))
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn run_boards(config: &AppConfig) -> Result<()> {
    let boards = fetcher(config)?.list_boards()?;

    println!("{:<8} Board", "Code");
    println!("{}", "-".repeat(30));
    for b in &boards {
        println!("{:<8} {}", b.code, b.name);
    }
    println!();
    println!("{} boards", boards.len());
    Ok(())
}

fn run_history(
    config: &AppConfig,
    board: &str,
    start: Option<String>,
    end: Option<String>,
) -> Result<()> {
    let end_date = end
        .as_deref()
        .map(parse_provider_date)
        .transpose()?
        .unwrap_or_else(today);
    let start_date = start
        .as_deref()
        .map(parse_provider_date)
        .transpose()?
        .unwrap_or_else(|| {
            end_date - chrono::Duration::days(i64::from(config.aggregation.window_days))
        });

    if start_date > end_date {
        anyhow::bail!("--start {start_date} is after --end {end_date}");
    }

    let rows = fetcher(config)?.fetch(board, start_date, end_date)?;
    print_history(board, start_date, end_date, &rows);
    Ok(())
}

fn run_snapshot(
    config: &AppConfig,
    query: HeatmapQuery,
    json: Option<&Path>,
    csv: Option<&Path>,
) -> Result<()> {
    query.validate()?;

    let mut aggregator = SnapshotAggregator::new(fetcher(config)?, config.aggregation_config());
    let today = today();
    let snapshot = aggregator.snapshot(today, &StdoutProgress)?;

    let drawn = render::draw(&mut std::io::stdout(), &snapshot, query, today, None)?;
    let Some(view) = drawn else {
        return Ok(());
    };

    if let Some(path) = json {
        render::export_json(&view, path)?;
        println!("Treemap JSON saved to: {}", path.display());
    }
    if let Some(path) = csv {
        render::export_csv(&view, path)?;
        println!("Detail CSV saved to: {}", path.display());
    }

    Ok(())
}

fn run_session(config: &AppConfig, query: HeatmapQuery) -> Result<()> {
    query.validate()?;

    let aggregator = SnapshotAggregator::new(fetcher(config)?, config.aggregation_config());
    let mut session = Session::new(aggregator, query, today);
    println!("Type 'help' for commands.");
    session.run(std::io::stdin().lock(), &mut std::io::stdout(), &StdoutProgress)
}

fn print_history(board: &str, start: NaiveDate, end: NaiveDate, rows: &[TradingRow]) {
    println!();
    println!("=== {board} ({start} to {end}) ===");
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8}",
        "Date", "Open", "Close", "High", "Low", "Chg%", "Turn%"
    );
    println!("{}", "-".repeat(72));
    for r in rows {
        println!(
            "{:<10} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>8.2} {:>8.2}",
            r.date, r.open, r.close, r.high, r.low, r.pct_change, r.turnover_rate
        );
    }
    println!();
    println!("{} rows", rows.len());
}
