//! EastMoney industry-board data provider.
//!
//! Two public endpoints:
//! - `clist/get` with `fs=m:90 t:2` lists industry boards (code `f12`, name `f14`),
//!   paged.
//! - `kline/get` with `secid=90.{code}` returns daily klines as comma-separated
//!   strings: date, open, close, high, low, volume, amount, amplitude,
//!   pct_change, change, turnover_rate.
//!
//! History is requested by board name. Names are resolved to codes through the
//! directory, which is listed once and remembered until the next explicit
//! `list_boards` call. Each provider method is a single attempt; retries are
//! the caller's job.

use super::provider::{provider_date, Board, BoardProvider, DataError, TradingRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_LIST_BASE: &str = "https://17.push2.eastmoney.com";
pub const DEFAULT_HISTORY_BASE: &str = "https://7.push2his.eastmoney.com";

const LIST_UT: &str = "bd1d9ddb04089700cf9c27f6f7426281";
const HISTORY_UT: &str = "7eea3edcaed734bea9cbfc24409ed989";
const INDUSTRY_BOARDS: &str = "m:90 t:2 f:!50";
const PAGE_SIZE: usize = 100;
const KLINE_FIELDS: usize = 11;

/// Endpoint and HTTP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EastMoneyConfig {
    pub list_base: String,
    pub history_base: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for EastMoneyConfig {
    fn default() -> Self {
        Self {
            list_base: DEFAULT_LIST_BASE.to_string(),
            history_base: DEFAULT_HISTORY_BASE.to_string(),
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    total: usize,
    diff: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    f12: String,
    f14: String,
}

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    klines: Vec<String>,
}

/// EastMoney board provider.
pub struct EastMoneyProvider {
    client: reqwest::blocking::Client,
    config: EastMoneyConfig,
    codes: Mutex<Option<HashMap<String, String>>>,
}

impl EastMoneyProvider {
    pub fn new(config: EastMoneyConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            codes: Mutex::new(None),
        })
    }

    fn list_url(&self) -> String {
        format!(
            "{}/api/qt/clist/get",
            self.config.list_base.trim_end_matches('/')
        )
    }

    fn history_url(&self) -> String {
        format!(
            "{}/api/qt/stock/kline/get",
            self.config.history_base.trim_end_matches('/')
        )
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, DataError> {
        let resp = self.client.get(url).query(query).send().map_err(|e| {
            if e.is_timeout() {
                DataError::Network(format!("timed out: {e}"))
            } else {
                DataError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
            });
        }

        resp.json()
            .map_err(|e| DataError::ResponseFormat(format!("failed to parse response: {e}")))
    }

    fn fetch_page(&self, page: usize) -> Result<ListData, DataError> {
        let query = [
            ("pn", page.to_string()),
            ("pz", PAGE_SIZE.to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("ut", LIST_UT.to_string()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f3".to_string()),
            ("fs", INDUSTRY_BOARDS.to_string()),
            ("fields", "f12,f14".to_string()),
        ];
        let resp: ListResponse = self.get_json(&self.list_url(), &query)?;
        resp.data
            .ok_or_else(|| DataError::ResponseFormat("board list has no data".into()))
    }

    /// Resolve a board name (or a raw `BK` code) to its code.
    fn resolve_code(&self, board: &str) -> Result<String, DataError> {
        if is_board_code(board) {
            return Ok(board.to_string());
        }

        if let Some(code) = self.cached_code(board)? {
            return Ok(code);
        }

        if !self.directory_loaded()? {
            self.list_boards()?;
            if let Some(code) = self.cached_code(board)? {
                return Ok(code);
            }
        }

        Err(DataError::BoardNotFound {
            board: board.to_string(),
        })
    }

    fn cached_code(&self, board: &str) -> Result<Option<String>, DataError> {
        let codes = self.lock_codes()?;
        Ok(codes.as_ref().and_then(|m| m.get(board).cloned()))
    }

    fn directory_loaded(&self) -> Result<bool, DataError> {
        Ok(self.lock_codes()?.is_some())
    }

    fn lock_codes(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<HashMap<String, String>>>, DataError> {
        self.codes
            .lock()
            .map_err(|_| DataError::Other("board code map poisoned".into()))
    }
}

impl BoardProvider for EastMoneyProvider {
    fn name(&self) -> &str {
        "eastmoney"
    }

    fn list_boards(&self) -> Result<Vec<Board>, DataError> {
        let boards = collect_pages(|page| self.fetch_page(page))?;

        let map: HashMap<String, String> = boards
            .iter()
            .map(|b| (b.name.clone(), b.code.clone()))
            .collect();
        *self.lock_codes()? = Some(map);

        Ok(boards)
    }

    fn fetch_history(
        &self,
        board: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradingRow>, DataError> {
        let code = self.resolve_code(board)?;
        let query = [
            ("secid", format!("90.{code}")),
            ("ut", HISTORY_UT.to_string()),
            ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
            (
                "fields2",
                "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61".to_string(),
            ),
            ("klt", "101".to_string()),
            ("fqt", "0".to_string()),
            ("beg", provider_date(start)),
            ("end", provider_date(end)),
            ("smplmt", "10000".to_string()),
            ("lmt", "1000000".to_string()),
        ];

        let resp: KlineResponse = self.get_json(&self.history_url(), &query)?;
        let data = resp.data.ok_or_else(|| DataError::BoardNotFound {
            board: board.to_string(),
        })?;

        parse_klines(&data.klines)
    }
}

impl From<ListItem> for Board {
    fn from(item: ListItem) -> Self {
        Board {
            name: item.f14,
            code: item.f12,
        }
    }
}

/// Walk directory pages from 1 until `total` boards are in hand or a page
/// comes back empty.
fn collect_pages<F>(mut fetch_page: F) -> Result<Vec<Board>, DataError>
where
    F: FnMut(usize) -> Result<ListData, DataError>,
{
    let first = fetch_page(1)?;
    let total = first.total;
    let mut boards: Vec<Board> = first.diff.into_iter().map(Board::from).collect();

    let mut page = 1;
    while boards.len() < total {
        page += 1;
        let next = fetch_page(page)?;
        if next.diff.is_empty() {
            break;
        }
        boards.extend(next.diff.into_iter().map(Board::from));
    }
    Ok(boards)
}

fn is_board_code(s: &str) -> bool {
    s.len() == 6 && s.starts_with("BK") && s[2..].bytes().all(|b| b.is_ascii_digit())
}

/// Parse kline strings into rows, sorted by date ascending.
pub fn parse_klines(lines: &[String]) -> Result<Vec<TradingRow>, DataError> {
    let mut rows = lines
        .iter()
        .map(|line| parse_kline(line))
        .collect::<Result<Vec<_>, _>>()?;
    rows.sort_by_key(|r| r.date);
    Ok(rows)
}

/// Parse one `date,open,close,high,low,volume,amount,amplitude,pct,change,turnover` line.
pub fn parse_kline(line: &str) -> Result<TradingRow, DataError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < KLINE_FIELDS {
        return Err(DataError::ResponseFormat(format!(
            "kline has {} fields, expected {KLINE_FIELDS}: {line}",
            fields.len()
        )));
    }

    let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d")
        .map_err(|e| DataError::ResponseFormat(format!("bad kline date '{}': {e}", fields[0])))?;

    let num = |i: usize, name: &str| -> Result<f64, DataError> {
        match fields[i] {
            "" | "-" => Ok(f64::NAN),
            raw => raw
                .parse::<f64>()
                .map_err(|_| DataError::ResponseFormat(format!("bad {name} '{raw}' on {date}"))),
        }
    };

    Ok(TradingRow {
        date,
        open: num(1, "open")?,
        close: num(2, "close")?,
        high: num(3, "high")?,
        low: num(4, "low")?,
        volume: num(5, "volume")?,
        amount: num(6, "amount")?,
        amplitude: num(7, "amplitude")?,
        pct_change: num(8, "pct_change")?,
        change: num(9, "change")?,
        turnover_rate: num(10, "turnover_rate")?,
    })
}
