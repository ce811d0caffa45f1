// src/services/collectors/naver_ranking.rs
use log::info;
use reqwest::Client;
use scraper::Html;
use std::fmt;
use std::str::FromStr;

use super::naver_finance::selector;
use super::{check_status, is_valid_code};
use crate::error::CollectorError;

const RANKING_URL: &str = "https://finance.naver.com/sise/sise_quant.naver";

/// The page quotes trading value in millions of won.
const TRADING_VALUE_UNIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Kospi,
    Kosdaq,
    All,
}

impl Market {
    fn sosok(self) -> Option<&'static str> {
        match self {
            Market::Kospi => Some("0"),
            Market::Kosdaq => Some("1"),
            Market::All => None,
        }
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KOSPI" => Ok(Market::Kospi),
            "KOSDAQ" => Ok(Market::Kosdaq),
            "ALL" => Ok(Market::All),
            other => Err(format!("unknown market {:?} (use KOSPI, KOSDAQ or ALL)", other)),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Market::Kospi => "KOSPI",
            Market::Kosdaq => "KOSDAQ",
            Market::All => "ALL",
        };
        write!(f, "{}", label)
    }
}

/// One row of the daily trading ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedStock {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub close: f64,
    pub change_rate: f64,
    pub volume: u64,
    /// KRW.
    pub trading_value: f64,
}

/// The `n` most traded stocks on `market`. `All` ranks KOSPI and KOSDAQ together.
pub async fn top_stocks(client: &Client, market: Market, n: usize) -> Result<Vec<RankedStock>, CollectorError> {
    let markets = match market {
        Market::All => vec![Market::Kospi, Market::Kosdaq],
        single => vec![single],
    };

    let mut rows = Vec::new();
    for m in markets {
        let Some(sosok) = m.sosok() else { continue };
        info!("Fetching Naver Finance trading ranking for {}", m);
        let response = client.get(RANKING_URL).query(&[("sosok", sosok)]).send().await?;
        let html = check_status(response, "Naver Finance ranking")?.text().await?;
        rows.extend(parse_ranking(&html, m)?);
    }

    let top = rank_by_trading_value(rows, n);
    if top.is_empty() {
        return Err(CollectorError::NotFound(format!("no ranked stocks on {}", market)));
    }
    Ok(top)
}

fn number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_end_matches('%').replace(',', "");
    cleaned.parse().ok()
}

pub fn parse_ranking(html: &str, market: Market) -> Result<Vec<RankedStock>, CollectorError> {
    let row_selector = selector("table.type_2 tr")?;
    let link_selector = selector("a.tltle")?;
    let cell_selector = selector("td")?;

    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for row in document.select(&row_selector) {
        let Some(link) = row.select(&link_selector).next() else {
            continue;
        };
        let Some(code) = link
            .value()
            .attr("href")
            .and_then(|href| href.split("code=").nth(1))
            .map(|c| c.chars().take(6).collect::<String>())
            .filter(|c| is_valid_code(c))
        else {
            continue;
        };

        // N, name, close, change, change rate, volume, trading value, ...
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();
        if cells.len() < 7 {
            continue;
        }
        let Some(trading_value) = number(&cells[6]) else {
            continue;
        };

        out.push(RankedStock {
            code,
            name: link.text().collect::<String>().trim().to_string(),
            market,
            close: number(&cells[2]).unwrap_or(0.0),
            change_rate: number(&cells[4]).unwrap_or(0.0),
            volume: number(&cells[5]).map_or(0, |v| v as u64),
            trading_value: trading_value * TRADING_VALUE_UNIT,
        });
    }
    Ok(out)
}

/// Highest trading value first, one row per code, at most `n` rows.
pub fn rank_by_trading_value(mut rows: Vec<RankedStock>, n: usize) -> Vec<RankedStock> {
    rows.sort_by(|a, b| {
        b.trading_value
            .total_cmp(&a.trading_value)
            .then_with(|| a.code.cmp(&b.code))
    });
    let mut seen = std::collections::HashSet::new();
    rows.retain(|r| seen.insert(r.code.clone()));
    rows.truncate(n);
    rows
}
