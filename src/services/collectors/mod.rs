// src/services/collectors/mod.rs
//
// Source collectors. Every collector returns `Result<_, CollectorError>`;
// the orchestrator turns those into `SourceResult`s at its boundary.

pub mod dart;
pub mod naver_finance;
pub mod naver_news;
pub mod naver_ranking;
pub mod openai;
pub mod yahoo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;

use crate::error::CollectorError;
use crate::models::{
    AiAnalysis, DateRange, Disclosure, FinancialData, NewsArticle, PriceBar, SecurityInfo, Signal,
};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Mandatory source: listing metadata and daily bars.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn security_info(&self, code: &str) -> Result<SecurityInfo, CollectorError>;

    /// Bars inside `range`, ascending by date with no duplicate dates.
    async fn price_bars(&self, code: &str, range: DateRange) -> Result<Vec<PriceBar>, CollectorError>;
}

#[async_trait]
pub trait FinancialSource: Send + Sync {
    async fn financials(&self, code: &str, years: &[i32]) -> Result<Vec<FinancialData>, CollectorError>;

    async fn disclosures(&self, code: &str, count: usize) -> Result<Vec<Disclosure>, CollectorError>;
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Raw articles published at or after `since`, at most `max_results`.
    async fn search(
        &self,
        keyword: &str,
        since: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<NewsArticle>, CollectorError>;
}

/// Everything the commentary model gets to see.
#[derive(Debug, Clone)]
pub struct AiContext {
    pub security: SecurityInfo,
    pub latest_price: Option<PriceBar>,
    pub signals: Vec<Signal>,
    pub financials: Vec<FinancialData>,
    pub articles: Vec<NewsArticle>,
}

#[async_trait]
pub trait AiSource: Send + Sync {
    async fn analyze(&self, context: &AiContext) -> Result<AiAnalysis, CollectorError>;
}

/// Six ASCII digits, e.g. `005930`.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Sorts by date and keeps the last bar seen for any repeated date.
pub fn normalize_bars(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.sort_by_key(|b| b.date);
    let mut out: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

pub fn http_client(timeout: Duration) -> Result<Client, CollectorError> {
    Ok(Client::builder().user_agent(USER_AGENT).timeout(timeout).build()?)
}

/// Maps a non-success status onto the collector error taxonomy.
pub(crate) fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response, CollectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        401 | 403 => Err(CollectorError::MissingCredential(format!("{} rejected the credential ({})", what, status))),
        404 => Err(CollectorError::NotFound(format!("{} returned {}", what, status))),
        _ => Err(CollectorError::upstream(format!("{} returned {}", what, status))),
    }
}
