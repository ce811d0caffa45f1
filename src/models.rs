// src/models.rs
use serde::{Serialize, Deserialize};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub code: String,
    pub name: String,
    pub market: String,
    pub sectors: Vec<String>,
    pub per: Option<f64>,
    pub eps: Option<f64>,
    pub pbr: Option<f64>,
    pub bps: Option<f64>,
    pub dividend_yield: Option<f64>,
}

impl SecurityInfo {
    pub fn new(code: impl Into<String>, name: impl Into<String>, market: impl Into<String>) -> Self {
        SecurityInfo {
            code: code.into(),
            name: name.into(),
            market: market.into(),
            sectors: Vec::new(),
            per: None,
            eps: None,
            pbr: None,
            bps: None,
            dividend_yield: None,
        }
    }
}

/// One daily bar. Sequences are ascending by date with no duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub trading_value: f64,
    pub change_rate: f64,
}

/// Indicator values for one bar date; `None` until the indicator has warmed up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub rsi: Option<f64>,
    pub trix: Option<f64>,
    pub trix_signal: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
}

impl IndicatorPoint {
    pub fn empty(date: NaiveDate) -> Self {
        IndicatorPoint {
            date,
            rsi: None,
            trix: None,
            trix_signal: None,
            macd: None,
            macd_signal: None,
            macd_histogram: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndicatorKind {
    Rsi,
    Trix,
    Macd,
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::Trix => "TRIX",
            IndicatorKind::Macd => "MACD",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub date: NaiveDate,
    pub indicator: IndicatorKind,
    pub action: SignalAction,
    pub reason: String,
    /// Always within 1..=5.
    pub strength: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialData {
    pub year: i32,
    pub quarter: Option<String>,
    pub revenue: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disclosure {
    pub title: String,
    pub date: String,
    pub link: String,
    pub filer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub link: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Sentiment::Positive,
            "NEGATIVE" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub news_summary: String,
    pub sentiment: Sentiment,
    /// Clamped to [-1, 1].
    pub sentiment_score: f64,
    pub key_issues: Vec<String>,
    pub overall_opinion: String,
}

/// Closed set of reasons an optional section can be missing from a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    MissingCredential,
    UpstreamError,
    NotFound,
    Timeout,
    DependencyUnavailable,
    Disabled,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            UnavailableReason::MissingCredential => "missing credential",
            UnavailableReason::UpstreamError => "upstream error",
            UnavailableReason::NotFound => "not found",
            UnavailableReason::Timeout => "timeout",
            UnavailableReason::DependencyUnavailable => "dependency unavailable",
            UnavailableReason::Disabled => "disabled",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of one optional source. Collectors never fail past this boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceResult<T> {
    Ok { data: T },
    Unavailable { reason: UnavailableReason, detail: String },
}

impl<T> SourceResult<T> {
    pub fn ok(data: T) -> Self {
        SourceResult::Ok { data }
    }

    pub fn unavailable(reason: UnavailableReason, detail: impl Into<String>) -> Self {
        SourceResult::Unavailable { reason, detail: detail.into() }
    }

    pub fn disabled(section: &str) -> Self {
        Self::unavailable(UnavailableReason::Disabled, format!("{} disabled for this run", section))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SourceResult::Ok { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            SourceResult::Ok { data } => Some(data),
            SourceResult::Unavailable { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<UnavailableReason> {
        match self {
            SourceResult::Ok { .. } => None,
            SourceResult::Unavailable { reason, .. } => Some(*reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SourceResult<U> {
        match self {
            SourceResult::Ok { data } => SourceResult::Ok { data: f(data) },
            SourceResult::Unavailable { reason, detail } => SourceResult::Unavailable { reason, detail },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// The `days` calendar days leading up to and including `end`.
    pub fn trailing(end: NaiveDate, days: i64) -> Self {
        DateRange { start: end - chrono::Duration::days(days), end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Calendar days for the named period presets (`1w`, `1m`, `3m`, `6m`, `1y`).
pub fn preset_days(preset: &str) -> Option<i64> {
    match preset.trim().to_ascii_lowercase().as_str() {
        "1w" => Some(7),
        "1m" => Some(30),
        "3m" => Some(90),
        "6m" => Some(180),
        "1y" => Some(365),
        _ => None,
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggles {
    pub include_ai: bool,
    pub include_news: bool,
    pub include_financials: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        FeatureToggles {
            include_ai: true,
            include_news: true,
            include_financials: true,
        }
    }
}

/// Everything a renderer needs. Built once per run by the orchestrator's merge step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub security_info: SecurityInfo,
    pub price_bars: Vec<PriceBar>,
    pub indicator_points: Vec<IndicatorPoint>,
    pub signals: Vec<Signal>,
    pub financials: SourceResult<Vec<FinancialData>>,
    pub disclosures: SourceResult<Vec<Disclosure>>,
    pub news: SourceResult<Vec<NewsArticle>>,
    pub ai_analysis: SourceResult<AiAnalysis>,
    pub generated_at: DateTime<Utc>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl ReportData {
    pub fn latest_price(&self) -> Option<&PriceBar> {
        self.price_bars.last()
    }

    pub fn latest_indicators(&self) -> Option<&IndicatorPoint> {
        self.indicator_points.last()
    }
}
