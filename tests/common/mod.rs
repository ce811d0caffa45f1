// tests/common/mod.rs
//
// In-memory collectors for driving the orchestrator without the network.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stock_report::error::CollectorError;
use stock_report::models::{
    AiAnalysis, DateRange, Disclosure, FinancialData, NewsArticle, PriceBar, SecurityInfo, Sentiment,
};
use stock_report::services::collectors::{AiContext, AiSource, FinancialSource, NewsSource, PriceSource};
use stock_report::services::orchestrator::{Collectors, OrchestratorOptions};

/// How a fake answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ok,
    MissingCredential,
    NotFound,
    Upstream,
    /// Sleeps far beyond any test timeout.
    Hang,
}

impl Mode {
    pub async fn apply(self, what: &str) -> Result<(), CollectorError> {
        match self {
            Mode::Ok => Ok(()),
            Mode::MissingCredential => Err(CollectorError::MissingCredential(format!("{} key", what))),
            Mode::NotFound => Err(CollectorError::NotFound(what.to_string())),
            Mode::Upstream => Err(CollectorError::upstream(format!("{} returned 503", what))),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        }
    }
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

pub fn day(i: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() + ChronoDuration::days(i)
}

pub fn range() -> DateRange {
    DateRange::new(day(0), day(60))
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: day(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000,
            trading_value: close * 1_000.0,
            change_rate: 0.0,
        })
        .collect()
}

/// 30 closes falling evenly from 100 to 70.
pub fn declining_bars() -> Vec<PriceBar> {
    let closes: Vec<f64> = (0..30).map(|i| 100.0 - 30.0 * i as f64 / 29.0).collect();
    bars_from_closes(&closes)
}

pub fn wavy_bars(n: usize) -> Vec<PriceBar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| 70_000.0 + 3_000.0 * (i as f64 / 6.0).sin() + 10.0 * i as f64)
        .collect();
    bars_from_closes(&closes)
}

pub fn article(title: &str, hours_ago: i64) -> NewsArticle {
    NewsArticle {
        title: title.to_string(),
        link: format!("https://news.example.com/{}", title.len() * 1000 + hours_ago as usize),
        source: "example".to_string(),
        published_at: now() - ChronoDuration::hours(hours_ago),
        summary: None,
    }
}

/// Twelve articles: nine distinct stories, three of them repeated with
/// cosmetic changes to the headline.
pub fn twelve_articles() -> Vec<NewsArticle> {
    let titles = [
        ("Samsung Electronics posts record quarterly chip revenue", 1),
        ("Samsung Electronics posts record quarterly chip revenue!", 2),
        ("Foreign investors keep selling KOSPI heavyweights", 5),
        ("Foreign investors keep selling KOSPI heavyweights.", 6),
        ("Union threatens strike at Pyeongtaek plant", 10),
        ("Union threatens strike at Pyeongtaek plant...", 11),
        ("New foldable phone lineup unveiled in Paris", 20),
        ("Regulators question memory price cartel claims", 30),
        ("Dividend policy revised for next fiscal year", 40),
        ("HBM supply deal with US customer delayed", 50),
        ("Analysts cut target price after weak guidance", 60),
        ("Display unit sells stake in OLED venture", 70),
    ];
    titles.iter().map(|(t, h)| article(t, *h)).collect()
}

pub struct FakePrice {
    pub name: String,
    pub bars: Vec<PriceBar>,
    pub mode: Mode,
    /// Failures (in `mode`) before answering normally.
    pub failures_before_ok: usize,
    pub calls: AtomicUsize,
}

impl FakePrice {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        FakePrice {
            name: "Samsung Electronics".to_string(),
            bars,
            mode: Mode::Ok,
            failures_before_ok: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(mode: Mode) -> Self {
        FakePrice {
            mode,
            failures_before_ok: usize::MAX,
            ..FakePrice::new(Vec::new())
        }
    }
}

#[async_trait]
impl PriceSource for FakePrice {
    async fn security_info(&self, code: &str) -> Result<SecurityInfo, CollectorError> {
        Ok(SecurityInfo::new(code, self.name.clone(), "KOSPI"))
    }

    async fn price_bars(&self, _code: &str, _range: DateRange) -> Result<Vec<PriceBar>, CollectorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_ok {
            self.mode.apply("price").await?;
        }
        Ok(self.bars.clone())
    }
}

pub struct FakeFinancials {
    pub mode: Mode,
}

#[async_trait]
impl FinancialSource for FakeFinancials {
    async fn financials(&self, _code: &str, years: &[i32]) -> Result<Vec<FinancialData>, CollectorError> {
        self.mode.apply("financials").await?;
        Ok(years
            .iter()
            .map(|&year| FinancialData {
                year,
                quarter: None,
                revenue: Some(258_935_494_000_000.0),
                operating_income: Some(6_566_976_000_000.0),
                net_income: Some(15_487_100_000_000.0),
                per: None,
                pbr: None,
                roe: Some(4.1),
            })
            .collect())
    }

    async fn disclosures(&self, _code: &str, count: usize) -> Result<Vec<Disclosure>, CollectorError> {
        self.mode.apply("disclosures").await?;
        Ok((0..count)
            .map(|i| Disclosure {
                title: format!("Report {}", i),
                date: "20240531".to_string(),
                link: format!("https://dart.fss.or.kr/dsaf001/main.do?rcpNo=2024053100{}", i),
                filer: "Samsung Electronics".to_string(),
            })
            .collect())
    }
}

pub struct FakeNews {
    pub articles: Vec<NewsArticle>,
    pub mode: Mode,
    pub delay: Duration,
    pub finished: Arc<AtomicBool>,
    pub keyword: std::sync::Mutex<Option<String>>,
}

impl FakeNews {
    pub fn new(articles: Vec<NewsArticle>) -> Self {
        FakeNews {
            articles,
            mode: Mode::Ok,
            delay: Duration::ZERO,
            finished: Arc::new(AtomicBool::new(false)),
            keyword: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl NewsSource for FakeNews {
    async fn search(
        &self,
        keyword: &str,
        since: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<NewsArticle>, CollectorError> {
        *self.keyword.lock().unwrap() = Some(keyword.to_string());
        tokio::time::sleep(self.delay).await;
        self.mode.apply("news").await?;
        self.finished.store(true, Ordering::SeqCst);
        Ok(self
            .articles
            .iter()
            .filter(|a| a.published_at >= since)
            .take(max_results)
            .cloned()
            .collect())
    }
}

pub struct FakeAi {
    pub mode: Mode,
    pub calls: AtomicUsize,
    pub articles_seen: AtomicUsize,
}

impl FakeAi {
    pub fn new(mode: Mode) -> Self {
        FakeAi {
            mode,
            calls: AtomicUsize::new(0),
            articles_seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AiSource for FakeAi {
    async fn analyze(&self, context: &AiContext) -> Result<AiAnalysis, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.articles_seen.store(context.articles.len(), Ordering::SeqCst);
        self.mode.apply("AI").await?;
        Ok(AiAnalysis {
            news_summary: format!("{} articles about {}", context.articles.len(), context.security.name),
            sentiment: Sentiment::Neutral,
            sentiment_score: 0.1,
            key_issues: vec!["memory cycle".to_string()],
            overall_opinion: "Hold".to_string(),
        })
    }
}

pub struct Fakes {
    pub price: Arc<FakePrice>,
    pub financials: Arc<FakeFinancials>,
    pub news: Arc<FakeNews>,
    pub ai: Arc<FakeAi>,
}

impl Fakes {
    pub fn healthy(bars: Vec<PriceBar>) -> Self {
        Fakes {
            price: Arc::new(FakePrice::new(bars)),
            financials: Arc::new(FakeFinancials { mode: Mode::Ok }),
            news: Arc::new(FakeNews::new(twelve_articles())),
            ai: Arc::new(FakeAi::new(Mode::Ok)),
        }
    }

    pub fn collectors(&self) -> Collectors {
        Collectors {
            price: self.price.clone(),
            financials: self.financials.clone(),
            news: self.news.clone(),
            ai: self.ai.clone(),
        }
    }
}

pub fn fast_options() -> OrchestratorOptions {
    OrchestratorOptions {
        fetch_timeout: Duration::from_millis(200),
        ai_timeout: Duration::from_millis(200),
        retry_backoff: Duration::from_millis(1),
        ..OrchestratorOptions::default()
    }
}
