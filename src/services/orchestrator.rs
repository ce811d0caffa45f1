// src/services/orchestrator.rs
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Asia::Seoul;
use log::{error, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::collectors::dart::DartSource;
use super::collectors::naver_news::NaverNewsSource;
use super::collectors::openai::OpenAiSource;
use super::collectors::yahoo::YahooPriceSource;
use super::collectors::{
    is_valid_code, AiContext, AiSource, FinancialSource, NewsSource, PriceSource,
};
use super::indicators::{compute_indicators, IndicatorParams};
use super::news_dedup::{dedup_news, window_start, DedupOptions, DEFAULT_NEWS_CAP, DEFAULT_SIMILARITY_THRESHOLD};
use super::signals::{generate_signals, SignalParams};
use crate::config::Settings;
use crate::error::{CollectorError, FatalError, FatalKind};
use crate::models::{
    AiAnalysis, DateRange, Disclosure, FeatureToggles, FinancialData, IndicatorPoint, NewsArticle,
    PriceBar, ReportData, SecurityInfo, Signal, SourceResult, UnavailableReason,
};

/// One handle per source. Cloned into every run; runs share nothing else.
#[derive(Clone)]
pub struct Collectors {
    pub price: Arc<dyn PriceSource>,
    pub financials: Arc<dyn FinancialSource>,
    pub news: Arc<dyn NewsSource>,
    pub ai: Arc<dyn AiSource>,
}

impl Collectors {
    pub fn from_settings(settings: &Settings) -> Result<Self, CollectorError> {
        let timeout = settings.fetch_timeout;
        Ok(Collectors {
            price: Arc::new(YahooPriceSource::new(timeout)?),
            financials: Arc::new(DartSource::new(
                settings.dart_api_key.clone(),
                settings.dart_corp_codes.clone(),
                timeout,
            )?),
            news: Arc::new(NaverNewsSource::new(
                settings.naver_client_id.clone(),
                settings.naver_client_secret.clone(),
                timeout,
            )?),
            ai: Arc::new(OpenAiSource::new(
                settings.openai_api_key.clone(),
                settings.openai_model.clone(),
                timeout,
            )?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    /// Bound on each fetch attempt, mandatory or optional.
    pub fetch_timeout: Duration,
    /// Bound on the whole commentary step (several model calls).
    pub ai_timeout: Duration,
    pub price_retries: u32,
    pub retry_backoff: Duration,
    pub news_months: u32,
    pub news_raw_limit: usize,
    pub news_cap: usize,
    pub similarity_threshold: f64,
    pub disclosure_count: usize,
    pub indicators: IndicatorParams,
    pub signals: SignalParams,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        OrchestratorOptions {
            fetch_timeout: Duration::from_secs(20),
            ai_timeout: Duration::from_secs(60),
            price_retries: 2,
            retry_backoff: Duration::from_millis(500),
            news_months: 6,
            news_raw_limit: 30,
            news_cap: DEFAULT_NEWS_CAP,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            disclosure_count: 5,
            indicators: IndicatorParams::default(),
            signals: SignalParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    FetchingMandatory,
    FetchingOptional,
    Merged,
    Done,
    FailedFatal,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            RunState::Init => "Init",
            RunState::FetchingMandatory => "FetchingMandatory",
            RunState::FetchingOptional => "FetchingOptional",
            RunState::Merged => "Merged",
            RunState::Done => "Done",
            RunState::FailedFatal => "FailedFatal",
        };
        write!(f, "{}", label)
    }
}

/// Output of the mandatory path.
#[derive(Debug, Clone)]
pub struct MandatoryData {
    pub security_info: SecurityInfo,
    pub price_bars: Vec<PriceBar>,
    pub indicator_points: Vec<IndicatorPoint>,
    pub signals: Vec<Signal>,
}

/// Settled optional sections.
#[derive(Debug, Clone)]
pub struct OptionalResults {
    pub financials: SourceResult<Vec<FinancialData>>,
    pub disclosures: SourceResult<Vec<Disclosure>>,
    pub news: SourceResult<Vec<NewsArticle>>,
    pub ai_analysis: SourceResult<AiAnalysis>,
}

/// Builds the report from settled inputs. Never calls a collector and never fails.
pub fn merge(
    mandatory: MandatoryData,
    optional: OptionalResults,
    range: DateRange,
    generated_at: DateTime<Utc>,
) -> ReportData {
    ReportData {
        security_info: mandatory.security_info,
        price_bars: mandatory.price_bars,
        indicator_points: mandatory.indicator_points,
        signals: mandatory.signals,
        financials: optional.financials,
        disclosures: optional.disclosures,
        news: optional.news,
        ai_analysis: optional.ai_analysis,
        generated_at,
        period_start: range.start,
        period_end: range.end,
    }
}

/// Runs a collector call under a timeout and folds every failure into
/// `SourceResult::Unavailable`.
pub async fn isolate<T>(
    section: &str,
    timeout: Duration,
    fetch: impl Future<Output = Result<T, CollectorError>>,
) -> SourceResult<T> {
    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(data)) => SourceResult::ok(data),
        Ok(Err(e)) => SourceResult::unavailable(e.reason(), format!("{}: {}", section, e)),
        Err(_) => SourceResult::unavailable(
            UnavailableReason::Timeout,
            format!("{}: no response within {:?}", section, timeout),
        ),
    }
}

/// Aborts the task when dropped, so a cancelled run leaves nothing behind.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// An optional section that is either already decided or still in flight.
enum Pending<T> {
    Settled(SourceResult<T>),
    Running(AbortOnDrop<SourceResult<T>>),
}

impl<T: Send + 'static> Pending<T> {
    fn spawn<F>(section: &'static str, timeout: Duration, fetch: F) -> Self
    where
        F: Future<Output = Result<T, CollectorError>> + Send + 'static,
    {
        Pending::Running(AbortOnDrop(tokio::spawn(isolate(section, timeout, fetch))))
    }

    fn abort(&self) {
        if let Pending::Running(guard) = self {
            guard.0.abort();
        }
    }

    async fn settle(self, section: &str) -> SourceResult<T> {
        match self {
            Pending::Settled(result) => result,
            Pending::Running(mut guard) => (&mut guard.0).await.unwrap_or_else(|e| {
                error!("{} task did not complete: {}", section, e);
                SourceResult::unavailable(UnavailableReason::UpstreamError, format!("{} task failed: {}", section, e))
            }),
        }
    }
}

/// Retries `attempt` on retryable errors with exponential backoff, each try
/// bounded by `timeout`.
async fn with_retry<T, F, Fut>(label: &str, retries: u32, backoff: Duration, timeout: Duration, mut attempt: F) -> Result<T, CollectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollectorError>>,
{
    let mut tries = 0u32;
    loop {
        let result = match tokio::time::timeout(timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::Timeout(timeout)),
        };
        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && tries < retries => {
                tries += 1;
                let delay = backoff * 2u32.saturating_pow(tries - 1);
                warn!("{} failed (attempt {}/{}): {}, retrying in {:?}", label, tries, retries + 1, e, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drives one report run. Build a fresh instance per security.
pub struct Orchestrator {
    collectors: Collectors,
    options: OrchestratorOptions,
    state: RunState,
}

impl Orchestrator {
    pub fn new(collectors: Collectors, options: OrchestratorOptions) -> Self {
        Orchestrator {
            collectors,
            options,
            state: RunState::Init,
        }
    }

    fn enter(&mut self, code: &str, next: RunState) {
        info!("[{}] {} -> {}", code, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, code: &str, err: FatalError) -> FatalError {
        self.enter(code, RunState::FailedFatal);
        error!("[{}] run aborted: {}", code, err);
        err
    }

    pub async fn run(self, code: &str, range: DateRange, toggles: FeatureToggles) -> Result<ReportData, FatalError> {
        self.run_at(code, range, toggles, Utc::now()).await
    }

    /// `now` anchors the news window and `generated_at`.
    pub async fn run_at(
        mut self,
        code: &str,
        range: DateRange,
        toggles: FeatureToggles,
        now: DateTime<Utc>,
    ) -> Result<ReportData, FatalError> {
        info!("[{}] report run for {} with {:?}", code, range, toggles);

        if !range.is_valid() {
            return Err(self.fail(
                code,
                FatalError::new(FatalKind::InvalidDateRange, code, range, "start is after end"),
            ));
        }
        if !is_valid_code(code) {
            return Err(self.fail(
                code,
                FatalError::new(FatalKind::NotFound, code, range, "security codes are six digits"),
            ));
        }

        self.enter(code, RunState::FetchingMandatory);
        let opts = self.options.clone();
        let price = self.collectors.price.clone();
        let security_info = match with_retry("security lookup", opts.price_retries, opts.retry_backoff, opts.fetch_timeout, || {
            price.security_info(code)
        })
        .await
        {
            Ok(info) => info,
            Err(e) => return Err(self.fail(code, FatalError::from_collector(code, range, &e))),
        };

        // Optional fetches overlap the price fetch and are aborted if it fails.
        let financials = self.spawn_financials(code, now, toggles);
        let disclosures = self.spawn_disclosures(code, toggles);
        let news = self.spawn_news(&security_info.name, now, toggles);
        let abort_all = || {
            financials.abort();
            disclosures.abort();
            news.abort();
        };

        let bars = with_retry("price fetch", opts.price_retries, opts.retry_backoff, opts.fetch_timeout, || {
            price.price_bars(code, range)
        })
        .await;
        let price_bars = match bars {
            Ok(bars) if bars.is_empty() => {
                abort_all();
                return Err(self.fail(
                    code,
                    FatalError::new(FatalKind::NotFound, code, range, "no trading days in range"),
                ));
            }
            Ok(bars) => bars,
            Err(e) => {
                abort_all();
                return Err(self.fail(code, FatalError::from_collector(code, range, &e)));
            }
        };

        let indicator_points = compute_indicators(&price_bars, &opts.indicators);
        let signals = generate_signals(&price_bars, &indicator_points, &opts.signals);
        info!("[{}] {} bars, {} signals", code, price_bars.len(), signals.len());

        self.enter(code, RunState::FetchingOptional);
        let (financials, disclosures, news) = tokio::join!(
            financials.settle("financials"),
            disclosures.settle("disclosures"),
            news.settle("news"),
        );
        let dedup = DedupOptions {
            months: opts.news_months,
            cap: opts.news_cap,
            threshold: opts.similarity_threshold,
        };
        let news = news.map(|raw| dedup_news(raw, now, &dedup));

        let ai_analysis = self
            .analyze(&security_info, &price_bars, &signals, &financials, &news, toggles)
            .await;

        for (section, reason) in [
            ("financials", financials.reason()),
            ("disclosures", disclosures.reason()),
            ("news", news.reason()),
            ("ai_analysis", ai_analysis.reason()),
        ] {
            if let Some(reason) = reason {
                warn!("[{}] {} unavailable: {}", code, section, reason);
            }
        }

        let report = merge(
            MandatoryData {
                security_info,
                price_bars,
                indicator_points,
                signals,
            },
            OptionalResults {
                financials,
                disclosures,
                news,
                ai_analysis,
            },
            range,
            now,
        );
        self.enter(code, RunState::Merged);
        self.enter(code, RunState::Done);
        Ok(report)
    }

    fn spawn_financials(&self, code: &str, now: DateTime<Utc>, toggles: FeatureToggles) -> Pending<Vec<FinancialData>> {
        if !toggles.include_financials {
            return Pending::Settled(SourceResult::disabled("financials"));
        }
        let source = self.collectors.financials.clone();
        let code = code.to_string();
        let year = now.with_timezone(&Seoul).year();
        Pending::spawn("financials", self.options.fetch_timeout, async move {
            source.financials(&code, &[year, year - 1]).await
        })
    }

    fn spawn_disclosures(&self, code: &str, toggles: FeatureToggles) -> Pending<Vec<Disclosure>> {
        if !toggles.include_financials {
            return Pending::Settled(SourceResult::disabled("disclosures"));
        }
        let source = self.collectors.financials.clone();
        let code = code.to_string();
        let count = self.options.disclosure_count;
        Pending::spawn("disclosures", self.options.fetch_timeout, async move {
            source.disclosures(&code, count).await
        })
    }

    fn spawn_news(&self, keyword: &str, now: DateTime<Utc>, toggles: FeatureToggles) -> Pending<Vec<NewsArticle>> {
        if !toggles.include_news {
            return Pending::Settled(SourceResult::disabled("news"));
        }
        let source = self.collectors.news.clone();
        let keyword = keyword.to_string();
        let since = window_start(now, self.options.news_months);
        let limit = self.options.news_raw_limit;
        Pending::spawn("news", self.options.fetch_timeout, async move {
            source.search(&keyword, since, limit).await
        })
    }

    /// Commentary depends on news; without news it is skipped, not attempted.
    async fn analyze(
        &self,
        security: &SecurityInfo,
        bars: &[PriceBar],
        signals: &[Signal],
        financials: &SourceResult<Vec<FinancialData>>,
        news: &SourceResult<Vec<NewsArticle>>,
        toggles: FeatureToggles,
    ) -> SourceResult<AiAnalysis> {
        if !toggles.include_ai {
            return SourceResult::disabled("AI analysis");
        }
        let articles = match news {
            SourceResult::Ok { data } => data.clone(),
            SourceResult::Unavailable { reason, .. } => {
                return SourceResult::unavailable(
                    UnavailableReason::DependencyUnavailable,
                    format!("news unavailable ({})", reason),
                );
            }
        };

        let context = AiContext {
            security: security.clone(),
            latest_price: bars.last().cloned(),
            signals: signals.to_vec(),
            financials: financials.data().cloned().unwrap_or_default(),
            articles,
        };
        isolate("AI analysis", self.options.ai_timeout, self.collectors.ai.analyze(&context)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn isolate_converts_errors_and_timeouts() {
        let ok = isolate("x", Duration::from_secs(1), async { Ok::<_, CollectorError>(3) }).await;
        assert_eq!(ok, SourceResult::ok(3));

        let err: SourceResult<u8> =
            isolate("x", Duration::from_secs(1), async { Err(CollectorError::NotFound("gone".into())) }).await;
        assert_eq!(err.reason(), Some(UnavailableReason::NotFound));

        let slow: SourceResult<u8> = isolate("x", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert_eq!(slow.reason(), Some(UnavailableReason::Timeout));
    }

    #[tokio::test]
    async fn retry_stops_on_not_found() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry("t", 3, Duration::from_millis(1), Duration::from_secs(1), || {
            calls += 1;
            async { Err(CollectorError::NotFound("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() {
        let mut calls = 0;
        let result: Result<(), _> = with_retry("t", 2, Duration::from_millis(1), Duration::from_secs(1), || {
            calls += 1;
            async { Err(CollectorError::upstream("503")) }
        })
        .await;
        assert!(matches!(result, Err(CollectorError::Upstream(_))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn merge_passes_every_section_through() {
        let mandatory = MandatoryData {
            security_info: SecurityInfo::new("005930", "Samsung", "KOSPI"),
            price_bars: Vec::new(),
            indicator_points: Vec::new(),
            signals: Vec::new(),
        };
        let optional = OptionalResults {
            financials: SourceResult::ok(Vec::new()),
            disclosures: SourceResult::unavailable(UnavailableReason::MissingCredential, "no key"),
            news: SourceResult::disabled("news"),
            ai_analysis: SourceResult::unavailable(UnavailableReason::DependencyUnavailable, "news"),
        };
        let at = Utc::now();
        let report = merge(mandatory, optional, range(), at);
        assert!(report.financials.is_ok());
        assert_eq!(report.disclosures.reason(), Some(UnavailableReason::MissingCredential));
        assert_eq!(report.news.reason(), Some(UnavailableReason::Disabled));
        assert_eq!(report.period_start, range().start);
        assert_eq!(report.generated_at, at);
    }
}
