// src/services/collectors/yahoo.rs
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{check_status, http_client, naver_finance, normalize_bars, PriceSource};
use crate::error::CollectorError;
use crate::models::{DateRange, PriceBar, SecurityInfo};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Listing suffixes in lookup order: KOSPI first, then KOSDAQ.
const MARKETS: [(&str, &str); 2] = [("KS", "KOSPI"), ("KQ", "KOSDAQ")];

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    long_name: Option<String>,
    short_name: Option<String>,
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Daily KRX bars from the Yahoo chart API, with the valuation profile
/// scraped from Naver Finance on a best-effort basis.
pub struct YahooPriceSource {
    client: Client,
    base_url: String,
    enrich_profile: bool,
}

impl YahooPriceSource {
    pub fn new(timeout: Duration) -> Result<Self, CollectorError> {
        Ok(YahooPriceSource {
            client: http_client(timeout)?,
            base_url: CHART_URL.to_string(),
            enrich_profile: true,
        })
    }

    pub fn without_profile(mut self) -> Self {
        self.enrich_profile = false;
        self
    }

    async fn fetch_chart(&self, symbol: &str, query: &[(&str, String)]) -> Result<ChartResult, CollectorError> {
        let url = format!("{}/{}", self.base_url, symbol);
        info!("Fetching Yahoo chart: {}", url);

        let response = self.client.get(&url).query(query).send().await?;
        let response = check_status(response, "Yahoo chart")?;
        let body: ChartResponse = response.json().await?;

        if let Some(err) = body.chart.error {
            let detail = err.description.unwrap_or_else(|| err.code.clone());
            return Err(if err.code.eq_ignore_ascii_case("Not Found") {
                CollectorError::NotFound(format!("{}: {}", symbol, detail))
            } else {
                CollectorError::upstream(format!("{}: {}", symbol, detail))
            });
        }

        body.chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| CollectorError::NotFound(format!("no chart data for {}", symbol)))
    }

    /// Tries each market suffix in turn; only `NotFound` moves on to the next.
    async fn fetch_listed(&self, code: &str, query: &[(&str, String)]) -> Result<(ChartResult, &'static str), CollectorError> {
        for (suffix, market) in MARKETS {
            match self.fetch_chart(&format!("{}.{}", code, suffix), query).await {
                Ok(result) => return Ok((result, market)),
                Err(CollectorError::NotFound(detail)) => {
                    info!("{} not listed on {}: {}", code, market, detail);
                }
                Err(e) => return Err(e),
            }
        }
        Err(CollectorError::NotFound(format!("{} is not listed on KOSPI or KOSDAQ", code)))
    }
}

#[async_trait]
impl PriceSource for YahooPriceSource {
    async fn security_info(&self, code: &str) -> Result<SecurityInfo, CollectorError> {
        let query = [("range", "5d".to_string()), ("interval", "1d".to_string())];
        let (chart, market) = self.fetch_listed(code, &query).await?;

        let name = chart
            .meta
            .long_name
            .or(chart.meta.short_name)
            .unwrap_or_else(|| chart.meta.symbol.clone());
        let mut info = SecurityInfo::new(code, name, market);

        if self.enrich_profile {
            match naver_finance::fetch_profile(&self.client, code).await {
                Ok(profile) => profile.apply_to(&mut info),
                Err(e) => warn!("Naver Finance profile for {} unavailable: {}", code, e),
            }
        }
        Ok(info)
    }

    async fn price_bars(&self, code: &str, range: DateRange) -> Result<Vec<PriceBar>, CollectorError> {
        let query = [
            ("period1", seoul_timestamp(range.start, NaiveTime::MIN).to_string()),
            ("period2", seoul_timestamp(range.end, end_of_day()).to_string()),
            ("interval", "1d".to_string()),
        ];
        let (chart, market) = self.fetch_listed(code, &query).await?;
        let bars = bars_from_chart(chart, range);
        info!("Fetched {} daily bars for {} ({}) over {}", bars.len(), code, market, range);
        Ok(bars)
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

fn seoul_timestamp(date: NaiveDate, time: NaiveTime) -> i64 {
    Seoul
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| date.and_time(time).and_utc().timestamp())
}

fn bars_from_chart(chart: ChartResult, range: DateRange) -> Vec<PriceBar> {
    let quote = chart.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |series: &Vec<Option<f64>>, i: usize| series.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(chart.timestamp.len());
    for (i, ts) in chart.timestamp.iter().enumerate() {
        let Some(close) = at(&quote.close, i) else {
            continue;
        };
        let Some(utc) = Utc.timestamp_opt(*ts, 0).single() else {
            continue;
        };
        let date = utc.with_timezone(&Seoul).date_naive();
        if date < range.start || date > range.end {
            continue;
        }
        let volume = quote.volume.get(i).copied().flatten().unwrap_or(0);
        bars.push(PriceBar {
            date,
            open: at(&quote.open, i).unwrap_or(close),
            high: at(&quote.high, i).unwrap_or(close),
            low: at(&quote.low, i).unwrap_or(close),
            close,
            volume,
            trading_value: close * volume as f64,
            change_rate: 0.0,
        });
    }

    let mut bars = normalize_bars(bars);
    let mut previous = chart.meta.chart_previous_close;
    for bar in bars.iter_mut() {
        bar.change_rate = match previous {
            Some(prev) if prev != 0.0 => (bar.close - prev) / prev * 100.0,
            _ => 0.0,
        };
        previous = Some(bar.close);
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "chart": {
        "result": [{
          "meta": {"symbol": "005930.KS", "longName": "Samsung Electronics Co., Ltd.", "chartPreviousClose": 100.0},
          "timestamp": [1717372800, 1717459200, 1717545600, 1717459200],
          "indicators": {"quote": [{
            "open":   [101.0, 102.0, null, 102.0],
            "high":   [103.0, 104.0, null, 104.0],
            "low":    [99.0, 100.0, null, 100.0],
            "close":  [102.0, 99.96, null, 99.96],
            "volume": [1000, 2000, null, 2000]
          }]}
        }],
        "error": null
      }
    }"#;

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    #[test]
    fn parses_chart_into_clean_bars() {
        let response: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let chart = response.chart.result.unwrap().into_iter().next().unwrap();
        let bars = bars_from_chart(chart, DateRange::new(june(1), june(30)));

        assert_eq!(bars.len(), 2);
        assert!(bars.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(bars[0].date, june(3));
        assert!((bars[0].change_rate - 2.0).abs() < 1e-9);
        assert!((bars[1].change_rate - (-2.0)).abs() < 1e-9);
        assert_eq!(bars[1].trading_value, 99.96 * 2000.0);
    }

    #[test]
    fn bars_outside_range_are_dropped() {
        let response: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let chart = response.chart.result.unwrap().into_iter().next().unwrap();
        let bars = bars_from_chart(chart, DateRange::new(june(4), june(4)));
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, june(4));
    }

    #[test]
    fn chart_error_payload_parses() {
        let raw = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let response: ChartResponse = serde_json::from_str(raw).unwrap();
        assert!(response.chart.result.is_none());
        assert_eq!(response.chart.error.unwrap().code, "Not Found");
    }

    #[test]
    fn seoul_midnight_is_utc_previous_day() {
        let ts = seoul_timestamp(june(3), NaiveTime::MIN);
        assert_eq!(ts, 1717340400);
    }
}
