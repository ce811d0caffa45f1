// src/bin/generate_report.rs
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Seoul;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use stock_report::config::Settings;
use stock_report::models::{preset_days, DateRange, FeatureToggles};
use stock_report::services::batch::{run_batch, BatchRequest};
use stock_report::services::collectors::http_client;
use stock_report::services::collectors::naver_ranking::{top_stocks, Market};
use stock_report::services::orchestrator::Collectors;

#[derive(Parser, Debug)]
#[command(version, about = "Generate technical analysis reports for KRX stocks")]
struct Cli {
    /// Six-digit stock codes; falls back to REPORT_CODES, then to the most traded stocks
    codes: Vec<String>,

    /// How many of the most traded stocks to pick when no codes are given
    #[arg(short = 'n', long = "top", default_value_t = 10)]
    top: usize,

    /// Market for automatic selection: KOSPI, KOSDAQ or ALL
    #[arg(short, long, default_value = "ALL")]
    market: Market,

    /// Period as a number of calendar days ending today
    #[arg(long, conflicts_with = "preset")]
    period: Option<i64>,

    /// Named period: 1w, 1m, 3m, 6m, 1y
    #[arg(long, default_value = "1m")]
    preset: String,

    /// Explicit start date (YYYY-MM-DD); needs --end
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Explicit end date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    #[arg(long)]
    no_ai: bool,

    #[arg(long)]
    no_news: bool,

    #[arg(long)]
    no_financials: bool,

    /// Output directory; defaults to OUTPUT_DIR
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Upload to GitHub and send a KakaoTalk notification
    #[arg(long)]
    kakao: bool,
}

impl Cli {
    fn range(&self, today: NaiveDate) -> Result<DateRange> {
        if let Some(start) = self.start {
            let end = self.end.context("--start needs --end")?;
            return Ok(DateRange::new(start, end));
        }
        let end = self.end.unwrap_or(today);
        let days = match self.period {
            Some(days) if days > 0 => days,
            Some(days) => bail!("--period must be positive, got {}", days),
            None => preset_days(&self.preset)
                .with_context(|| format!("unknown preset {:?} (use 1w, 1m, 3m, 6m or 1y)", self.preset))?,
        };
        Ok(DateRange::trailing(end, days))
    }

    fn toggles(&self) -> FeatureToggles {
        FeatureToggles {
            include_ai: !self.no_ai,
            include_news: !self.no_news,
            include_financials: !self.no_financials,
        }
    }
}

async fn select_top_stocks(settings: &Settings, market: Market, n: usize) -> Result<Vec<String>> {
    if n == 0 {
        bail!("--top must be at least 1");
    }
    info!("Selecting the {} most traded stocks on {}", n, market);
    let client = http_client(settings.fetch_timeout)?;
    let ranked = top_stocks(&client, market, n)
        .await
        .with_context(|| format!("selecting top stocks on {}", market))?;
    for (i, stock) in ranked.iter().enumerate() {
        println!(
            "{:>2}. {} {} ({}) {:.0} KRW {:+.2}%  traded {:.0}억",
            i + 1,
            stock.code,
            stock.name,
            stock.market,
            stock.close,
            stock.change_rate,
            stock.trading_value / 100_000_000.0
        );
    }
    Ok(ranked.into_iter().map(|s| s.code).collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    let codes = if !cli.codes.is_empty() {
        cli.codes.clone()
    } else if !settings.report_codes.is_empty() {
        settings.report_codes.clone()
    } else {
        select_top_stocks(&settings, cli.market, cli.top).await?
    };

    let today = Utc::now().with_timezone(&Seoul).date_naive();
    let request = BatchRequest {
        codes,
        range: cli.range(today)?,
        toggles: cli.toggles(),
        output_dir: cli.output.clone().unwrap_or_else(|| settings.output_dir.clone()),
        max_reports: settings.max_reports,
        deliver: cli.kakao,
    };
    info!("Generating reports for {:?} over {}", request.codes, request.range);

    let collectors = Collectors::from_settings(&settings)?;
    let outcome = run_batch(&settings, &collectors, &settings.orchestrator_options(), &request).await?;

    for (report, artifacts) in &outcome.reports {
        println!("{} ({}): {}", report.security_info.name, report.security_info.code, artifacts.markdown.display());
    }
    for failure in &outcome.failures {
        warn!("{}", failure);
        eprintln!("failed: {}", failure);
    }
    if let Some(document) = &outcome.document {
        println!("document: {}", document.display());
    }
    if let Some(link) = &outcome.link {
        println!("link: {}", link);
    }

    if outcome.reports.is_empty() {
        bail!("no report could be generated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn preset_defaults_to_one_month() {
        let cli = Cli::parse_from(["generate_report", "005930"]);
        let range = cli.range(day(2024, 6, 3)).unwrap();
        assert_eq!(range, DateRange::trailing(day(2024, 6, 3), 30));
        assert!(cli.toggles().include_ai);
        assert_eq!((cli.top, cli.market), (10, Market::All));
    }

    #[test]
    fn automatic_selection_options() {
        let cli = Cli::parse_from(["generate_report", "-n", "5", "--market", "kosdaq"]);
        assert!(cli.codes.is_empty());
        assert_eq!(cli.top, 5);
        assert_eq!(cli.market, Market::Kosdaq);
        assert!(Cli::try_parse_from(["generate_report", "--market", "NYSE"]).is_err());
    }

    #[test]
    fn explicit_dates_and_flags() {
        let cli = Cli::parse_from([
            "generate_report",
            "005930",
            "000660",
            "--start",
            "2024-01-02",
            "--end",
            "2024-03-29",
            "--no-ai",
            "--no-news",
        ]);
        assert_eq!(cli.codes.len(), 2);
        assert_eq!(cli.range(day(2024, 6, 3)).unwrap(), DateRange::new(day(2024, 1, 2), day(2024, 3, 29)));
        let toggles = cli.toggles();
        assert!(!toggles.include_ai && !toggles.include_news && toggles.include_financials);
    }

    #[test]
    fn bad_period_is_rejected() {
        let cli = Cli::parse_from(["generate_report", "--preset", "2w"]);
        assert!(cli.range(day(2024, 6, 3)).is_err());
        let cli = Cli::parse_from(["generate_report", "--period", "0"]);
        assert!(cli.range(day(2024, 6, 3)).is_err());
    }
}
