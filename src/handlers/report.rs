// src/handlers/report.rs
use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Seoul;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use crate::models::{DateRange, FeatureToggles};
use crate::services::orchestrator::{Collectors, Orchestrator, OrchestratorOptions};

const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 3650;

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub days: Option<i64>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub ai: Option<bool>,
    pub news: Option<bool>,
    pub financials: Option<bool>,
}

impl ReportQuery {
    /// `start`+`end` win over `days`; a lone `days` counts back from `end`
    /// (or today). Ordering of start/end is left to the orchestrator.
    pub fn range(&self, today: NaiveDate) -> Result<DateRange, ApiError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            return Ok(DateRange::new(start, end));
        }
        let days = self.days.unwrap_or(DEFAULT_DAYS);
        if !(1..=MAX_DAYS).contains(&days) {
            return Err(ApiError::bad_request(format!("days must be between 1 and {}", MAX_DAYS)));
        }
        match (self.start, self.end) {
            (Some(start), None) => Ok(DateRange::new(start, start + chrono::Duration::days(days))),
            (None, Some(end)) => Ok(DateRange::trailing(end, days)),
            _ => Ok(DateRange::trailing(today, days)),
        }
    }

    pub fn toggles(&self) -> FeatureToggles {
        let defaults = FeatureToggles::default();
        FeatureToggles {
            include_ai: self.ai.unwrap_or(defaults.include_ai),
            include_news: self.news.unwrap_or(defaults.include_news),
            include_financials: self.financials.unwrap_or(defaults.include_financials),
        }
    }
}

pub async fn get_report(
    code: String,
    query: ReportQuery,
    collectors: Collectors,
    options: OrchestratorOptions,
) -> Result<Json, Rejection> {
    let today = Utc::now().with_timezone(&Seoul).date_naive();
    let range = query.range(today).map_err(warp::reject::custom)?;

    info!("Report requested for {} over {}", code, range);
    match Orchestrator::new(collectors, options)
        .run(&code, range, query.toggles())
        .await
    {
        Ok(report) => Ok(warp::reply::json(&report)),
        Err(e) => {
            error!("Report for {} failed: {}", code, e);
            Err(warp::reject::custom(ApiError::from(e)))
        }
    }
}

pub async fn get_health() -> Result<Json, Rejection> {
    Ok(warp::reply::json(&json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::http::StatusCode;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn explicit_dates_win_over_days() {
        let query = ReportQuery {
            days: Some(7),
            start: Some(day(2024, 1, 1)),
            end: Some(day(2024, 3, 1)),
            ..ReportQuery::default()
        };
        assert_eq!(query.range(day(2024, 6, 3)).unwrap(), DateRange::new(day(2024, 1, 1), day(2024, 3, 1)));
    }

    #[test]
    fn days_count_back_from_today() {
        let range = ReportQuery::default().range(day(2024, 6, 3)).unwrap();
        assert_eq!(range.end, day(2024, 6, 3));
        assert_eq!(range.days(), DEFAULT_DAYS);

        let err = ReportQuery { days: Some(0), ..ReportQuery::default() }
            .range(day(2024, 6, 3))
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn toggles_default_on() {
        let query = ReportQuery { ai: Some(false), ..ReportQuery::default() };
        let toggles = query.toggles();
        assert!(!toggles.include_ai);
        assert!(toggles.include_news && toggles.include_financials);
    }
}
