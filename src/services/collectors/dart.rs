// src/services/collectors/dart.rs
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use chrono_tz::Asia::Seoul;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{check_status, http_client, FinancialSource};
use crate::error::CollectorError;
use crate::models::{Disclosure, FinancialData};

const API_BASE: &str = "https://opendart.fss.or.kr/api";
const VIEWER_URL: &str = "https://dart.fss.or.kr/dsaf001/main.do";

/// Annual business report, then the Q3 report as a fallback.
const REPORT_CODES: [(&str, &str); 2] = [("11011", "Annual"), ("11014", "Q3")];

#[derive(Debug, Deserialize)]
struct DartResponse<T> {
    status: String,
    message: String,
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct AccountRow {
    #[serde(default)]
    fs_div: String,
    #[serde(default)]
    account_nm: String,
    #[serde(default)]
    thstrm_amount: String,
}

#[derive(Debug, Deserialize)]
struct FilingRow {
    rcept_no: String,
    rcept_dt: String,
    report_nm: String,
    #[serde(default)]
    flr_nm: String,
}

/// OpenDART single-company key accounts and the disclosure list. Stock codes
/// are mapped to DART corp codes through configuration.
pub struct DartSource {
    client: Client,
    api_key: Option<String>,
    corp_codes: HashMap<String, String>,
}

impl DartSource {
    pub fn new(api_key: Option<String>, corp_codes: HashMap<String, String>, timeout: Duration) -> Result<Self, CollectorError> {
        Ok(DartSource {
            client: http_client(timeout)?,
            api_key,
            corp_codes,
        })
    }

    fn credentials(&self, code: &str) -> Result<(&str, &str), CollectorError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CollectorError::MissingCredential("DART_API_KEY is not set".to_string()))?;
        let corp = self
            .corp_codes
            .get(code)
            .ok_or_else(|| CollectorError::NotFound(format!("no DART corp code configured for {}", code)))?;
        Ok((key, corp.as_str()))
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<Vec<T>>, CollectorError> {
        let url = format!("{}/{}", API_BASE, endpoint);
        let response = self.client.get(&url).query(query).send().await?;
        let body: DartResponse<T> = check_status(response, "OpenDART")?.json().await?;
        match body.status.as_str() {
            "000" => Ok(Some(body.list)),
            // no data for the requested period
            "013" => Ok(None),
            "010" | "011" | "012" | "901" => Err(CollectorError::MissingCredential(format!(
                "OpenDART rejected the key: {} ({})",
                body.message, body.status
            ))),
            _ => Err(CollectorError::upstream(format!("OpenDART {}: {}", body.status, body.message))),
        }
    }
}

#[async_trait]
impl FinancialSource for DartSource {
    async fn financials(&self, code: &str, years: &[i32]) -> Result<Vec<FinancialData>, CollectorError> {
        let (key, corp) = self.credentials(code)?;
        let mut out = Vec::new();

        for year in years {
            let year_str = year.to_string();
            for (reprt_code, label) in REPORT_CODES {
                let query = [
                    ("crtfc_key", key),
                    ("corp_code", corp),
                    ("bsns_year", year_str.as_str()),
                    ("reprt_code", reprt_code),
                ];
                match self.get::<AccountRow>("fnlttSinglAcnt.json", &query).await? {
                    Some(rows) if !rows.is_empty() => {
                        info!("DART {} {} report found for {}", year, label, code);
                        out.push(financial_from_rows(*year, label, &rows));
                        break;
                    }
                    _ => info!("No DART {} report for {} in {}", label, code, year),
                }
            }
        }

        if out.is_empty() {
            return Err(CollectorError::NotFound(format!("no DART statements for {} in {:?}", code, years)));
        }
        Ok(out)
    }

    async fn disclosures(&self, code: &str, count: usize) -> Result<Vec<Disclosure>, CollectorError> {
        let (key, corp) = self.credentials(code)?;
        let today = Utc::now().with_timezone(&Seoul).date_naive();
        let begin = (today - ChronoDuration::days(90)).format("%Y%m%d").to_string();
        let end = today.format("%Y%m%d").to_string();
        let page_count = count.to_string();

        let query = [
            ("crtfc_key", key),
            ("corp_code", corp),
            ("bgn_de", begin.as_str()),
            ("end_de", end.as_str()),
            ("page_count", page_count.as_str()),
        ];
        let rows = self.get::<FilingRow>("list.json", &query).await?.unwrap_or_default();
        if rows.is_empty() {
            warn!("No recent DART disclosures for {}", code);
        }
        Ok(rows.into_iter().take(count).map(disclosure_from_row).collect())
    }
}

fn amount(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse().ok()
}

/// Consolidated (CFS) rows win over separate (OFS) ones.
fn financial_from_rows(year: i32, label: &str, rows: &[AccountRow]) -> FinancialData {
    let consolidated: Vec<&AccountRow> = rows.iter().filter(|r| r.fs_div == "CFS").collect();
    let chosen: Vec<&AccountRow> = if consolidated.is_empty() {
        rows.iter().collect()
    } else {
        consolidated
    };

    let find = |names: &[&str]| {
        names.iter().find_map(|name| {
            chosen
                .iter()
                .find(|r| r.account_nm.contains(name))
                .and_then(|r| amount(&r.thstrm_amount))
        })
    };

    let revenue = find(&["매출액", "영업수익"]);
    let operating_income = find(&["영업이익"]);
    let net_income = find(&["당기순이익", "분기순이익"]);
    let equity = find(&["자본총계"]);
    let roe = match (net_income, equity) {
        (Some(n), Some(e)) if e != 0.0 => Some(n / e * 100.0),
        _ => None,
    };

    FinancialData {
        year,
        quarter: Some(label.to_string()),
        revenue,
        operating_income,
        net_income,
        per: None,
        pbr: None,
        roe,
    }
}

fn disclosure_from_row(row: FilingRow) -> Disclosure {
    let date = match (row.rcept_dt.get(0..4), row.rcept_dt.get(4..6), row.rcept_dt.get(6..8)) {
        (Some(y), Some(m), Some(d)) => format!("{}-{}-{}", y, m, d),
        _ => row.rcept_dt.clone(),
    };
    Disclosure {
        title: row.report_nm.trim().to_string(),
        date,
        link: format!("{}?rcpNo={}", VIEWER_URL, row.rcept_no),
        filer: row.flr_nm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fs_div: &str, account: &str, amount: &str) -> AccountRow {
        AccountRow {
            fs_div: fs_div.to_string(),
            account_nm: account.to_string(),
            thstrm_amount: amount.to_string(),
        }
    }

    #[test]
    fn consolidated_statements_are_preferred() {
        let rows = vec![
            row("OFS", "매출액", "170,374,090,000,000"),
            row("CFS", "매출액", "258,935,494,000,000"),
            row("CFS", "영업이익", "6,566,976,000,000"),
            row("CFS", "당기순이익(손실)", "15,487,100,000,000"),
            row("CFS", "자본총계", "363,677,865,000,000"),
        ];
        let data = financial_from_rows(2023, "Annual", &rows);
        assert_eq!(data.revenue, Some(258_935_494_000_000.0));
        assert_eq!(data.operating_income, Some(6_566_976_000_000.0));
        assert_eq!(data.quarter.as_deref(), Some("Annual"));
        let roe = data.roe.unwrap();
        assert!((roe - 4.2585).abs() < 0.001);
    }

    #[test]
    fn dash_revenue_falls_back_to_operating_revenue() {
        let rows = vec![row("OFS", "매출액", "-"), row("OFS", "영업수익", "1,000")];
        let data = financial_from_rows(2024, "Q3", &rows);
        assert_eq!(data.revenue, Some(1000.0));
        assert_eq!(data.net_income, None);
        assert_eq!(data.roe, None);
    }

    #[test]
    fn dash_amounts_are_missing() {
        let rows = vec![
            row("OFS", "매출액", "-"),
            row("OFS", "영업수익", " - "),
            row("OFS", "영업이익", ""),
        ];
        let data = financial_from_rows(2024, "Q3", &rows);
        assert_eq!(data.revenue, None);
        assert_eq!(data.operating_income, None);
        assert_eq!(data.net_income, None);
        assert_eq!(data.roe, None);
    }

    #[test]
    fn status_013_means_no_data() {
        let body: DartResponse<AccountRow> =
            serde_json::from_str(r#"{"status":"013","message":"조회된 데이타가 없습니다."}"#).unwrap();
        assert!(body.list.is_empty());
        assert_eq!(body.status, "013");
    }

    #[test]
    fn disclosure_rows_get_viewer_links() {
        let d = disclosure_from_row(FilingRow {
            rcept_no: "20240430000123".into(),
            rcept_dt: "20240430".into(),
            report_nm: " 분기보고서 (2024.03) ".into(),
            flr_nm: "삼성전자".into(),
        });
        assert_eq!(d.date, "2024-04-30");
        assert_eq!(d.title, "분기보고서 (2024.03)");
        assert!(d.link.ends_with("rcpNo=20240430000123"));
    }

    #[test]
    fn missing_key_is_a_credential_error() {
        let source = DartSource::new(None, HashMap::new(), Duration::from_secs(1)).unwrap();
        let err = source.credentials("005930").unwrap_err();
        assert!(matches!(err, CollectorError::MissingCredential(_)));
    }
}
