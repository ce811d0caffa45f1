// src/config.rs
use log::warn;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::orchestrator::OrchestratorOptions;

/// Runtime settings, read from the process environment (and `.env` via dotenv).
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub dart_api_key: Option<String>,
    pub dart_corp_codes: HashMap<String, String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub naver_client_id: Option<String>,
    pub naver_client_secret: Option<String>,
    pub kakao_rest_api_key: Option<String>,
    pub kakao_access_token: Option<String>,
    pub kakao_refresh_token: Option<String>,
    pub github_token: Option<String>,
    pub github_repository: Option<String>,
    pub github_branch: String,
    pub output_dir: PathBuf,
    pub max_reports: usize,
    pub port: u16,
    pub report_schedule: Option<String>,
    pub report_codes: Vec<String>,
    pub fetch_timeout: Duration,
    pub price_retries: u32,
    pub news_months: u32,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            dart_api_key: non_empty("DART_API_KEY"),
            dart_corp_codes: non_empty("DART_CORP_CODES")
                .map(|raw| parse_corp_codes(&raw))
                .unwrap_or_default(),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: non_empty("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            naver_client_id: non_empty("NAVER_CLIENT_ID"),
            naver_client_secret: non_empty("NAVER_CLIENT_SECRET"),
            kakao_rest_api_key: non_empty("KAKAO_REST_API_KEY"),
            kakao_access_token: non_empty("KAKAO_ACCESS_TOKEN"),
            kakao_refresh_token: non_empty("KAKAO_REFRESH_TOKEN"),
            github_token: non_empty("GITHUB_TOKEN"),
            github_repository: non_empty("GITHUB_REPOSITORY"),
            github_branch: non_empty("GITHUB_BRANCH").unwrap_or_else(|| "main".to_string()),
            output_dir: non_empty("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./output")),
            max_reports: parsed_or("MAX_REPORTS", 10),
            port: parsed_or("PORT", 3030),
            report_schedule: non_empty("REPORT_SCHEDULE"),
            report_codes: non_empty("REPORT_CODES")
                .map(|raw| parse_code_list(&raw))
                .unwrap_or_default(),
            fetch_timeout: Duration::from_secs(parsed_or("FETCH_TIMEOUT_SECS", 20)),
            price_retries: parsed_or("PRICE_RETRIES", 2),
            news_months: parsed_or("NEWS_MONTHS", 6),
        }
    }

    pub fn has_dart(&self) -> bool {
        self.dart_api_key.is_some()
    }

    pub fn has_openai(&self) -> bool {
        self.openai_api_key.is_some()
    }

    pub fn has_naver(&self) -> bool {
        self.naver_client_id.is_some() && self.naver_client_secret.is_some()
    }

    pub fn has_kakao(&self) -> bool {
        self.kakao_access_token.is_some() || self.kakao_refresh_token.is_some()
    }

    pub fn has_github(&self) -> bool {
        self.github_token.is_some() && self.github_repository.is_some()
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            fetch_timeout: self.fetch_timeout,
            // summary, sentiment and opinion are separate model calls
            ai_timeout: self.fetch_timeout * 3,
            price_retries: self.price_retries,
            news_months: self.news_months,
            ..OrchestratorOptions::default()
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    match non_empty(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an unparseable value {:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

/// `005930:00126380,000660:00164779` -> stock code => DART corp code
pub fn parse_corp_codes(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (stock, corp) = pair.split_once(':')?;
            let (stock, corp) = (stock.trim(), corp.trim());
            if stock.is_empty() || corp.is_empty() {
                return None;
            }
            Some((stock.to_string(), corp.to_string()))
        })
        .collect()
}

pub fn parse_code_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corp_codes_skip_malformed_pairs() {
        let map = parse_corp_codes("005930:00126380, 000660:00164779,bad,:123");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("000660").map(String::as_str), Some("00164779"));
    }

    #[test]
    fn code_list_accepts_commas_and_spaces() {
        assert_eq!(
            parse_code_list("005930, 000660 035420"),
            vec!["005930", "000660", "035420"]
        );
    }

    #[test]
    fn credentials_gate_optional_sources() {
        let settings = Settings {
            naver_client_id: Some("id".into()),
            ..Settings::default()
        };
        assert!(!settings.has_naver());
        assert!(!settings.has_dart());
    }
}
