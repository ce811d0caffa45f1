// src/services/collectors/naver_finance.rs
use log::info;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};

use super::check_status;
use crate::error::CollectorError;
use crate::models::SecurityInfo;

const ITEM_URL: &str = "https://finance.naver.com/item/main.naver";

/// Valuation fields scraped from the Naver Finance item page. Every field
/// is optional; a layout change only loses data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub sectors: Vec<String>,
    pub per: Option<f64>,
    pub eps: Option<f64>,
    pub pbr: Option<f64>,
    pub bps: Option<f64>,
    pub dividend_yield: Option<f64>,
}

impl Profile {
    pub fn apply_to(self, info: &mut SecurityInfo) {
        if !self.sectors.is_empty() {
            info.sectors = self.sectors;
        }
        info.per = self.per.or(info.per);
        info.eps = self.eps.or(info.eps);
        info.pbr = self.pbr.or(info.pbr);
        info.bps = self.bps.or(info.bps);
        info.dividend_yield = self.dividend_yield.or(info.dividend_yield);
    }
}

pub async fn fetch_profile(client: &Client, code: &str) -> Result<Profile, CollectorError> {
    info!("Fetching Naver Finance profile for {}", code);
    let response = client.get(ITEM_URL).query(&[("code", code)]).send().await?;
    let html = check_status(response, "Naver Finance")?.text().await?;
    parse_profile(&html)
}

/// Compiles a CSS selector; scraper's parse error only implements `Debug`.
pub(crate) fn selector(css: &str) -> Result<Selector, CollectorError> {
    Selector::parse(css).map_err(|e| CollectorError::upstream(format!("bad selector {:?}: {:?}", css, e)))
}

fn number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

fn capture_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text).and_then(|c| c.get(1)).and_then(|m| number(m.as_str()))
}

pub fn parse_profile(html: &str) -> Result<Profile, CollectorError> {
    let sector_re = Regex::new(r#"type=upjong[^"]*"[^>]*>([^<]+)</a>"#)
        .map_err(|e| CollectorError::upstream(e.to_string()))?;
    let ratio_re = Regex::new(r"(-?\d[\d,]*(?:\.\d+)?)\s*배").map_err(|e| CollectorError::upstream(e.to_string()))?;
    let won_re = Regex::new(r"(-?\d[\d,]*(?:\.\d+)?)\s*원").map_err(|e| CollectorError::upstream(e.to_string()))?;
    let dividend_re = Regex::new(r"(?s)배당수익률.*?(\d+(?:\.\d+)?)\s*%")
        .map_err(|e| CollectorError::upstream(e.to_string()))?;
    let row_selector = selector("table.per_table tr")?;

    let mut profile = Profile::default();

    for caps in sector_re.captures_iter(html) {
        let sector = caps[1].trim().to_string();
        if !sector.is_empty() && !profile.sectors.contains(&sector) {
            profile.sectors.push(sector);
        }
    }
    profile.sectors.truncate(5);

    let document = Html::parse_document(html);
    for row in document.select(&row_selector) {
        let text = row.text().collect::<Vec<_>>().join(" ");
        if text.contains("PER") && !text.contains("추정") && profile.per.is_none() {
            profile.per = capture_number(&ratio_re, &text);
            profile.eps = capture_number(&won_re, &text);
        } else if text.contains("PBR") && profile.pbr.is_none() {
            profile.pbr = capture_number(&ratio_re, &text);
            profile.bps = capture_number(&won_re, &text);
        }
    }

    profile.dividend_yield = capture_number(&dividend_re, &document.root_element().text().collect::<String>());
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
      <html><body>
        <h4 class="h_sub sub_tit7"><em><a href="/sise/sise_group_detail.naver?type=upjong&no=278">반도체와반도체장비</a></em></h4>
        <table class="per_table">
          <tr><th>PER|EPS(2023.12)</th><td><em id="_per">35.12</em>배 | <em id="_eps">2,131</em>원</td></tr>
          <tr><th>추정PER|EPS</th><td><em>14.10</em>배 | <em>5,301</em>원</td></tr>
          <tr><th>PBR|BPS (2023.12)</th><td><em id="_pbr">1.42</em>배 | <em>52,002</em>원</td></tr>
          <tr><th>배당수익률</th><td><em id="_dvr">1.94</em>%</td></tr>
        </table>
      </body></html>"#;

    #[test]
    fn parses_valuation_table() {
        let profile = parse_profile(PAGE).unwrap();
        assert_eq!(profile.sectors, vec!["반도체와반도체장비"]);
        assert_eq!(profile.per, Some(35.12));
        assert_eq!(profile.eps, Some(2131.0));
        assert_eq!(profile.pbr, Some(1.42));
        assert_eq!(profile.bps, Some(52002.0));
        assert_eq!(profile.dividend_yield, Some(1.94));
    }

    #[test]
    fn invalid_selector_is_an_upstream_error() {
        assert!(selector("table.per_table tr").is_ok());
        assert!(matches!(selector("table[[").unwrap_err(), CollectorError::Upstream(_)));
    }

    #[test]
    fn unknown_layout_yields_empty_profile() {
        let profile = parse_profile("<html><body><p>점검 중</p></body></html>").unwrap();
        assert_eq!(profile, Profile::default());
    }

    #[test]
    fn apply_keeps_existing_values_when_scrape_is_empty() {
        let mut info = SecurityInfo::new("005930", "Samsung", "KOSPI");
        info.per = Some(10.0);
        Profile::default().apply_to(&mut info);
        assert_eq!(info.per, Some(10.0));
        assert!(info.sectors.is_empty());
    }
}
