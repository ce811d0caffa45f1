// src/services/collectors/naver_news.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use scraper::Html;
use serde::Deserialize;
use std::time::Duration;

use super::{check_status, http_client, NewsSource};
use crate::error::CollectorError;
use crate::models::NewsArticle;

const SEARCH_URL: &str = "https://openapi.naver.com/v1/search/news.json";
const PAGE_SIZE: usize = 100;
/// The search API refuses `start` beyond this.
const MAX_START: usize = 1000;

const PUBLISHERS: [(&str, &str); 21] = [
    ("n.news.naver.com", "네이버뉴스"),
    ("news.naver.com", "네이버뉴스"),
    ("chosun.com", "조선일보"),
    ("donga.com", "동아일보"),
    ("joongang.co.kr", "중앙일보"),
    ("hani.co.kr", "한겨레"),
    ("khan.co.kr", "경향신문"),
    ("mk.co.kr", "매일경제"),
    ("hankyung.com", "한국경제"),
    ("sedaily.com", "서울경제"),
    ("fnnews.com", "파이낸셜뉴스"),
    ("edaily.co.kr", "이데일리"),
    ("mt.co.kr", "머니투데이"),
    ("etnews.com", "전자신문"),
    ("zdnet.co.kr", "지디넷코리아"),
    ("bloter.net", "블로터"),
    ("yonhapnews.co.kr", "연합뉴스"),
    ("yna.co.kr", "연합뉴스"),
    ("news.sbs.co.kr", "SBS"),
    ("news.kbs.co.kr", "KBS"),
    ("imnews.imbc.com", "MBC"),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    originallink: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    pub_date: String,
}

pub struct NaverNewsSource {
    client: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl NaverNewsSource {
    pub fn new(client_id: Option<String>, client_secret: Option<String>, timeout: Duration) -> Result<Self, CollectorError> {
        Ok(NaverNewsSource {
            client: http_client(timeout)?,
            client_id,
            client_secret,
        })
    }

    async fn page(&self, id: &str, secret: &str, keyword: &str, start: usize) -> Result<Vec<SearchItem>, CollectorError> {
        let response = self
            .client
            .get(SEARCH_URL)
            .header("X-Naver-Client-Id", id)
            .header("X-Naver-Client-Secret", secret)
            .query(&[
                ("query", keyword.to_string()),
                ("display", PAGE_SIZE.to_string()),
                ("start", start.to_string()),
                ("sort", "date".to_string()),
            ])
            .send()
            .await?;
        let body: SearchResponse = check_status(response, "Naver news search")?.json().await?;
        Ok(body.items)
    }
}

#[async_trait]
impl NewsSource for NaverNewsSource {
    async fn search(
        &self,
        keyword: &str,
        since: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<NewsArticle>, CollectorError> {
        let (Some(id), Some(secret)) = (self.client_id.as_deref(), self.client_secret.as_deref()) else {
            return Err(CollectorError::MissingCredential(
                "NAVER_CLIENT_ID / NAVER_CLIENT_SECRET are not set".to_string(),
            ));
        };

        let mut articles = Vec::new();
        let mut start = 1;
        'pages: while articles.len() < max_results && start <= MAX_START {
            let items = self.page(id, secret, keyword, start).await?;
            let fetched = items.len();
            debug!("Naver news page at {} returned {} items", start, fetched);

            for item in items {
                let Some(article) = article_from_item(item) else {
                    continue;
                };
                // results are newest first
                if article.published_at < since {
                    break 'pages;
                }
                articles.push(article);
                if articles.len() >= max_results {
                    break 'pages;
                }
            }
            if fetched < PAGE_SIZE {
                break;
            }
            start += PAGE_SIZE;
        }

        info!("Collected {} news articles for {:?}", articles.len(), keyword);
        Ok(articles)
    }
}

/// Strips tags and decodes entities, collapsing whitespace.
pub fn clean_html(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn publisher_for(link: &str) -> String {
    let host = link
        .split("://")
        .nth(1)
        .unwrap_or(link)
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if let Some((_, name)) = PUBLISHERS.iter().find(|(domain, _)| host.contains(domain)) {
        return name.to_string();
    }
    host.trim_start_matches("www.")
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn article_from_item(item: SearchItem) -> Option<NewsArticle> {
    let title = clean_html(&item.title);
    if title.is_empty() {
        return None;
    }
    let published_at = match DateTime::parse_from_rfc2822(item.pub_date.trim()) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            warn!("Skipping article with unparseable date {:?}: {}", item.pub_date, e);
            return None;
        }
    };
    let link = if item.originallink.is_empty() { item.link } else { item.originallink };
    let summary = clean_html(&item.description);

    Some(NewsArticle {
        source: publisher_for(&link),
        title,
        link,
        published_at,
        summary: (!summary.is_empty()).then_some(summary),
    })
}
