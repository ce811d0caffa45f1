// src/services/news_dedup.rs
use chrono::{DateTime, Duration, Utc};
use log::debug;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::models::NewsArticle;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_NEWS_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupOptions {
    pub months: u32,
    pub cap: usize,
    pub threshold: f64,
}

impl Default for DedupOptions {
    fn default() -> Self {
        DedupOptions {
            months: 6,
            cap: DEFAULT_NEWS_CAP,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Start of the lookback window; a month counts as 30 days.
pub fn window_start(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(months) * 30)
}

fn punctuation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("static regex"))
}

fn normalize_title(title: &str) -> Vec<char> {
    let lowered = title.to_lowercase();
    let stripped = punctuation().replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ").chars().collect()
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(row[j + 1] + 1);
        }
    }
    row[b.len()]
}

/// `1 - edit_distance / max_len` over normalized titles, in [0, 1].
/// Two titles that both normalize to nothing are identical.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_title(a), normalize_title(b));
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Newest first; ties are broken on every remaining field so the order does
/// not depend on the input order.
fn recency_order(a: &NewsArticle, b: &NewsArticle) -> Ordering {
    b.published_at
        .cmp(&a.published_at)
        .then_with(|| a.link.cmp(&b.link))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.summary.cmp(&b.summary))
}

/// Window, order, drop near-duplicate titles, cap.
///
/// # Panics
/// Panics if the similarity metric ever leaves [0, 1].
pub fn dedup_news(articles: Vec<NewsArticle>, now: DateTime<Utc>, options: &DedupOptions) -> Vec<NewsArticle> {
    let since = window_start(now, options.months);
    let raw = articles.len();

    let mut in_window: Vec<NewsArticle> = articles
        .into_iter()
        .filter(|a| a.published_at >= since && a.published_at <= now)
        .collect();
    in_window.sort_by(recency_order);

    let mut seen_links = HashSet::new();
    let mut kept: Vec<NewsArticle> = Vec::new();
    for article in in_window {
        if !seen_links.insert(article.link.clone()) {
            continue;
        }
        let duplicate = kept.iter().any(|k| {
            let score = title_similarity(&k.title, &article.title);
            assert!((0.0..=1.0).contains(&score), "similarity {} outside [0, 1]", score);
            score > options.threshold
        });
        if !duplicate {
            kept.push(article);
        }
    }
    kept.truncate(options.cap);

    debug!("News dedup: {} raw -> {} kept (window from {})", raw, kept.len(), since);
    kept
}
