// src/services/collectors/openai.rs
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{check_status, http_client, AiContext, AiSource};
use crate::error::CollectorError;
use crate::models::{AiAnalysis, Sentiment};

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANALYST_ROLE: &str = "You are an equity analyst covering the Korean stock market. Answer concisely.";
const MAX_KEY_ISSUES: usize = 5;

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SentimentReply {
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    key_issues: Vec<String>,
}

/// Commentary from the chat completions API: a news summary, a sentiment
/// read, and an overall opinion.
pub struct OpenAiSource {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiSource {
    pub fn new(api_key: Option<String>, model: impl Into<String>, timeout: Duration) -> Result<Self, CollectorError> {
        Ok(OpenAiSource {
            client: http_client(timeout)?,
            api_key,
            model: model.into(),
        })
    }

    async fn complete(&self, key: &str, system: &str, prompt: String, max_tokens: u32, temperature: f64) -> Result<String, CollectorError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let response = self.client.post(COMPLETIONS_URL).bearer_auth(key).json(&body).send().await?;
        let reply: CompletionResponse = check_status(response, "OpenAI")?.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CollectorError::upstream("OpenAI returned an empty completion"))
    }
}

#[async_trait]
impl AiSource for OpenAiSource {
    async fn analyze(&self, context: &AiContext) -> Result<AiAnalysis, CollectorError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CollectorError::MissingCredential("OPENAI_API_KEY is not set".to_string()))?;
        let name = &context.security.name;
        info!("Requesting AI commentary for {} ({} articles)", name, context.articles.len());

        let summary = self.complete(key, ANALYST_ROLE, summary_prompt(context), 500, 0.3).await?;

        let sentiment_system = format!("{} Reply with JSON only.", ANALYST_ROLE);
        let sentiment = match self.complete(key, &sentiment_system, sentiment_prompt(context), 300, 0.2).await {
            Ok(raw) => parse_sentiment(&raw),
            Err(e) => {
                warn!("Sentiment request for {} failed, treating as neutral: {}", name, e);
                SentimentReply::default()
            }
        };

        let opinion = self.complete(key, ANALYST_ROLE, opinion_prompt(context, &summary), 700, 0.5).await?;

        let mut key_issues = sentiment.key_issues;
        key_issues.truncate(MAX_KEY_ISSUES);
        Ok(AiAnalysis {
            news_summary: summary,
            sentiment: Sentiment::parse(&sentiment.sentiment),
            sentiment_score: sentiment.score.clamp(-1.0, 1.0),
            key_issues,
            overall_opinion: opinion,
        })
    }
}

fn headlines(context: &AiContext, with_source: bool) -> String {
    context
        .articles
        .iter()
        .take(10)
        .map(|a| {
            if with_source {
                format!("- [{}] {}", a.source, a.title)
            } else {
                format!("- {}", a.title)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn summary_prompt(context: &AiContext) -> String {
    format!(
        "Recent headlines about {}:\n{}\n\nSummarize the key points in 3-4 sentences from an investor's point of view.",
        context.security.name,
        headlines(context, true)
    )
}

fn sentiment_prompt(context: &AiContext) -> String {
    format!(
        "Recent headlines about {}:\n{}\n\nRate the overall sentiment. Respond as JSON: \
         {{\"sentiment\": \"POSITIVE\" | \"NEGATIVE\" | \"NEUTRAL\", \"score\": <-1.0 to 1.0>, \
         \"key_issues\": [up to 5 short strings]}}",
        context.security.name,
        headlines(context, false)
    )
}

fn opinion_prompt(context: &AiContext, summary: &str) -> String {
    let price = match &context.latest_price {
        Some(bar) => format!("- Close: {:.0} KRW\n- Change: {:+.2}%", bar.close, bar.change_rate),
        None => "- No recent price".to_string(),
    };
    let signals = if context.signals.is_empty() {
        "- No signals".to_string()
    } else {
        context
            .signals
            .iter()
            .rev()
            .take(10)
            .map(|s| format!("- {}: {} ({})", s.indicator, s.action, s.reason))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let financials = context
        .financials
        .iter()
        .take(2)
        .map(|f| {
            format!(
                "- {}: revenue {}, operating income {}",
                f.year,
                f.revenue.map_or("N/A".to_string(), |v| format!("{:.0}", v)),
                f.operating_income.map_or("N/A".to_string(), |v| format!("{:.0}", v)),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analysis data for {}.\n\n## Latest price\n{}\n\n## Technical signals\n{}\n\n## Financials\n{}\n\n\
         ## News summary\n{}\n\nWrite a 4-5 sentence overall view. State that this is information only, \
         not investment advice, and that decisions are the reader's own.",
        context.security.name, price, signals, financials, summary
    )
}

/// Accepts bare JSON or JSON wrapped in a Markdown code fence.
fn parse_sentiment(raw: &str) -> SentimentReply {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let body = body.strip_suffix("```").unwrap_or(body).trim();

    serde_json::from_str(body).unwrap_or_else(|e| {
        warn!("Unparseable sentiment reply ({}): {:?}", e, raw);
        SentimentReply::default()
    })
}
