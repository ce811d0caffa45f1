// src/services/delivery/kakao.rs
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{status_error, Notification, Notifier};
use crate::error::NotifyError;

const TOKEN_URL: &str = "https://kauth.kakao.com/oauth/token";
const SEND_ME_URL: &str = "https://kapi.kakao.com/v2/api/talk/memo/default/send";
const FALLBACK_LINK: &str = "https://github.com";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    result_code: i64,
}

#[derive(Debug, Default)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

/// KakaoTalk "send to me" feed messages. An expired access token is
/// refreshed once per send.
pub struct KakaoNotifier {
    client: Client,
    rest_api_key: Option<String>,
    tokens: Mutex<Tokens>,
}

impl KakaoNotifier {
    pub fn new(
        rest_api_key: Option<String>,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transient(e.to_string()))?;
        Ok(KakaoNotifier {
            client,
            rest_api_key,
            tokens: Mutex::new(Tokens {
                access: access_token,
                refresh: refresh_token,
            }),
        })
    }

    async fn refresh(&self) -> Result<String, NotifyError> {
        let key = self
            .rest_api_key
            .clone()
            .ok_or_else(|| NotifyError::MissingCredential("KAKAO_REST_API_KEY is not set".to_string()))?;
        let mut tokens = self.tokens.lock().await;
        let refresh = tokens
            .refresh
            .clone()
            .ok_or_else(|| NotifyError::Unauthorized("no Kakao refresh token available".to_string()))?;

        info!("Refreshing Kakao access token");
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", key.as_str()),
                ("refresh_token", refresh.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // a rejected refresh token means the user has to authorize again
            return Err(match status_error("Kakao token endpoint", status, &body) {
                NotifyError::Rejected(detail) => NotifyError::Unauthorized(detail),
                other => other,
            });
        }

        let token: TokenResponse = response.json().await?;
        tokens.access = Some(token.access_token.clone());
        if let Some(rotated) = token.refresh_token {
            tokens.refresh = Some(rotated);
        }
        Ok(token.access_token)
    }

    async fn send(&self, access_token: &str, notification: &Notification) -> Result<(), NotifyError> {
        let template = feed_template(notification);
        let response = self
            .client
            .post(SEND_ME_URL)
            .bearer_auth(access_token)
            .form(&[("template_object", template.to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Kakao send", status, &body));
        }
        let reply: SendResponse = response.json().await?;
        if reply.result_code != 0 {
            return Err(NotifyError::Rejected(format!("Kakao result_code {}", reply.result_code)));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for KakaoNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let current = self.tokens.lock().await.access.clone();
        let access = match current {
            Some(token) => token,
            None => self.refresh().await?,
        };

        let sent = match self.send(&access, notification).await {
            Err(NotifyError::Unauthorized(detail)) => {
                warn!("Kakao rejected the access token ({}), refreshing", detail);
                let access = self.refresh().await?;
                self.send(&access, notification).await
            }
            other => other,
        };
        sent?;
        info!("Sent Kakao notification: {}", notification.title);
        Ok(())
    }
}

pub fn feed_template(notification: &Notification) -> Value {
    let link = notification.link_url.as_deref().unwrap_or(FALLBACK_LINK);
    let mut template = json!({
        "object_type": "feed",
        "content": {
            "title": notification.title,
            "description": notification.description,
            "image_url": "https://via.placeholder.com/800x400/2962FF/FFFFFF?text=Stock+Report",
            "link": {"web_url": link, "mobile_web_url": link},
        },
    });
    if notification.link_url.is_some() {
        template["buttons"] = json!([
            {"title": "View report", "link": {"web_url": link, "mobile_web_url": link}}
        ]);
    }
    template
}
