// src/services/delivery/mod.rs
pub mod github;
pub mod kakao;

use async_trait::async_trait;
use log::warn;
use serde::Serialize;

use crate::error::NotifyError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub link_url: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// One more attempt after a transient failure; anything else is final.
pub async fn send_with_retry(notifier: &dyn Notifier, notification: &Notification) -> Result<(), NotifyError> {
    match notifier.notify(notification).await {
        Err(e) if e.is_transient() => {
            warn!("Notification failed ({}), retrying once", e);
            notifier.notify(notification).await
        }
        other => other,
    }
}

/// Maps an HTTP status from a delivery endpoint onto `NotifyError`.
pub(crate) fn status_error(service: &str, status: reqwest::StatusCode, body: &str) -> NotifyError {
    let detail = format!("{} returned {}: {}", service, status, body.chars().take(200).collect::<String>());
    match status.as_u16() {
        401 | 403 => NotifyError::Unauthorized(detail),
        408 | 429 => NotifyError::Transient(detail),
        s if s >= 500 => NotifyError::Transient(detail),
        _ => NotifyError::Rejected(detail),
    }
}
