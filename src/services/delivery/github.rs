// src/services/delivery/github.rs
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::info;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use super::status_error;
use crate::error::NotifyError;

const API_BASE: &str = "https://api.github.com";
const REPORTS_DIR: &str = "reports";

#[derive(Debug, Deserialize)]
struct ContentEntry {
    sha: String,
}

/// Publishes report documents to `reports/` in a GitHub repository through
/// the contents API.
pub struct GitHubUploader {
    client: Client,
    token: String,
    repository: String,
    branch: String,
}

impl GitHubUploader {
    pub fn new(token: Option<String>, repository: Option<String>, branch: impl Into<String>) -> Result<Self, NotifyError> {
        let token = token.ok_or_else(|| NotifyError::MissingCredential("GITHUB_TOKEN is not set".to_string()))?;
        let repository = repository
            .filter(|r| r.split('/').count() == 2)
            .ok_or_else(|| NotifyError::MissingCredential("GITHUB_REPOSITORY must be owner/repo".to_string()))?;
        let client = Client::builder()
            .user_agent("stock-report-uploader")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotifyError::Transient(e.to_string()))?;
        Ok(GitHubUploader {
            client,
            token,
            repository,
            branch: branch.into(),
        })
    }

    fn contents_url(&self, name: &str) -> String {
        format!("{}/repos/{}/contents/{}/{}", API_BASE, self.repository, REPORTS_DIR, name)
    }

    /// Browser link for an uploaded report.
    pub fn link_for(&self, name: &str) -> String {
        format!("https://github.com/{}/blob/{}/{}/{}", self.repository, self.branch, REPORTS_DIR, name)
    }

    /// Blob sha of an existing file, needed to overwrite it.
    async fn existing_sha(&self, name: &str) -> Result<Option<String>, NotifyError> {
        let response = self
            .client
            .get(self.contents_url(name))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json::<ContentEntry>().await?.sha)),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error("GitHub contents", s, &body))
            }
        }
    }

    /// Creates or replaces `reports/{file name}` and returns its browser link.
    pub async fn upload(&self, path: &Path) -> Result<String, NotifyError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| NotifyError::Rejected(format!("{} has no usable file name", path.display())))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| NotifyError::Rejected(format!("reading {}: {}", path.display(), e)))?;

        let sha = self.existing_sha(name).await?;
        let mut body = json!({
            "message": format!("Add report {}", name),
            "content": STANDARD.encode(&bytes),
            "branch": self.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        info!("Uploading {} to {}", name, self.repository);
        let response = self
            .client
            .put(self.contents_url(name))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("GitHub upload", status, &text));
        }
        Ok(self.link_for(name))
    }
}
