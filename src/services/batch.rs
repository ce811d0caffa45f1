// src/services/batch.rs
use anyhow::Result;
use chrono::Utc;
use chrono_tz::Asia::Seoul;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use super::delivery::github::GitHubUploader;
use super::delivery::kakao::KakaoNotifier;
use super::delivery::{send_with_retry, Notification};
use super::orchestrator::{Collectors, Orchestrator, OrchestratorOptions};
use super::report::{batch_date, cleanup_old_reports, merge_markdown, merged_file_name, write_artifacts, ReportArtifacts};
use crate::config::Settings;
use crate::error::BatchFailure;
use crate::models::{DateRange, FeatureToggles, ReportData};

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub codes: Vec<String>,
    pub range: DateRange,
    pub toggles: FeatureToggles,
    pub output_dir: PathBuf,
    /// Markdown reports kept in `output_dir`; 0 disables pruning.
    pub max_reports: usize,
    /// Upload the document and send a KakaoTalk message.
    pub deliver: bool,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub reports: Vec<(ReportData, ReportArtifacts)>,
    pub failures: Vec<BatchFailure>,
    /// The merged document, or the single report's Markdown.
    pub document: Option<PathBuf>,
    pub link: Option<String>,
    pub notified: bool,
}

/// Runs one independent report per code, then merges, prunes and delivers.
/// A failed code is recorded and does not stop the others.
pub async fn run_batch(
    settings: &Settings,
    collectors: &Collectors,
    options: &OrchestratorOptions,
    request: &BatchRequest,
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();

    for code in &request.codes {
        let orchestrator = Orchestrator::new(collectors.clone(), options.clone());
        match orchestrator.run(code, request.range, request.toggles).await {
            Ok(report) => match write_artifacts(&report, &request.output_dir) {
                Ok(artifacts) => outcome.reports.push((report, artifacts)),
                Err(e) => {
                    error!("Could not write report for {}: {:#}", code, e);
                    outcome.failures.push(BatchFailure::Write {
                        code: code.clone(),
                        message: format!("{:#}", e),
                    });
                }
            },
            Err(e) => {
                error!("Skipping {}: {}", code, e);
                outcome.failures.push(e.into());
            }
        }
    }
    info!(
        "Batch finished: {} reports, {} failures",
        outcome.reports.len(),
        outcome.failures.len()
    );

    outcome.document = match outcome.reports.as_slice() {
        [] => None,
        [(_, single)] => Some(single.markdown.clone()),
        many => {
            let parts: Vec<PathBuf> = many.iter().map(|(_, a)| a.markdown.clone()).collect();
            let reports: Vec<ReportData> = many.iter().map(|(r, _)| r.clone()).collect();
            let date = batch_date(&reports).unwrap_or_else(|| Utc::now().with_timezone(&Seoul).date_naive());
            let output = request.output_dir.join(merged_file_name(date));
            Some(merge_markdown(&parts, &output, true)?)
        }
    };

    if request.max_reports > 0 && request.output_dir.is_dir() {
        cleanup_old_reports(&request.output_dir, request.max_reports)?;
    }

    if request.deliver {
        if let Some(document) = outcome.document.clone() {
            let subject = match outcome.reports.as_slice() {
                [(report, _)] => report.security_info.name.clone(),
                many => format!("{} stocks", many.len()),
            };
            let (link, notified) = deliver(settings, &document, &subject).await;
            outcome.link = link;
            outcome.notified = notified;
        } else {
            warn!("Nothing to deliver: no report was produced");
        }
    }

    Ok(outcome)
}

/// Uploads `document` when GitHub is configured, then notifies through
/// KakaoTalk. Delivery failures are logged, never fatal.
pub async fn deliver(settings: &Settings, document: &Path, subject: &str) -> (Option<String>, bool) {
    let link = if settings.has_github() {
        let uploaded = match GitHubUploader::new(
            settings.github_token.clone(),
            settings.github_repository.clone(),
            settings.github_branch.clone(),
        ) {
            Ok(uploader) => uploader.upload(document).await,
            Err(e) => Err(e),
        };
        match uploaded {
            Ok(link) => {
                info!("Uploaded {} -> {}", document.display(), link);
                Some(link)
            }
            Err(e) => {
                error!("Upload of {} failed: {}", document.display(), e);
                None
            }
        }
    } else {
        warn!("GitHub upload not configured; notification will carry no link");
        None
    };

    if !settings.has_kakao() {
        warn!("KakaoTalk not configured; skipping notification");
        return (link, false);
    }

    let name = document
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let notification = Notification {
        title: format!("{} analysis report", subject),
        description: format!("{} is ready.", name),
        link_url: link.clone(),
    };

    let notifier = match KakaoNotifier::new(
        settings.kakao_rest_api_key.clone(),
        settings.kakao_access_token.clone(),
        settings.kakao_refresh_token.clone(),
    ) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("Could not set up KakaoTalk client: {}", e);
            return (link, false);
        }
    };
    match send_with_retry(&notifier, &notification).await {
        Ok(()) => (link, true),
        Err(e) => {
            error!("KakaoTalk notification failed: {}", e);
            (link, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn delivery_without_credentials_is_a_no_op() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("005930_1m_20240603.md");
        std::fs::write(&doc, "# report").unwrap();

        let (link, notified) = deliver(&Settings::default(), &doc, "Samsung").await;
        assert!(link.is_none());
        assert!(!notified);
    }
}
