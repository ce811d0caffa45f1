// src/error.rs
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::{DateRange, UnavailableReason};

/// Failure inside a single collector. Converted to `SourceResult::Unavailable`
/// at the collector boundary, or to a `FatalError` on the mandatory path.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl CollectorError {
    pub fn upstream(message: impl Into<String>) -> Self {
        CollectorError::Upstream(message.into())
    }

    pub fn reason(&self) -> UnavailableReason {
        match self {
            CollectorError::MissingCredential(_) => UnavailableReason::MissingCredential,
            CollectorError::NotFound(_) => UnavailableReason::NotFound,
            CollectorError::Request(e) if e.is_timeout() => UnavailableReason::Timeout,
            CollectorError::Request(e) if e.status().map(|s| s.as_u16()) == Some(404) => {
                UnavailableReason::NotFound
            }
            CollectorError::Request(_) | CollectorError::Upstream(_) => UnavailableReason::UpstreamError,
            CollectorError::Timeout(_) => UnavailableReason::Timeout,
        }
    }

    /// Worth another attempt on the mandatory path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.reason(),
            UnavailableReason::UpstreamError | UnavailableReason::Timeout
        )
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(e: serde_json::Error) -> Self {
        CollectorError::Upstream(format!("malformed response: {}", e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    NotFound,
    InvalidDateRange,
    UpstreamError,
    Timeout,
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            FatalKind::NotFound => "security not found",
            FatalKind::InvalidDateRange => "invalid date range",
            FatalKind::UpstreamError => "price source unreachable",
            FatalKind::Timeout => "price source timed out",
        };
        write!(f, "{}", label)
    }
}

/// The run produced no report.
#[derive(Debug, Clone, Error)]
#[error("{kind} for {code} ({range}): {detail}")]
pub struct FatalError {
    pub kind: FatalKind,
    pub code: String,
    pub range: DateRange,
    pub detail: String,
}

impl FatalError {
    pub fn new(kind: FatalKind, code: &str, range: DateRange, detail: impl Into<String>) -> Self {
        FatalError {
            kind,
            code: code.to_string(),
            range,
            detail: detail.into(),
        }
    }

    pub fn from_collector(code: &str, range: DateRange, err: &CollectorError) -> Self {
        let kind = match err.reason() {
            UnavailableReason::NotFound => FatalKind::NotFound,
            UnavailableReason::Timeout => FatalKind::Timeout,
            _ => FatalKind::UpstreamError,
        };
        FatalError::new(kind, code, range, err.to_string())
    }
}

/// A code in a batch that produced no report artifacts.
#[derive(Debug, Error)]
pub enum BatchFailure {
    #[error(transparent)]
    Run(#[from] FatalError),

    #[error("writing report for {code}: {message}")]
    Write { code: String, message: String },
}

impl BatchFailure {
    pub fn code(&self) -> &str {
        match self {
            BatchFailure::Run(e) => &e.code,
            BatchFailure::Write { code, .. } => code,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("authorization rejected: {0}")]
    Unauthorized(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rejected by service: {0}")]
    Rejected(String),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Transient(_))
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        match e.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => NotifyError::Unauthorized(e.to_string()),
            Some(code) if code < 500 => NotifyError::Rejected(e.to_string()),
            _ => NotifyError::Transient(e.to_string()),
        }
    }
}
