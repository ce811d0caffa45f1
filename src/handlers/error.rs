// src/handlers/error.rs
use std::fmt;
use warp::http::StatusCode;
use warp::reject::Reject;

use crate::error::{FatalError, FatalKind};

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<FatalError> for ApiError {
    fn from(err: FatalError) -> Self {
        let status = match err.kind {
            FatalKind::NotFound => StatusCode::NOT_FOUND,
            FatalKind::InvalidDateRange => StatusCode::BAD_REQUEST,
            FatalKind::UpstreamError => StatusCode::BAD_GATEWAY,
            FatalKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };
        ApiError::new(status, err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}
impl Reject for ApiError {}
