// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::db::StoreError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Upstream throttling context, enough for a caller to back off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    /// Raw `X-RateLimit-Limit` header ("short,daily")
    pub limit: Option<String>,
    /// Raw `X-RateLimit-Usage` header ("short,daily")
    pub usage: Option<String>,
    /// Seconds until the short-term window resets
    pub retry_after_secs: u64,
}

/// One key that failed inside a fanned-out batch.
#[derive(Debug, Clone)]
pub struct KeyFailure {
    pub key: String,
    pub error: StoreError,
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Strava rejected a token exchange, refresh, or access token.
    /// Requires re-authentication, never retried automatically.
    #[error("Strava authorization rejected: {0}")]
    UpstreamAuth(String),

    #[error("Strava rate limit exceeded, retry in {}s", .0.retry_after_secs)]
    RateLimited(RateLimitInfo),

    #[error("Strava request timed out")]
    UpstreamTimeout,

    #[error("Strava API error: {0}")]
    StravaApi(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{} of {} operations failed; first error: {}", .failures.len(), .attempted, first_failure(.failures))]
    PartialBatchFailure {
        attempted: usize,
        failures: Vec<KeyFailure>,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn first_failure(failures: &[KeyFailure]) -> String {
    failures
        .first()
        .map(|f| format!("{}: {}", f.key, f.error))
        .unwrap_or_default()
}

impl AppError {
    /// Machine-readable kind used in the JSON body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::UpstreamAuth(_) => "upstream_auth",
            AppError::RateLimited(_) => "rate_limited",
            AppError::UpstreamTimeout => "upstream_timeout",
            AppError::StravaApi(_) => "strava_error",
            AppError::Store(StoreError::NotFound(_)) => "not_found",
            AppError::Store(_) => "store_error",
            AppError::PartialBatchFailure { .. } => "partial_batch_failure",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited(_) | AppError::UpstreamTimeout | AppError::PartialBatchFailure { .. }
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limit: Option<RateLimitInfo>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let mut rate_limit = None;

        let (status, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Some(msg.clone())),
            AppError::UpstreamAuth(msg) => {
                tracing::warn!(error = %msg, "Strava authorization rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    Some("Strava authorization expired, please reconnect".to_string()),
                )
            }
            AppError::RateLimited(info) => {
                rate_limit = Some(info.clone());
                (StatusCode::TOO_MANY_REQUESTS, Some(self.to_string()))
            }
            AppError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, Some(self.to_string())),
            AppError::StravaApi(msg) => (StatusCode::BAD_GATEWAY, Some(msg.clone())),
            AppError::Store(StoreError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, Some(msg.clone()))
            }
            AppError::Store(err) => {
                tracing::error!(error = %err, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::PartialBatchFailure { .. } => {
                tracing::error!(error = %self, "Batch partially failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Some(self.to_string()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let retry_after = rate_limit.as_ref().map(|info| info.retry_after_secs);

        let body = ErrorResponse {
            error: kind.to_string(),
            details,
            rate_limit,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
