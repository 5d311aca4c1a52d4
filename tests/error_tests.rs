// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error-to-response mapping tests.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use chrono::TimeZone;
use reqwest::header::{HeaderMap, HeaderValue};
use srg_backend::db::StoreError;
use srg_backend::error::{AppError, KeyFailure, RateLimitInfo};
use srg_backend::services::strava::rate_limit_from_headers;

mod common;
use common::body_json;

#[tokio::test]
async fn test_rate_limited_sets_retry_after() {
    let err = AppError::RateLimited(RateLimitInfo {
        limit: Some("200,2000".to_string()),
        usage: Some("201,540".to_string()),
        retry_after_secs: 450,
    });
    assert!(err.is_retryable());

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "450");

    let body = body_json(response).await;
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["rate_limit"]["retry_after_secs"], 450);
}

#[test]
fn test_rate_limit_window_from_headers() {
    let mut headers = HeaderMap::new();
    headers.insert("X-RateLimit-Limit", HeaderValue::from_static("100,1000"));
    headers.insert("X-RateLimit-Usage", HeaderValue::from_static("100,312"));
    let now = chrono::Utc.with_ymd_and_hms(2025, 1, 1, 10, 14, 0).unwrap();

    let info = rate_limit_from_headers(&headers, now);
    assert_eq!(info.retry_after_secs, 60);
    assert_eq!(info.usage.as_deref(), Some("100,312"));
}

#[tokio::test]
async fn test_status_mapping() {
    let cases = [
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (AppError::UpstreamAuth("invalid_grant".into()), StatusCode::UNAUTHORIZED),
        (AppError::UpstreamTimeout, StatusCode::GATEWAY_TIMEOUT),
        (AppError::StravaApi("500".into()), StatusCode::BAD_GATEWAY),
        (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
        (
            AppError::Store(StoreError::NotFound("a_1".into())),
            StatusCode::NOT_FOUND,
        ),
        (
            AppError::Store(StoreError::Backend("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, status) in cases {
        let kind = err.kind();
        let response = err.into_response();
        assert_eq!(response.status(), status, "{kind}");
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}

#[tokio::test]
async fn test_partial_batch_failure_lists_counts() {
    let err = AppError::PartialBatchFailure {
        attempted: 10,
        failures: vec![KeyFailure {
            key: "42".to_string(),
            error: StoreError::Backend("unavailable".to_string()),
        }],
    };
    assert!(err.is_retryable());

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "partial_batch_failure");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .starts_with("1 of 10 operations failed"));
}

#[test]
fn test_upstream_auth_is_not_retryable() {
    assert!(!AppError::UpstreamAuth("revoked".into()).is_retryable());
    assert!(!AppError::Unauthorized.is_retryable());
}
