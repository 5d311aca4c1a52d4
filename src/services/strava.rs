// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client.
//!
//! Handles:
//! - OAuth code exchange, token refresh and deauthorization
//! - Paginated activity listing and detailed activity fetches
//! - Activity edits (name, description, gear)
//! - Rate limit detection (surfaced as `AppError::RateLimited`)

use crate::error::{AppError, RateLimitInfo};
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";
const STRAVA_OAUTH_BASE: &str = "https://www.strava.com/oauth";

/// Strava resets its short-term rate limit window every 15 minutes.
const RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

/// Upstream operations the core consumes.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Exchange an authorization code for the athlete's first token pair.
    async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, AppError>;

    /// Mint a new token pair from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, AppError>;

    /// One page of the athlete's activities (1-indexed).
    async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivity>, AppError>;

    /// Full activity including efforts, laps and photos.
    async fn get_activity_detail(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError>;

    /// Apply user edits upstream, returning the updated activity.
    async fn update_activity(
        &self,
        access_token: &str,
        activity_id: u64,
        changes: &ActivityChanges,
    ) -> Result<StravaActivity, AppError>;

    /// Revoke every token issued to this application for the athlete.
    async fn deauthorize(&self, access_token: &str) -> Result<(), AppError>;
}

pub type SharedUpstream = Arc<dyn UpstreamClient>;

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client with OAuth credentials and a per-call timeout.
    pub fn new(
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            api_base: STRAVA_API_BASE.to_string(),
            oauth_base: STRAVA_OAUTH_BASE.to_string(),
            client_id,
            client_secret,
        })
    }

    /// Point the client at a different host (local fakes, proxies).
    pub fn with_base_urls(mut self, api_base: &str, oauth_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.oauth_base = oauth_base.trim_end_matches('/').to_string();
        self
    }

    /// POST to the token endpoint; 400/401 mean the grant was rejected.
    async fn token_request<T: for<'de> Deserialize<'de>>(
        &self,
        form: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_base))
            .form(form)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Strava rejected token grant");
            return Err(AppError::UpstreamAuth(format!(
                "token grant rejected ({}): {}",
                status, body
            )));
        }

        check_response_json(response).await
    }
}

#[async_trait]
impl UpstreamClient for StravaClient {
    async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, AppError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, AppError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivity>, AppError> {
        let response = self
            .http
            .get(format!("{}/athlete/activities", self.api_base))
            .bearer_auth(access_token)
            .query(&[("page", page.to_string()), ("per_page", per_page.to_string())])
            .send()
            .await
            .map_err(send_error)?;

        check_response_json(response).await
    }

    async fn get_activity_detail(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        let response = self
            .http
            .get(format!("{}/activities/{}", self.api_base, activity_id))
            .bearer_auth(access_token)
            .query(&[("include_all_efforts", "true")])
            .send()
            .await
            .map_err(send_error)?;

        check_response_json(response).await
    }

    async fn update_activity(
        &self,
        access_token: &str,
        activity_id: u64,
        changes: &ActivityChanges,
    ) -> Result<StravaActivity, AppError> {
        let response = self
            .http
            .put(format!("{}/activities/{}", self.api_base, activity_id))
            .bearer_auth(access_token)
            .json(changes)
            .send()
            .await
            .map_err(send_error)?;

        check_response_json(response).await
    }

    async fn deauthorize(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/deauthorize", self.oauth_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(send_error)?;

        check_response(response).await?;
        tracing::info!("Strava deauthorization successful");
        Ok(())
    }
}

/// Map a transport failure; timeouts are retryable by the caller.
fn send_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        tracing::warn!(error = %e, "Strava request timed out");
        AppError::UpstreamTimeout
    } else {
        AppError::StravaApi(e.to_string())
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let info = rate_limit_from_headers(response.headers(), Utc::now());
        tracing::warn!(
            limit = ?info.limit,
            usage = ?info.usage,
            retry_after_secs = info.retry_after_secs,
            "Strava rate limit hit (429)"
        );
        return Err(AppError::RateLimited(info));
    }

    let body = response.text().await.unwrap_or_default();

    if status.as_u16() == 401 {
        return Err(AppError::UpstreamAuth(format!(
            "access token rejected: {}",
            body
        )));
    }

    if status.as_u16() == 404 {
        return Err(AppError::NotFound("Strava resource".to_string()));
    }

    Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)))
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    check_response(response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
}

/// Extract Strava's rate limit headers.
///
/// `X-RateLimit-Limit` and `X-RateLimit-Usage` carry "short,daily" pairs.
/// The short window resets on the quarter hour, which is when a caller
/// should retry.
pub fn rate_limit_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> RateLimitInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    let elapsed_in_window = (u64::from(now.minute()) * 60 + u64::from(now.second()))
        % RATE_LIMIT_WINDOW_SECS;

    RateLimitInfo {
        limit: header("x-ratelimit-limit"),
        usage: header("x-ratelimit-usage"),
        retry_after_secs: RATE_LIMIT_WINDOW_SECS - elapsed_in_window,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Token exchange response from Strava OAuth (includes athlete info).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub athlete: StravaAthlete,
}

/// Athlete info from OAuth token exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaAthlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
}

/// Strava activity, summary or detailed representation.
///
/// Detail-only fields (`description`, efforts, laps, photos) are absent on
/// list responses.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sport_type: String,
    #[serde(default)]
    pub workout_type: Option<u32>,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub moving_time: u64,
    #[serde(default)]
    pub elapsed_time: u64,
    #[serde(default)]
    pub total_elevation_gain: f64,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub start_date_local: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub location_city: Option<String>,
    #[serde(default)]
    pub location_state: Option<String>,
    #[serde(default)]
    pub location_country: Option<String>,
    #[serde(default)]
    pub average_speed: f64,
    #[serde(default)]
    pub max_speed: f64,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    #[serde(default)]
    pub achievement_count: u32,
    #[serde(default)]
    pub kudos_count: u32,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub athlete_count: u32,
    #[serde(default)]
    pub photo_count: u32,
    #[serde(default)]
    pub pr_count: u32,
    #[serde(default)]
    pub trainer: bool,
    #[serde(default)]
    pub commute: bool,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub gear_id: Option<String>,
    #[serde(default)]
    pub map: Option<StravaMap>,

    // Detail-only
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub segment_efforts: Option<serde_json::Value>,
    #[serde(default)]
    pub best_efforts: Option<serde_json::Value>,
    #[serde(default)]
    pub laps: Option<serde_json::Value>,
    #[serde(default)]
    pub photos: Option<serde_json::Value>,
}

/// Activity map data with polylines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaMap {
    #[serde(default)]
    pub polyline: Option<String>,
    #[serde(default)]
    pub summary_polyline: Option<String>,
}

/// Body of an activity update (`PUT /activities/{id}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivityChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `"none"` clears the gear assignment upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gear_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_rate_limit_headers_and_retry_window() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Limit", HeaderValue::from_static("200,2000"));
        headers.insert("X-RateLimit-Usage", HeaderValue::from_static("201,540"));

        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 7, 30).unwrap();
        let info = rate_limit_from_headers(&headers, now);

        assert_eq!(info.limit.as_deref(), Some("200,2000"));
        assert_eq!(info.usage.as_deref(), Some("201,540"));
        // 10:07:30 -> next window opens at 10:15:00
        assert_eq!(info.retry_after_secs, 450);
    }

    #[test]
    fn test_rate_limit_without_headers() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 15, 0).unwrap();
        let info = rate_limit_from_headers(&HeaderMap::new(), now);

        assert_eq!(info.limit, None);
        assert_eq!(info.retry_after_secs, RATE_LIMIT_WINDOW_SECS);
    }

    #[test]
    fn test_activity_changes_skip_unset_fields() {
        let changes = ActivityChanges {
            name: Some("Lunch Ride".to_string()),
            ..Default::default()
        };
        let body = serde_json::to_value(&changes).unwrap();
        assert_eq!(body, serde_json::json!({ "name": "Lunch Ride" }));
    }

    #[test]
    fn test_summary_activity_parses_with_missing_detail_fields() {
        let activity: StravaActivity = serde_json::from_value(serde_json::json!({
            "id": 10295631901u64,
            "name": "Morning Swim",
            "distance": 1897.4,
            "moving_time": 2522,
            "sport_type": "Swim",
            "map": { "id": "a10295631901", "summary_polyline": "" }
        }))
        .unwrap();

        assert_eq!(activity.id, 10295631901);
        assert!(activity.description.is_none());
        assert!(activity.segment_efforts.is_none());
    }

    #[test]
    fn test_client_base_url_override() {
        let client = StravaClient::new(
            "id".to_string(),
            "secret".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_urls("http://127.0.0.1:9000/api/v3/", "http://127.0.0.1:9000/oauth");

        assert_eq!(client.api_base, "http://127.0.0.1:9000/api/v3");
        assert_eq!(client.oauth_base, "http://127.0.0.1:9000/oauth");
    }
}
