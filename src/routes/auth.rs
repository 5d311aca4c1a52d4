// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth authentication routes.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, removal_cookie, session_cookie};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// How long a signed OAuth state stays acceptable.
const STATE_MAX_AGE_MS: i64 = 10 * 60 * 1000;

/// Tolerated clock difference between the instance that signed and the one
/// that verifies.
const STATE_CLOCK_SKEW_MS: i64 = 60 * 1000;

/// Scopes needed to read private activities and write edits back.
const STRAVA_SCOPES: &str = "read,activity:read_all,activity:write";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/strava", get(auth_start))
        .route("/auth/strava/callback", get(auth_callback))
        .route("/auth/logout", get(logout).post(logout))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// Only the configured frontend or localhost are honoured.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start OAuth flow - redirect to Strava authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    headers: HeaderMap,
) -> Result<Redirect> {
    let frontend_url = params
        .redirect_uri
        .filter(|uri| is_allowed_frontend(uri, &state.config.frontend_url))
        .unwrap_or_else(|| state.config.frontend_url.clone());

    let oauth_state = sign_state(
        &frontend_url,
        chrono::Utc::now().timestamp_millis(),
        &state.config.oauth_state_key,
    )?;

    let callback_url = format!("{}/auth/strava/callback", request_origin(&headers));

    let auth_url = format!(
        "https://www.strava.com/oauth/authorize?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         approval_prompt=auto&\
         scope={}&\
         state={}",
        state.config.strava_client_id,
        urlencoding::encode(&callback_url),
        STRAVA_SCOPES,
        oauth_state
    );

    tracing::info!(
        client_id = %state.config.strava_client_id,
        frontend_url = %frontend_url,
        "Starting OAuth flow, redirecting to Strava"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, create session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    let frontend_url = verify_and_decode_state(
        &params.state,
        &state.config.oauth_state_key,
        chrono::Utc::now().timestamp_millis(),
    )
    .ok_or_else(|| {
        tracing::warn!("Invalid, expired or tampered OAuth state parameter");
        AppError::BadRequest("Invalid OAuth state".to_string())
    })?;

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Strava");
        let redirect = format!(
            "{}/callback?error={}",
            frontend_url,
            urlencoding::encode(&error)
        );
        return Ok((jar, Redirect::temporary(&redirect)));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    tracing::info!("Exchanging authorization code for tokens");
    let athlete = state.tokens.complete_authorization(&code).await?;

    tracing::info!(
        athlete_id = %athlete.athlete_id,
        firstname = %athlete.firstname,
        "OAuth successful, tokens stored"
    );

    let jwt = create_jwt(&athlete.athlete_id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let jar = jar.add(session_cookie(jwt, is_secure(&frontend_url)));
    Ok((jar, Redirect::temporary(&format!("{}/callback", frontend_url))))
}

/// Logout - clear the session cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.add(removal_cookie(is_secure(&state.config.frontend_url)));
    (jar, StatusCode::NO_CONTENT)
}

/// Scheme and host the request arrived on, for building the callback URL.
fn request_origin(headers: &HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");

    let scheme = if is_local(host) { "http" } else { "https" };
    format!("{}://{}", scheme, host)
}

/// `host[:port]` is a loopback name.
fn is_local(host: &str) -> bool {
    let name = host.split(':').next().unwrap_or_default();
    name == "localhost" || name == "127.0.0.1"
}

fn is_secure(frontend_url: &str) -> bool {
    frontend_url.starts_with("https://")
}

fn is_allowed_frontend(uri: &str, configured: &str) -> bool {
    uri == configured
        || uri
            .strip_prefix("http://")
            .and_then(|rest| rest.split('/').next())
            .is_some_and(is_local)
}

/// Build `base64("frontend_url|timestamp_hex|signature_hex")`.
fn sign_state(frontend_url: &str, now_ms: i64, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", frontend_url, now_ms);
    let signature = state_signature(&payload, secret)?;
    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

fn state_signature(payload: &str, secret: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify HMAC signature and freshness, then return the frontend URL.
fn verify_and_decode_state(state: &str, secret: &[u8], now_ms: i64) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // The URL itself may contain '|', so split from the right.
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}", frontend_url, timestamp_hex);
    let expected = state_signature(&payload, secret).ok()?;
    let provided = hex::decode(signature_hex).ok()?;

    if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = i64::from_str_radix(timestamp_hex, 16).ok()?;
    let age_ms = now_ms.saturating_sub(issued_ms);
    if !(-STATE_CLOCK_SKEW_MS..=STATE_MAX_AGE_MS).contains(&age_ms) {
        tracing::warn!(issued_ms, now_ms, "OAuth state expired");
        return None;
    }

    Some(frontend_url.to_string())
}
