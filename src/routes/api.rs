// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{ActivityRecord, UserPreferences};
use crate::services::{ActivityEdit, SyncFilter};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/activities", get(get_activities))
        .route("/api/activities/sync", post(sync_activities))
        .route("/api/activities/cached", get(get_cached_activities))
        .route(
            "/api/activities/{id}",
            get(get_activity).put(update_activity),
        )
        .route("/api/activities/{id}/social", post(refresh_social))
        .route(
            "/api/preferences",
            get(get_preferences).put(update_preferences),
        )
        .route("/api/account", delete(delete_account))
}

fn validated<T: Validate>(body: T) -> Result<T> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(body)
}

// ─── Activities ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ActivitiesQuery {
    /// Pagination: page number (1-indexed)
    #[serde(default = "default_page")]
    page: u32,
    /// Pagination: items per page
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    30
}

const MAX_PER_PAGE: u32 = crate::services::activity::STRAVA_MAX_PER_PAGE;

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivitiesResponse {
    pub activities: Vec<ActivityRecord>,
    pub page: u32,
    pub per_page: u32,
}

/// One page of the athlete's activities straight from Strava.
async fn get_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    if params.page == 0 {
        return Err(AppError::BadRequest("'page' starts at 1".to_string()));
    }
    let per_page = params.per_page.clamp(1, MAX_PER_PAGE);

    let activities = state
        .activities
        .list_page(&user.athlete_id, params.page, per_page)
        .await?;

    Ok(Json(ActivitiesResponse {
        activities,
        page: params.page,
        per_page,
    }))
}

#[derive(Deserialize)]
struct SyncQuery {
    /// Comma separated sport types, e.g. `Run,TrailRun`
    types: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncResponse {
    /// Filtered activities, fastest pace first
    pub activities: Vec<ActivityRecord>,
    pub inserted: usize,
    pub updated: usize,
    /// Activity IDs that could not be written
    pub failed: Vec<String>,
}

/// Pull every activity from Strava and mirror it locally.
///
/// Per-record store failures do not fail the request; they are listed in
/// `failed` so the client can retry.
async fn sync_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<SyncQuery>,
) -> Result<Json<SyncResponse>> {
    let filter = SyncFilter::from_csv(params.types.as_deref());
    let report = state.activities.sync(&user.athlete_id, &filter).await?;

    Ok(Json(SyncResponse {
        inserted: report.inserted,
        updated: report.updated,
        failed: report.failures.into_iter().map(|f| f.key).collect(),
        activities: report.records,
    }))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CachedActivitiesResponse {
    pub activities: Vec<ActivityRecord>,
    pub total: usize,
}

/// Locally mirrored activities, newest first.
async fn get_cached_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CachedActivitiesResponse>> {
    let activities = state.activities.cached(&user.athlete_id).await?;
    Ok(Json(CachedActivitiesResponse {
        total: activities.len(),
        activities,
    }))
}

#[derive(Deserialize)]
struct DetailQuery {
    #[serde(default)]
    refresh: bool,
}

async fn get_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<u64>,
    Query(params): Query<DetailQuery>,
) -> Result<Json<ActivityRecord>> {
    let record = state
        .activities
        .detail(&user.athlete_id, activity_id, params.refresh)
        .await?;
    Ok(Json(record))
}

/// Distinguish an absent field from an explicit `null`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Edit request. `gear_id: null` clears the gear assignment.
#[derive(Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UpdateActivityRequest {
    #[validate(length(min = 1, max = 255))]
    #[serde(default)]
    pub name: Option<String>,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub gear_id: Option<Option<String>>,
}

impl UpdateActivityRequest {
    fn into_edit(self) -> Result<ActivityEdit> {
        if let Some(Some(gear)) = &self.gear_id {
            if gear.is_empty() || gear.len() > 64 {
                return Err(AppError::BadRequest("Invalid 'gear_id'".to_string()));
            }
        }
        Ok(ActivityEdit {
            name: self.name,
            description: self.description,
            gear_id: self.gear_id,
        })
    }
}

/// Write an edit to Strava, then to the local record.
async fn update_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<u64>,
    Json(body): Json<UpdateActivityRequest>,
) -> Result<Json<ActivityRecord>> {
    let edit = validated(body)?.into_edit()?;

    let record = state
        .activities
        .update(&user.athlete_id, activity_id, &edit)
        .await?;

    Ok(Json(record))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SocialCountsResponse {
    pub kudos_count: u32,
    pub comment_count: u32,
}

async fn refresh_social(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<u64>,
) -> Result<Json<SocialCountsResponse>> {
    let (kudos_count, comment_count) = state
        .activities
        .refresh_social(&user.athlete_id, activity_id)
        .await?;

    Ok(Json(SocialCountsResponse {
        kudos_count,
        comment_count,
    }))
}

// ─── Preferences ─────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PreferencesRequest {
    #[validate(length(min = 1, max = 32))]
    #[serde(default)]
    pub default_sport: Option<String>,
    #[validate(length(min = 1, max = 32))]
    #[serde(default)]
    pub display_format: Option<String>,
}

async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserPreferences>> {
    Ok(Json(state.tokens.preferences(&user.athlete_id).await?))
}

/// Update the preferences that are present in the body; others are kept.
async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PreferencesRequest>,
) -> Result<Json<UserPreferences>> {
    let body = validated(body)?;
    let preferences = UserPreferences {
        default_sport: body.default_sport,
        display_format: body.display_format,
    };

    Ok(Json(
        state
            .tokens
            .update_preferences(&user.athlete_id, &preferences)
            .await?,
    ))
}

// ─── Account Deletion ────────────────────────────────────────

/// Response for account deletion.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub activities_deleted: usize,
    /// Whether Strava access was revoked as well
    pub deauthorized: bool,
}

/// Delete the user's tokens and every stored activity.
///
/// If any activity cannot be deleted the tokens are kept and the request
/// fails, so it can simply be repeated.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeleteAccountResponse>> {
    tracing::info!(
        athlete_id = %user.athlete_id,
        "User-initiated account deletion"
    );

    let summary = state.accounts.destroy_user(&user.athlete_id).await?;

    Ok(Json(DeleteAccountResponse {
        success: true,
        activities_deleted: summary.activities_deleted,
        deauthorized: summary.deauthorized,
    }))
}
