// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use srg_backend::config::Config;
use srg_backend::db::{FieldMap, FirestoreDb, MemoryStore, StoreError, TokenStore};
use srg_backend::error::AppError;
use srg_backend::models::{TokenPair, TokenRecord};
use srg_backend::routes::create_router;
use srg_backend::services::strava::{
    ActivityChanges, StravaActivity, TokenExchangeResponse, TokenRefreshResponse, UpstreamClient,
};
use srg_backend::AppState;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Athlete returned by the fake OAuth exchange.
#[allow(dead_code)]
pub const TEST_ATHLETE: &str = "123456789";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Generate a unique athlete ID for test isolation.
#[allow(dead_code)]
pub fn unique_athlete_id() -> String {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string()
}

/// Build an upstream activity from the fields tests care about.
#[allow(dead_code)]
pub fn strava_activity(
    id: u64,
    name: &str,
    sport_type: &str,
    distance: f64,
    moving_time: u64,
    start_date: &str,
) -> StravaActivity {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": name,
        "sport_type": sport_type,
        "distance": distance,
        "moving_time": moving_time,
        "elapsed_time": moving_time + 60,
        "total_elevation_gain": 12.5,
        "start_date": start_date,
        "start_date_local": start_date,
        "location_city": "Boulder",
        "average_speed": if moving_time == 0 { 0.0 } else { distance / moving_time as f64 },
        "max_speed": 5.1,
        "kudos_count": 3,
        "comment_count": 1,
        "map": { "summary_polyline": "abc123" }
    }))
    .expect("valid activity json")
}

/// Seed a token record directly into a store.
#[allow(dead_code)]
pub async fn seed_tokens(
    store: &dyn TokenStore,
    athlete_id: &str,
    access: &str,
    refresh: &str,
    expires_at: i64,
) {
    let pair = TokenPair {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        expires_at,
    };
    store
        .put_partial(athlete_id, &pair.to_fields(athlete_id))
        .await
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Fake Strava
// ─────────────────────────────────────────────────────────────────────────────

/// In-process stand-in for Strava with call counters.
#[derive(Default)]
pub struct FakeUpstream {
    pub activities: Mutex<Vec<StravaActivity>>,
    /// Token pairs handed out by successive refresh calls.
    pub refresh_pairs: Mutex<VecDeque<TokenRefreshResponse>>,
    pub reject_refresh: AtomicBool,
    pub fail_deauthorize: AtomicBool,
    pub refresh_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub deauthorize_calls: AtomicUsize,
    /// Refresh tokens presented, in order.
    pub refresh_tokens_seen: Mutex<Vec<String>>,
    /// Access tokens presented to data endpoints, in order.
    pub access_tokens_seen: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_activities(activities: Vec<StravaActivity>) -> Arc<Self> {
        let fake = Self::default();
        *fake.activities.lock().unwrap() = activities;
        Arc::new(fake)
    }

    pub fn push_refresh(&self, access: &str, refresh: &str, expires_at: i64) {
        self.refresh_pairs
            .lock()
            .unwrap()
            .push_back(TokenRefreshResponse {
                access_token: access.to_string(),
                refresh_token: refresh.to_string(),
                expires_at,
            });
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn saw_access_token(&self, token: &str) {
        self.access_tokens_seen
            .lock()
            .unwrap()
            .push(token.to_string());
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstream {
    async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, AppError> {
        if code != "good_code" {
            return Err(AppError::UpstreamAuth("bad authorization code".to_string()));
        }
        Ok(serde_json::from_value(serde_json::json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "expires_at": chrono::Utc::now().timestamp() + 21600,
            "athlete": { "id": 123456789u64, "firstname": "Test", "lastname": "User" }
        }))
        .expect("valid exchange json"))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, AppError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        if self.reject_refresh.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamAuth("invalid_grant".to_string()));
        }
        self.refresh_pairs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::StravaApi("no scripted refresh".to_string()))
    }

    async fn list_activities(
        &self,
        access_token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivity>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.saw_access_token(access_token);

        let activities = self.activities.lock().unwrap();
        let start = (page.saturating_sub(1) * per_page) as usize;
        Ok(activities
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect())
    }

    async fn get_activity_detail(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.saw_access_token(access_token);

        let activities = self.activities.lock().unwrap();
        let mut activity = activities
            .iter()
            .find(|a| a.id == activity_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Activity {}", activity_id)))?;

        if activity.description.is_none() {
            activity.description = Some(format!("Details for {}", activity.name));
        }
        activity.calories = Some(512.0);
        activity.laps = Some(serde_json::json!([{ "lap_index": 1 }]));
        Ok(activity)
    }

    async fn update_activity(
        &self,
        access_token: &str,
        activity_id: u64,
        changes: &ActivityChanges,
    ) -> Result<StravaActivity, AppError> {
        self.saw_access_token(access_token);

        let mut activities = self.activities.lock().unwrap();
        let activity = activities
            .iter_mut()
            .find(|a| a.id == activity_id)
            .ok_or_else(|| AppError::NotFound(format!("Activity {}", activity_id)))?;

        if let Some(name) = &changes.name {
            activity.name = name.clone();
        }
        if let Some(description) = &changes.description {
            activity.description = Some(description.clone());
        }
        if let Some(gear) = &changes.gear_id {
            activity.gear_id = (gear != "none").then(|| gear.clone());
        }
        Ok(activity.clone())
    }

    async fn deauthorize(&self, access_token: &str) -> Result<(), AppError> {
        self.deauthorize_calls.fetch_add(1, Ordering::SeqCst);
        self.saw_access_token(access_token);
        if self.fail_deauthorize.load(Ordering::SeqCst) {
            return Err(AppError::StravaApi("deauthorize failed".to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store wrappers
// ─────────────────────────────────────────────────────────────────────────────

/// Token store that counts writes on top of a [`MemoryStore`].
#[derive(Clone, Default)]
pub struct CountingTokenStore {
    pub inner: MemoryStore,
    pub writes: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl CountingTokenStore {
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for CountingTokenStore {
    async fn get(&self, athlete_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        TokenStore::get(&self.inner, athlete_id).await
    }

    async fn put_partial(&self, athlete_id: &str, fields: &FieldMap) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_partial(athlete_id, fields).await
    }

    async fn update_existing(&self, athlete_id: &str, fields: &FieldMap) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_existing(athlete_id, fields).await
    }

    async fn delete(&self, athlete_id: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        TokenStore::delete(&self.inner, athlete_id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// App
// ─────────────────────────────────────────────────────────────────────────────

/// Handles to the doubles behind a test app.
#[allow(dead_code)]
pub struct TestHarness {
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub upstream: Arc<FakeUpstream>,
}

/// Create a test app over an in-memory store and a fake Strava.
/// Returns the router and the handles to inspect afterwards.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, TestHarness) {
    create_test_app_with(FakeUpstream::new())
}

#[allow(dead_code)]
pub fn create_test_app_with(upstream: Arc<FakeUpstream>) -> (axum::Router, TestHarness) {
    let config = Config::test_default();
    let store = MemoryStore::new();

    let state = Arc::new(AppState::new(
        config,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        upstream.clone(),
    ));

    let harness = TestHarness {
        state: state.clone(),
        store,
        upstream,
    };
    (create_router(state), harness)
}

/// Bearer token for the test signing key.
#[allow(dead_code)]
pub fn bearer(athlete_id: &str) -> String {
    let jwt = srg_backend::middleware::auth::create_jwt(
        athlete_id,
        &Config::test_default().jwt_signing_key,
    )
    .unwrap();
    format!("Bearer {}", jwt)
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
