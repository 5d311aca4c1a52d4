// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity workflows exposed to the frontend.
//!
//! Handles:
//! 1. Full sync: paginate Strava, filter, sort by pace, reconcile
//! 2. Single page passthrough
//! 3. Detail fetch with local caching
//! 4. Write-through edits (Strava first, then the local projection)
//! 5. Social count refresh

use crate::db::{SharedActivityStore, StoreError};
use crate::error::{AppError, Result};
use crate::models::{activity::pace_metric, ActivityRecord, DetailCache};
use crate::services::reconcile::{ReconcileReport, Reconciler};
use crate::services::strava::{ActivityChanges, SharedUpstream, StravaActivity};
use crate::services::tokens::TokenManager;
use crate::time_utils::format_utc_rfc3339;

/// Strava's maximum page size.
pub const STRAVA_MAX_PER_PAGE: u32 = 200;

/// Hard stop for pagination against a misbehaving upstream.
const MAX_SYNC_PAGES: u32 = 100;

/// Filter applied by a full sync.
#[derive(Debug, Clone, Default)]
pub struct SyncFilter {
    /// Keep only these sport types (case-insensitive); empty keeps all.
    pub sport_types: Vec<String>,
}

impl SyncFilter {
    /// Parse a comma separated list such as `"Run,TrailRun"`.
    pub fn from_csv(types: Option<&str>) -> Self {
        let sport_types = types
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { sport_types }
    }

    pub fn matches(&self, activity: &StravaActivity) -> bool {
        self.sport_types.is_empty()
            || self
                .sport_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&activity.sport_type))
    }
}

/// Sort descending by `distance / moving_time`; zero moving time sorts last.
pub fn sort_by_pace(activities: &mut [StravaActivity]) {
    activities.sort_by(|a, b| {
        pace_metric(b.distance, b.moving_time).total_cmp(&pace_metric(a.distance, a.moving_time))
    });
}

/// User edit of an activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the gear assignment.
    pub gear_id: Option<Option<String>>,
}

impl ActivityEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.gear_id.is_none()
    }

    fn to_changes(&self) -> ActivityChanges {
        ActivityChanges {
            name: self.name.clone(),
            description: self.description.clone(),
            gear_id: self
                .gear_id
                .as_ref()
                .map(|g| g.clone().unwrap_or_else(|| "none".to_string())),
        }
    }
}

/// Orchestrates token lookup, Strava calls and local reconciliation.
#[derive(Clone)]
pub struct ActivityService {
    tokens: TokenManager,
    upstream: SharedUpstream,
    store: SharedActivityStore,
    reconciler: Reconciler,
}

impl ActivityService {
    pub fn new(
        tokens: TokenManager,
        upstream: SharedUpstream,
        store: SharedActivityStore,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            tokens,
            upstream,
            store,
            reconciler,
        }
    }

    /// Fetch every page of the athlete's activities until a short page.
    pub async fn fetch_all(&self, athlete_id: &str) -> Result<Vec<StravaActivity>> {
        let access_token = self.tokens.get_valid_access_token(athlete_id).await?;
        let mut activities = Vec::new();

        for page in 1..=MAX_SYNC_PAGES {
            let batch = self
                .upstream
                .list_activities(&access_token, page, STRAVA_MAX_PER_PAGE)
                .await?;
            let fetched = batch.len();
            activities.extend(batch);

            tracing::debug!(athlete_id, page, fetched, "Fetched activity page");

            if fetched < STRAVA_MAX_PER_PAGE as usize {
                return Ok(activities);
            }
        }

        tracing::warn!(
            athlete_id,
            pages = MAX_SYNC_PAGES,
            "Stopped pagination at page limit"
        );
        Ok(activities)
    }

    /// Full sync: fetch all, filter, pace-sort, mirror into the store.
    pub async fn sync(&self, athlete_id: &str, filter: &SyncFilter) -> Result<ReconcileReport> {
        let mut activities: Vec<StravaActivity> = self
            .fetch_all(athlete_id)
            .await?
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect();
        sort_by_pace(&mut activities);

        tracing::info!(
            athlete_id,
            count = activities.len(),
            sport_types = ?filter.sport_types,
            "Reconciling synced activities"
        );

        Ok(self.reconciler.reconcile_batch(athlete_id, &activities).await)
    }

    /// One upstream page reshaped into the stored projection, without writes.
    pub async fn list_page(
        &self,
        athlete_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ActivityRecord>> {
        let access_token = self.tokens.get_valid_access_token(athlete_id).await?;
        let activities = self
            .upstream
            .list_activities(&access_token, page, per_page.min(STRAVA_MAX_PER_PAGE))
            .await?;

        Ok(activities
            .iter()
            .map(|a| ActivityRecord::from_upstream(athlete_id, a))
            .collect())
    }

    /// Locally mirrored activities, newest first.
    pub async fn cached(&self, athlete_id: &str) -> Result<Vec<ActivityRecord>> {
        let mut records = self.store.get_by_owner(athlete_id).await?;
        records.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(records)
    }

    /// Detailed activity, served from the cache unless `refresh` is set or
    /// no detail has been cached yet.
    pub async fn detail(
        &self,
        athlete_id: &str,
        activity_id: u64,
        refresh: bool,
    ) -> Result<ActivityRecord> {
        let key = activity_id.to_string();

        if !refresh {
            if let Some(record) = self.store.get_one(athlete_id, &key).await? {
                if record.detail_cached {
                    tracing::debug!(athlete_id, activity_id, "Serving cached detail");
                    return Ok(record);
                }
            }
        }

        let access_token = self.tokens.get_valid_access_token(athlete_id).await?;
        let activity = self
            .upstream
            .get_activity_detail(&access_token, activity_id)
            .await?;

        let mut record = self.reconciler.reconcile_one(athlete_id, &activity).await?;
        let detail = DetailCache::from_upstream(&activity, &format_utc_rfc3339(chrono::Utc::now()));
        self.reconciler
            .cache_detail(athlete_id, &key, detail.clone())
            .await?;
        record.apply_detail(&detail);

        tracing::info!(athlete_id, activity_id, "Activity detail cached");
        Ok(record)
    }

    /// Apply a user edit upstream, then mirror it locally and return the
    /// stored record.
    ///
    /// When the activity has never been synced, the updated upstream
    /// activity is inserted first and the edit applied on top of it.
    pub async fn update(
        &self,
        athlete_id: &str,
        activity_id: u64,
        edit: &ActivityEdit,
    ) -> Result<ActivityRecord> {
        if edit.is_empty() {
            return Err(AppError::BadRequest("No fields to update".to_string()));
        }

        let access_token = self.tokens.get_valid_access_token(athlete_id).await?;
        let updated = self
            .upstream
            .update_activity(&access_token, activity_id, &edit.to_changes())
            .await?;

        let key = activity_id.to_string();
        match self.apply_edit_locally(athlete_id, &key, edit).await {
            Ok(()) => {}
            Err(AppError::Store(StoreError::NotFound(_))) => {
                tracing::debug!(athlete_id, activity_id, "Edited activity not mirrored yet");
                self.reconciler.reconcile_one(athlete_id, &updated).await?;
                self.apply_edit_locally(athlete_id, &key, edit).await?;
            }
            Err(e) => return Err(e),
        }

        tracing::info!(athlete_id, activity_id, "Activity updated");
        self.store
            .get_one(athlete_id, &key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Activity {}", activity_id)))
    }

    async fn apply_edit_locally(&self, athlete_id: &str, key: &str, edit: &ActivityEdit) -> Result<()> {
        if edit.name.is_some() || edit.description.is_some() {
            self.reconciler
                .update_name_description(athlete_id, key, edit.name.clone(), edit.description.clone())
                .await?;
        }
        if let Some(gear_id) = &edit.gear_id {
            self.reconciler
                .update_gear(athlete_id, key, gear_id.clone())
                .await?;
        }
        Ok(())
    }

    /// Refresh kudos/comment counts from Strava into the stored record.
    pub async fn refresh_social(&self, athlete_id: &str, activity_id: u64) -> Result<(u32, u32)> {
        let access_token = self.tokens.get_valid_access_token(athlete_id).await?;
        let activity = self
            .upstream
            .get_activity_detail(&access_token, activity_id)
            .await?;

        let key = activity_id.to_string();
        match self
            .reconciler
            .update_social_counts(athlete_id, &key, activity.kudos_count, activity.comment_count)
            .await
        {
            Ok(()) => {}
            Err(AppError::Store(StoreError::NotFound(_))) => {
                self.reconciler.reconcile_one(athlete_id, &activity).await?;
            }
            Err(e) => return Err(e),
        }

        Ok((activity.kudos_count, activity.comment_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: u64, distance: f64, moving_time: u64, sport: &str) -> StravaActivity {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "distance": distance,
            "moving_time": moving_time,
            "sport_type": sport,
        }))
        .unwrap()
    }

    #[test]
    fn test_sort_by_pace_descending_zero_time_last() {
        let mut activities = vec![
            activity(1, 1000.0, 500, "Run"), // 2.0
            activity(2, 1000.0, 0, "Run"),   // -inf
            activity(3, 3000.0, 1000, "Run"), // 3.0
            activity(4, 0.0, 100, "Run"),    // 0.0
        ];

        sort_by_pace(&mut activities);

        let ids: Vec<u64> = activities.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_sync_filter_matches_case_insensitively() {
        let filter = SyncFilter::from_csv(Some("run, Ride,"));
        assert_eq!(filter.sport_types, vec!["run", "Ride"]);
        assert!(filter.matches(&activity(1, 1.0, 1, "Run")));
        assert!(filter.matches(&activity(1, 1.0, 1, "ride")));
        assert!(!filter.matches(&activity(1, 1.0, 1, "Swim")));

        assert!(SyncFilter::from_csv(None).matches(&activity(1, 1.0, 1, "Swim")));
    }

    #[test]
    fn test_edit_clearing_gear_maps_to_none_literal() {
        let edit = ActivityEdit {
            gear_id: Some(None),
            ..Default::default()
        };
        assert_eq!(edit.to_changes().gear_id.as_deref(), Some("none"));
        assert!(ActivityEdit::default().is_empty());
    }
}
