// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local projection of Strava activities.
//!
//! The projection is split in two groups of persisted fields:
//! - summary fields, mirrored from the list endpoint and rewritten by every
//!   sync;
//! - detail-cache fields, filled lazily by a detail fetch and never touched
//!   by a sync.

use crate::db::{FieldMap, StoreError};
use crate::services::strava::StravaActivity;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Fields written by a bulk sync when the record already exists.
pub const SUMMARY_FIELDS: [&str; 31] = [
    "athlete_id",
    "activity_id",
    "name",
    "sport_type",
    "workout_type",
    "distance",
    "moving_time",
    "elapsed_time",
    "total_elevation_gain",
    "start_date",
    "start_date_local",
    "timezone",
    "location_city",
    "location_state",
    "location_country",
    "average_speed",
    "max_speed",
    "average_heartrate",
    "max_heartrate",
    "achievement_count",
    "kudos_count",
    "comment_count",
    "athlete_count",
    "photo_count",
    "pr_count",
    "trainer",
    "commute",
    "manual",
    "private",
    "gear_id",
    "summary_polyline",
];

/// Stored activity record (document ID is `{athlete_id}_{activity_id}`).
///
/// Optional upstream values are persisted as an explicit null rather than
/// being omitted, so a re-sync clears values the upstream has dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivityRecord {
    /// Strava athlete ID (owner)
    pub athlete_id: String,
    /// Strava activity ID
    pub activity_id: String,
    pub name: String,
    pub sport_type: String,
    pub workout_type: Option<u32>,
    /// Distance in meters
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub distance: Decimal,
    /// Moving time in seconds
    pub moving_time: u64,
    /// Elapsed time in seconds
    pub elapsed_time: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub total_elevation_gain: Decimal,
    /// Start date/time (ISO 8601, UTC)
    pub start_date: String,
    pub start_date_local: String,
    pub timezone: Option<String>,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub location_country: Option<String>,
    /// Meters per second
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub average_speed: Decimal,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub max_speed: Decimal,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub average_heartrate: Option<Decimal>,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub max_heartrate: Option<Decimal>,
    pub achievement_count: u32,
    pub kudos_count: u32,
    pub comment_count: u32,
    pub athlete_count: u32,
    pub photo_count: u32,
    pub pr_count: u32,
    pub trainer: bool,
    pub commute: bool,
    pub manual: bool,
    pub private: bool,
    /// Gear (shoe/bike) reference
    pub gear_id: Option<String>,
    pub summary_polyline: Option<String>,

    // ─── Detail Cache ────────────────────────────────────────────
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detail_cached: bool,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub calories: Option<Decimal>,
    /// Serialized JSON array
    #[serde(default)]
    pub segment_efforts: Option<String>,
    /// Serialized JSON array
    #[serde(default)]
    pub best_efforts: Option<String>,
    /// Serialized JSON array
    #[serde(default)]
    pub laps: Option<String>,
    #[serde(default)]
    pub polyline: Option<String>,
    /// Serialized JSON object of the primary photo
    #[serde(default)]
    pub primary_photo: Option<String>,
    #[serde(default)]
    pub detail_cached_at: Option<String>,
}

impl ActivityRecord {
    /// Normalize an upstream activity into the stored projection.
    ///
    /// Detail-cache fields start empty; use [`DetailCache`] to fill them.
    pub fn from_upstream(athlete_id: &str, activity: &StravaActivity) -> Self {
        Self {
            athlete_id: athlete_id.to_string(),
            activity_id: activity.id.to_string(),
            name: activity.name.clone(),
            sport_type: activity.sport_type.clone(),
            workout_type: activity.workout_type,
            distance: exact_decimal(activity.distance),
            moving_time: activity.moving_time,
            elapsed_time: activity.elapsed_time,
            total_elevation_gain: exact_decimal(activity.total_elevation_gain),
            start_date: activity.start_date.clone(),
            start_date_local: activity.start_date_local.clone(),
            timezone: activity.timezone.clone(),
            location_city: activity.location_city.clone(),
            location_state: activity.location_state.clone(),
            location_country: activity.location_country.clone(),
            average_speed: exact_decimal(activity.average_speed),
            max_speed: exact_decimal(activity.max_speed),
            average_heartrate: activity.average_heartrate.map(exact_decimal),
            max_heartrate: activity.max_heartrate.map(exact_decimal),
            achievement_count: activity.achievement_count,
            kudos_count: activity.kudos_count,
            comment_count: activity.comment_count,
            athlete_count: activity.athlete_count,
            photo_count: activity.photo_count,
            pr_count: activity.pr_count,
            trainer: activity.trainer,
            commute: activity.commute,
            manual: activity.manual,
            private: activity.private,
            gear_id: activity.gear_id.clone(),
            summary_polyline: activity
                .map
                .as_ref()
                .and_then(|m| m.summary_polyline.clone())
                .filter(|p| !p.is_empty()),
            description: None,
            detail_cached: false,
            calories: None,
            segment_efforts: None,
            best_efforts: None,
            laps: None,
            polyline: None,
            primary_photo: None,
            detail_cached_at: None,
        }
    }

    /// Every persisted field of the record.
    pub fn to_fields(&self) -> Result<FieldMap, StoreError> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(StoreError::InvalidRecord(format!(
                "activity {} did not serialize to an object",
                self.activity_id
            ))),
            Err(e) => Err(StoreError::InvalidRecord(e.to_string())),
        }
    }

    /// Only the [`SUMMARY_FIELDS`] of the record.
    pub fn summary_fields(&self) -> Result<FieldMap, StoreError> {
        let mut fields = self.to_fields()?;
        fields.retain(|key, _| SUMMARY_FIELDS.contains(&key.as_str()));
        Ok(fields)
    }

    /// Copy a detail cache onto this record.
    pub fn apply_detail(&mut self, detail: &DetailCache) {
        self.description = detail.description.clone();
        self.detail_cached = true;
        self.calories = detail.calories;
        self.segment_efforts = detail.segment_efforts.clone();
        self.best_efforts = detail.best_efforts.clone();
        self.laps = detail.laps.clone();
        self.polyline = detail.polyline.clone();
        self.primary_photo = detail.primary_photo.clone();
        self.detail_cached_at = Some(detail.cached_at.clone());
    }

    /// Meters per second of moving time; zero-duration activities rank last.
    pub fn pace_metric(&self) -> f64 {
        pace_metric(self.distance.to_f64().unwrap_or(0.0), self.moving_time)
    }
}

/// `distance / moving_time`, or negative infinity when no time was recorded.
pub fn pace_metric(distance: f64, moving_time: u64) -> f64 {
    if moving_time == 0 {
        f64::NEG_INFINITY
    } else {
        distance / moving_time as f64
    }
}

/// Convert an upstream float to the shortest exact decimal that
/// round-trips to it, so `1897.4` persists as `1897.4` and not as the
/// nearest binary fraction.
pub fn exact_decimal(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&value.to_string())
        .or_else(|_| Decimal::try_from(value))
        .unwrap_or_default()
}

/// Detail-only fields captured from a full activity fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailCache {
    pub description: Option<String>,
    pub calories: Option<Decimal>,
    pub segment_efforts: Option<String>,
    pub best_efforts: Option<String>,
    pub laps: Option<String>,
    pub polyline: Option<String>,
    pub primary_photo: Option<String>,
    pub cached_at: String,
}

impl DetailCache {
    pub fn from_upstream(activity: &StravaActivity, cached_at: &str) -> Self {
        let serialize = |value: &Option<serde_json::Value>| {
            value
                .as_ref()
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
        };

        Self {
            description: activity.description.clone(),
            calories: activity.calories.map(exact_decimal),
            segment_efforts: serialize(&activity.segment_efforts),
            best_efforts: serialize(&activity.best_efforts),
            laps: serialize(&activity.laps),
            polyline: activity
                .map
                .as_ref()
                .and_then(|m| m.polyline.clone())
                .filter(|p| !p.is_empty()),
            primary_photo: activity
                .photos
                .as_ref()
                .and_then(|p| p.get("primary"))
                .filter(|v| !v.is_null())
                .map(|v| v.to_string()),
            cached_at: cached_at.to_string(),
        }
    }
}

/// A narrow write against one stored activity.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityPatch {
    /// User edit of the title and/or description.
    NameDescription {
        name: Option<String>,
        description: Option<String>,
    },
    /// Gear (shoe/bike) assignment; `None` clears it.
    Gear { gear_id: Option<String> },
    /// Refreshed social counters.
    SocialCounts { kudos_count: u32, comment_count: u32 },
    /// Result of a detail fetch.
    Detail(DetailCache),
}

impl ActivityPatch {
    /// Field map containing exactly the fields this patch names.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        match self {
            ActivityPatch::NameDescription { name, description } => {
                if let Some(name) = name {
                    fields.insert("name".into(), name.clone().into());
                }
                if let Some(description) = description {
                    fields.insert("description".into(), description.clone().into());
                }
            }
            ActivityPatch::Gear { gear_id } => {
                fields.insert("gear_id".into(), gear_id.clone().into());
            }
            ActivityPatch::SocialCounts {
                kudos_count,
                comment_count,
            } => {
                fields.insert("kudos_count".into(), (*kudos_count).into());
                fields.insert("comment_count".into(), (*comment_count).into());
            }
            ActivityPatch::Detail(detail) => {
                fields.insert("detail_cached".into(), true.into());
                fields.insert("description".into(), detail.description.clone().into());
                fields.insert(
                    "calories".into(),
                    detail.calories.map(|c| c.to_string()).into(),
                );
                fields.insert(
                    "segment_efforts".into(),
                    detail.segment_efforts.clone().into(),
                );
                fields.insert("best_efforts".into(), detail.best_efforts.clone().into());
                fields.insert("laps".into(), detail.laps.clone().into());
                fields.insert("polyline".into(), detail.polyline.clone().into());
                fields.insert("primary_photo".into(), detail.primary_photo.clone().into());
                fields.insert(
                    "detail_cached_at".into(),
                    detail.cached_at.clone().into(),
                );
            }
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        matches!(
            self,
            ActivityPatch::NameDescription {
                name: None,
                description: None
            }
        )
    }
}
