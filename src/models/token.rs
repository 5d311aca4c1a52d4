// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token record and the user preferences stored alongside it.

use crate::db::{FieldMap, StoreError};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Persisted field names written by a token refresh. Nothing else on the
/// record is touched when tokens rotate.
pub const TOKEN_FIELDS: [&str; 3] = ["access_token", "refresh_token", "expires_at"];

/// Per-athlete token record (document ID is the athlete ID).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Strava athlete ID
    pub athlete_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry, Unix seconds
    pub expires_at: i64,
    /// Sport preselected in the frontend filters
    #[serde(default)]
    pub default_sport: Option<String>,
    /// "metric" or "imperial"
    #[serde(default)]
    pub display_format: Option<String>,
}

impl TokenRecord {
    /// Check the record read back from a store.
    pub fn validate(self) -> Result<Self, StoreError> {
        if self.expires_at < 0 {
            return Err(StoreError::InvalidRecord(format!(
                "token for athlete {} has negative expiry {}",
                self.athlete_id, self.expires_at
            )));
        }
        if self.access_token.is_empty() || self.refresh_token.is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "token for athlete {} is missing credentials",
                self.athlete_id
            )));
        }
        Ok(self)
    }

    /// Strict comparison: a token is still usable at `now == expires_at`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    pub fn preferences(&self) -> UserPreferences {
        UserPreferences {
            default_sport: self.default_sport.clone(),
            display_format: self.display_format.clone(),
        }
    }
}

/// Token tuple issued by Strava on exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl TokenPair {
    /// Field map restricted to [`TOKEN_FIELDS`], plus the athlete ID so the
    /// first write creates a complete record.
    pub fn to_fields(&self, athlete_id: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("athlete_id".into(), athlete_id.into());
        fields.insert("access_token".into(), self.access_token.clone().into());
        fields.insert("refresh_token".into(), self.refresh_token.clone().into());
        fields.insert("expires_at".into(), self.expires_at.into());
        fields
    }
}

/// Display preferences, colocated in the token record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserPreferences {
    pub default_sport: Option<String>,
    pub display_format: Option<String>,
}

impl UserPreferences {
    /// Only preference fields that are set; absent ones are left alone.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        if let Some(sport) = &self.default_sport {
            fields.insert("default_sport".into(), sport.clone().into());
        }
        if let Some(format) = &self.display_format {
            fields.insert("display_format".into(), format.clone().into());
        }
        fields
    }
}
