// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence layer.
//!
//! Two stores back the application:
//! - the token store, keyed by athlete ID, holding OAuth tokens and the
//!   user preferences colocated with them;
//! - the activity store, keyed by (athlete ID, activity ID), holding the
//!   local projection of Strava activities.
//!
//! Both are consumed through narrow traits so the services never depend on
//! a concrete backend. Writes are expressed as a [`FieldMap`]: only the keys
//! present in the map are touched on the stored record.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::models::{ActivityRecord, TokenRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    pub const TOKENS: &str = "tokens";
    pub const ACTIVITIES: &str = "activities";
}

/// Subset of a record's attributes, keyed by persisted field name.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Persistence faults.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Conditional insert lost: a record already exists for the key.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Partial update targeted a record that does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Concurrent writers raced on the same key.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Stored data failed validation at the store boundary.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error only reflects an insert/update race on one key.
    pub fn is_benign_race(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_) | StoreError::Conflict(_))
    }
}

/// Token persistence keyed by athlete ID.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the token record, `None` when the athlete has never authorized.
    async fn get(&self, athlete_id: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Upsert only the given fields; every other stored field survives.
    async fn put_partial(&self, athlete_id: &str, fields: &FieldMap) -> Result<(), StoreError>;

    /// Like `put_partial`, but never creates the record
    /// (`StoreError::NotFound` when it is absent).
    async fn update_existing(&self, athlete_id: &str, fields: &FieldMap) -> Result<(), StoreError>;

    async fn delete(&self, athlete_id: &str) -> Result<(), StoreError>;
}

/// Activity projection persistence keyed by (athlete ID, activity ID).
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Range query over every activity owned by the athlete.
    async fn get_by_owner(&self, athlete_id: &str) -> Result<Vec<ActivityRecord>, StoreError>;

    async fn get_one(
        &self,
        athlete_id: &str,
        activity_id: &str,
    ) -> Result<Option<ActivityRecord>, StoreError>;

    /// Insert the record unless one exists for its key
    /// (`StoreError::AlreadyExists` otherwise).
    async fn put_if_absent(&self, record: &ActivityRecord) -> Result<(), StoreError>;

    /// Overwrite only the given fields of an existing record
    /// (`StoreError::NotFound` when the record is absent).
    async fn update_partial(
        &self,
        athlete_id: &str,
        activity_id: &str,
        fields: &FieldMap,
    ) -> Result<(), StoreError>;

    async fn delete(&self, athlete_id: &str, activity_id: &str) -> Result<(), StoreError>;
}

pub type SharedTokenStore = Arc<dyn TokenStore>;
pub type SharedActivityStore = Arc<dyn ActivityStore>;

/// Document ID for an activity: owner and activity joined so two athletes
/// can never collide on the same Strava activity ID.
pub fn activity_doc_id(athlete_id: &str, activity_id: &str) -> String {
    format!("{}_{}", athlete_id, activity_id)
}
