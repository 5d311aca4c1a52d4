// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store for local development and tests.
//!
//! Records are kept as JSON objects so partial writes merge exactly like
//! they do in Firestore: only the keys in the written [`FieldMap`] change.

use crate::db::{activity_doc_id, ActivityStore, FieldMap, StoreError, TokenStore};
use crate::models::{ActivityRecord, TokenRecord};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Both stores over shared concurrent maps. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tokens: Arc<DashMap<String, FieldMap>>,
    /// Keyed by `{athlete_id}_{activity_id}`.
    activities: Arc<DashMap<String, FieldMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored fields for a token record.
    pub fn token_fields(&self, athlete_id: &str) -> Option<FieldMap> {
        self.tokens.get(athlete_id).map(|r| r.value().clone())
    }

    /// Raw stored fields for an activity record.
    pub fn activity_fields(&self, athlete_id: &str, activity_id: &str) -> Option<FieldMap> {
        self.activities
            .get(&activity_doc_id(athlete_id, activity_id))
            .map(|r| r.value().clone())
    }

    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }
}

fn decode<T: DeserializeOwned>(key: &str, fields: &FieldMap) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|e| StoreError::InvalidRecord(format!("{}: {}", key, e)))
}

fn merge(target: &mut FieldMap, fields: &FieldMap) {
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self, athlete_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        match self.tokens.get(athlete_id) {
            Some(entry) => {
                let record: TokenRecord = decode(athlete_id, entry.value())?;
                Ok(Some(record.validate()?))
            }
            None => Ok(None),
        }
    }

    async fn put_partial(&self, athlete_id: &str, fields: &FieldMap) -> Result<(), StoreError> {
        let mut entry = self.tokens.entry(athlete_id.to_string()).or_default();
        merge(entry.value_mut(), fields);
        Ok(())
    }

    async fn update_existing(&self, athlete_id: &str, fields: &FieldMap) -> Result<(), StoreError> {
        match self.tokens.get_mut(athlete_id) {
            Some(mut entry) => {
                merge(entry.value_mut(), fields);
                Ok(())
            }
            None => Err(StoreError::NotFound(athlete_id.to_string())),
        }
    }

    async fn delete(&self, athlete_id: &str) -> Result<(), StoreError> {
        self.tokens.remove(athlete_id);
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn get_by_owner(&self, athlete_id: &str) -> Result<Vec<ActivityRecord>, StoreError> {
        let owned: Vec<(String, FieldMap)> = self
            .activities
            .iter()
            .filter(|entry| entry.value().get("athlete_id") == Some(&Value::from(athlete_id)))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        owned
            .iter()
            .map(|(key, fields)| decode(key, fields))
            .collect()
    }

    async fn get_one(
        &self,
        athlete_id: &str,
        activity_id: &str,
    ) -> Result<Option<ActivityRecord>, StoreError> {
        let key = activity_doc_id(athlete_id, activity_id);
        let fields = self.activities.get(&key).map(|r| r.value().clone());
        fields.map(|f| decode(&key, &f)).transpose()
    }

    async fn put_if_absent(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        let key = activity_doc_id(&record.athlete_id, &record.activity_id);
        let fields = record.to_fields()?;

        match self.activities.entry(key) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(fields);
                Ok(())
            }
        }
    }

    async fn update_partial(
        &self,
        athlete_id: &str,
        activity_id: &str,
        fields: &FieldMap,
    ) -> Result<(), StoreError> {
        let key = activity_doc_id(athlete_id, activity_id);
        match self.activities.get_mut(&key) {
            Some(mut entry) => {
                merge(entry.value_mut(), fields);
                Ok(())
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    async fn delete(&self, athlete_id: &str, activity_id: &str) -> Result<(), StoreError> {
        self.activities
            .remove(&activity_doc_id(athlete_id, activity_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_token_put_partial_merges() {
        let store = MemoryStore::new();
        TokenStore::put_partial(
            &store,
            "1",
            &fields(json!({
                "athlete_id": "1",
                "access_token": "A1",
                "refresh_token": "R1",
                "expires_at": 100,
                "default_sport": "Run"
            })),
        )
        .await
        .unwrap();

        TokenStore::put_partial(&store, "1", &fields(json!({ "access_token": "A2" })))
            .await
            .unwrap();

        let record = TokenStore::get(&store, "1").await.unwrap().unwrap();
        assert_eq!(record.access_token, "A2");
        assert_eq!(record.refresh_token, "R1");
        assert_eq!(record.default_sport.as_deref(), Some("Run"));
    }

    #[tokio::test]
    async fn test_string_expiry_is_rejected_at_boundary() {
        let store = MemoryStore::new();
        TokenStore::put_partial(
            &store,
            "1",
            &fields(json!({
                "athlete_id": "1",
                "access_token": "A1",
                "refresh_token": "R1",
                "expires_at": "1700000000"
            })),
        )
        .await
        .unwrap();

        let err = TokenStore::get(&store, "1").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_token_update_existing_never_creates() {
        let store = MemoryStore::new();
        let err = TokenStore::update_existing(&store, "1", &fields(json!({ "default_sport": "Run" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.token_fields("1").is_none());
    }

    #[tokio::test]
    async fn test_update_partial_requires_existing_record() {
        let store = MemoryStore::new();
        let err = store
            .update_partial("1", "2", &fields(json!({ "name": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
