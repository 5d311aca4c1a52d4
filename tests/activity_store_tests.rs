// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity store contract tests (in-memory backend).

use srg_backend::db::{ActivityStore, MemoryStore, StoreError};
use srg_backend::models::ActivityRecord;

mod common;
use common::strava_activity;

fn record(owner: &str, id: u64) -> ActivityRecord {
    ActivityRecord::from_upstream(
        owner,
        &strava_activity(id, &format!("Activity {id}"), "Run", 4000.0, 1200, "2025-05-01T08:00:00Z"),
    )
}

#[tokio::test]
async fn test_get_by_owner_returns_only_owned_records() {
    let store = MemoryStore::new();
    store.put_if_absent(&record("123456789", 111)).await.unwrap();
    store.put_if_absent(&record("123456789", 222)).await.unwrap();
    store.put_if_absent(&record("987654321", 333)).await.unwrap();

    let mut ids: Vec<String> = store
        .get_by_owner("123456789")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.activity_id)
        .collect();
    ids.sort();

    assert_eq!(ids, vec!["111", "222"]);
    assert!(store.get_by_owner("555").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_same_activity_id_under_two_owners() {
    let store = MemoryStore::new();
    store.put_if_absent(&record("123456789", 111)).await.unwrap();
    store.put_if_absent(&record("987654321", 111)).await.unwrap();

    assert_eq!(store.activity_count(), 2);
    assert!(store.get_one("987654321", "111").await.unwrap().is_some());
}

#[tokio::test]
async fn test_put_if_absent_conflict() {
    let store = MemoryStore::new();
    store.put_if_absent(&record("123456789", 111)).await.unwrap();

    let err = store.put_if_absent(&record("123456789", 111)).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
    assert!(err.is_benign_race());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = MemoryStore::new();
    store.put_if_absent(&record("123456789", 111)).await.unwrap();

    ActivityStore::delete(&store, "123456789", "111").await.unwrap();
    ActivityStore::delete(&store, "123456789", "111").await.unwrap();

    assert!(store.get_one("123456789", "111").await.unwrap().is_none());
}
