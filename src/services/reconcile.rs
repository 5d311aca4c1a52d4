// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Merge upstream activities into the local activity store.
//!
//! Each record is an upsert: a conditional insert first, and on conflict a
//! partial update restricted to the summary fields, so detail-cache fields
//! and user edits already stored on the record survive a re-sync.

use crate::db::{SharedActivityStore, StoreError};
use crate::error::{AppError, KeyFailure, Result};
use crate::models::{ActivityPatch, ActivityRecord, DetailCache};
use crate::services::strava::StravaActivity;
use futures_util::{stream, StreamExt};

/// Default ceiling on concurrent per-record store operations.
pub const DEFAULT_STORE_CONCURRENCY: usize = 10;

/// How a single record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Per-key outcome of a batch reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// Normalized records as submitted (not re-read from the store).
    pub records: Vec<ActivityRecord>,
    pub inserted: usize,
    pub updated: usize,
    pub failures: Vec<KeyFailure>,
}

impl ReconcileReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The submitted records, or `PartialBatchFailure` if any key failed.
    pub fn into_result(self) -> Result<Vec<ActivityRecord>> {
        if self.failures.is_empty() {
            Ok(self.records)
        } else {
            Err(AppError::PartialBatchFailure {
                attempted: self.records.len(),
                failures: self.failures,
            })
        }
    }
}

/// Reconciles upstream activities with the stored projection.
#[derive(Clone)]
pub struct Reconciler {
    store: SharedActivityStore,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(store: SharedActivityStore, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Upsert a batch of upstream activities for one owner.
    ///
    /// Records are written concurrently (bounded) and independently: a failed
    /// key is reported without rolling back or aborting its siblings.
    pub async fn reconcile_batch(
        &self,
        owner: &str,
        activities: &[StravaActivity],
    ) -> ReconcileReport {
        let records: Vec<ActivityRecord> = activities
            .iter()
            .map(|a| ActivityRecord::from_upstream(owner, a))
            .collect();

        let outcomes: Vec<(String, std::result::Result<UpsertOutcome, StoreError>)> =
            stream::iter(records.clone())
                .map(|record| async move {
                    let outcome = self.upsert(&record).await;
                    (record.activity_id, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut report = ReconcileReport {
            records: Vec::new(),
            inserted: 0,
            updated: 0,
            failures: Vec::new(),
        };

        for (key, outcome) in outcomes {
            match outcome {
                Ok(UpsertOutcome::Inserted) => report.inserted += 1,
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Err(error) => {
                    tracing::warn!(
                        athlete_id = owner,
                        activity_id = %key,
                        error = %error,
                        "Failed to reconcile activity"
                    );
                    report.failures.push(KeyFailure { key, error });
                }
            }
        }
        report.records = records;

        tracing::info!(
            athlete_id = owner,
            inserted = report.inserted,
            updated = report.updated,
            failed = report.failures.len(),
            "Batch reconciled"
        );

        report
    }

    /// Upsert a single upstream activity and return its projection.
    pub async fn reconcile_one(
        &self,
        owner: &str,
        activity: &StravaActivity,
    ) -> Result<ActivityRecord> {
        let record = ActivityRecord::from_upstream(owner, activity);
        self.upsert(&record).await?;
        Ok(record)
    }

    async fn upsert(
        &self,
        record: &ActivityRecord,
    ) -> std::result::Result<UpsertOutcome, StoreError> {
        match self.store.put_if_absent(record).await {
            Ok(()) => return Ok(UpsertOutcome::Inserted),
            Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        let fields = record.summary_fields()?;
        match self
            .store
            .update_partial(&record.athlete_id, &record.activity_id, &fields)
            .await
        {
            Ok(()) => Ok(UpsertOutcome::Updated),
            Err(e) if e.is_benign_race() => {
                tracing::debug!(
                    activity_id = %record.activity_id,
                    error = %e,
                    "Concurrent writer won the update race"
                );
                Ok(UpsertOutcome::Updated)
            }
            // Deleted between the insert attempt and the update: insert once more.
            Err(StoreError::NotFound(_)) => match self.store.put_if_absent(record).await {
                Ok(()) => Ok(UpsertOutcome::Inserted),
                Err(e) if e.is_benign_race() => Ok(UpsertOutcome::Updated),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Write exactly the fields named by `patch` onto a stored activity.
    pub async fn apply(&self, owner: &str, activity_id: &str, patch: &ActivityPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.store
            .update_partial(owner, activity_id, &patch.to_fields())
            .await?;
        tracing::debug!(athlete_id = owner, activity_id, "Activity patched");
        Ok(())
    }

    pub async fn update_name_description(
        &self,
        owner: &str,
        activity_id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<()> {
        self.apply(
            owner,
            activity_id,
            &ActivityPatch::NameDescription { name, description },
        )
        .await
    }

    pub async fn update_gear(
        &self,
        owner: &str,
        activity_id: &str,
        gear_id: Option<String>,
    ) -> Result<()> {
        self.apply(owner, activity_id, &ActivityPatch::Gear { gear_id })
            .await
    }

    pub async fn update_social_counts(
        &self,
        owner: &str,
        activity_id: &str,
        kudos_count: u32,
        comment_count: u32,
    ) -> Result<()> {
        self.apply(
            owner,
            activity_id,
            &ActivityPatch::SocialCounts {
                kudos_count,
                comment_count,
            },
        )
        .await
    }

    pub async fn cache_detail(
        &self,
        owner: &str,
        activity_id: &str,
        detail: DetailCache,
    ) -> Result<()> {
        self.apply(owner, activity_id, &ActivityPatch::Detail(detail))
            .await
    }
}
