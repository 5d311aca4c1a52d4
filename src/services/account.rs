// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account deletion.

use crate::db::{SharedActivityStore, StoreError};
use crate::error::{AppError, KeyFailure, Result};
use crate::services::strava::SharedUpstream;
use crate::services::tokens::TokenManager;
use futures_util::{stream, StreamExt};

/// Summary of a completed account deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionSummary {
    pub activities_deleted: usize,
    pub deauthorized: bool,
}

/// Removes everything stored for an athlete.
#[derive(Clone)]
pub struct AccountService {
    tokens: TokenManager,
    upstream: SharedUpstream,
    activities: SharedActivityStore,
    concurrency: usize,
}

impl AccountService {
    pub fn new(
        tokens: TokenManager,
        upstream: SharedUpstream,
        activities: SharedActivityStore,
        concurrency: usize,
    ) -> Self {
        Self {
            tokens,
            upstream,
            activities,
            concurrency: concurrency.max(1),
        }
    }

    /// Delete the athlete's token record and every activity they own.
    ///
    /// 1. Deauthorize with Strava (best-effort)
    /// 2. Delete all activities, bounded fan-out, joined before continuing
    /// 3. Delete the token record, only once every activity is gone
    ///
    /// If any activity delete fails, the token record is kept so the request
    /// can be retried, and `PartialBatchFailure` reports every failed key.
    pub async fn destroy_user(&self, athlete_id: &str) -> Result<DeletionSummary> {
        tracing::info!(athlete_id, "Destroying user data");

        let deauthorized = self.deauthorize(athlete_id).await;

        let records = self.activities.get_by_owner(athlete_id).await?;
        let attempted = records.len();
        let store = &self.activities;

        let results: Vec<(String, std::result::Result<(), StoreError>)> = stream::iter(records)
            .map(|record| async move {
                let result = store.delete(athlete_id, &record.activity_id).await;
                (record.activity_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let failures: Vec<KeyFailure> = results
            .into_iter()
            .filter_map(|(key, result)| result.err().map(|error| KeyFailure { key, error }))
            .collect();

        if !failures.is_empty() {
            tracing::error!(
                athlete_id,
                attempted,
                failed = failures.len(),
                "Activity deletion incomplete, keeping tokens"
            );
            return Err(AppError::PartialBatchFailure {
                attempted,
                failures,
            });
        }

        self.tokens.delete(athlete_id).await?;

        tracing::info!(
            athlete_id,
            activities_deleted = attempted,
            deauthorized,
            "User data deletion complete"
        );

        Ok(DeletionSummary {
            activities_deleted: attempted,
            deauthorized,
        })
    }

    /// Revoke the app's Strava access; failures are logged, not fatal.
    async fn deauthorize(&self, athlete_id: &str) -> bool {
        let access_token = match self.tokens.get_valid_access_token(athlete_id).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(athlete_id, error = %e, "No usable token for deauthorization");
                return false;
            }
        };

        match self.upstream.deauthorize(&access_token).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(athlete_id, error = %e, "Strava deauthorization failed, continuing");
                false
            }
        }
    }
}
