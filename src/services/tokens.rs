// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token lifecycle.
//!
//! Every lookup reads the token store fresh: there is no in-process token
//! cache and no lock is held across the Strava refresh call, so concurrent
//! requests for the same athlete always see the latest persisted pair.

use crate::db::{SharedTokenStore, StoreError};
use crate::error::{AppError, Result};
use crate::models::{TokenPair, UserPreferences};
use crate::services::strava::SharedUpstream;

/// Returns valid access tokens, refreshing and persisting them on expiry.
#[derive(Clone)]
pub struct TokenManager {
    store: SharedTokenStore,
    upstream: SharedUpstream,
}

/// Result of completing the OAuth authorization-code flow.
#[derive(Debug, Clone)]
pub struct AuthorizedAthlete {
    pub athlete_id: String,
    pub firstname: String,
    pub lastname: String,
}

impl TokenManager {
    pub fn new(store: SharedTokenStore, upstream: SharedUpstream) -> Self {
        Self { store, upstream }
    }

    /// Get a valid access token for the athlete, refreshing it if expired.
    pub async fn get_valid_access_token(&self, athlete_id: &str) -> Result<String> {
        self.get_valid_access_token_at(athlete_id, chrono::Utc::now().timestamp())
            .await
    }

    /// [`Self::get_valid_access_token`] against an explicit clock (Unix seconds).
    ///
    /// Performs at most one refresh call and one store write; none when the
    /// stored token is still valid (`now <= expires_at`).
    pub async fn get_valid_access_token_at(&self, athlete_id: &str, now: i64) -> Result<String> {
        let tokens = self
            .store
            .get(athlete_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tokens for athlete {}", athlete_id)))?;

        if !tokens.is_expired_at(now) {
            return Ok(tokens.access_token);
        }

        tracing::info!(
            athlete_id,
            expires_at = tokens.expires_at,
            now,
            "Access token expired, refreshing"
        );

        // A rejected refresh token needs re-authentication; propagate as is.
        let refreshed = self.upstream.refresh(&tokens.refresh_token).await?;

        let pair = TokenPair {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
        };
        self.upsert_token(athlete_id, &pair).await?;

        tracing::info!(athlete_id, expires_at = pair.expires_at, "Token refreshed");
        Ok(pair.access_token)
    }

    /// Persist a token pair, touching only the token fields so preferences
    /// stored on the same record survive. Idempotent.
    pub async fn upsert_token(&self, athlete_id: &str, pair: &TokenPair) -> Result<()> {
        self.store
            .put_partial(athlete_id, &pair.to_fields(athlete_id))
            .await?;
        Ok(())
    }

    /// Exchange an authorization code and persist the first token pair.
    pub async fn complete_authorization(&self, code: &str) -> Result<AuthorizedAthlete> {
        let response = self.upstream.exchange_code(code).await?;
        let athlete_id = response.athlete.id.to_string();

        let pair = TokenPair {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_at,
        };
        self.upsert_token(&athlete_id, &pair).await?;

        tracing::info!(
            athlete_id = %athlete_id,
            firstname = %response.athlete.firstname,
            "OAuth exchange complete, tokens stored"
        );

        Ok(AuthorizedAthlete {
            athlete_id,
            firstname: response.athlete.firstname,
            lastname: response.athlete.lastname,
        })
    }

    /// Preferences colocated with the athlete's tokens.
    pub async fn preferences(&self, athlete_id: &str) -> Result<UserPreferences> {
        self.store
            .get(athlete_id)
            .await?
            .map(|t| t.preferences())
            .ok_or_else(|| AppError::NotFound(format!("Tokens for athlete {}", athlete_id)))
    }

    /// Update only the preference fields that are set.
    pub async fn update_preferences(
        &self,
        athlete_id: &str,
        preferences: &UserPreferences,
    ) -> Result<UserPreferences> {
        let fields = preferences.to_fields();
        if fields.is_empty() {
            return self.preferences(athlete_id).await;
        }

        // Preferences live on the token record; never create an orphan one.
        match self.store.update_existing(athlete_id, &fields).await {
            Ok(()) => self.preferences(athlete_id).await,
            Err(StoreError::NotFound(_)) => Err(AppError::NotFound(format!(
                "Tokens for athlete {}",
                athlete_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the athlete's token record.
    pub async fn delete(&self, athlete_id: &str) -> Result<()> {
        self.store.delete(athlete_id).await?;
        Ok(())
    }
}
