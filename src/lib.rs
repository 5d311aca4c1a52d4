// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! srg-backend: Strava activity report backend
//!
//! This crate mirrors a user's Strava activities into a local store, keeps
//! their OAuth tokens fresh, and serves the reshaped data to the frontend.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{SharedActivityStore, SharedTokenStore};
use services::strava::SharedUpstream;
use services::{AccountService, ActivityService, Reconciler, TokenManager};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub tokens: TokenManager,
    pub activities: ActivityService,
    pub accounts: AccountService,
}

impl AppState {
    /// Wire the services over the given stores and Strava client.
    pub fn new(
        config: Config,
        token_store: SharedTokenStore,
        activity_store: SharedActivityStore,
        upstream: SharedUpstream,
    ) -> Self {
        let tokens = TokenManager::new(token_store, upstream.clone());
        let reconciler = Reconciler::new(activity_store.clone(), config.store_concurrency);
        let activities = ActivityService::new(
            tokens.clone(),
            upstream.clone(),
            activity_store.clone(),
            reconciler,
        );
        let accounts = AccountService::new(
            tokens.clone(),
            upstream,
            activity_store,
            config.store_concurrency,
        );

        Self {
            config,
            tokens,
            activities,
            accounts,
        }
    }
}
