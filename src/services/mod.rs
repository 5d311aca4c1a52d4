// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod account;
pub mod activity;
pub mod reconcile;
pub mod strava;
pub mod tokens;

pub use account::{AccountService, DeletionSummary};
pub use activity::{ActivityEdit, ActivityService, SyncFilter};
pub use reconcile::{ReconcileReport, Reconciler};
pub use strava::{StravaClient, UpstreamClient};
pub use tokens::{AuthorizedAthlete, TokenManager};
