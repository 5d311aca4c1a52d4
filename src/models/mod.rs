// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod activity;
pub mod token;

pub use activity::{ActivityPatch, ActivityRecord, DetailCache};
pub use token::{TokenPair, TokenRecord, UserPreferences};
