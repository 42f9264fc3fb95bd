// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Coachline: workout completions and coach/student feedback threads
//!
//! This crate provides the backend API that records when a student finishes
//! an assigned workout and carries the conversation about it, with read
//! receipts and a derived status for each side.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::WorkoutRegistry;
use services::ThreadService;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub threads: ThreadService,
    /// Workout ownership, maintained by the workout service
    pub workouts: Arc<dyn WorkoutRegistry>,
}
