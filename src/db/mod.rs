// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer.
//!
//! Components receive a [`ThreadStore`] handle explicitly; there is no global
//! client. Two backends implement it: Firestore for deployments and an
//! in-process map for local development and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{Completion, InboxCursor, Message, NewMessage, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Collection names as constants.
pub mod collections {
    /// One document per (student, workout), keyed by `Completion::key`
    pub const COMPLETIONS: &str = "completions";
    pub const MESSAGES: &str = "completion_messages";
    /// Owned by the workout service; read-only here
    pub const WORKOUTS: &str = "workouts";
}

/// Persistence for completions and their message threads.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Create or overwrite the completion for a pair in one keyed write.
    ///
    /// Sets `feedback_text` and `completed_at = now` whether or not the row
    /// already existed. Must not be implemented as read-then-write.
    async fn upsert_completion(
        &self,
        student_id: &str,
        workout_id: &str,
        feedback_text: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Completion, AppError>;

    /// Create the completion only if the pair has none; otherwise return the
    /// existing one untouched.
    async fn ensure_completion(
        &self,
        student_id: &str,
        workout_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Completion, AppError>;

    async fn get_completion(
        &self,
        student_id: &str,
        workout_id: &str,
    ) -> Result<Option<Completion>, AppError>;

    /// All completions, or only one student's when `student_id` is given.
    async fn list_completions(&self, student_id: Option<&str>)
        -> Result<Vec<Completion>, AppError>;

    /// One inbox page: completions with at least one message, in inbox order
    /// (see [`InboxCursor`]), starting strictly after `after`.
    async fn list_active_completions(
        &self,
        student_id: Option<&str>,
        after: Option<&InboxCursor>,
        limit: usize,
    ) -> Result<Vec<Completion>, AppError>;

    /// Store a message and, in the same step, bump its completion's
    /// `message_count` and `last_message_at`.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, AppError>;

    /// Most recent message in the thread, by thread order.
    async fn last_message(&self, completion_id: &str) -> Result<Option<Message>, AppError>;

    /// Thread snapshot in thread order: ascending `created_at`, then message id.
    async fn list_messages(&self, completion_id: &str) -> Result<Vec<Message>, AppError>;

    /// Set `viewer`'s read receipt on every opposite-role message that lacks
    /// one. Returns how many messages were marked.
    ///
    /// The check and the write must be one atomic step: a receipt written by
    /// a concurrent reader is never replaced.
    async fn mark_read(
        &self,
        completion_id: &str,
        viewer: Role,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError>;
}

/// Read-only view of workout ownership, maintained by the workout service.
#[async_trait]
pub trait WorkoutRegistry: Send + Sync {
    /// Owning student of a workout; `None` for unknown workouts and templates.
    async fn workout_owner(&self, workout_id: &str) -> Result<Option<String>, AppError>;
}

/// Run a storage call under a deadline. Expiry is reported as a storage error.
pub async fn with_deadline<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Storage call timed out");
            Err(AppError::Storage(format!(
                "{} timed out after {}ms",
                operation,
                limit.as_millis()
            )))
        }
    }
}
