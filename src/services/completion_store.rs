// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Completion records: one per (student, workout), last submission wins.

use crate::db::{with_deadline, ThreadStore};
use crate::error::Result;
use crate::models::completion::normalize_feedback;
use crate::models::{Completion, InboxCursor};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct CompletionStore {
    store: Arc<dyn ThreadStore>,
    timeout: Duration,
}

impl CompletionStore {
    pub fn new(store: Arc<dyn ThreadStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Record a "mark as done" for the pair.
    ///
    /// Feedback is trimmed and blank becomes `None`. Creates the row on first
    /// call; afterwards overwrites `feedback_text` and refreshes
    /// `completed_at`. Uniqueness is the storage key's job, not ours, so
    /// concurrent callers for the same pair still end up with one row.
    ///
    /// Does not touch the message thread.
    pub async fn upsert_completion(
        &self,
        student_id: &str,
        workout_id: &str,
        raw_feedback_text: Option<&str>,
    ) -> Result<Completion> {
        let feedback_text = normalize_feedback(raw_feedback_text);
        let now = chrono::Utc::now();

        let completion = with_deadline(
            self.timeout,
            "upsert_completion",
            self.store
                .upsert_completion(student_id, workout_id, feedback_text, now),
        )
        .await?;

        tracing::info!(
            student_id,
            workout_id,
            completion_id = %completion.id,
            has_feedback = completion.feedback_text.is_some(),
            "Completion recorded"
        );

        Ok(completion)
    }

    /// Create an empty completion if the pair has none yet; never overwrites.
    pub async fn ensure_completion(&self, student_id: &str, workout_id: &str) -> Result<Completion> {
        with_deadline(
            self.timeout,
            "ensure_completion",
            self.store
                .ensure_completion(student_id, workout_id, chrono::Utc::now()),
        )
        .await
    }

    pub async fn find(&self, student_id: &str, workout_id: &str) -> Result<Option<Completion>> {
        with_deadline(
            self.timeout,
            "get_completion",
            self.store.get_completion(student_id, workout_id),
        )
        .await
    }

    /// Completions with thread activity, in inbox order, after `after`.
    /// Pass `student_id` to restrict to one student's threads.
    pub async fn list_active(
        &self,
        student_id: Option<&str>,
        after: Option<&InboxCursor>,
        limit: usize,
    ) -> Result<Vec<Completion>> {
        with_deadline(
            self.timeout,
            "list_active_completions",
            self.store.list_active_completions(student_id, after, limit),
        )
        .await
    }
}
