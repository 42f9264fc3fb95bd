// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout completion record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A student's engagement with one workout.
///
/// At most one exists per (student, workout). The id is derived from that
/// pair, so the key itself acts as the uniqueness constraint in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Completion {
    pub id: String,
    pub student_id: String,
    pub workout_id: String,
    /// Trimmed feedback from the latest submission; `None` when blank
    pub feedback_text: Option<String>,
    /// Time of the latest "mark as done" (or of lazy creation)
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub completed_at: DateTime<Utc>,
    /// Messages in the thread, maintained by the store on every insert
    #[serde(default)]
    pub message_count: u32,
    /// Time of the newest message; `None` while the thread is empty
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Completion {
    /// Deterministic completion id for a (student, workout) pair.
    ///
    /// Both parts are percent-encoded so the `:` separator cannot occur inside
    /// either of them, which keeps distinct pairs from colliding.
    pub fn key(student_id: &str, workout_id: &str) -> String {
        format!(
            "{}:{}",
            urlencoding::encode(student_id),
            urlencoding::encode(workout_id)
        )
    }

    /// A completion with no thread activity yet.
    pub fn new(
        student_id: &str,
        workout_id: &str,
        feedback_text: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::key(student_id, workout_id),
            student_id: student_id.to_string(),
            workout_id: workout_id.to_string(),
            feedback_text,
            completed_at: now,
            message_count: 0,
            last_message_at: None,
        }
    }

    /// Account for a message stored in this completion's thread.
    pub fn record_message(&mut self, created_at: DateTime<Utc>) {
        self.message_count += 1;
        if self.last_message_at.is_none_or(|last| last < created_at) {
            self.last_message_at = Some(created_at);
        }
    }

    /// Inbox position; `None` for completions without messages.
    pub fn inbox_cursor(&self) -> Option<InboxCursor> {
        self.last_message_at.map(|last_activity| InboxCursor {
            last_activity,
            completion_id: self.id.clone(),
        })
    }
}

/// Position of a thread in the inbox.
///
/// The inbox lists threads from the greatest cursor down: newest activity
/// first, ties broken by completion id descending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InboxCursor {
    pub last_activity: DateTime<Utc>,
    pub completion_id: String,
}

impl InboxCursor {
    /// Whether `other` comes strictly after this position in inbox order.
    pub fn precedes(&self, other: &InboxCursor) -> bool {
        other < self
    }
}

/// Trim submitted feedback; blank becomes `None`.
pub fn normalize_feedback(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
