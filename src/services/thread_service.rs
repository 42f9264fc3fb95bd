// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request flows over completions and their threads.
//!
//! This is the role boundary: every entry point takes the caller's role and
//! refuses work the role may not do. Workout ownership is checked upstream
//! (see `routes::threads`); ids arriving here are only checked for shape.

use crate::config::Config;
use crate::db::ThreadStore;
use crate::error::{AppError, Result};
use crate::models::{
    validate_identifier, AppendOutcome, Completion, InboxCursor, InteractionType, Message, Role,
    ThreadStatus,
};
use crate::services::status;
use crate::services::{CompletionStore, MessageThread};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Upper bound on concurrent thread reads while building an inbox.
const MAX_CONCURRENT_THREAD_READS: usize = 16;

/// Characters of the latest message shown in an inbox entry.
pub const PREVIEW_CHARS: usize = 140;

/// Result of `submit_completion`.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub completion: Completion,
    /// `None` when the feedback was blank and no append was attempted.
    pub message: Option<AppendOutcome>,
}

impl SubmitOutcome {
    pub fn message_created(&self) -> bool {
        self.message.as_ref().is_some_and(AppendOutcome::was_created)
    }
}

/// Result of `send_message`.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub completion_id: String,
    pub outcome: AppendOutcome,
}

/// A thread as shown to one viewer, after their read receipts were applied.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ThreadView {
    /// `None` if the student never completed or discussed this workout
    pub completion_id: Option<String>,
    pub messages: Vec<Message>,
    pub interaction_type: InteractionType,
    pub status: Option<ThreadStatus>,
    pub has_unread_staff_reply: bool,
    pub did_mark_read: bool,
}

impl ThreadView {
    fn empty() -> Self {
        Self {
            completion_id: None,
            messages: Vec::new(),
            interaction_type: InteractionType::Conversation,
            status: None,
            has_unread_staff_reply: false,
            did_mark_read: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct InboxEntry {
    pub completion_id: String,
    pub student_id: String,
    pub workout_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    pub last_message_preview: String,
    pub interaction_type: InteractionType,
    pub status: ThreadStatus,
    pub has_unread_staff_reply: bool,
}

impl InboxEntry {
    /// Build an entry for `viewer`. Empty threads have no entry.
    ///
    /// `last_activity` comes from the completion row, the same value the page
    /// was selected and ordered by, so cursors stay consistent with storage.
    fn build(viewer: Role, completion: Completion, messages: &[Message]) -> Option<Self> {
        let thread_status = status::status_for(viewer, messages)?;
        let last = messages.last()?;
        Some(Self {
            last_activity: completion
                .last_message_at
                .unwrap_or_else(|| status::last_activity(&completion, messages)),
            message_count: messages.len(),
            last_message_preview: last.text.chars().take(PREVIEW_CHARS).collect(),
            interaction_type: status::interaction_type(messages),
            status: thread_status,
            has_unread_staff_reply: status::has_unread_staff_reply(messages),
            completion_id: completion.id,
            student_id: completion.student_id,
            workout_id: completion.workout_id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct InboxPage {
    pub entries: Vec<InboxEntry>,
    pub next_cursor: Option<InboxCursor>,
}

#[derive(Clone)]
pub struct ThreadService {
    completions: CompletionStore,
    messages: MessageThread,
}

impl ThreadService {
    pub fn new(store: Arc<dyn ThreadStore>, config: &Config) -> Self {
        Self {
            completions: CompletionStore::new(store.clone(), config.storage_timeout),
            messages: MessageThread::new(store, config.storage_timeout, config.max_message_chars),
        }
    }

    /// A student marks a workout done, optionally with feedback.
    ///
    /// The completion is upserted first; non-blank feedback is then appended
    /// to the thread as a student message (subject to dedup).
    pub async fn submit_completion(
        &self,
        caller_role: Role,
        student_id: &str,
        workout_id: &str,
        feedback_text: Option<&str>,
    ) -> Result<SubmitOutcome> {
        if !caller_role.is_student() {
            tracing::warn!(role = %caller_role, workout_id, "Non-student tried to submit a completion");
            return Err(AppError::NotAuthorized(
                "Only students can complete workouts".to_string(),
            ));
        }
        validate_identifier("student_id", student_id)?;
        validate_identifier("workout_id", workout_id)?;
        // Over-long feedback must fail before the completion is touched.
        if let Some(text) = feedback_text.filter(|t| !t.trim().is_empty()) {
            self.messages.validate_text(text)?;
        }

        let completion = self
            .completions
            .upsert_completion(student_id, workout_id, feedback_text)
            .await?;

        let message = match completion.feedback_text.as_deref() {
            Some(text) => Some(
                self.messages
                    .append(&completion.id, student_id, Role::Student, text)
                    .await?,
            ),
            None => None,
        };

        Ok(SubmitOutcome {
            completion,
            message,
        })
    }

    /// Post a message into the (student, workout) thread.
    ///
    /// Students may only write into their own threads and open the
    /// completion lazily if needed. Staff can only answer threads that
    /// already exist.
    pub async fn send_message(
        &self,
        caller_role: Role,
        caller_id: &str,
        student_id: &str,
        workout_id: &str,
        text: &str,
    ) -> Result<SendOutcome> {
        validate_identifier("student_id", student_id)?;
        validate_identifier("workout_id", workout_id)?;
        // Reject bad text before any completion gets created for it.
        self.messages.validate_text(text)?;

        let completion = if caller_role.is_student() {
            if caller_id != student_id {
                tracing::warn!(caller_id, student_id, workout_id, "Student tried to write into another student's thread");
                return Err(AppError::NotAuthorized(
                    "Students can only message about their own workouts".to_string(),
                ));
            }
            self.completions
                .ensure_completion(student_id, workout_id)
                .await?
        } else {
            self.completions
                .find(student_id, workout_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "No thread for workout {workout_id} and student {student_id}"
                    ))
                })?
        };

        let outcome = self
            .messages
            .append(&completion.id, caller_id, caller_role, text)
            .await?;

        Ok(SendOutcome {
            completion_id: completion.id,
            outcome,
        })
    }

    /// Load a thread for display and mark the other side's messages seen.
    ///
    /// A pair without a completion yields an empty view; nothing is created.
    pub async fn fetch_thread(
        &self,
        caller_role: Role,
        student_id: &str,
        workout_id: &str,
    ) -> Result<ThreadView> {
        validate_identifier("student_id", student_id)?;
        validate_identifier("workout_id", workout_id)?;

        let Some(completion) = self.completions.find(student_id, workout_id).await? else {
            return Ok(ThreadView::empty());
        };

        let mut messages = self.messages.list(&completion.id).await?;
        let did_mark_read = self
            .messages
            .mark_read(&completion.id, caller_role, Utc::now())
            .await?;
        if did_mark_read {
            messages = self.messages.list(&completion.id).await?;
        }

        Ok(ThreadView {
            interaction_type: status::interaction_type(&messages),
            status: status::status_for(caller_role, &messages),
            has_unread_staff_reply: status::has_unread_staff_reply(&messages),
            did_mark_read,
            completion_id: Some(completion.id),
            messages,
        })
    }

    /// Threads with at least one message, most recently active first.
    ///
    /// Staff see every thread; students see their own. Storage selects and
    /// orders the page, so only the page's threads are read. Listing never
    /// marks anything read.
    pub async fn inbox(
        &self,
        viewer: Role,
        viewer_id: &str,
        limit: usize,
        after: Option<&InboxCursor>,
    ) -> Result<InboxPage> {
        let owner = viewer.is_student().then_some(viewer_id);
        let mut completions = self.completions.list_active(owner, after, limit + 1).await?;

        let next_cursor = if completions.len() > limit {
            completions.truncate(limit);
            completions.last().and_then(Completion::inbox_cursor)
        } else {
            None
        };

        let entries: Vec<InboxEntry> = stream::iter(completions)
            .map(|completion| async move {
                let messages = self.messages.list(&completion.id).await?;
                Ok::<_, AppError>(InboxEntry::build(viewer, completion, &messages))
            })
            .buffered(MAX_CONCURRENT_THREAD_READS)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .filter_map(|entry| entry.transpose())
            .collect::<Result<_>>()?;

        tracing::debug!(viewer = %viewer, entries = entries.len(), more = next_cursor.is_some(), "Inbox listed");

        Ok(InboxPage {
            entries,
            next_cursor,
        })
    }
}
