// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Message threads attached to completions.
//!
//! Appends are deduplicated against the thread's latest message: if it has
//! the same author and identical text, nothing is written and that message is
//! echoed back. Only that single message is compared, so a repeat that
//! follows a reply from the other side is stored again. The check is
//! read-then-write and two truly simultaneous identical appends can both land.

use crate::db::{with_deadline, ThreadStore};
use crate::error::{AppError, Result};
use crate::models::{AppendOutcome, Message, NewMessage, Role};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct MessageThread {
    store: Arc<dyn ThreadStore>,
    timeout: Duration,
    max_chars: usize,
}

impl MessageThread {
    pub fn new(store: Arc<dyn ThreadStore>, timeout: Duration, max_chars: usize) -> Self {
        Self {
            store,
            timeout,
            max_chars,
        }
    }

    /// Trim and check message text. Blank or over-length text is rejected,
    /// never truncated.
    pub fn validate_text(&self, raw: &str) -> Result<String> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(AppError::Validation(
                "Message text must not be blank".to_string(),
            ));
        }
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(AppError::Validation(format!(
                "Message text is {} characters; the limit is {}",
                len, self.max_chars
            )));
        }
        Ok(text.to_string())
    }

    /// Append a message unless it repeats the thread's latest message from
    /// the same author.
    pub async fn append(
        &self,
        completion_id: &str,
        author_id: &str,
        author_role: Role,
        text: &str,
    ) -> Result<AppendOutcome> {
        let text = self.validate_text(text)?;

        let previous = with_deadline(
            self.timeout,
            "last_message",
            self.store.last_message(completion_id),
        )
        .await?;

        if let Some(previous) = previous
            .as_ref()
            .filter(|m| m.author_id == author_id && m.text == text)
        {
            tracing::debug!(
                completion_id,
                author_id,
                message_id = %previous.id,
                "Duplicate message suppressed"
            );
            return Ok(AppendOutcome::Duplicate(previous.clone()));
        }

        // Stored precision is microseconds; keep thread order strictly
        // increasing even when two appends land in the same microsecond.
        let mut created_at = Utc::now().trunc_subsecs(6);
        if let Some(previous) = &previous {
            if created_at <= previous.created_at {
                created_at = previous.created_at + chrono::Duration::microseconds(1);
            }
        }

        let message = with_deadline(
            self.timeout,
            "insert_message",
            self.store.insert_message(NewMessage {
                completion_id: completion_id.to_string(),
                author_id: author_id.to_string(),
                author_role,
                text,
                created_at,
            }),
        )
        .await?;

        tracing::info!(
            completion_id,
            author_id,
            author_role = %author_role,
            message_id = %message.id,
            "Message appended"
        );

        Ok(AppendOutcome::Created(message))
    }

    /// Snapshot of the thread in conversation order.
    pub async fn list(&self, completion_id: &str) -> Result<Vec<Message>> {
        with_deadline(
            self.timeout,
            "list_messages",
            self.store.list_messages(completion_id),
        )
        .await
    }

    /// Mark the other side's messages as seen by `viewer`.
    ///
    /// Returns `true` if any receipt was set. Receipts that are already set
    /// are left alone, so repeating the call is harmless and returns `false`.
    pub async fn mark_read(
        &self,
        completion_id: &str,
        viewer: Role,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let marked = with_deadline(
            self.timeout,
            "mark_read",
            self.store.mark_read(completion_id, viewer, now),
        )
        .await?;

        if marked > 0 {
            tracing::debug!(completion_id, viewer = %viewer, marked, "Messages marked read");
        }

        Ok(marked > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    const COMPLETION: &str = "s1:w1";

    fn thread() -> MessageThread {
        MessageThread::new(Arc::new(MemoryStore::new()), Duration::from_secs(1), 20)
    }

    #[tokio::test]
    async fn test_rejects_blank_and_long_text() {
        let thread = thread();

        let err = thread
            .append(COMPLETION, "s1", Role::Student, " \n ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = thread
            .append(COMPLETION, "s1", Role::Student, &"x".repeat(21))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Limit counts characters, not bytes.
        let outcome = thread
            .append(COMPLETION, "s1", Role::Student, &"é".repeat(20))
            .await
            .unwrap();
        assert!(outcome.was_created());
    }

    #[tokio::test]
    async fn test_repeat_from_same_author_is_suppressed() {
        let thread = thread();

        let first = thread
            .append(COMPLETION, "s1", Role::Student, "Feito!")
            .await
            .unwrap();
        let again = thread
            .append(COMPLETION, "s1", Role::Student, "  Feito!  ")
            .await
            .unwrap();

        assert!(first.was_created());
        assert!(!again.was_created());
        assert_eq!(again.message().id, first.message().id);
        assert_eq!(thread.list(COMPLETION).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_text_from_other_author_is_kept() {
        let thread = thread();

        thread
            .append(COMPLETION, "s1", Role::Student, "ok")
            .await
            .unwrap();
        let coach = thread
            .append(COMPLETION, "c1", Role::COACH, "ok")
            .await
            .unwrap();

        assert!(coach.was_created());
        assert_eq!(thread.list(COMPLETION).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_repeat_after_reply_is_stored_again() {
        let thread = thread();

        thread.append(COMPLETION, "s1", Role::Student, "X").await.unwrap();
        thread.append(COMPLETION, "c1", Role::COACH, "Y").await.unwrap();
        let retried = thread.append(COMPLETION, "s1", Role::Student, "X").await.unwrap();

        // The coach's reply sits between the twins, so the retry is kept.
        assert!(retried.was_created());

        let texts: Vec<String> = thread
            .list(COMPLETION)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["X", "Y", "X"]);
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let thread = thread();
        thread.append(COMPLETION, "s1", Role::Student, "a").await.unwrap();
        thread.append(COMPLETION, "c1", Role::COACH, "b").await.unwrap();

        let first_look = Utc::now();
        assert!(thread.mark_read(COMPLETION, Role::COACH, first_look).await.unwrap());
        let after_first = thread.list(COMPLETION).await.unwrap();

        let second_look = first_look + chrono::Duration::seconds(10);
        assert!(!thread.mark_read(COMPLETION, Role::ADMIN, second_look).await.unwrap());
        let after_second = thread.list(COMPLETION).await.unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(after_second[0].read_by_coach_at, Some(first_look));
        // Staff reading never marks staff messages.
        assert_eq!(after_second[1].read_by_coach_at, None);
        assert_eq!(after_second[1].read_by_student_at, None);
    }

    #[tokio::test]
    async fn test_mark_read_on_empty_thread() {
        let thread = thread();
        assert!(!thread
            .mark_read("nothing-here", Role::Student, Utc::now())
            .await
            .unwrap());
    }
}
