// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store backed by `DashMap`.
//!
//! Each map entry is guarded by its shard lock, so a keyed upsert is a single
//! atomic step just like the keyed document write in Firestore.

use crate::db::{ThreadStore, WorkoutRegistry};
use crate::error::AppError;
use crate::models::{Completion, InboxCursor, Message, NewMessage, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    completions: DashMap<String, Completion>,
    /// Messages per completion id, kept in thread order
    threads: DashMap<String, Vec<Message>>,
    /// workout id -> owning student id
    workouts: DashMap<String, String>,
}

/// Shared in-memory store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `workout_id` belongs to `student_id`.
    pub fn assign_workout(&self, workout_id: &str, student_id: &str) {
        self.inner
            .workouts
            .insert(workout_id.to_string(), student_id.to_string());
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn upsert_completion(
        &self,
        student_id: &str,
        workout_id: &str,
        feedback_text: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Completion, AppError> {
        let key = Completion::key(student_id, workout_id);
        let entry = self
            .inner
            .completions
            .entry(key)
            .and_modify(|existing| {
                existing.feedback_text = feedback_text.clone();
                existing.completed_at = now;
            })
            .or_insert_with(|| {
                Completion::new(student_id, workout_id, feedback_text.clone(), now)
            });
        Ok(entry.value().clone())
    }

    async fn ensure_completion(
        &self,
        student_id: &str,
        workout_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Completion, AppError> {
        let key = Completion::key(student_id, workout_id);
        let entry = self
            .inner
            .completions
            .entry(key)
            .or_insert_with(|| Completion::new(student_id, workout_id, None, now));
        Ok(entry.value().clone())
    }

    async fn get_completion(
        &self,
        student_id: &str,
        workout_id: &str,
    ) -> Result<Option<Completion>, AppError> {
        let key = Completion::key(student_id, workout_id);
        Ok(self.inner.completions.get(&key).map(|c| c.value().clone()))
    }

    async fn list_completions(
        &self,
        student_id: Option<&str>,
    ) -> Result<Vec<Completion>, AppError> {
        Ok(self
            .inner
            .completions
            .iter()
            .filter(|c| student_id.is_none_or(|s| c.student_id == s))
            .map(|c| c.value().clone())
            .collect())
    }

    async fn list_active_completions(
        &self,
        student_id: Option<&str>,
        after: Option<&InboxCursor>,
        limit: usize,
    ) -> Result<Vec<Completion>, AppError> {
        let mut page: Vec<(InboxCursor, Completion)> = self
            .inner
            .completions
            .iter()
            .filter(|c| student_id.is_none_or(|s| c.student_id == s))
            .filter_map(|c| c.inbox_cursor().map(|cursor| (cursor, c.value().clone())))
            .filter(|(cursor, _)| after.is_none_or(|after| after.precedes(cursor)))
            .collect();

        page.sort_by(|(a, _), (b, _)| b.cmp(a));
        page.truncate(limit);
        Ok(page.into_iter().map(|(_, c)| c).collect())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, AppError> {
        let message = message.into_message(uuid::Uuid::new_v4().to_string());
        {
            let mut thread = self
                .inner
                .threads
                .entry(message.completion_id.clone())
                .or_default();

            // Concurrent appends may take the lock out of timestamp order.
            let pos = thread.partition_point(|m| {
                (m.created_at, &m.id) <= (message.created_at, &message.id)
            });
            thread.insert(pos, message.clone());
        }

        if let Some(mut completion) = self.inner.completions.get_mut(&message.completion_id) {
            completion.record_message(message.created_at);
        }
        Ok(message)
    }

    async fn last_message(&self, completion_id: &str) -> Result<Option<Message>, AppError> {
        Ok(self
            .inner
            .threads
            .get(completion_id)
            .and_then(|thread| thread.last().cloned()))
    }

    async fn list_messages(&self, completion_id: &str) -> Result<Vec<Message>, AppError> {
        Ok(self
            .inner
            .threads
            .get(completion_id)
            .map(|thread| thread.value().clone())
            .unwrap_or_default())
    }

    async fn mark_read(
        &self,
        completion_id: &str,
        viewer: Role,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let Some(mut thread) = self.inner.threads.get_mut(completion_id) else {
            return Ok(0);
        };
        Ok(thread
            .iter_mut()
            .map(|m| m.mark_read_by(viewer, now))
            .filter(|marked| *marked)
            .count())
    }
}

#[async_trait]
impl WorkoutRegistry for MemoryStore {
    async fn workout_owner(&self, workout_id: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .inner
            .workouts
            .get(workout_id)
            .map(|owner| owner.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_row() {
        let store = MemoryStore::new();
        let mut handles = vec![];

        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_completion("s1", "w1", Some(format!("take {i}")), Utc::now())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let rows = store.list_completions(None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, Completion::key("s1", "w1"));
    }

    #[tokio::test]
    async fn test_ensure_does_not_overwrite() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        store
            .upsert_completion("s1", "w1", Some("done".to_string()), t0)
            .await
            .unwrap();

        let later = t0 + chrono::Duration::minutes(5);
        let existing = store.ensure_completion("s1", "w1", later).await.unwrap();

        assert_eq!(existing.feedback_text.as_deref(), Some("done"));
        assert_eq!(existing.completed_at, t0);
    }

    #[tokio::test]
    async fn test_messages_stay_in_timestamp_order() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        for (offset, text) in [(2, "third"), (0, "first"), (1, "second")] {
            store
                .insert_message(NewMessage {
                    completion_id: "c1".to_string(),
                    author_id: "s1".to_string(),
                    author_role: Role::Student,
                    text: text.to_string(),
                    created_at: t0 + chrono::Duration::seconds(offset),
                })
                .await
                .unwrap();
        }

        let texts: Vec<String> = store
            .list_messages("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_equal_timestamps_order_by_id() {
        let store = MemoryStore::new();
        let at = Utc::now();
        for text in ["a", "b", "c"] {
            store
                .insert_message(NewMessage {
                    completion_id: "c1".to_string(),
                    author_id: "s1".to_string(),
                    author_role: Role::Student,
                    text: text.to_string(),
                    created_at: at,
                })
                .await
                .unwrap();
        }

        let ids: Vec<String> = store
            .list_messages("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(store.last_message("c1").await.unwrap().unwrap().id, sorted[2]);
    }

    #[tokio::test]
    async fn test_later_read_with_earlier_time_keeps_receipt() {
        let store = MemoryStore::new();
        let t1 = Utc::now();
        store
            .insert_message(NewMessage {
                completion_id: "c1".to_string(),
                author_id: "s1".to_string(),
                author_role: Role::Student,
                text: "feito".to_string(),
                created_at: t1 - chrono::Duration::minutes(1),
            })
            .await
            .unwrap();

        assert_eq!(store.mark_read("c1", Role::COACH, t1).await.unwrap(), 1);
        let t0 = t1 - chrono::Duration::seconds(30);
        assert_eq!(store.mark_read("c1", Role::ADMIN, t0).await.unwrap(), 0);

        let thread = store.list_messages("c1").await.unwrap();
        assert_eq!(thread[0].read_by_coach_at, Some(t1));
    }

    #[tokio::test]
    async fn test_active_completions_page_in_inbox_order() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        for (workout, offset) in [("w1", 0), ("w2", 2), ("w3", 2), ("w4", 1)] {
            let completion = store.upsert_completion("s1", workout, None, t0).await.unwrap();
            store
                .insert_message(NewMessage {
                    completion_id: completion.id,
                    author_id: "s1".to_string(),
                    author_role: Role::Student,
                    text: "ok".to_string(),
                    created_at: t0 + chrono::Duration::seconds(offset),
                })
                .await
                .unwrap();
        }
        // No messages, never listed.
        store.upsert_completion("s1", "w5", None, t0).await.unwrap();
        store.upsert_completion("s2", "w6", None, t0).await.unwrap();

        let first = store.list_active_completions(None, None, 3).await.unwrap();
        let workouts: Vec<&str> = first.iter().map(|c| c.workout_id.as_str()).collect();
        assert_eq!(workouts, ["w3", "w2", "w4"]);
        assert_eq!(first[0].message_count, 1);

        let after = first[2].inbox_cursor().unwrap();
        let rest = store
            .list_active_completions(Some("s1"), Some(&after), 3)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].workout_id, "w1");

        assert!(store
            .list_active_completions(Some("s2"), None, 3)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_upsert_keeps_thread_counters() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let completion = store.upsert_completion("s1", "w1", None, t0).await.unwrap();
        store
            .insert_message(NewMessage {
                completion_id: completion.id.clone(),
                author_id: "s1".to_string(),
                author_role: Role::Student,
                text: "oi".to_string(),
                created_at: t0,
            })
            .await
            .unwrap();

        let again = store
            .upsert_completion("s1", "w1", Some("feito".to_string()), t0)
            .await
            .unwrap();
        assert_eq!(again.message_count, 1);
        assert_eq!(again.last_message_at, Some(t0));
    }

    #[tokio::test]
    async fn test_list_completions_filters_by_student() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.upsert_completion("s1", "w1", None, now).await.unwrap();
        store.upsert_completion("s1", "w2", None, now).await.unwrap();
        store.upsert_completion("s2", "w3", None, now).await.unwrap();

        assert_eq!(store.list_completions(None).await.unwrap().len(), 3);
        assert_eq!(store.list_completions(Some("s1")).await.unwrap().len(), 2);
        assert!(store.list_completions(Some("s9")).await.unwrap().is_empty());
    }
}
