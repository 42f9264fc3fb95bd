// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Completions (one document per student/workout pair)
//! - Completion messages (one document per message)
//! - Workouts (ownership lookup only)

use crate::db::{collections, ThreadStore, WorkoutRegistry};
use crate::error::AppError;
use crate::models::{Completion, InboxCursor, Message, NewMessage, Role};
use crate::time_utils::{format_sortable, parse_utc};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::FirestoreQueryDirection;
use serde::{Deserialize, Serialize};

/// Completion fields owned by "mark as done". Upserts write only these, so
/// the thread counters kept by `insert_message` survive resubmission.
const SUBMISSION_FIELDS: [&str; 5] = [
    "id",
    "student_id",
    "workout_id",
    "feedback_text",
    "completed_at",
];

/// Completion fields maintained by `insert_message`.
const THREAD_ACTIVITY_FIELDS: [&str; 3] = ["message_count", "last_message_at", "inbox_key"];

// ─── Document Shapes ─────────────────────────────────────────────

/// Stored completion. Timestamps are fixed-width strings so that string
/// ordering in queries is chronological.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompletionDoc {
    id: String,
    student_id: String,
    workout_id: String,
    feedback_text: Option<String>,
    completed_at: String,
    #[serde(default)]
    message_count: u32,
    #[serde(default)]
    last_message_at: Option<String>,
    /// `inbox_key(last_message_at, id)`; unset while the thread is empty.
    #[serde(default)]
    inbox_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageDoc {
    id: String,
    completion_id: String,
    author_id: String,
    author_role: String,
    text: String,
    created_at: String,
    read_by_student_at: Option<String>,
    read_by_coach_at: Option<String>,
}

/// The fields of a workout document we care about.
#[derive(Debug, Clone, Deserialize)]
struct WorkoutDoc {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    is_template: bool,
}

/// Single-field sort key for inbox paging. Sortable timestamps are fixed
/// width, so ordering by this string orders by (time, completion id).
fn inbox_key(last_activity: &str, completion_id: &str) -> String {
    format!("{last_activity}|{completion_id}")
}

fn receipt_field(viewer: Role) -> &'static str {
    if viewer.is_staff() {
        "read_by_coach_at"
    } else {
        "read_by_student_at"
    }
}

fn parse_stored_time(raw: &str, field: &str) -> Result<DateTime<Utc>, AppError> {
    parse_utc(raw).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("Invalid stored timestamp in {}: {}", field, raw))
    })
}

impl CompletionDoc {
    fn from_parts(
        student_id: &str,
        workout_id: &str,
        feedback_text: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Completion::key(student_id, workout_id),
            student_id: student_id.to_string(),
            workout_id: workout_id.to_string(),
            feedback_text,
            completed_at: format_sortable(now),
            message_count: 0,
            last_message_at: None,
            inbox_key: None,
        }
    }

    fn record_message(&mut self, created_at: &str) {
        self.message_count += 1;
        if self
            .last_message_at
            .as_deref()
            .is_none_or(|last| last < created_at)
        {
            self.last_message_at = Some(created_at.to_string());
            self.inbox_key = Some(inbox_key(created_at, &self.id));
        }
    }
}

impl TryFrom<CompletionDoc> for Completion {
    type Error = AppError;

    fn try_from(doc: CompletionDoc) -> Result<Self, Self::Error> {
        Ok(Completion {
            completed_at: parse_stored_time(&doc.completed_at, "completed_at")?,
            last_message_at: doc
                .last_message_at
                .as_deref()
                .map(|raw| parse_stored_time(raw, "last_message_at"))
                .transpose()?,
            message_count: doc.message_count,
            id: doc.id,
            student_id: doc.student_id,
            workout_id: doc.workout_id,
            feedback_text: doc.feedback_text,
        })
    }
}

impl From<&Message> for MessageDoc {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            completion_id: message.completion_id.clone(),
            author_id: message.author_id.clone(),
            author_role: message.author_role.to_string(),
            text: message.text.clone(),
            created_at: format_sortable(message.created_at),
            read_by_student_at: message.read_by_student_at.map(format_sortable),
            read_by_coach_at: message.read_by_coach_at.map(format_sortable),
        }
    }
}

impl TryFrom<MessageDoc> for Message {
    type Error = AppError;

    fn try_from(doc: MessageDoc) -> Result<Self, Self::Error> {
        let author_role: Role = doc.author_role.parse().map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Message {} has bad role: {}", doc.id, e))
        })?;

        Ok(Message {
            created_at: parse_stored_time(&doc.created_at, "created_at")?,
            read_by_student_at: doc
                .read_by_student_at
                .as_deref()
                .map(|raw| parse_stored_time(raw, "read_by_student_at"))
                .transpose()?,
            read_by_coach_at: doc
                .read_by_coach_at
                .as_deref()
                .map(|raw| parse_stored_time(raw, "read_by_coach_at"))
                .transpose()?,
            id: doc.id,
            completion_id: doc.completion_id,
            author_id: doc.author_id,
            author_role,
            text: doc.text,
        })
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Storage(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    async fn get_completion_doc(&self, id: &str) -> Result<Option<CompletionDoc>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::COMPLETIONS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }
}

/// Thread in thread order. Takes the raw client so it also runs inside a
/// transaction.
async fn query_thread(
    client: &firestore::FirestoreDb,
    completion_id: &str,
) -> Result<Vec<MessageDoc>, FirestoreError> {
    client
        .fluent()
        .select()
        .from(collections::MESSAGES)
        .filter(|q| q.for_all([q.field("completion_id").eq(completion_id)]))
        .order_by([
            ("created_at", FirestoreQueryDirection::Ascending),
            ("id", FirestoreQueryDirection::Ascending),
        ])
        .obj()
        .query()
        .await
}

/// Messages in `docs` that still need `viewer`'s receipt, with it set.
fn pending_receipts(
    docs: Vec<MessageDoc>,
    viewer: Role,
    now: DateTime<Utc>,
) -> Result<Vec<MessageDoc>, AppError> {
    let mut pending = Vec::new();
    for doc in docs {
        let mut message = Message::try_from(doc)?;
        if message.mark_read_by(viewer, now) {
            pending.push(MessageDoc::from(&message));
        }
    }
    Ok(pending)
}

#[async_trait]
impl ThreadStore for FirestoreDb {
    /// Single keyed write with no precondition: creates the document or
    /// replaces its submission fields atomically.
    async fn upsert_completion(
        &self,
        student_id: &str,
        workout_id: &str,
        feedback_text: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Completion, AppError> {
        let doc = CompletionDoc::from_parts(student_id, workout_id, feedback_text, now);

        let stored: CompletionDoc = self
            .client
            .fluent()
            .update()
            .fields(SUBMISSION_FIELDS)
            .in_col(collections::COMPLETIONS)
            .document_id(&doc.id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        stored.try_into()
    }

    /// Conditional create; an existing document wins and is returned as-is.
    async fn ensure_completion(
        &self,
        student_id: &str,
        workout_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Completion, AppError> {
        let doc = CompletionDoc::from_parts(student_id, workout_id, None, now);

        let created: Result<CompletionDoc, _> = self
            .client
            .fluent()
            .insert()
            .into(collections::COMPLETIONS)
            .document_id(&doc.id)
            .object(&doc)
            .execute()
            .await;

        match created {
            Ok(stored) => stored.try_into(),
            Err(FirestoreError::DataConflictError(_)) => {
                tracing::debug!(completion_id = %doc.id, "Completion already exists");
                self.get_completion_doc(&doc.id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Storage(format!("Completion {} vanished after conflict", doc.id))
                    })?
                    .try_into()
            }
            Err(e) => Err(AppError::Storage(e.to_string())),
        }
    }

    async fn get_completion(
        &self,
        student_id: &str,
        workout_id: &str,
    ) -> Result<Option<Completion>, AppError> {
        self.get_completion_doc(&Completion::key(student_id, workout_id))
            .await?
            .map(Completion::try_from)
            .transpose()
    }

    async fn list_completions(
        &self,
        student_id: Option<&str>,
    ) -> Result<Vec<Completion>, AppError> {
        let query = self
            .client
            .fluent()
            .select()
            .from(collections::COMPLETIONS);

        let docs: Vec<CompletionDoc> = if let Some(student_id) = student_id {
            query
                .filter(|q| q.for_all([q.field("student_id").eq(student_id)]))
                .obj()
                .query()
                .await
        } else {
            query.obj().query().await
        }
        .map_err(|e| AppError::Storage(e.to_string()))?;

        docs.into_iter().map(Completion::try_from).collect()
    }

    async fn list_active_completions(
        &self,
        student_id: Option<&str>,
        after: Option<&InboxCursor>,
        limit: usize,
    ) -> Result<Vec<Completion>, AppError> {
        // Completions without messages have no inbox_key and so never match
        // a range filter on it.
        let floor =
            after.map(|c| inbox_key(&format_sortable(c.last_activity), &c.completion_id));

        let docs: Vec<CompletionDoc> = self
            .client
            .fluent()
            .select()
            .from(collections::COMPLETIONS)
            .filter(|q| {
                q.for_all([
                    student_id.and_then(|s| q.field("student_id").eq(s)),
                    match floor.as_deref() {
                        Some(floor) => q.field("inbox_key").less_than(floor),
                        None => q.field("inbox_key").greater_than(""),
                    },
                ])
            })
            .order_by([("inbox_key", FirestoreQueryDirection::Descending)])
            .limit(u32::try_from(limit).unwrap_or(u32::MAX))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        docs.into_iter().map(Completion::try_from).collect()
    }

    /// The message and its completion's counters commit together. Concurrent
    /// appends to one thread conflict on the completion and are retried.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, AppError> {
        let message = message.into_message(uuid::Uuid::new_v4().to_string());
        let doc = MessageDoc::from(&message);

        self.client
            .run_transaction(|db, transaction| {
                let doc = doc.clone();
                Box::pin(async move {
                    let completion: Option<CompletionDoc> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::COMPLETIONS)
                        .obj()
                        .one(&doc.completion_id)
                        .await?;

                    db.fluent()
                        .update()
                        .in_col(collections::MESSAGES)
                        .document_id(&doc.id)
                        .object(&doc)
                        .add_to_transaction(transaction)?;

                    if let Some(mut completion) = completion {
                        completion.record_message(&doc.created_at);
                        db.fluent()
                            .update()
                            .fields(THREAD_ACTIVITY_FIELDS)
                            .in_col(collections::COMPLETIONS)
                            .document_id(&completion.id)
                            .object(&completion)
                            .add_to_transaction(transaction)?;
                    }

                    Ok(())
                })
            })
            .await
            .map_err(|e| AppError::Storage(format!("Message insert failed: {}", e)))?;

        doc.try_into()
    }

    async fn last_message(&self, completion_id: &str) -> Result<Option<Message>, AppError> {
        let docs: Vec<MessageDoc> = self
            .client
            .fluent()
            .select()
            .from(collections::MESSAGES)
            .filter(|q| q.for_all([q.field("completion_id").eq(completion_id)]))
            .order_by([
                ("created_at", FirestoreQueryDirection::Descending),
                ("id", FirestoreQueryDirection::Descending),
            ])
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        docs.into_iter().next().map(Message::try_from).transpose()
    }

    async fn list_messages(&self, completion_id: &str) -> Result<Vec<Message>, AppError> {
        query_thread(&self.client, completion_id)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }

    /// Reads the thread and writes the receipts in one transaction. A reader
    /// that lost the race retries, finds the receipts set and writes nothing.
    /// Only the viewer's receipt field is written, so student and staff
    /// receipts never clobber each other.
    async fn mark_read(
        &self,
        completion_id: &str,
        viewer: Role,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let field = receipt_field(viewer);

        let marked = self
            .client
            .run_transaction(|db, transaction| {
                let completion_id = completion_id.to_string();
                Box::pin(async move {
                    let docs = query_thread(&db, &completion_id).await?;
                    let pending = match pending_receipts(docs, viewer, now) {
                        Ok(pending) => pending,
                        Err(e) => return Ok(Err(e)),
                    };

                    for doc in &pending {
                        db.fluent()
                            .update()
                            .fields([field])
                            .in_col(collections::MESSAGES)
                            .document_id(&doc.id)
                            .object(doc)
                            .add_to_transaction(transaction)?;
                    }

                    Ok(Ok(pending.len()))
                })
            })
            .await
            .map_err(|e| AppError::Storage(format!("Read receipt update failed: {}", e)))??;

        Ok(marked)
    }
}

#[async_trait]
impl WorkoutRegistry for FirestoreDb {
    async fn workout_owner(&self, workout_id: &str) -> Result<Option<String>, AppError> {
        let workout: Option<WorkoutDoc> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::WORKOUTS)
            .obj()
            .one(workout_id)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(workout
            .filter(|w| !w.is_template)
            .and_then(|w| w.student_id))
    }
}
