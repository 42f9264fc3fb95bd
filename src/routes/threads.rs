// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Completion and conversation routes for authenticated users.

use crate::db::with_deadline;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Completion, InboxCursor, Message};
use crate::services::{InboxEntry, ThreadView};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Thread routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/completions", post(submit_completion))
        .route("/api/messages", post(send_message))
        .route("/api/thread", get(get_thread))
        .route("/api/inbox", get(get_inbox))
}

/// Work out whose thread the caller is addressing.
///
/// Students always address their own thread and must own the workout. Staff
/// must name the student, who must own the workout.
async fn resolve_student(
    state: &AppState,
    user: &AuthUser,
    workout_id: &str,
    student_id: Option<&str>,
) -> Result<String> {
    if user.role.is_staff() && student_id.is_none() {
        return Err(AppError::Validation(
            "student_id is required for staff".to_string(),
        ));
    }

    let owner = with_deadline(
        state.config.storage_timeout,
        "workout_owner",
        state.workouts.workout_owner(workout_id),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Workout {workout_id} not found")))?;

    if user.role.is_student() {
        let addresses_self = student_id.is_none_or(|s| s == user.user_id);
        if owner != user.user_id || !addresses_self {
            tracing::warn!(
                user_id = %user.user_id,
                workout_id,
                "Student addressed a workout they do not own"
            );
            return Err(AppError::NotAuthorized(
                "Workout belongs to another student".to_string(),
            ));
        }
        return Ok(owner);
    }

    match student_id {
        Some(student_id) if student_id == owner => Ok(owner),
        _ => Err(AppError::NotFound(format!(
            "Workout {workout_id} is not assigned to that student"
        ))),
    }
}

// ─── Completions ─────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct SubmitCompletionRequest {
    #[validate(custom(function = "crate::models::ids::check_identifier"))]
    workout_id: String,
    feedback_text: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SubmitCompletionResponse {
    pub completion: Completion,
    /// False for blank feedback and for a repeat of the latest message
    pub message_created: bool,
    /// The stored message, or the earlier one a repeat was folded into
    pub message: Option<Message>,
}

/// Mark a workout as done, with optional feedback.
async fn submit_completion(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SubmitCompletionRequest>,
) -> Result<Json<SubmitCompletionResponse>> {
    payload.validate()?;
    // Staff go straight to the service, which refuses them.
    let student_id = if user.role.is_student() {
        resolve_student(&state, &user, &payload.workout_id, None).await?
    } else {
        user.user_id.clone()
    };

    let outcome = state
        .threads
        .submit_completion(
            user.role,
            &student_id,
            &payload.workout_id,
            payload.feedback_text.as_deref(),
        )
        .await?;

    Ok(Json(SubmitCompletionResponse {
        message_created: outcome.message_created(),
        message: outcome.message.map(|m| m.into_message()),
        completion: outcome.completion,
    }))
}

// ─── Messages ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct SendMessageRequest {
    #[validate(custom(function = "crate::models::ids::check_identifier"))]
    workout_id: String,
    text: String,
    /// Required when the caller is staff
    #[validate(custom(function = "crate::models::ids::check_identifier"))]
    student_id: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SendMessageResponse {
    pub completion_id: String,
    pub message: Message,
    /// False when the text repeated the thread's latest message
    pub created: bool,
}

/// Post into a thread. Returns 201 for a new message, 200 for an echo.
async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>)> {
    payload.validate()?;
    let student_id = resolve_student(
        &state,
        &user,
        &payload.workout_id,
        payload.student_id.as_deref(),
    )
    .await?;

    let sent = state
        .threads
        .send_message(
            user.role,
            &user.user_id,
            &student_id,
            &payload.workout_id,
            &payload.text,
        )
        .await?;

    let created = sent.outcome.was_created();
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(SendMessageResponse {
            completion_id: sent.completion_id,
            message: sent.outcome.into_message(),
            created,
        }),
    ))
}

// ─── Thread ──────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct ThreadQuery {
    #[validate(custom(function = "crate::models::ids::check_identifier"))]
    workout_id: String,
    #[validate(custom(function = "crate::models::ids::check_identifier"))]
    student_id: Option<String>,
}

/// Load a thread. Viewing marks the other side's messages as seen.
async fn get_thread(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ThreadQuery>,
) -> Result<Json<ThreadView>> {
    params.validate()?;
    let student_id = resolve_student(
        &state,
        &user,
        &params.workout_id,
        params.student_id.as_deref(),
    )
    .await?;

    let view = state
        .threads
        .fetch_thread(user.role, &student_id, &params.workout_id)
        .await?;

    Ok(Json(view))
}

// ─── Inbox ───────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct InboxQuery {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    limit: usize,
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
}

fn default_limit() -> usize {
    50
}

const MAX_LIMIT: usize = 100;
const CURSOR_PARTS: usize = 3;

fn parse_cursor(cursor: Option<&str>) -> Result<Option<InboxCursor>> {
    cursor
        .map(|raw| {
            let invalid_cursor = || AppError::Validation("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;

            // Completion ids contain ':' themselves, so only split off the
            // two leading numeric parts.
            let parts: Vec<&str> = decoded_str.splitn(CURSOR_PARTS, ':').collect();
            if parts.len() != CURSOR_PARTS || parts[2].is_empty() {
                return Err(invalid_cursor());
            }

            let seconds = parts[0].parse::<i64>().map_err(|_| invalid_cursor())?;
            let nanos = parts[1].parse::<u32>().map_err(|_| invalid_cursor())?;
            let last_activity =
                chrono::DateTime::from_timestamp(seconds, nanos).ok_or_else(invalid_cursor)?;

            Ok(InboxCursor {
                last_activity,
                completion_id: parts[2].to_string(),
            })
        })
        .transpose()
}

fn encode_cursor(cursor: &InboxCursor) -> String {
    let payload = format!(
        "{}:{}:{}",
        cursor.last_activity.timestamp(),
        cursor.last_activity.timestamp_subsec_nanos(),
        cursor.completion_id
    );
    URL_SAFE_NO_PAD.encode(payload)
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct InboxResponse {
    pub entries: Vec<InboxEntry>,
    pub next_cursor: Option<String>,
}

/// List threads with activity, newest first.
async fn get_inbox(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<InboxQuery>,
) -> Result<Json<InboxResponse>> {
    params.validate()?;
    tracing::debug!(
        user_id = %user.user_id,
        role = %user.role,
        limit = params.limit,
        cursor = ?params.cursor,
        "Fetching inbox"
    );

    let limit = params.limit.min(MAX_LIMIT);
    let cursor = parse_cursor(params.cursor.as_deref())?;

    let page = state
        .threads
        .inbox(user.role, &user.user_id, limit, cursor.as_ref())
        .await?;

    Ok(Json(InboxResponse {
        entries: page.entries,
        next_cursor: page.next_cursor.as_ref().map(encode_cursor),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_cursor_keeps_colons_in_completion_id() {
        let cursor = InboxCursor {
            last_activity: Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap(),
            completion_id: Completion::key("aluno:1", "treino%2"),
        };
        let parsed = parse_cursor(Some(encode_cursor(&cursor).as_str())).unwrap();
        assert_eq!(parsed, Some(cursor));
    }

    #[test]
    fn test_rejects_malformed_cursor() {
        let malformed = [
            "not base64!".to_string(),
            String::new(),
            URL_SAFE_NO_PAD.encode("12:34"),
            URL_SAFE_NO_PAD.encode("x:0:s1:w1"),
            URL_SAFE_NO_PAD.encode("12:34:"),
        ];
        for raw in &malformed {
            assert!(
                matches!(parse_cursor(Some(raw.as_str())), Err(AppError::Validation(_))),
                "cursor {raw:?} should be rejected"
            );
        }
        assert_eq!(parse_cursor(None).unwrap(), None);
    }
}
