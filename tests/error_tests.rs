// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use coachline::config::Config;
use coachline::db::ThreadStore;
use coachline::error::AppError;
use coachline::models::{Completion, InboxCursor, Message, NewMessage, Role};
use coachline::services::ThreadService;
use std::sync::Arc;
use std::time::Duration;

mod common;

#[test]
fn test_error_status_mapping() {
    let cases = [
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
        (
            AppError::NotAuthorized("staff".to_string()),
            StatusCode::FORBIDDEN,
        ),
        (AppError::NotFound("w1".to_string()), StatusCode::NOT_FOUND),
        (
            AppError::Validation("blank".to_string()),
            StatusCode::BAD_REQUEST,
        ),
        (
            AppError::Storage("down".to_string()),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            AppError::Internal(anyhow::anyhow!("boom")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, status) in cases {
        assert_eq!(err.into_response().status(), status);
    }
}

#[tokio::test]
async fn test_storage_details_are_not_echoed() {
    let response = AppError::Storage("connection to 10.0.0.7 refused".to_string()).into_response();
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "storage_unavailable");
    assert!(body.get("details").is_none());
}

#[test]
fn test_only_storage_errors_are_transient() {
    assert!(AppError::Storage("timeout".to_string()).is_transient());
    assert!(!AppError::Validation("blank".to_string()).is_transient());
    assert!(!AppError::NotFound("thread".to_string()).is_transient());
}

/// Store whose every call outlives any reasonable deadline.
struct StalledStore;

impl StalledStore {
    async fn stall<T>() -> Result<T, AppError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(AppError::Storage("unreachable".to_string()))
    }
}

#[async_trait]
impl ThreadStore for StalledStore {
    async fn upsert_completion(
        &self,
        _student_id: &str,
        _workout_id: &str,
        _feedback_text: Option<String>,
        _now: DateTime<Utc>,
    ) -> Result<Completion, AppError> {
        Self::stall().await
    }

    async fn ensure_completion(
        &self,
        _student_id: &str,
        _workout_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<Completion, AppError> {
        Self::stall().await
    }

    async fn get_completion(
        &self,
        _student_id: &str,
        _workout_id: &str,
    ) -> Result<Option<Completion>, AppError> {
        Self::stall().await
    }

    async fn list_completions(
        &self,
        _student_id: Option<&str>,
    ) -> Result<Vec<Completion>, AppError> {
        Self::stall().await
    }

    async fn list_active_completions(
        &self,
        _student_id: Option<&str>,
        _after: Option<&InboxCursor>,
        _limit: usize,
    ) -> Result<Vec<Completion>, AppError> {
        Self::stall().await
    }

    async fn insert_message(&self, _message: NewMessage) -> Result<Message, AppError> {
        Self::stall().await
    }

    async fn last_message(&self, _completion_id: &str) -> Result<Option<Message>, AppError> {
        Self::stall().await
    }

    async fn list_messages(&self, _completion_id: &str) -> Result<Vec<Message>, AppError> {
        Self::stall().await
    }

    async fn mark_read(
        &self,
        _completion_id: &str,
        _viewer: Role,
        _now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        Self::stall().await
    }
}

#[tokio::test]
async fn test_storage_deadline_surfaces_as_transient() {
    let mut config = Config::test_default();
    config.storage_timeout = Duration::from_millis(20);
    let service = ThreadService::new(Arc::new(StalledStore), &config);

    let err = service
        .submit_completion(Role::Student, "s1", "w1", Some("feito"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));
    assert!(err.is_transient());

    let err = service
        .fetch_thread(Role::COACH, "s1", "w1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));
}
