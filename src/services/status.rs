// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Conversation status derivation.
//!
//! Pure functions over an ordered message list; no storage access. The list
//! must be in thread order (ascending `created_at`).

use crate::models::{
    CoachStatus, Completion, InteractionType, Message, Role, StudentStatus, ThreadStatus,
};
use chrono::{DateTime, Utc};

/// `Feedback` iff the thread is exactly one student-authored message.
pub fn interaction_type(messages: &[Message]) -> InteractionType {
    match messages {
        [only] if only.from_student() => InteractionType::Feedback,
        _ => InteractionType::Conversation,
    }
}

fn last_from_staff(messages: &[Message]) -> bool {
    messages.last().is_some_and(Message::from_staff)
}

fn student_message_unseen_by_staff(messages: &[Message]) -> bool {
    messages
        .iter()
        .any(|m| m.from_student() && m.read_by_coach_at.is_none())
}

/// Status as the coach sees it. `None` for an empty thread, which has no
/// coach-facing status and never appears in an inbox.
pub fn status_for_coach(messages: &[Message]) -> Option<CoachStatus> {
    if messages.is_empty() {
        return None;
    }
    Some(if student_message_unseen_by_staff(messages) {
        CoachStatus::Pending
    } else if last_from_staff(messages) {
        CoachStatus::Replied
    } else {
        CoachStatus::Seen
    })
}

/// Status as the student sees it.
pub fn status_for_student(messages: &[Message]) -> StudentStatus {
    if last_from_staff(messages) {
        StudentStatus::Replied
    } else if student_message_unseen_by_staff(messages) {
        StudentStatus::Sent
    } else {
        StudentStatus::Seen
    }
}

/// Badge signal: some staff message has not been seen by the student yet.
pub fn has_unread_staff_reply(messages: &[Message]) -> bool {
    messages
        .iter()
        .any(|m| m.from_staff() && m.read_by_student_at.is_none())
}

/// Status for whichever side is viewing. Empty threads have none.
pub fn status_for(viewer: Role, messages: &[Message]) -> Option<ThreadStatus> {
    if messages.is_empty() {
        return None;
    }
    if viewer.is_staff() {
        status_for_coach(messages).map(ThreadStatus::Coach)
    } else {
        Some(ThreadStatus::Student(status_for_student(messages)))
    }
}

/// Latest message time, falling back to the completion time for empty threads.
pub fn last_activity(completion: &Completion, messages: &[Message]) -> DateTime<Utc> {
    messages
        .last()
        .map(|m| m.created_at)
        .unwrap_or(completion.completed_at)
}
