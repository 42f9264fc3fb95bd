// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Thread message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Role;

/// One entry in a completion's conversation thread.
///
/// Immutable after creation except for the two read receipts, which only
/// ever go from `None` to `Some`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Message {
    pub id: String,
    pub completion_id: String,
    pub author_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub author_role: Role,
    pub text: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    /// When the student first saw this message (staff-authored messages only)
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub read_by_student_at: Option<DateTime<Utc>>,
    /// When staff first saw this message (student-authored messages only)
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub read_by_coach_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn from_staff(&self) -> bool {
        self.author_role.is_staff()
    }

    pub fn from_student(&self) -> bool {
        self.author_role.is_student()
    }

    /// The read receipt a viewer with `viewer` role is responsible for.
    pub fn read_receipt_for(&self, viewer: Role) -> Option<DateTime<Utc>> {
        if viewer.is_staff() {
            self.read_by_coach_at
        } else {
            self.read_by_student_at
        }
    }

    /// Whether a viewer with `viewer` role still has to mark this message seen.
    pub fn unread_by(&self, viewer: Role) -> bool {
        self.author_role.is_opposite(viewer) && self.read_receipt_for(viewer).is_none()
    }

    /// Set the viewer's read receipt if it is still empty.
    ///
    /// Returns `true` if the receipt changed. Never overwrites an existing one.
    pub fn mark_read_by(&mut self, viewer: Role, now: DateTime<Utc>) -> bool {
        if !self.unread_by(viewer) {
            return false;
        }
        if viewer.is_staff() {
            self.read_by_coach_at = Some(now);
        } else {
            self.read_by_student_at = Some(now);
        }
        true
    }
}

/// A message about to be stored.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub completion_id: String,
    pub author_id: String,
    pub author_role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Materialize into a stored message with the given id and no receipts.
    pub fn into_message(self, id: String) -> Message {
        Message {
            id,
            completion_id: self.completion_id,
            author_id: self.author_id,
            author_role: self.author_role,
            text: self.text,
            created_at: self.created_at,
            read_by_student_at: None,
            read_by_coach_at: None,
        }
    }
}

/// Result of appending to a thread.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// A new message row was written.
    Created(Message),
    /// The author's latest message already had this text; nothing was written.
    /// Carries that existing message so callers can echo it.
    Duplicate(Message),
}

impl AppendOutcome {
    pub fn was_created(&self) -> bool {
        matches!(self, AppendOutcome::Created(_))
    }

    pub fn message(&self) -> &Message {
        match self {
            AppendOutcome::Created(m) | AppendOutcome::Duplicate(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            AppendOutcome::Created(m) | AppendOutcome::Duplicate(m) => m,
        }
    }
}
