// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Derived conversation state, as shown to each side.
//!
//! Computed by `services::status`; never stored.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Whether a thread is a lone piece of student feedback or a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum InteractionType {
    Feedback,
    Conversation,
}

/// Thread status from the coach's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum CoachStatus {
    /// Some student message has not been seen by staff.
    Pending,
    /// Staff saw everything but the student spoke last.
    Seen,
    /// Staff sent the latest message.
    Replied,
}

/// Thread status from the student's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum StudentStatus {
    /// Waiting for staff to see the student's message.
    Sent,
    Seen,
    Replied,
}

/// Status for whichever side is looking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ThreadStatus {
    Coach(CoachStatus),
    Student(StudentStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_plain_string() {
        let json = serde_json::to_string(&ThreadStatus::Coach(CoachStatus::Pending)).unwrap();
        assert_eq!(json, "\"pending\"");

        let json = serde_json::to_string(&ThreadStatus::Student(StudentStatus::Replied)).unwrap();
        assert_eq!(json, "\"replied\"");

        let json = serde_json::to_string(&InteractionType::Feedback).unwrap();
        assert_eq!(json, "\"feedback\"");
    }
}
