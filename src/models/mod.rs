// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod completion;
pub mod ids;
pub mod message;
pub mod role;
pub mod status;

pub use completion::{Completion, InboxCursor};
pub use ids::validate_identifier;
pub use message::{AppendOutcome, Message, NewMessage};
pub use role::{Role, StaffRole};
pub use status::{CoachStatus, InteractionType, StudentStatus, ThreadStatus};
