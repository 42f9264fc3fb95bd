// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod completion_store;
pub mod message_thread;
pub mod status;
pub mod thread_service;

pub use completion_store::CompletionStore;
pub use message_thread::MessageThread;
pub use thread_service::{InboxEntry, InboxPage, ThreadService, ThreadView};
