// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat core for Mishkat.
//!
//! The [`ChatService`] is the entry point. It:
//! - Appends messages to per-conversation ordered logs
//! - Classifies support messages and generates assistant replies
//! - Routes conversations that need a human into the operator queue
//! - Drives the session and ticket lifecycle
//! - Publishes [`ChatEvent`]s for observers

pub mod conversation;
pub mod events;
pub mod generator;
pub mod retry;
pub mod service;
pub mod session;

pub use conversation::ConversationStore;
pub use events::{ChatEvent, EventBus};
pub use generator::{GeneratedReply, ResponseGenerator, cache_key};
pub use retry::RetryPolicy;
pub use service::{ChatService, Exchange, StoreStatus};
pub use session::{SessionManager, TicketRequest};
