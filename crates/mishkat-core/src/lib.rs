// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mishkat chat core.
//!
//! This crate provides the error taxonomy, the message/conversation/session
//! data model, and the collaborator traits (persistence, escalation history,
//! response cache, classification, content lookup, identity) that the rest of
//! the workspace is built on.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::MishkatError;
pub use types::{
    AdapterType, CachedReply, ConfidenceLevel, Conversation, ConversationId, ConversationKind,
    DeliveryStatus, EscalationDecision, EscalationReason, HealthStatus, Identity, Message,
    MessageId, Priority, ReplyCategory, Responder, ResponderMetadata, Sender, Session, SessionId,
    SessionKind, SessionStatus, UserId,
};

pub use traits::{
    ChatStore, Classifier, ContentLookup, EscalationHistoryStore, IdentityProvider,
    PluginAdapter, ResponseCache,
};
