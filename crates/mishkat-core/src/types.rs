// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model shared by the classifier, storage, and chat service crates.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Creates an id from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh random id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Opaque user identifier issued by the external identity provider.
    UserId
);
string_id!(
    /// Unique identifier for a message. Client-generated so appends are idempotent.
    MessageId
);
string_id!(
    /// Unique identifier for a conversation (room, thread, or support conversation).
    ConversationId
);
string_id!(
    /// Unique identifier for a support session or ticket.
    SessionId
);

/// Who authored a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
    Operator,
}

/// The kind of responder that produced a reply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Responder {
    Assistant,
    Operator,
}

/// Coarse self-reported certainty attached to a reply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Metadata describing how a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponderMetadata {
    pub responder: Responder,
    pub confidence: ConfidenceLevel,
    /// Set when the reply asks for (or announces) a human handoff.
    pub escalation_flag: bool,
}

/// A single chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    /// The human author, if any. `None` for assistant messages.
    pub author: Option<UserId>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<ResponderMetadata>,
}

impl Message {
    /// A message typed by a user.
    pub fn from_user(conversation_id: ConversationId, author: UserId, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            sender: Sender::User,
            author: Some(author),
            text: text.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// A reply produced by the automated assistant.
    pub fn from_assistant(
        conversation_id: ConversationId,
        text: impl Into<String>,
        metadata: ResponderMetadata,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            sender: Sender::Assistant,
            author: None,
            text: text.into(),
            timestamp: Utc::now(),
            metadata: Some(metadata),
        }
    }

    /// A reply typed by a human operator.
    pub fn from_operator(
        conversation_id: ConversationId,
        operator: UserId,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            sender: Sender::Operator,
            author: Some(operator),
            text: text.into(),
            timestamp: Utc::now(),
            metadata: Some(ResponderMetadata {
                responder: Responder::Operator,
                confidence: ConfidenceLevel::High,
                escalation_flag: false,
            }),
        }
    }

    pub fn escalation_flag(&self) -> bool {
        self.metadata.is_some_and(|m| m.escalation_flag)
    }
}

/// The three chat surfaces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    CommunityRoom,
    DirectThread,
    SupportTicket,
}

/// An ordered, append-only message log shared by a set of participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub participants: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        kind: ConversationKind,
        title: Option<String>,
        participants: impl IntoIterator<Item = UserId>,
    ) -> Self {
        Self {
            id: ConversationId::generate(),
            kind,
            title,
            participants: participants.into_iter().collect(),
            created_at: Utc::now(),
        }
    }
}

/// Whether a message reached the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Lifecycle status of a support session or ticket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Active,
    Resolved,
    Closed,
}

impl SessionStatus {
    /// Resolved and closed sessions accept no further transitions
    /// (other than reopening a resolved session).
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Resolved | SessionStatus::Closed)
    }
}

/// Support priority. Ordered from least to most urgent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Why a conversation was routed to a human operator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationReason {
    AdminRequest,
    FatwaRequest,
    SensitiveTopic,
    PaymentIssue,
    TechnicalSupport,
    DisputeAuthenticity,
    EmotionalSupport,
    ConfusionAfterAi,
    /// The assistant could not answer in time; routed to a human as a fail-safe.
    AssistantUnavailable,
}

impl EscalationReason {
    /// The priority a session gets when it is created for this reason.
    pub fn default_priority(self) -> Priority {
        match self {
            EscalationReason::PaymentIssue => Priority::Urgent,
            EscalationReason::FatwaRequest
            | EscalationReason::SensitiveTopic
            | EscalationReason::EmotionalSupport
            | EscalationReason::AssistantUnavailable => Priority::High,
            EscalationReason::AdminRequest
            | EscalationReason::TechnicalSupport
            | EscalationReason::DisputeAuthenticity
            | EscalationReason::ConfusionAfterAi => Priority::Normal,
        }
    }
}

/// Outcome of running the escalation classifier over a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationDecision {
    pub requires_human: bool,
    pub reason: Option<EscalationReason>,
}

impl EscalationDecision {
    pub fn automated() -> Self {
        Self {
            requires_human: false,
            reason: None,
        }
    }

    pub fn escalate(reason: EscalationReason) -> Self {
        Self {
            requires_human: true,
            reason: Some(reason),
        }
    }
}

/// Session flavour: escalated chat or explicitly filed ticket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Chat,
    Ticket,
}

/// A tracked support interaction attached to a support conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub kind: SessionKind,
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub status: SessionStatus,
    pub priority: Priority,
    pub escalation_reason: EscalationReason,
    pub assigned_operator: Option<UserId>,
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Template family used to shape an automated reply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyCategory {
    HadithExplanation,
    AppGuidance,
    TechnicalHelp,
    GeneralIslamic,
    Escalation,
    Clarification,
}

/// A previously generated reply, keyed by normalized message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedReply {
    pub text: String,
    pub category: ReplyCategory,
    pub metadata: ResponderMetadata,
}

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    HistoryStore,
    ResponseCache,
    ContentLookup,
    Identity,
}
