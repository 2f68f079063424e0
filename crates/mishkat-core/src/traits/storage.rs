// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document-store contract for conversations, messages, and sessions.

use async_trait::async_trait;

use crate::error::MishkatError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Conversation, ConversationId, Message, Session, SessionId, SessionStatus, UserId,
};

/// Persistence backend for the chat core.
///
/// Covers the create / append-update / query-by-id / query-by-participant
/// surface. `append_message` must be idempotent on the message id so callers
/// can retry after a transient failure, and `list_messages` must return
/// messages in append order.
#[async_trait]
pub trait ChatStore: PluginAdapter {
    /// Prepares the backend (migrations, connections).
    async fn initialize(&self) -> Result<(), MishkatError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), MishkatError>;

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), MishkatError>;

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, MishkatError>;

    async fn add_participant(
        &self,
        id: &ConversationId,
        user: &UserId,
    ) -> Result<(), MishkatError>;

    async fn conversations_for_participant(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, MishkatError>;

    /// Appends a message. Appending an id that already exists is a no-op.
    async fn append_message(&self, message: &Message) -> Result<(), MishkatError>;

    /// All messages of a conversation in append order.
    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, MishkatError>;

    /// Records how many messages of the conversation `user` has seen.
    async fn save_read_position(
        &self,
        id: &ConversationId,
        user: &UserId,
        position: u64,
    ) -> Result<(), MishkatError>;

    async fn read_positions(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<(UserId, u64)>, MishkatError>;

    /// Inserts or replaces a session record.
    async fn upsert_session(&self, session: &Session) -> Result<(), MishkatError>;

    /// Replaces a session only while its stored status is still `expected`.
    ///
    /// Returns `false` when the record is missing or another writer has
    /// already moved it to a different status.
    async fn update_session(
        &self,
        session: &Session,
        expected: SessionStatus,
    ) -> Result<bool, MishkatError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, MishkatError>;

    /// Sessions, optionally filtered by status, oldest first.
    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, MishkatError>;
}
