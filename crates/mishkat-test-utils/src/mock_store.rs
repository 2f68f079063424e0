// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat store wrapper with injectable failures.
//!
//! `FlakyStore` delegates to any [`ChatStore`] but fails the next `n` writes
//! with a retryable persistence error, for exercising retry and failed-send
//! paths. Reads always pass through.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use mishkat_core::{
    AdapterType, ChatStore, Conversation, ConversationId, HealthStatus, Message, MishkatError,
    PluginAdapter, Session, SessionId, SessionStatus, UserId,
};

pub struct FlakyStore<S> {
    inner: S,
    failures: AtomicU32,
}

impl<S: ChatStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` store writes, whatever they are.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Failures still pending.
    pub fn pending_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    fn check(&self, op: &str) -> Result<(), MishkatError> {
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            tracing::debug!(op, "injected store failure");
            return Err(MishkatError::persistence(format!("injected failure in {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ChatStore> PluginAdapter for FlakyStore<S> {
    fn name(&self) -> &str {
        "flaky"
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MishkatError> {
        if self.pending_failures() > 0 {
            return Ok(HealthStatus::Degraded("failures pending".to_string()));
        }
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), MishkatError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl<S: ChatStore> ChatStore for FlakyStore<S> {
    async fn initialize(&self) -> Result<(), MishkatError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), MishkatError> {
        self.inner.close().await
    }

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), MishkatError> {
        self.check("create_conversation")?;
        self.inner.create_conversation(conversation).await
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, MishkatError> {
        self.inner.get_conversation(id).await
    }

    async fn add_participant(
        &self,
        id: &ConversationId,
        user: &UserId,
    ) -> Result<(), MishkatError> {
        self.check("add_participant")?;
        self.inner.add_participant(id, user).await
    }

    async fn conversations_for_participant(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, MishkatError> {
        self.inner.conversations_for_participant(user).await
    }

    async fn append_message(&self, message: &Message) -> Result<(), MishkatError> {
        self.check("append_message")?;
        self.inner.append_message(message).await
    }

    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, MishkatError> {
        self.inner.list_messages(id).await
    }

    async fn save_read_position(
        &self,
        id: &ConversationId,
        user: &UserId,
        position: u64,
    ) -> Result<(), MishkatError> {
        self.check("save_read_position")?;
        self.inner.save_read_position(id, user, position).await
    }

    async fn read_positions(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<(UserId, u64)>, MishkatError> {
        self.inner.read_positions(id).await
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), MishkatError> {
        self.check("upsert_session")?;
        self.inner.upsert_session(session).await
    }

    async fn update_session(
        &self,
        session: &Session,
        expected: SessionStatus,
    ) -> Result<bool, MishkatError> {
        self.check("update_session")?;
        self.inner.update_session(session, expected).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, MishkatError> {
        self.inner.get_session(id).await
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, MishkatError> {
        self.inner.list_sessions(status).await
    }
}
