// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered message logs and per-user read state.
//!
//! Each conversation has its own lock, so appends to one conversation are
//! strictly ordered by call sequence while different conversations proceed
//! independently. The committed log and read positions are reloaded from the
//! store under that lock before every operation, so writes made by another
//! process sharing the store are visible. Messages that cannot be stored
//! after retries stay visible in a local outbox marked
//! [`DeliveryStatus::Failed`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use mishkat_core::{
    ChatStore, Conversation, ConversationId, ConversationKind, DeliveryStatus, Message, MessageId,
    MishkatError, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};

use crate::events::{ChatEvent, EventBus};
use crate::retry::RetryPolicy;

struct ConversationState {
    conversation: Conversation,
    log: Vec<Message>,
    ids: HashSet<MessageId>,
    failed: Vec<Message>,
    read: HashMap<UserId, u64>,
}

impl ConversationState {
    fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            log: Vec::new(),
            ids: HashSet::new(),
            failed: Vec::new(),
            read: HashMap::new(),
        }
    }

    /// Messages past the read position written by someone else. Users outside
    /// the conversation have nothing unread.
    fn unread_for(&self, user: &UserId) -> u64 {
        if !self.conversation.participants.contains(user) {
            return 0;
        }
        let seen = self.read.get(user).copied().unwrap_or(0) as usize;
        self.log
            .iter()
            .skip(seen)
            .filter(|m| m.author.as_ref() != Some(user))
            .count() as u64
    }
}

type Entry = Arc<Mutex<ConversationState>>;

/// Conversation logs for all three chat surfaces.
pub struct ConversationStore {
    store: Arc<dyn ChatStore>,
    cache: DashMap<ConversationId, Entry>,
    /// Serializes direct-thread lookup-or-create.
    threads: Mutex<()>,
    retry: RetryPolicy,
    events: EventBus,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn ChatStore>, retry: RetryPolicy, events: EventBus) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            threads: Mutex::new(()),
            retry,
            events,
        }
    }

    async fn entry(&self, id: &ConversationId) -> Result<Entry, MishkatError> {
        if let Some(entry) = self.cache.get(id) {
            return Ok(entry.value().clone());
        }
        let conversation = self
            .store
            .get_conversation(id)
            .await?
            .ok_or_else(|| MishkatError::unknown(id))?;
        Ok(self
            .cache
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(conversation))))
            .value()
            .clone())
    }

    /// Lock the conversation and bring it up to date with the store.
    async fn locked(
        &self,
        id: &ConversationId,
    ) -> Result<OwnedMutexGuard<ConversationState>, MishkatError> {
        let mut state = self.entry(id).await?.lock_owned().await;
        if let Some(conversation) = self.store.get_conversation(id).await? {
            state.conversation = conversation;
        }
        let log = self.store.list_messages(id).await?;
        if log.len() != state.log.len() {
            trace!(
                conversation_id = %id,
                cached = state.log.len(),
                stored = log.len(),
                "conversation log reloaded"
            );
            state.ids = log.iter().map(|m| m.id.clone()).collect();
            state.log = log;
        }
        state.read = self.store.read_positions(id).await?.into_iter().collect();
        let ConversationState { ids, failed, .. } = &mut *state;
        failed.retain(|m| !ids.contains(&m.id));
        Ok(state)
    }

    async fn create(&self, conversation: Conversation) -> Result<Conversation, MishkatError> {
        self.retry
            .run("create_conversation", || {
                self.store.create_conversation(&conversation)
            })
            .await?;
        debug!(conversation_id = %conversation.id, kind = %conversation.kind, "conversation created");
        self.cache.insert(
            conversation.id.clone(),
            Arc::new(Mutex::new(ConversationState::new(conversation.clone()))),
        );
        Ok(conversation)
    }

    /// Create a community room with `creator` as its first member.
    pub async fn create_room(
        &self,
        title: &str,
        creator: &UserId,
    ) -> Result<Conversation, MishkatError> {
        self.create(Conversation::new(
            ConversationKind::CommunityRoom,
            Some(title.to_string()),
            [creator.clone()],
        ))
        .await
    }

    pub async fn join_room(&self, room: &ConversationId, user: &UserId) -> Result<(), MishkatError> {
        let kind = self.get(room).await?.kind;
        if kind != ConversationKind::CommunityRoom {
            return Err(MishkatError::InvalidRequest(format!(
                "conversation {room} is a {kind}, not a community room"
            )));
        }
        self.add_participant(room, user).await
    }

    /// Add a participant to any conversation. Adding an existing one is a no-op.
    ///
    /// A new participant starts with everything already in the log marked
    /// as read.
    pub async fn add_participant(
        &self,
        id: &ConversationId,
        user: &UserId,
    ) -> Result<(), MishkatError> {
        let mut state = self.locked(id).await?;
        if state.conversation.participants.contains(user) {
            return Ok(());
        }
        let position = state.log.len() as u64;
        self.retry
            .run("add_participant", || self.store.add_participant(id, user))
            .await?;
        self.retry
            .run("save_read_position", || {
                self.store.save_read_position(id, user, position)
            })
            .await?;
        state.conversation.participants.insert(user.clone());
        state.read.insert(user.clone(), position);
        Ok(())
    }

    /// The 1:1 thread between `a` and `b`, created on first use.
    pub async fn open_direct_thread(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Conversation, MishkatError> {
        let _guard = self.threads.lock().await;
        let existing = self
            .store
            .conversations_for_participant(a)
            .await?
            .into_iter()
            .find(|c| {
                c.kind == ConversationKind::DirectThread
                    && c.participants.contains(b)
                    && c.participants.len() == if a == b { 1 } else { 2 }
            });
        if let Some(thread) = existing {
            return Ok(thread);
        }
        self.create(Conversation::new(
            ConversationKind::DirectThread,
            None,
            [a.clone(), b.clone()],
        ))
        .await
    }

    /// The user's assistant support conversation, created on first use.
    ///
    /// Tickets get their own conversations and are never returned here.
    pub async fn open_support_conversation(
        &self,
        user: &UserId,
    ) -> Result<Conversation, MishkatError> {
        let _guard = self.threads.lock().await;
        let existing = self
            .store
            .conversations_for_participant(user)
            .await?
            .into_iter()
            .find(|c| c.kind == ConversationKind::SupportTicket && c.title.is_none());
        if let Some(conversation) = existing {
            return Ok(conversation);
        }
        self.create(Conversation::new(
            ConversationKind::SupportTicket,
            None,
            [user.clone()],
        ))
        .await
    }

    /// A fresh support conversation for a filed ticket.
    pub async fn create_ticket_conversation(
        &self,
        user: &UserId,
        subject: &str,
    ) -> Result<Conversation, MishkatError> {
        self.create(Conversation::new(
            ConversationKind::SupportTicket,
            Some(subject.to_string()),
            [user.clone()],
        ))
        .await
    }

    pub async fn conversations_for(&self, user: &UserId) -> Result<Vec<Conversation>, MishkatError> {
        self.store.conversations_for_participant(user).await
    }

    pub async fn get(&self, id: &ConversationId) -> Result<Conversation, MishkatError> {
        let state = self.locked(id).await?;
        Ok(state.conversation.clone())
    }

    /// Append `message` to the conversation's log.
    ///
    /// The store write is retried with backoff. If it still fails the
    /// message is kept in the failed outbox, `DeliveryFailed` is emitted,
    /// and the persistence error is returned.
    pub async fn append(&self, id: &ConversationId, message: Message) -> Result<(), MishkatError> {
        if &message.conversation_id != id {
            return Err(MishkatError::InvalidRequest(format!(
                "message {} belongs to {}, not {id}",
                message.id, message.conversation_id
            )));
        }
        let mut state = self.locked(id).await?;
        self.commit(&mut state, message).await
    }

    async fn commit(
        &self,
        state: &mut ConversationState,
        message: Message,
    ) -> Result<(), MishkatError> {
        if state.ids.contains(&message.id) {
            debug!(message_id = %message.id, "message already committed");
            return Ok(());
        }

        let result = self
            .retry
            .run("append_message", || self.store.append_message(&message))
            .await;

        match result {
            Ok(()) => {
                state.failed.retain(|m| m.id != message.id);
                state.ids.insert(message.id.clone());
                state.log.push(message.clone());
                self.events.publish(ChatEvent::NewMessage { message });
                Ok(())
            }
            Err(e) => {
                warn!(
                    conversation_id = %message.conversation_id,
                    message_id = %message.id,
                    error = %e,
                    "message held locally after failed delivery"
                );
                self.events.publish(ChatEvent::DeliveryFailed {
                    conversation_id: message.conversation_id.clone(),
                    message_id: message.id.clone(),
                });
                if !state.failed.iter().any(|m| m.id == message.id) {
                    state.failed.push(message);
                }
                Err(e)
            }
        }
    }

    /// Re-attempt delivery of a failed message, keeping its id. Returns the
    /// message once it is committed.
    pub async fn retry_failed(
        &self,
        id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Message, MishkatError> {
        let mut state = self.locked(id).await?;
        let message = state
            .failed
            .iter()
            .find(|m| &m.id == message_id)
            .cloned()
            .ok_or_else(|| {
                MishkatError::InvalidRequest(format!("no failed message {message_id} in {id}"))
            })?;
        self.commit(&mut state, message.clone()).await?;
        Ok(message)
    }

    /// The committed log in append order.
    pub async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, MishkatError> {
        let state = self.locked(id).await?;
        Ok(state.log.clone())
    }

    /// The committed log followed by messages still awaiting delivery.
    pub async fn list_with_status(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<(Message, DeliveryStatus)>, MishkatError> {
        let state = self.locked(id).await?;
        Ok(state
            .log
            .iter()
            .map(|m| (m.clone(), DeliveryStatus::Sent))
            .chain(state.failed.iter().map(|m| (m.clone(), DeliveryStatus::Failed)))
            .collect())
    }

    pub async fn failed_messages(&self, id: &ConversationId) -> Result<Vec<Message>, MishkatError> {
        let state = self.locked(id).await?;
        Ok(state.failed.clone())
    }

    /// Committed messages after `user`'s read position not written by `user`.
    /// Always zero for users who are not participants.
    pub async fn unread_count(
        &self,
        id: &ConversationId,
        user: &UserId,
    ) -> Result<u64, MishkatError> {
        let state = self.locked(id).await?;
        Ok(state.unread_for(user))
    }

    /// Mark everything committed so far as read by `user`.
    pub async fn mark_read(&self, id: &ConversationId, user: &UserId) -> Result<(), MishkatError> {
        let mut state = self.locked(id).await?;
        let position = state.log.len() as u64;
        self.retry
            .run("save_read_position", || {
                self.store.save_read_position(id, user, position)
            })
            .await?;
        state.read.insert(user.clone(), position);
        Ok(())
    }
}
