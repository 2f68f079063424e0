// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process stores for ephemeral runs and tests.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use mishkat_core::types::{
    CachedReply, Conversation, ConversationId, EscalationReason, Message, MessageId, Session,
    SessionId, SessionStatus, UserId,
};
use mishkat_core::{
    AdapterType, ChatStore, EscalationHistoryStore, HealthStatus, MishkatError, PluginAdapter,
    ResponseCache,
};

#[derive(Default)]
struct Tables {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    message_ids: HashSet<MessageId>,
    read_positions: HashMap<ConversationId, HashMap<UserId, u64>>,
    sessions: HashMap<SessionId, Session>,
    /// Session insertion order, used to break `created_at` ties.
    session_order: Vec<SessionId>,
}

/// [`ChatStore`] kept entirely in memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MishkatError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MishkatError> {
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn initialize(&self) -> Result<(), MishkatError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), MishkatError> {
        Ok(())
    }

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), MishkatError> {
        let mut t = self.tables.write().await;
        if t.conversations.contains_key(&conversation.id) {
            return Err(MishkatError::persistence(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        t.conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, MishkatError> {
        Ok(self.tables.read().await.conversations.get(id).cloned())
    }

    async fn add_participant(&self, id: &ConversationId, user: &UserId) -> Result<(), MishkatError> {
        let mut t = self.tables.write().await;
        let conv = t
            .conversations
            .get_mut(id)
            .ok_or_else(|| MishkatError::unknown(id))?;
        conv.participants.insert(user.clone());
        Ok(())
    }

    async fn conversations_for_participant(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, MishkatError> {
        let t = self.tables.read().await;
        let mut found: Vec<Conversation> = t
            .conversations
            .values()
            .filter(|c| c.participants.contains(user))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn append_message(&self, message: &Message) -> Result<(), MishkatError> {
        let mut t = self.tables.write().await;
        if !t.conversations.contains_key(&message.conversation_id) {
            return Err(MishkatError::unknown(&message.conversation_id));
        }
        if !t.message_ids.insert(message.id.clone()) {
            return Ok(());
        }
        t.messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, MishkatError> {
        Ok(self
            .tables
            .read()
            .await
            .messages
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_read_position(
        &self,
        id: &ConversationId,
        user: &UserId,
        position: u64,
    ) -> Result<(), MishkatError> {
        self.tables
            .write()
            .await
            .read_positions
            .entry(id.clone())
            .or_default()
            .insert(user.clone(), position);
        Ok(())
    }

    async fn read_positions(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<(UserId, u64)>, MishkatError> {
        let t = self.tables.read().await;
        let mut positions: Vec<(UserId, u64)> = t
            .read_positions
            .get(id)
            .map(|m| m.iter().map(|(u, p)| (u.clone(), *p)).collect())
            .unwrap_or_default();
        positions.sort();
        Ok(positions)
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), MishkatError> {
        let mut t = self.tables.write().await;
        if t.sessions.insert(session.id.clone(), session.clone()).is_none() {
            t.session_order.push(session.id.clone());
        }
        Ok(())
    }

    async fn update_session(
        &self,
        session: &Session,
        expected: SessionStatus,
    ) -> Result<bool, MishkatError> {
        let mut t = self.tables.write().await;
        match t.sessions.get_mut(&session.id) {
            Some(stored) if stored.status == expected => {
                *stored = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, MishkatError> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, MishkatError> {
        let t = self.tables.read().await;
        let mut sessions: Vec<Session> = t
            .session_order
            .iter()
            .filter_map(|id| t.sessions.get(id))
            .filter(|s| status.is_none_or(|st| s.status == st))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}

/// Escalation history capped at `limit` entries per user.
pub struct MemoryHistoryStore {
    limit: usize,
    entries: Mutex<HashMap<UserId, VecDeque<EscalationReason>>>,
}

impl MemoryHistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl EscalationHistoryStore for MemoryHistoryStore {
    async fn append(&self, user: &UserId, reason: EscalationReason) -> Result<(), MishkatError> {
        let mut entries = self.entries.lock().await;
        let history = entries.entry(user.clone()).or_default();
        history.push_back(reason);
        while history.len() > self.limit {
            history.pop_front();
        }
        Ok(())
    }

    async fn history(&self, user: &UserId) -> Result<Vec<EscalationReason>, MishkatError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(user)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, user: &UserId) -> Result<(), MishkatError> {
        self.entries.lock().await.remove(user);
        Ok(())
    }
}

#[derive(Default)]
struct CacheState {
    replies: HashMap<String, CachedReply>,
    order: VecDeque<String>,
}

/// Bounded response cache with first-in first-out eviction.
pub struct MemoryResponseCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl MemoryResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.replies.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Result<Option<CachedReply>, MishkatError> {
        Ok(self.state.lock().await.replies.get(key).cloned())
    }

    async fn put(&self, key: &str, reply: &CachedReply) -> Result<(), MishkatError> {
        let mut state = self.state.lock().await;
        if state.replies.insert(key.to_string(), reply.clone()).is_none() {
            state.order.push_back(key.to_string());
        }
        while state.replies.len() > self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.replies.remove(&oldest);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), MishkatError> {
        let mut state = self.state.lock().await;
        state.replies.clear();
        state.order.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mishkat_core::{
        ConfidenceLevel, ConversationKind, Priority, ReplyCategory, Responder, ResponderMetadata,
        SessionKind,
    };

    fn session(id: &str, conv: &ConversationId, status: SessionStatus, age: i64) -> Session {
        let at = Utc::now() - Duration::seconds(age);
        Session {
            id: SessionId::new(id),
            kind: SessionKind::Chat,
            conversation_id: conv.clone(),
            user_id: UserId::new("u"),
            status,
            priority: Priority::Normal,
            escalation_reason: EscalationReason::AdminRequest,
            assigned_operator: None,
            subject: None,
            created_at: at,
            last_activity_at: at,
        }
    }

    #[tokio::test]
    async fn append_is_ordered_and_idempotent() {
        let store = MemoryStore::new();
        let conv = Conversation::new(ConversationKind::DirectThread, None, [UserId::new("a")]);
        store.create_conversation(&conv).await.unwrap();

        let first = Message::from_user(conv.id.clone(), UserId::new("a"), "one");
        let second = Message::from_user(conv.id.clone(), UserId::new("a"), "two");
        store.append_message(&first).await.unwrap();
        store.append_message(&second).await.unwrap();
        store.append_message(&first).await.unwrap();

        let texts: Vec<_> = store
            .list_messages(&conv.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_fails() {
        let store = MemoryStore::new();
        let msg = Message::from_user(ConversationId::new("ghost"), UserId::new("a"), "hi");
        let err = store.append_message(&msg).await.unwrap_err();
        assert!(matches!(err, MishkatError::UnknownConversation { .. }));
    }

    #[tokio::test]
    async fn participants_and_lookup() {
        let store = MemoryStore::new();
        let conv = Conversation::new(ConversationKind::CommunityRoom, None, [UserId::new("a")]);
        store.create_conversation(&conv).await.unwrap();
        store.add_participant(&conv.id, &UserId::new("b")).await.unwrap();

        assert_eq!(
            store.conversations_for_participant(&UserId::new("b")).await.unwrap().len(),
            1
        );
        assert!(
            store
                .conversations_for_participant(&UserId::new("c"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn sessions_list_by_status_oldest_first() {
        let store = MemoryStore::new();
        let conv = ConversationId::new("c");
        store
            .upsert_session(&session("new", &conv, SessionStatus::Waiting, 1))
            .await
            .unwrap();
        store
            .upsert_session(&session("old", &conv, SessionStatus::Waiting, 100))
            .await
            .unwrap();
        store
            .upsert_session(&session("busy", &conv, SessionStatus::Active, 50))
            .await
            .unwrap();

        let waiting = store.list_sessions(Some(SessionStatus::Waiting)).await.unwrap();
        let ids: Vec<_> = waiting.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);
        assert_eq!(store.list_sessions(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_session_requires_the_expected_status() {
        let store = MemoryStore::new();
        let conv = ConversationId::new("c");
        let waiting = session("s", &conv, SessionStatus::Waiting, 0);
        store.upsert_session(&waiting).await.unwrap();

        let mut resolved = waiting.clone();
        resolved.status = SessionStatus::Resolved;
        assert!(store.update_session(&resolved, SessionStatus::Waiting).await.unwrap());

        let mut stale = waiting.clone();
        stale.last_activity_at = Utc::now();
        assert!(!store.update_session(&stale, SessionStatus::Waiting).await.unwrap());
        assert_eq!(
            store.get_session(&waiting.id).await.unwrap().unwrap().status,
            SessionStatus::Resolved
        );

        let ghost = session("ghost", &conv, SessionStatus::Waiting, 0);
        assert!(!store.update_session(&ghost, SessionStatus::Waiting).await.unwrap());
    }

    #[tokio::test]
    async fn history_is_capped() {
        let store = MemoryHistoryStore::new(2);
        let user = UserId::new("u");
        for reason in [
            EscalationReason::AdminRequest,
            EscalationReason::FatwaRequest,
            EscalationReason::PaymentIssue,
        ] {
            store.append(&user, reason).await.unwrap();
        }
        assert_eq!(
            store.history(&user).await.unwrap(),
            vec![EscalationReason::FatwaRequest, EscalationReason::PaymentIssue]
        );
        store.clear(&user).await.unwrap();
        assert!(store.history(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_evicts_first_inserted() {
        let cache = MemoryResponseCache::new(2);
        let reply = CachedReply {
            text: "t".into(),
            category: ReplyCategory::AppGuidance,
            metadata: ResponderMetadata {
                responder: Responder::Assistant,
                confidence: ConfidenceLevel::High,
                escalation_flag: false,
            },
        };
        cache.put("a", &reply).await.unwrap();
        cache.put("b", &reply).await.unwrap();
        cache.put("a", &reply).await.unwrap();
        cache.put("c", &reply).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_some());
        assert!(cache.get("c").await.unwrap().is_some());
        assert_eq!(cache.len().await, 2);

        cache.clear().await.unwrap();
        assert!(cache.is_empty().await);
    }
}
