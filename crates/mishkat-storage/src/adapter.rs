// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the chat store, escalation history, and response cache.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use mishkat_config::model::StorageConfig;
use mishkat_core::types::{
    CachedReply, Conversation, ConversationId, EscalationReason, Message, Session, SessionId,
    SessionStatus, UserId,
};
use mishkat_core::{
    AdapterType, ChatStore, EscalationHistoryStore, HealthStatus, MishkatError, PluginAdapter,
    ResponseCache,
};

use crate::database::Database;
use crate::queries;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// SQLite-backed storage adapter.
///
/// One database file backs all three persistence seams, so a single
/// `Arc<SqliteStorage>` can be handed out as a [`ChatStore`], an
/// [`EscalationHistoryStore`], and a [`ResponseCache`]. The database is
/// lazily opened on the first call to [`ChatStore::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    history_limit: usize,
    cache_capacity: usize,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            history_limit: DEFAULT_HISTORY_LIMIT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            db: OnceCell::new(),
        }
    }

    /// Cap on stored escalations per user.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Cap on cached replies.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, MishkatError> {
        self.db.get().ok_or_else(|| {
            MishkatError::persistence("storage not initialized -- call initialize() first")
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MishkatError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MishkatError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for SqliteStorage {
    async fn initialize(&self) -> Result<(), MishkatError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| MishkatError::persistence("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), MishkatError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Conversation operations ---

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), MishkatError> {
        queries::conversations::create_conversation(self.db()?, conversation).await
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, MishkatError> {
        queries::conversations::get_conversation(self.db()?, id).await
    }

    async fn add_participant(&self, id: &ConversationId, user: &UserId) -> Result<(), MishkatError> {
        queries::conversations::add_participant(self.db()?, id, user).await
    }

    async fn conversations_for_participant(
        &self,
        user: &UserId,
    ) -> Result<Vec<Conversation>, MishkatError> {
        queries::conversations::conversations_for_participant(self.db()?, user).await
    }

    // --- Message operations ---

    async fn append_message(&self, message: &Message) -> Result<(), MishkatError> {
        let inserted = queries::messages::append_message(self.db()?, message).await?;
        if !inserted {
            debug!(message_id = %message.id, "duplicate append ignored");
        }
        Ok(())
    }

    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, MishkatError> {
        queries::messages::list_messages(self.db()?, id).await
    }

    async fn save_read_position(
        &self,
        id: &ConversationId,
        user: &UserId,
        position: u64,
    ) -> Result<(), MishkatError> {
        queries::conversations::save_read_position(self.db()?, id, user, position).await
    }

    async fn read_positions(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<(UserId, u64)>, MishkatError> {
        queries::conversations::read_positions(self.db()?, id).await
    }

    // --- Session operations ---

    async fn upsert_session(&self, session: &Session) -> Result<(), MishkatError> {
        queries::sessions::upsert_session(self.db()?, session).await
    }

    async fn update_session(
        &self,
        session: &Session,
        expected: SessionStatus,
    ) -> Result<bool, MishkatError> {
        queries::sessions::update_session(self.db()?, session, expected).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, MishkatError> {
        queries::sessions::get_session(self.db()?, id).await
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, MishkatError> {
        queries::sessions::list_sessions(self.db()?, status).await
    }
}

#[async_trait]
impl EscalationHistoryStore for SqliteStorage {
    async fn append(&self, user: &UserId, reason: EscalationReason) -> Result<(), MishkatError> {
        queries::escalations::append_escalation(self.db()?, user, reason, self.history_limit).await
    }

    async fn history(&self, user: &UserId) -> Result<Vec<EscalationReason>, MishkatError> {
        queries::escalations::escalation_history(self.db()?, user).await
    }

    async fn clear(&self, user: &UserId) -> Result<(), MishkatError> {
        queries::escalations::clear_escalations(self.db()?, user).await
    }
}

#[async_trait]
impl ResponseCache for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<CachedReply>, MishkatError> {
        queries::responses::get_cached_reply(self.db()?, key).await
    }

    async fn put(&self, key: &str, reply: &CachedReply) -> Result<(), MishkatError> {
        queries::responses::put_cached_reply(self.db()?, key, reply, self.cache_capacity).await
    }

    async fn clear(&self) -> Result<(), MishkatError> {
        queries::responses::clear_cached_replies(self.db()?).await
    }
}
