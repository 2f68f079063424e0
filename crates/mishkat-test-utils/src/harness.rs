// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete chat service on a temp SQLite database
//! (or in-memory stores) and exposes helpers that drive the full
//! classify, generate, and route pipeline in tests.

use std::sync::Arc;
use std::time::Duration;

use mishkat_chat::{ChatService, Exchange};
use mishkat_config::model::{MishkatConfig, StorageBackend};
use mishkat_core::{ContentLookup, ConversationId, MishkatError, UserId};
use mishkat_storage::Stores;

use crate::mock_identity::StaticIdentity;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: MishkatConfig,
    content: Option<Arc<dyn ContentLookup>>,
    identity: Option<StaticIdentity>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = MishkatConfig::default();
        // Keep retries fast in tests.
        config.persistence.base_delay_ms = 1;
        config.persistence.max_delay_ms = 5;
        Self {
            config,
            content: None,
            identity: None,
        }
    }

    /// Start from an explicit configuration. The storage path is still
    /// replaced by a temp file when the backend is SQLite.
    pub fn with_config(mut self, config: MishkatConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_memory_storage(mut self) -> Self {
        self.config.storage.backend = StorageBackend::Memory;
        self
    }

    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.config.generator.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_operators(mut self, ids: &[&str]) -> Self {
        self.config.operators.ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_content_lookup(mut self, content: Arc<dyn ContentLookup>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_signed_in_user(mut self, user_id: &str, display_name: &str) -> Self {
        self.identity = Some(StaticIdentity::signed_in(user_id, display_name));
        self
    }

    /// Build the harness, creating storage and the service.
    pub async fn build(self) -> Result<TestHarness, MishkatError> {
        let mut config = self.config;
        let temp_dir = tempfile::TempDir::new().map_err(MishkatError::persistence)?;
        if config.storage.backend == StorageBackend::Sqlite {
            config.storage.database_path =
                temp_dir.path().join("test.db").to_string_lossy().to_string();
        }

        let stores = Stores::open(&config).await?;
        let mut service = ChatService::new(
            &config,
            stores.chat.clone(),
            stores.history.clone(),
            stores.cache.clone(),
        );
        if let Some(content) = self.content {
            service = service.with_content_lookup(content);
        }
        if let Some(identity) = self.identity {
            service = service.with_identity(Arc::new(identity));
        }

        Ok(TestHarness {
            service: Arc::new(service),
            stores,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a wired service and temp storage.
pub struct TestHarness {
    pub service: Arc<ChatService>,
    /// The stores behind the service, for direct assertions.
    pub stores: Stores,
    /// Effective configuration, including the temp database path.
    pub config: MishkatConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A second service over the same stores, as after a process restart.
    pub fn restart(&self) -> ChatService {
        ChatService::new(
            &self.config,
            self.stores.chat.clone(),
            self.stores.history.clone(),
            self.stores.cache.clone(),
        )
    }

    /// Open `user`'s support conversation.
    pub async fn support_conversation(&self, user: &str) -> Result<ConversationId, MishkatError> {
        Ok(self
            .service
            .open_support_conversation(&UserId::new(user))
            .await?
            .id)
    }

    /// Send `text` as `user` on a support conversation.
    pub async fn send(
        &self,
        conversation_id: &ConversationId,
        user: &str,
        text: &str,
    ) -> Result<Exchange, MishkatError> {
        self.service
            .handle_user_message(conversation_id, &UserId::new(user), text)
            .await
    }
}
