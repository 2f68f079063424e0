// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend selection from configuration.

use std::sync::Arc;

use mishkat_config::model::{MishkatConfig, StorageBackend};
use mishkat_core::{ChatStore, EscalationHistoryStore, MishkatError, ResponseCache};
use tracing::info;

use crate::adapter::SqliteStorage;
use crate::memory::{MemoryHistoryStore, MemoryResponseCache, MemoryStore};

/// The three persistence seams, initialized and ready for use.
#[derive(Clone)]
pub struct Stores {
    pub chat: Arc<dyn ChatStore>,
    pub history: Arc<dyn EscalationHistoryStore>,
    pub cache: Arc<dyn ResponseCache>,
}

impl Stores {
    /// Build and initialize the backend named by `[storage].backend`.
    pub async fn open(config: &MishkatConfig) -> Result<Self, MishkatError> {
        match config.storage.backend {
            StorageBackend::Sqlite => {
                let sqlite = Arc::new(
                    SqliteStorage::new(config.storage.clone())
                        .with_history_limit(config.escalation.history_limit)
                        .with_cache_capacity(config.generator.cache_capacity),
                );
                sqlite.initialize().await?;
                info!(path = %config.storage.database_path, "using sqlite storage");
                Ok(Self {
                    chat: sqlite.clone(),
                    history: sqlite.clone(),
                    cache: sqlite,
                })
            }
            StorageBackend::Memory => {
                info!("using in-memory storage");
                Ok(Self::in_memory(
                    config.escalation.history_limit,
                    config.generator.cache_capacity,
                ))
            }
        }
    }

    pub fn in_memory(history_limit: usize, cache_capacity: usize) -> Self {
        Self {
            chat: Arc::new(MemoryStore::new()),
            history: Arc::new(MemoryHistoryStore::new(history_limit)),
            cache: Arc::new(MemoryResponseCache::new(cache_capacity)),
        }
    }
}
