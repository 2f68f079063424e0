// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache of generated replies keyed by normalized message text.

use async_trait::async_trait;

use crate::error::MishkatError;
use crate::types::CachedReply;

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedReply>, MishkatError>;

    async fn put(&self, key: &str, reply: &CachedReply) -> Result<(), MishkatError>;

    async fn clear(&self) -> Result<(), MishkatError>;
}
