// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque lookup into the hadith corpus.

use async_trait::async_trait;

use crate::error::MishkatError;

/// Returns a short excerpt relevant to a user question, if one is known.
#[async_trait]
pub trait ContentLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<Option<String>, MishkatError>;
}
