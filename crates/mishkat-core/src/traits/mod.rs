// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! Persistence, caching, classification, and content lookup sit behind these
//! traits so the chat service can be constructed with in-memory doubles in
//! tests and durable backends in production. Async traits use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod cache;
pub mod classifier;
pub mod content;
pub mod history;
pub mod identity;
pub mod storage;

pub use adapter::PluginAdapter;
pub use cache::ResponseCache;
pub use classifier::Classifier;
pub use content::ContentLookup;
pub use history::EscalationHistoryStore;
pub use identity::IdentityProvider;
pub use storage::ChatStore;
