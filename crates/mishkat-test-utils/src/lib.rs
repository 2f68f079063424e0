// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Mishkat integration tests.
//!
//! Provides mock collaborators and a harness for fast, deterministic tests
//! without external services.
//!
//! # Components
//!
//! - [`FlakyStore`] - Chat store wrapper that fails a configurable number of calls
//! - [`StaticContentLookup`] / [`SlowContentLookup`] - Content lookup doubles
//! - [`StaticIdentity`] - Fixed signed-in user
//! - [`TestHarness`] - Fully wired [`mishkat_chat::ChatService`] on temp storage

pub mod harness;
pub mod mock_content;
pub mod mock_identity;
pub mod mock_store;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_content::{SlowContentLookup, StaticContentLookup};
pub use mock_identity::StaticIdentity;
pub use mock_store::FlakyStore;
