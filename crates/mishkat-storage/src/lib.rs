// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the Mishkat chat core.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and in-memory equivalents of every
//! store for ephemeral runs and tests.

pub mod adapter;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod stores;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use memory::{MemoryHistoryStore, MemoryResponseCache, MemoryStore};
pub use stores::Stores;
