// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use mishkat_core::MishkatError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Handle to the single SQLite writer connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, MishkatError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(MishkatError::persistence)?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(MishkatError::persistence)?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), refinery::Error> { migrations::run_migrations(conn) })
            .await
            .map_err(MishkatError::persistence)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// Open a private in-memory database (tests and ephemeral runs).
    pub async fn open_in_memory() -> Result<Self, MishkatError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(MishkatError::persistence)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        })
        .await
        .map_err(map_tr_err)?;
        conn.call(|conn| -> Result<(), refinery::Error> { migrations::run_migrations(conn) })
            .await
            .map_err(MishkatError::persistence)?;
        Ok(Self { conn })
    }

    /// The serialized writer connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), MishkatError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), MishkatError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(MishkatError::persistence)
    }
}

/// Map a tokio-rusqlite error into [`MishkatError::Persistence`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MishkatError {
    MishkatError::persistence(e)
}
