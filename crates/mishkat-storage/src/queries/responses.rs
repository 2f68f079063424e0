// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent response cache keyed by normalized message text.

use mishkat_core::{MishkatError, ResponderMetadata};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{decode_enum, decode_json, encode_json, CachedReply};

pub async fn get_cached_reply(db: &Database, key: &str) -> Result<Option<CachedReply>, MishkatError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT text, category, metadata FROM response_cache WHERE key = ?1",
                params![key],
                |row| {
                    let category: String = row.get(1)?;
                    let metadata: String = row.get(2)?;
                    Ok(CachedReply {
                        text: row.get(0)?,
                        category: decode_enum(1, &category)?,
                        metadata: decode_json::<ResponderMetadata>(2, &metadata)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Store a reply, evicting the oldest entries beyond `capacity`.
pub async fn put_cached_reply(
    db: &Database,
    key: &str,
    reply: &CachedReply,
    capacity: usize,
) -> Result<(), MishkatError> {
    let key = key.to_string();
    let reply = reply.clone();
    let capacity = i64::try_from(capacity).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let metadata = encode_json(&reply.metadata)?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO response_cache (key, text, category, metadata)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key, reply.text, reply.category.to_string(), metadata],
            )?;
            tx.execute(
                "DELETE FROM response_cache WHERE rowid NOT IN (
                     SELECT rowid FROM response_cache ORDER BY rowid DESC LIMIT ?1
                 )",
                params![capacity],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn clear_cached_replies(db: &Database) -> Result<(), MishkatError> {
    db.connection()
        .call(|conn| {
            conn.execute("DELETE FROM response_cache", [])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mishkat_core::{ConfidenceLevel, ReplyCategory, Responder};

    fn reply(text: &str) -> CachedReply {
        CachedReply {
            text: text.to_string(),
            category: ReplyCategory::GeneralIslamic,
            metadata: ResponderMetadata {
                responder: Responder::Assistant,
                confidence: ConfidenceLevel::Medium,
                escalation_flag: false,
            },
        }
    }

    #[tokio::test]
    async fn put_get_and_clear() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(get_cached_reply(&db, "what time is fajr").await.unwrap().is_none());

        put_cached_reply(&db, "what time is fajr", &reply("Check the prayer tab."), 8)
            .await
            .unwrap();
        assert_eq!(
            get_cached_reply(&db, "what time is fajr").await.unwrap(),
            Some(reply("Check the prayer tab."))
        );

        clear_cached_replies(&db).await.unwrap();
        assert!(get_cached_reply(&db, "what time is fajr").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oldest_entries_are_evicted_past_capacity() {
        let db = Database::open_in_memory().await.unwrap();
        for key in ["a", "b", "c"] {
            put_cached_reply(&db, key, &reply(key), 2).await.unwrap();
        }
        assert!(get_cached_reply(&db, "a").await.unwrap().is_none());
        assert!(get_cached_reply(&db, "b").await.unwrap().is_some());
        assert!(get_cached_reply(&db, "c").await.unwrap().is_some());
    }
}
