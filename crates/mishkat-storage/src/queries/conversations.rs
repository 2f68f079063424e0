// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation, participant, and read-position queries.

use std::collections::BTreeSet;

use mishkat_core::{ConversationId, MishkatError, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{decode_enum, decode_timestamp, encode_timestamp, Conversation};

/// Insert a conversation together with its initial participants.
pub async fn create_conversation(db: &Database, conv: &Conversation) -> Result<(), MishkatError> {
    let conv = conv.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, kind, title, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    conv.id.as_str(),
                    conv.kind.to_string(),
                    conv.title,
                    encode_timestamp(&conv.created_at),
                ],
            )?;
            for user in &conv.participants {
                tx.execute(
                    "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id)
                     VALUES (?1, ?2)",
                    params![conv.id.as_str(), user.as_str()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn participants_of(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<BTreeSet<UserId>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1",
    )?;
    let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
    rows.map(|r| r.map(UserId::from)).collect()
}

fn conversation_row(
    conn: &rusqlite::Connection,
    row: (String, String, Option<String>, String),
) -> Result<Conversation, rusqlite::Error> {
    let (id, kind, title, created_at) = row;
    let participants = participants_of(conn, &id)?;
    Ok(Conversation {
        kind: decode_enum(1, &kind)?,
        title,
        participants,
        created_at: decode_timestamp(3, &created_at)?,
        id: ConversationId::from(id),
    })
}

/// Get a conversation by ID, including its participants.
pub async fn get_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<Conversation>, MishkatError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, kind, title, created_at FROM conversations WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            row.map(|r| conversation_row(conn, r)).transpose()
        })
        .await
        .map_err(map_tr_err)
}

/// Add a participant. Adding an existing participant is a no-op.
pub async fn add_participant(
    db: &Database,
    id: &ConversationId,
    user: &UserId,
) -> Result<(), MishkatError> {
    let id = id.to_string();
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id)
                 VALUES (?1, ?2)",
                params![id, user],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Conversations `user` participates in, oldest first.
pub async fn conversations_for_participant(
    db: &Database,
    user: &UserId,
) -> Result<Vec<Conversation>, MishkatError> {
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            let rows: Vec<(String, String, Option<String>, String)> = {
                let mut stmt = conn.prepare(
                    "SELECT c.id, c.kind, c.title, c.created_at
                     FROM conversations c
                     JOIN conversation_participants p ON p.conversation_id = c.id
                     WHERE p.user_id = ?1
                     ORDER BY c.created_at ASC, c.id ASC",
                )?;
                let mapped = stmt.query_map(params![user], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?;
                mapped.collect::<Result<_, _>>()?
            };
            rows.into_iter().map(|r| conversation_row(conn, r)).collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert how many messages `user` has read in a conversation.
pub async fn save_read_position(
    db: &Database,
    id: &ConversationId,
    user: &UserId,
    position: u64,
) -> Result<(), MishkatError> {
    let id = id.to_string();
    let user = user.to_string();
    let position = i64::try_from(position).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO read_positions (conversation_id, user_id, position)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(conversation_id, user_id) DO UPDATE SET position = excluded.position",
                params![id, user, position],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All stored read positions for a conversation.
pub async fn read_positions(
    db: &Database,
    id: &ConversationId,
) -> Result<Vec<(UserId, u64)>, MishkatError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, position FROM read_positions
                 WHERE conversation_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                let user: String = row.get(0)?;
                let position: i64 = row.get(1)?;
                Ok((UserId::from(user), u64::try_from(position).unwrap_or(0)))
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mishkat_core::ConversationKind;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    fn room(title: &str, members: &[&str]) -> Conversation {
        Conversation::new(
            ConversationKind::CommunityRoom,
            Some(title.to_string()),
            members.iter().map(|m| UserId::from(*m)),
        )
    }

    #[tokio::test]
    async fn create_and_get_conversation_roundtrips() {
        let (db, _dir) = setup_db().await;
        let conv = room("Morning adhkar", &["amina", "yusuf"]);
        create_conversation(&db, &conv).await.unwrap();

        let loaded = get_conversation(&db, &conv.id).await.unwrap().unwrap();
        assert_eq!(loaded, conv);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_conversation_is_none() {
        let (db, _dir) = setup_db().await;
        let missing = get_conversation(&db, &ConversationId::new("nope")).await.unwrap();
        assert!(missing.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn participants_are_deduplicated_and_indexed() {
        let (db, _dir) = setup_db().await;
        let a = room("a", &["amina"]);
        let b = room("b", &["yusuf"]);
        create_conversation(&db, &a).await.unwrap();
        create_conversation(&db, &b).await.unwrap();

        add_participant(&db, &b.id, &UserId::new("amina")).await.unwrap();
        add_participant(&db, &b.id, &UserId::new("amina")).await.unwrap();

        let mine = conversations_for_participant(&db, &UserId::new("amina"))
            .await
            .unwrap();
        let ids: Vec<_> = mine.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id) && ids.contains(&b.id));

        let b_loaded = get_conversation(&db, &b.id).await.unwrap().unwrap();
        assert_eq!(b_loaded.participants.len(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn read_positions_upsert() {
        let (db, _dir) = setup_db().await;
        let conv = room("r", &["amina"]);
        create_conversation(&db, &conv).await.unwrap();

        let amina = UserId::new("amina");
        save_read_position(&db, &conv.id, &amina, 3).await.unwrap();
        save_read_position(&db, &conv.id, &amina, 7).await.unwrap();

        assert_eq!(
            read_positions(&db, &conv.id).await.unwrap(),
            vec![(amina, 7)]
        );
        db.close().await.unwrap();
    }
}
