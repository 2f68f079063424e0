// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message log.

use mishkat_core::{ConversationId, MessageId, MishkatError, ResponderMetadata, UserId};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{decode_enum, decode_json, decode_timestamp, encode_json, encode_timestamp, Message};

/// Append a message. Re-inserting an existing id leaves the log untouched.
///
/// Returns `true` when a row was written.
pub async fn append_message(db: &Database, msg: &Message) -> Result<bool, MishkatError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            let metadata = msg.metadata.as_ref().map(encode_json).transpose()?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO messages
                     (id, conversation_id, sender, author, text, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.id.as_str(),
                    msg.conversation_id.as_str(),
                    msg.sender.to_string(),
                    msg.author.as_ref().map(UserId::as_str),
                    msg.text,
                    metadata,
                    encode_timestamp(&msg.timestamp),
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of a conversation in append order.
pub async fn list_messages(
    db: &Database,
    conversation_id: &ConversationId,
) -> Result<Vec<Message>, MishkatError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender, author, text, metadata, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id], |row| {
                let sender: String = row.get(2)?;
                let metadata: Option<String> = row.get(5)?;
                let created_at: String = row.get(6)?;
                Ok(Message {
                    id: MessageId::from(row.get::<_, String>(0)?),
                    conversation_id: ConversationId::from(row.get::<_, String>(1)?),
                    sender: decode_enum(2, &sender)?,
                    author: row.get::<_, Option<String>>(3)?.map(UserId::from),
                    text: row.get(4)?,
                    metadata: metadata
                        .map(|m| decode_json::<ResponderMetadata>(5, &m))
                        .transpose()?,
                    timestamp: decode_timestamp(6, &created_at)?,
                })
            })?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations::create_conversation;
    use mishkat_core::{ConfidenceLevel, Conversation, ConversationKind, Responder, Sender};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir, ConversationId) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        let conv = Conversation::new(
            ConversationKind::SupportTicket,
            None,
            [UserId::new("amina")],
        );
        create_conversation(&db, &conv).await.unwrap();
        (db, dir, conv.id)
    }

    #[tokio::test]
    async fn messages_come_back_in_append_order() {
        let (db, _dir, conv) = setup_db().await;
        let first = Message::from_user(conv.clone(), UserId::new("amina"), "salaam");
        let mut second = Message::from_assistant(
            conv.clone(),
            "wa alaikum salaam",
            ResponderMetadata {
                responder: Responder::Assistant,
                confidence: ConfidenceLevel::Low,
                escalation_flag: false,
            },
        );
        // Same timestamp as the first; seq must still order them.
        second.timestamp = first.timestamp;

        append_message(&db, &first).await.unwrap();
        append_message(&db, &second).await.unwrap();

        let log = list_messages(&db, &conv).await.unwrap();
        assert_eq!(log, vec![first, second]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_append_is_ignored() {
        let (db, _dir, conv) = setup_db().await;
        let msg = Message::from_user(conv.clone(), UserId::new("amina"), "salaam");

        assert!(append_message(&db, &msg).await.unwrap());
        assert!(!append_message(&db, &msg).await.unwrap());

        let log = list_messages(&db, &conv).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, Sender::User);
        assert!(log[0].metadata.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected() {
        let (db, _dir, _conv) = setup_db().await;
        let orphan = Message::from_user(ConversationId::new("ghost"), UserId::new("x"), "hi");
        let err = append_message(&db, &orphan).await.unwrap_err();
        assert!(matches!(err, MishkatError::Persistence { .. }));
        db.close().await.unwrap();
    }
}
