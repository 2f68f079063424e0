// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support session CRUD operations.

use mishkat_core::{ConversationId, MishkatError, SessionId, SessionStatus, UserId};
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};
use crate::models::{decode_enum, decode_timestamp, encode_timestamp, Session};

const SESSION_COLUMNS: &str = "id, kind, conversation_id, user_id, status, priority, \
     escalation_reason, assigned_operator, subject, created_at, last_activity_at";

fn session_from_row(row: &Row<'_>) -> Result<Session, rusqlite::Error> {
    let kind: String = row.get(1)?;
    let status: String = row.get(4)?;
    let priority: String = row.get(5)?;
    let reason: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    let last_activity_at: String = row.get(10)?;
    Ok(Session {
        id: SessionId::from(row.get::<_, String>(0)?),
        kind: decode_enum(1, &kind)?,
        conversation_id: ConversationId::from(row.get::<_, String>(2)?),
        user_id: UserId::from(row.get::<_, String>(3)?),
        status: decode_enum(4, &status)?,
        priority: decode_enum(5, &priority)?,
        escalation_reason: decode_enum(6, &reason)?,
        assigned_operator: row.get::<_, Option<String>>(7)?.map(UserId::from),
        subject: row.get(8)?,
        created_at: decode_timestamp(9, &created_at)?,
        last_activity_at: decode_timestamp(10, &last_activity_at)?,
    })
}

/// Insert a session or replace the stored record with the same id.
pub async fn upsert_session(db: &Database, session: &Session) -> Result<(), MishkatError> {
    let s = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO sessions ({SESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    s.id.as_str(),
                    s.kind.to_string(),
                    s.conversation_id.as_str(),
                    s.user_id.as_str(),
                    s.status.to_string(),
                    s.priority.to_string(),
                    s.escalation_reason.to_string(),
                    s.assigned_operator.as_ref().map(UserId::as_str),
                    s.subject,
                    encode_timestamp(&s.created_at),
                    encode_timestamp(&s.last_activity_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace a session only while its stored status equals `expected`.
///
/// Returns whether a row was updated.
pub async fn update_session(
    db: &Database,
    session: &Session,
    expected: SessionStatus,
) -> Result<bool, MishkatError> {
    let s = session.clone();
    let expected = expected.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET status = ?2, priority = ?3, escalation_reason = ?4,
                     assigned_operator = ?5, subject = ?6, last_activity_at = ?7
                 WHERE id = ?1 AND status = ?8",
                params![
                    s.id.as_str(),
                    s.status.to_string(),
                    s.priority.to_string(),
                    s.escalation_reason.to_string(),
                    s.assigned_operator.as_ref().map(UserId::as_str),
                    s.subject,
                    encode_timestamp(&s.last_activity_at),
                    expected,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &SessionId) -> Result<Option<Session>, MishkatError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                session_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// List sessions, optionally filtered by status, oldest first.
pub async fn list_sessions(
    db: &Database,
    status: Option<SessionStatus>,
) -> Result<Vec<Session>, MishkatError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut sessions = Vec::new();
            match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ?1
                         ORDER BY created_at ASC, rowid ASC"
                    ))?;
                    let rows = stmt.query_map(params![status], session_from_row)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at ASC, rowid ASC"
                    ))?;
                    let rows = stmt.query_map([], session_from_row)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations::create_conversation;
    use chrono::{Duration, Utc};
    use mishkat_core::{
        Conversation, ConversationKind, EscalationReason, Priority, SessionKind,
    };
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir, ConversationId) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        let conv = Conversation::new(ConversationKind::SupportTicket, None, [UserId::new("u")]);
        create_conversation(&db, &conv).await.unwrap();
        (db, dir, conv.id)
    }

    fn make_session(id: &str, conv: &ConversationId, age_secs: i64) -> Session {
        let created = Utc::now() - Duration::seconds(age_secs);
        Session {
            id: SessionId::new(id),
            kind: SessionKind::Chat,
            conversation_id: conv.clone(),
            user_id: UserId::new("u"),
            status: SessionStatus::Waiting,
            priority: Priority::High,
            escalation_reason: EscalationReason::FatwaRequest,
            assigned_operator: None,
            subject: None,
            created_at: created,
            last_activity_at: created,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_session_roundtrips() {
        let (db, _dir, conv) = setup_db().await;
        let session = make_session("sess-1", &conv, 0);
        upsert_session(&db, &session).await.unwrap();

        let loaded = get_session(&db, &session.id).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(get_session(&db, &SessionId::new("other")).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_replaces_existing_record() {
        let (db, _dir, conv) = setup_db().await;
        let mut session = make_session("sess-1", &conv, 0);
        upsert_session(&db, &session).await.unwrap();

        session.status = SessionStatus::Active;
        session.assigned_operator = Some(UserId::new("op-1"));
        upsert_session(&db, &session).await.unwrap();

        let all = list_sessions(&db, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, SessionStatus::Active);
        assert_eq!(all[0].assigned_operator, Some(UserId::new("op-1")));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn conditional_update_skips_sessions_that_moved_on() {
        let (db, _dir, conv) = setup_db().await;
        let session = make_session("sess-1", &conv, 0);
        upsert_session(&db, &session).await.unwrap();

        let mut accepted = session.clone();
        accepted.status = SessionStatus::Active;
        accepted.assigned_operator = Some(UserId::new("op-1"));
        assert!(update_session(&db, &accepted, SessionStatus::Waiting).await.unwrap());

        // A writer still holding the WAITING copy loses.
        assert!(!update_session(&db, &session, SessionStatus::Waiting).await.unwrap());
        let stored = get_session(&db, &session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert_eq!(stored.assigned_operator, Some(UserId::new("op-1")));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_status_oldest_first() {
        let (db, _dir, conv) = setup_db().await;
        let newer = make_session("newer", &conv, 10);
        let older = make_session("older", &conv, 60);
        let mut active = make_session("active", &conv, 30);
        active.status = SessionStatus::Active;
        for s in [&newer, &older, &active] {
            upsert_session(&db, s).await.unwrap();
        }

        let waiting = list_sessions(&db, Some(SessionStatus::Waiting)).await.unwrap();
        let ids: Vec<_> = waiting.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["older", "newer"]);
        assert_eq!(list_sessions(&db, None).await.unwrap().len(), 3);
        db.close().await.unwrap();
    }
}
