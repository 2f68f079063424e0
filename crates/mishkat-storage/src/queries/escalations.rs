// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user escalation history.

use mishkat_core::{EscalationReason, MishkatError, UserId};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::decode_enum;

/// Record an escalation, keeping at most `limit` of the user's newest entries.
pub async fn append_escalation(
    db: &Database,
    user: &UserId,
    reason: EscalationReason,
    limit: usize,
) -> Result<(), MishkatError> {
    let user = user.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO escalation_history (user_id, reason) VALUES (?1, ?2)",
                params![user, reason.to_string()],
            )?;
            tx.execute(
                "DELETE FROM escalation_history
                 WHERE user_id = ?1 AND id NOT IN (
                     SELECT id FROM escalation_history WHERE user_id = ?1
                     ORDER BY id DESC LIMIT ?2
                 )",
                params![user, limit],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// A user's escalation reasons, oldest first.
pub async fn escalation_history(
    db: &Database,
    user: &UserId,
) -> Result<Vec<EscalationReason>, MishkatError> {
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT reason FROM escalation_history WHERE user_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![user], |row| {
                let raw: String = row.get(0)?;
                decode_enum::<EscalationReason>(0, &raw)
            })?;
            let mut reasons = Vec::new();
            for row in rows {
                reasons.push(row?);
            }
            Ok(reasons)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn clear_escalations(db: &Database, user: &UserId) -> Result<(), MishkatError> {
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM escalation_history WHERE user_id = ?1",
                params![user],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
