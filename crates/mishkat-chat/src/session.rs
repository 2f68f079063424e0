// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support session and ticket lifecycle.
//!
//! ```text
//!            accept            resolve
//! WAITING ─────────▶ ACTIVE ─────────▶ RESOLVED
//!    │                  │                 │
//!    └──── resolve ─────┼─────────────────┘ (reopen on user message → WAITING)
//!                       │
//!   close (tickets only, from WAITING/ACTIVE) ──▶ CLOSED
//! ```
//!
//! The store is the only copy of a session. Every transition reads the
//! current record, applies the change, and writes it back conditionally on
//! the status it read, so a shell and an operator queue running in separate
//! processes never overwrite each other's transitions.

use std::sync::Arc;

use chrono::Utc;
use mishkat_config::model::OperatorsConfig;
use mishkat_core::{
    ChatStore, ConversationId, EscalationReason, MishkatError, Priority, Session, SessionId,
    SessionKind, SessionStatus, UserId,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::events::{ChatEvent, EventBus};
use crate::retry::RetryPolicy;

/// Owns every session and ticket, backed by a [`ChatStore`].
pub struct SessionManager {
    store: Arc<dyn ChatStore>,
    /// Serializes escalation so a conversation gets at most one open session.
    escalations: Mutex<()>,
    operators: OperatorsConfig,
    retry: RetryPolicy,
    events: EventBus,
}

/// Parameters for a ticket filed through the support form.
#[derive(Debug, Clone)]
pub struct TicketRequest {
    pub user_id: UserId,
    pub subject: String,
    pub reason: EscalationReason,
    /// Overrides the priority derived from `reason`.
    pub priority: Option<Priority>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn ChatStore>,
        operators: OperatorsConfig,
        retry: RetryPolicy,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            escalations: Mutex::new(()),
            operators,
            retry,
            events,
        }
    }

    async fn insert(&self, session: &Session) -> Result<(), MishkatError> {
        self.retry
            .run("upsert_session", || self.store.upsert_session(session))
            .await
    }

    /// Apply `change` to the stored session and write it back, provided no
    /// other writer moved the session in the meantime.
    async fn transition<F>(
        &self,
        id: &SessionId,
        action: &'static str,
        change: F,
    ) -> Result<Session, MishkatError>
    where
        F: FnOnce(&mut Session) -> Result<(), MishkatError>,
    {
        let current = self.get(id).await?;
        let mut updated = current.clone();
        change(&mut updated)?;
        updated.last_activity_at = Utc::now();

        let applied = self
            .retry
            .run("update_session", || {
                self.store.update_session(&updated, current.status)
            })
            .await?;
        if !applied {
            let latest = self.get(id).await?;
            debug!(
                session_id = %id,
                expected = %current.status,
                found = %latest.status,
                action,
                "session changed by another writer"
            );
            return Err(invalid(&latest, action));
        }
        Ok(updated)
    }

    /// Route a conversation to the operator queue.
    ///
    /// If the conversation already has a WAITING or ACTIVE session it is
    /// returned unchanged; otherwise a new WAITING chat session is created
    /// with a priority derived from `reason`.
    pub async fn escalate(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        reason: EscalationReason,
    ) -> Result<Session, MishkatError> {
        let _guard = self.escalations.lock().await;
        if let Some(open) = self.latest_for_conversation(conversation_id).await? {
            if !open.status.is_terminal() {
                debug!(session_id = %open.id, "conversation already has an open session");
                return Ok(open);
            }
        }

        let now = Utc::now();
        let session = Session {
            id: SessionId::generate(),
            kind: SessionKind::Chat,
            conversation_id: conversation_id.clone(),
            user_id: user_id.clone(),
            status: SessionStatus::Waiting,
            priority: reason.default_priority(),
            escalation_reason: reason,
            assigned_operator: None,
            subject: None,
            created_at: now,
            last_activity_at: now,
        };
        self.insert(&session).await?;

        info!(
            session_id = %session.id,
            reason = %reason,
            priority = %session.priority,
            "conversation escalated to operator queue"
        );
        self.publish_escalated(&session);
        Ok(session)
    }

    /// File a ticket directly into the queue.
    pub async fn open_ticket(
        &self,
        conversation_id: &ConversationId,
        request: TicketRequest,
    ) -> Result<Session, MishkatError> {
        let now = Utc::now();
        let session = Session {
            id: SessionId::generate(),
            kind: SessionKind::Ticket,
            conversation_id: conversation_id.clone(),
            user_id: request.user_id,
            status: SessionStatus::Waiting,
            priority: request
                .priority
                .unwrap_or_else(|| request.reason.default_priority()),
            escalation_reason: request.reason,
            assigned_operator: None,
            subject: Some(request.subject),
            created_at: now,
            last_activity_at: now,
        };
        self.insert(&session).await?;
        info!(session_id = %session.id, priority = %session.priority, "ticket opened");
        self.publish_escalated(&session);
        Ok(session)
    }

    fn publish_escalated(&self, session: &Session) {
        self.events.publish(ChatEvent::SessionEscalated {
            session_id: session.id.clone(),
            conversation_id: session.conversation_id.clone(),
            reason: session.escalation_reason,
            priority: session.priority,
        });
    }

    /// An operator picks up a WAITING session.
    pub async fn accept(
        &self,
        id: &SessionId,
        operator_id: &UserId,
    ) -> Result<Session, MishkatError> {
        if !self.operators.is_allowed(operator_id.as_str()) {
            return Err(MishkatError::OperatorMismatch {
                session_id: id.to_string(),
                operator_id: operator_id.to_string(),
            });
        }
        let session = self
            .transition(id, "accept", |s| {
                if s.status != SessionStatus::Waiting {
                    return Err(invalid(s, "accept"));
                }
                s.status = SessionStatus::Active;
                s.assigned_operator = Some(operator_id.clone());
                Ok(())
            })
            .await?;
        info!(session_id = %id, operator = %operator_id, "session accepted");
        self.events.publish(ChatEvent::SessionAccepted {
            session_id: id.clone(),
            operator_id: operator_id.clone(),
        });
        Ok(session)
    }

    /// Mark a session resolved. Legal from WAITING (abandoned) or ACTIVE.
    pub async fn resolve(&self, id: &SessionId) -> Result<Session, MishkatError> {
        let session = self
            .transition(id, "resolve", |s| match s.status {
                SessionStatus::Waiting | SessionStatus::Active => {
                    s.status = SessionStatus::Resolved;
                    Ok(())
                }
                _ => Err(invalid(s, "resolve")),
            })
            .await?;
        info!(session_id = %id, "session resolved");
        self.events.publish(ChatEvent::SessionResolved {
            session_id: id.clone(),
        });
        Ok(session)
    }

    /// Close a WAITING or ACTIVE ticket. Chat sessions cannot be closed.
    pub async fn close(&self, id: &SessionId) -> Result<Session, MishkatError> {
        let session = self
            .transition(id, "close", |s| match (s.kind, s.status) {
                (SessionKind::Ticket, SessionStatus::Waiting | SessionStatus::Active) => {
                    s.status = SessionStatus::Closed;
                    Ok(())
                }
                _ => Err(invalid(s, "close")),
            })
            .await?;
        info!(session_id = %id, "ticket closed");
        self.events.publish(ChatEvent::SessionClosed {
            session_id: id.clone(),
        });
        Ok(session)
    }

    /// Put a RESOLVED session back in the queue after the user wrote again.
    pub async fn reopen(&self, id: &SessionId) -> Result<Session, MishkatError> {
        let session = self
            .transition(id, "reopen", |s| {
                if s.status != SessionStatus::Resolved {
                    return Err(invalid(s, "reopen"));
                }
                s.status = SessionStatus::Waiting;
                s.assigned_operator = None;
                Ok(())
            })
            .await?;
        info!(session_id = %id, "session reopened");
        self.events.publish(ChatEvent::SessionReopened {
            session_id: id.clone(),
        });
        Ok(session)
    }

    /// Bump `last_activity_at` without changing status.
    pub async fn touch(&self, id: &SessionId) -> Result<Session, MishkatError> {
        self.transition(id, "touch", |_| Ok(())).await
    }

    pub async fn get(&self, id: &SessionId) -> Result<Session, MishkatError> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| MishkatError::unknown(id))
    }

    /// The most recently created session of a conversation, in any status.
    pub async fn latest_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Session>, MishkatError> {
        let sessions = self.store.list_sessions(None).await?;
        Ok(latest(sessions, conversation_id))
    }

    /// WAITING sessions, most urgent first, then oldest first.
    pub async fn waiting_queue(&self) -> Result<Vec<Session>, MishkatError> {
        let mut queue = self.store.list_sessions(Some(SessionStatus::Waiting)).await?;
        queue.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(queue)
    }

    /// ACTIVE sessions assigned to `operator_id`, oldest first.
    pub async fn sessions_for_operator(
        &self,
        operator_id: &UserId,
    ) -> Result<Vec<Session>, MishkatError> {
        Ok(self
            .store
            .list_sessions(Some(SessionStatus::Active))
            .await?
            .into_iter()
            .filter(|s| s.assigned_operator.as_ref() == Some(operator_id))
            .collect())
    }
}

/// Sessions arrive oldest first; the last one for the conversation wins.
fn latest(sessions: Vec<Session>, conversation_id: &ConversationId) -> Option<Session> {
    sessions
        .into_iter()
        .rev()
        .find(|s| &s.conversation_id == conversation_id)
}

fn invalid(session: &Session, action: &'static str) -> MishkatError {
    MishkatError::InvalidStateTransition {
        session_id: session.id.to_string(),
        from: session.status,
        action,
    }
}
