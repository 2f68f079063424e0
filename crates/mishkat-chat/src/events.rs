// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observer events emitted by the chat core.
//!
//! The bus is a `tokio::sync::broadcast` channel: every subscriber sees every
//! event published after it subscribed, and a subscriber that falls more than
//! `capacity` events behind receives `RecvError::Lagged` instead of blocking
//! publishers.

use mishkat_core::{
    ConversationId, EscalationReason, Message, MessageId, Priority, SessionId, UserId,
};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel depth.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A message was committed to a conversation log.
    NewMessage { message: Message },
    /// A support conversation was routed to the operator queue.
    SessionEscalated {
        session_id: SessionId,
        conversation_id: ConversationId,
        reason: EscalationReason,
        priority: Priority,
    },
    SessionAccepted {
        session_id: SessionId,
        operator_id: UserId,
    },
    SessionResolved { session_id: SessionId },
    SessionClosed { session_id: SessionId },
    /// A user wrote again after resolution; the session is back in the queue.
    SessionReopened { session_id: SessionId },
    /// A message could not be stored after all retries and is held locally.
    DeliveryFailed {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
}

impl ChatEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::NewMessage { .. } => "new_message",
            ChatEvent::SessionEscalated { .. } => "session_escalated",
            ChatEvent::SessionAccepted { .. } => "session_accepted",
            ChatEvent::SessionResolved { .. } => "session_resolved",
            ChatEvent::SessionClosed { .. } => "session_closed",
            ChatEvent::SessionReopened { .. } => "session_reopened",
            ChatEvent::DeliveryFailed { .. } => "delivery_failed",
        }
    }
}

/// Cloneable handle to the event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: ChatEvent) {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => trace!(kind, receivers, "event published"),
            Err(_) => trace!(kind, "event dropped, no subscribers"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let first = SessionId::new("s-1");
        bus.publish(ChatEvent::SessionResolved {
            session_id: first.clone(),
        });
        bus.publish(ChatEvent::SessionClosed {
            session_id: first.clone(),
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            ChatEvent::SessionResolved {
                session_id: first.clone()
            }
        );
        assert_eq!(rx.recv().await.unwrap().kind(), "session_closed");
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new(0);
        bus.publish(ChatEvent::SessionReopened {
            session_id: SessionId::new("s"),
        });
    }
}
