// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The chat service facade.
//!
//! [`ChatService`] wires the classifier, response generator, session manager,
//! and conversation store into the message flow of the three chat surfaces:
//! community rooms and direct threads go straight to the log, while support
//! conversations run through classification, reply generation, and routing to
//! the operator queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use mishkat_classifier::KeywordClassifier;
use mishkat_config::model::MishkatConfig;
use mishkat_core::{
    AdapterType, ChatStore, Classifier, ConfidenceLevel, ContentLookup, Conversation, ConversationId,
    ConversationKind, EscalationHistoryStore, EscalationReason, HealthStatus, Identity,
    IdentityProvider, Message, MessageId, MishkatError, Priority, ReplyCategory, Responder,
    ResponderMetadata, ResponseCache, Sender, Session, SessionId, SessionStatus, UserId,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversation::ConversationStore;
use crate::events::{ChatEvent, EventBus};
use crate::generator::ResponseGenerator;
use crate::retry::RetryPolicy;
use crate::session::{SessionManager, TicketRequest};

const HANDOFF_NOTICE: &str = "I have passed this conversation to our support team. Someone \
     will reply here as soon as they can.";

/// What happened to a user message on a support conversation.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The user's message as committed.
    pub message: Message,
    /// Assistant messages appended in response, in order.
    pub replies: Vec<Message>,
    /// Template category of the generated reply, if one was generated.
    pub category: Option<ReplyCategory>,
    /// Set when this message routed the conversation to an operator.
    pub reason: Option<EscalationReason>,
    /// The conversation's support session after the message, if any.
    pub session: Option<Session>,
}

impl Exchange {
    pub fn escalated(&self) -> bool {
        self.reason.is_some()
    }
}

/// Identity and health of the backing chat store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub name: String,
    pub version: String,
    pub adapter_type: AdapterType,
    pub health: HealthStatus,
}

/// Chat core service. Construct one per process and share it behind an `Arc`.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    history: Arc<dyn EscalationHistoryStore>,
    classifier: Arc<dyn Classifier>,
    generator: ResponseGenerator,
    conversations: ConversationStore,
    sessions: SessionManager,
    identity: Option<Arc<dyn IdentityProvider>>,
    events: EventBus,
    cancellations: DashMap<ConversationId, (u64, CancellationToken)>,
    next_ticket: AtomicU64,
}

/// Cancellation registration of one in-flight call, removed on drop.
struct InFlight<'a> {
    cancellations: &'a DashMap<ConversationId, (u64, CancellationToken)>,
    conversation_id: ConversationId,
    ticket: u64,
    token: CancellationToken,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.cancellations
            .remove_if(&self.conversation_id, |_, (ticket, _)| *ticket == self.ticket);
    }
}

impl ChatService {
    /// Build a service over the given collaborators, with the keyword
    /// classifier reading and writing `history`.
    pub fn new(
        config: &MishkatConfig,
        store: Arc<dyn ChatStore>,
        history: Arc<dyn EscalationHistoryStore>,
        cache: Arc<dyn ResponseCache>,
    ) -> Self {
        let events = EventBus::default();
        let retry = RetryPolicy::from_config(&config.persistence);
        let classifier: Arc<dyn Classifier> =
            Arc::new(KeywordClassifier::new(history.clone(), &config.escalation));

        info!(
            store = store.name(),
            timeout_ms = config.generator.timeout_ms,
            "chat service initialized"
        );

        Self {
            conversations: ConversationStore::new(store.clone(), retry, events.clone()),
            sessions: SessionManager::new(
                store.clone(),
                config.operators.clone(),
                retry,
                events.clone(),
            ),
            generator: ResponseGenerator::new(cache, &config.generator),
            store,
            history,
            classifier,
            identity: None,
            events,
            cancellations: DashMap::new(),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Replace the keyword classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_content_lookup(mut self, content: Arc<dyn ContentLookup>) -> Self {
        self.generator = self.generator.with_content_lookup(content);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The signed-in user, if an identity provider is configured.
    pub fn current_user(&self) -> Option<Identity> {
        self.identity.as_ref().and_then(|p| p.current_user())
    }

    /// Post to a community room or direct thread. The author must already be
    /// a participant.
    pub async fn post(
        &self,
        conversation_id: &ConversationId,
        author: &UserId,
        text: &str,
    ) -> Result<Message, MishkatError> {
        let conversation = self.conversations.get(conversation_id).await?;
        if conversation.kind == ConversationKind::SupportTicket {
            return Err(MishkatError::InvalidRequest(format!(
                "conversation {conversation_id} is a support conversation"
            )));
        }
        if !conversation.participants.contains(author) {
            return Err(MishkatError::InvalidRequest(format!(
                "{author} is not a participant of {conversation_id}"
            )));
        }
        let message = Message::from_user(conversation_id.clone(), author.clone(), text);
        self.conversations
            .append(conversation_id, message.clone())
            .await?;
        Ok(message)
    }

    /// Handle a user message on a support conversation.
    ///
    /// While an operator session is WAITING or ACTIVE the message goes to the
    /// human only. A RESOLVED session is reopened. Otherwise the message is
    /// classified, answered by the assistant, and escalated when either the
    /// classifier or the reply asks for a human. If generation times out the
    /// conversation is escalated instead of left unanswered.
    ///
    /// The call can be cancelled with [`cancel_conversation`] from the moment
    /// it starts.
    ///
    /// [`cancel_conversation`]: ChatService::cancel_conversation
    pub async fn handle_user_message(
        &self,
        conversation_id: &ConversationId,
        user: &UserId,
        text: &str,
    ) -> Result<Exchange, MishkatError> {
        let in_flight = self.begin(conversation_id);
        self.require_support(conversation_id).await?;

        let message = Message::from_user(conversation_id.clone(), user.clone(), text);
        self.conversations
            .append(conversation_id, message.clone())
            .await?;
        self.respond(conversation_id, user, message, &in_flight.token)
            .await
    }

    /// Resend a support message that failed to send, then route it exactly
    /// like a fresh [`handle_user_message`] call.
    ///
    /// [`handle_user_message`]: ChatService::handle_user_message
    pub async fn retry_user_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Exchange, MishkatError> {
        let in_flight = self.begin(conversation_id);
        self.require_support(conversation_id).await?;

        let held = self
            .conversations
            .failed_messages(conversation_id)
            .await?
            .into_iter()
            .find(|m| &m.id == message_id)
            .ok_or_else(|| {
                MishkatError::InvalidRequest(format!(
                    "no failed message {message_id} in {conversation_id}"
                ))
            })?;
        let user = match (held.sender, &held.author) {
            (Sender::User, Some(author)) => author.clone(),
            _ => {
                return Err(MishkatError::InvalidRequest(format!(
                    "message {message_id} was not written by a user"
                )));
            }
        };

        let message = self
            .conversations
            .retry_failed(conversation_id, message_id)
            .await?;
        debug!(conversation_id = %conversation_id, message_id = %message_id, "held message delivered");
        self.respond(conversation_id, &user, message, &in_flight.token)
            .await
    }

    async fn require_support(&self, conversation_id: &ConversationId) -> Result<(), MishkatError> {
        let conversation = self.conversations.get(conversation_id).await?;
        if conversation.kind != ConversationKind::SupportTicket {
            return Err(MishkatError::InvalidRequest(format!(
                "conversation {conversation_id} is a {}, not a support conversation",
                conversation.kind
            )));
        }
        Ok(())
    }

    /// Route a committed user message: operator session, or assistant reply
    /// and possible escalation.
    async fn respond(
        &self,
        conversation_id: &ConversationId,
        user: &UserId,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<Exchange, MishkatError> {
        let text = message.text.clone();
        let mut exchange = Exchange {
            message,
            replies: Vec::new(),
            category: None,
            reason: None,
            session: None,
        };

        if let Some(session) = self.sessions.latest_for_conversation(conversation_id).await? {
            match session.status {
                SessionStatus::Waiting | SessionStatus::Active => {
                    debug!(session_id = %session.id, "message routed to operator session");
                    exchange.session = Some(self.sessions.touch(&session.id).await?);
                    return Ok(exchange);
                }
                SessionStatus::Resolved => {
                    exchange.session = Some(self.sessions.reopen(&session.id).await?);
                    return Ok(exchange);
                }
                SessionStatus::Closed => {}
            }
        }

        let decision = self.classifier.classify(&text, user).await?;

        let reply = match self
            .generator
            .generate_reply(conversation_id, user, &text, cancel)
            .await
        {
            Ok(reply) => reply,
            Err(MishkatError::ClassificationTimeout { duration }) => {
                let reason = decision
                    .reason
                    .unwrap_or(EscalationReason::AssistantUnavailable);
                warn!(
                    conversation_id = %conversation_id,
                    timeout_ms = duration.as_millis() as u64,
                    reason = %reason,
                    "reply generation timed out, routing to an operator"
                );
                let session = self
                    .sessions
                    .escalate(conversation_id, user, reason)
                    .await?;
                if let Some(classified) = decision.reason {
                    self.classifier.record_escalation(user, classified).await?;
                }
                let notice = handoff_notice(conversation_id, ConfidenceLevel::Low);
                self.conversations
                    .append(conversation_id, notice.clone())
                    .await?;
                exchange.replies.push(notice);
                exchange.reason = Some(reason);
                exchange.session = Some(session);
                return Ok(exchange);
            }
            Err(e) => return Err(e),
        };

        self.conversations
            .append(conversation_id, reply.message.clone())
            .await?;
        let flagged = reply.message.escalation_flag();
        exchange.category = Some(reply.category);
        exchange.replies.push(reply.message);

        let reason = match decision.reason {
            Some(reason) => Some(reason),
            None if flagged => Some(reason_for_category(reply.category)),
            None => None,
        };

        if let Some(reason) = reason {
            exchange.session = Some(
                self.sessions
                    .escalate(conversation_id, user, reason)
                    .await?,
            );
            self.classifier.record_escalation(user, reason).await?;
            info!(user = %user, reason = %reason, "message requires human handling");
            if !flagged {
                let notice = handoff_notice(conversation_id, ConfidenceLevel::High);
                self.conversations
                    .append(conversation_id, notice.clone())
                    .await?;
                exchange.replies.push(notice);
            }
            exchange.reason = Some(reason);
        }

        Ok(exchange)
    }

    /// Cancel in-flight message handling for a conversation.
    ///
    /// Returns `false` when nothing is in flight for it.
    pub fn cancel_conversation(&self, conversation_id: &ConversationId) -> bool {
        match self.cancellations.remove(conversation_id) {
            Some((_, (_, token))) => {
                token.cancel();
                debug!(conversation_id = %conversation_id, "reply generation cancelled");
                true
            }
            None => false,
        }
    }

    /// Register a cancellation token for the duration of one call.
    fn begin(&self, conversation_id: &ConversationId) -> InFlight<'_> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.cancellations
            .insert(conversation_id.clone(), (ticket, token.clone()));
        InFlight {
            cancellations: &self.cancellations,
            conversation_id: conversation_id.clone(),
            ticket,
            token,
        }
    }

    /// File a ticket: a fresh support conversation with a WAITING ticket
    /// session.
    pub async fn open_ticket(
        &self,
        user: &UserId,
        subject: &str,
        reason: EscalationReason,
        priority: Option<Priority>,
    ) -> Result<Session, MishkatError> {
        let conversation = self
            .conversations
            .create_ticket_conversation(user, subject)
            .await?;
        self.sessions
            .open_ticket(
                &conversation.id,
                TicketRequest {
                    user_id: user.clone(),
                    subject: subject.to_string(),
                    reason,
                    priority,
                },
            )
            .await
    }

    /// An operator accepts a WAITING session and joins its conversation.
    pub async fn accept(
        &self,
        session_id: &SessionId,
        operator_id: &UserId,
    ) -> Result<Session, MishkatError> {
        let session = self.sessions.accept(session_id, operator_id).await?;
        self.conversations
            .add_participant(&session.conversation_id, operator_id)
            .await?;
        Ok(session)
    }

    pub async fn resolve(&self, session_id: &SessionId) -> Result<Session, MishkatError> {
        self.sessions.resolve(session_id).await
    }

    pub async fn close(&self, session_id: &SessionId) -> Result<Session, MishkatError> {
        self.sessions.close(session_id).await
    }

    /// Reply on an ACTIVE session as its assigned operator.
    pub async fn operator_reply(
        &self,
        session_id: &SessionId,
        operator_id: &UserId,
        text: &str,
    ) -> Result<Message, MishkatError> {
        let session = self.sessions.get(session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(MishkatError::InvalidStateTransition {
                session_id: session.id.to_string(),
                from: session.status,
                action: "reply",
            });
        }
        if session.assigned_operator.as_ref() != Some(operator_id) {
            return Err(MishkatError::OperatorMismatch {
                session_id: session.id.to_string(),
                operator_id: operator_id.to_string(),
            });
        }

        let message =
            Message::from_operator(session.conversation_id.clone(), operator_id.clone(), text);
        self.conversations
            .append(&session.conversation_id, message.clone())
            .await?;
        self.sessions.touch(session_id).await?;
        Ok(message)
    }

    pub async fn waiting_queue(&self) -> Result<Vec<Session>, MishkatError> {
        self.sessions.waiting_queue().await
    }

    pub async fn open_support_conversation(
        &self,
        user: &UserId,
    ) -> Result<Conversation, MishkatError> {
        self.conversations.open_support_conversation(user).await
    }

    /// Escalation reasons recorded for `user`, oldest first.
    pub async fn get_history(&self, user: &UserId) -> Result<Vec<EscalationReason>, MishkatError> {
        self.history.history(user).await
    }

    pub async fn clear_history(&self, user: &UserId) -> Result<(), MishkatError> {
        self.history.clear(user).await
    }

    /// Report the backing store's identity and health. A failing health
    /// check is reported as unhealthy rather than returned as an error.
    pub async fn store_status(&self) -> StoreStatus {
        let health = match self.store.health_check().await {
            Ok(health) => health,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        StoreStatus {
            name: self.store.name().to_string(),
            version: self.store.version().to_string(),
            adapter_type: self.store.adapter_type(),
            health,
        }
    }

    /// Cancel outstanding generations and close the backing store.
    pub async fn shutdown(&self) -> Result<(), MishkatError> {
        for entry in self.cancellations.iter() {
            entry.value().1.cancel();
        }
        self.cancellations.clear();
        self.store.close().await?;
        info!("chat service shut down");
        Ok(())
    }
}

/// Reason recorded when only the generated reply asked for a human.
fn reason_for_category(category: ReplyCategory) -> EscalationReason {
    match category {
        ReplyCategory::TechnicalHelp => EscalationReason::TechnicalSupport,
        _ => EscalationReason::AdminRequest,
    }
}

fn handoff_notice(conversation_id: &ConversationId, confidence: ConfidenceLevel) -> Message {
    Message::from_assistant(
        conversation_id.clone(),
        HANDOFF_NOTICE,
        ResponderMetadata {
            responder: Responder::Assistant,
            confidence,
            escalation_flag: true,
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use mishkat_config::model::OperatorsConfig;
    use mishkat_core::{DeliveryStatus, Sender, SessionKind};
    use mishkat_storage::{MemoryHistoryStore, MemoryResponseCache, MemoryStore};
    use mishkat_test_utils::{FlakyStore, SlowContentLookup};
    use tracing_test::traced_test;

    struct Fixture {
        service: ChatService,
        history: Arc<MemoryHistoryStore>,
    }

    fn fixture_with(config: MishkatConfig, store: Arc<dyn ChatStore>) -> Fixture {
        let history = Arc::new(MemoryHistoryStore::new(config.escalation.history_limit));
        let service = ChatService::new(
            &config,
            store,
            history.clone(),
            Arc::new(MemoryResponseCache::new(config.generator.cache_capacity)),
        );
        Fixture { service, history }
    }

    fn fixture() -> Fixture {
        fixture_with(MishkatConfig::default(), Arc::new(MemoryStore::new()))
    }

    fn amina() -> UserId {
        UserId::new("amina")
    }

    fn operator() -> UserId {
        UserId::new("op-bilal")
    }

    async fn support(service: &ChatService) -> ConversationId {
        service.open_support_conversation(&amina()).await.unwrap().id
    }

    #[tokio::test]
    async fn fatwa_request_opens_high_priority_waiting_session() {
        let f = fixture();
        let conv = support(&f.service).await;
        let ex = f
            .service
            .handle_user_message(&conv, &amina(), "I need a fatwa about inheritance")
            .await
            .unwrap();

        assert_eq!(ex.reason, Some(EscalationReason::FatwaRequest));
        let session = ex.session.unwrap();
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.priority, Priority::High);
        assert_eq!(session.kind, SessionKind::Chat);
        assert!(session.assigned_operator.is_none());
        assert_eq!(ex.replies.len(), 1);
        assert!(ex.replies[0].escalation_flag());
        assert_eq!(
            f.service.get_history(&amina()).await.unwrap(),
            vec![EscalationReason::FatwaRequest]
        );
    }

    #[tokio::test]
    async fn payment_failure_is_urgent_with_flagged_technical_reply() {
        let f = fixture();
        let conv = support(&f.service).await;
        let ex = f
            .service
            .handle_user_message(&conv, &amina(), "my payment failed")
            .await
            .unwrap();

        assert_eq!(ex.reason, Some(EscalationReason::PaymentIssue));
        assert_eq!(ex.category, Some(ReplyCategory::TechnicalHelp));
        assert!(ex.replies[0].escalation_flag());
        assert_eq!(ex.session.unwrap().priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn hadith_question_is_answered_and_cached() {
        let f = fixture();
        let conv = support(&f.service).await;
        let first = f
            .service
            .handle_user_message(&conv, &amina(), "what is the hadith about smiling")
            .await
            .unwrap();
        assert!(!first.escalated());
        assert!(first.session.is_none());
        assert_eq!(first.category, Some(ReplyCategory::HadithExplanation));

        let second = f
            .service
            .handle_user_message(&conv, &amina(), "What is the hadith about smiling ")
            .await
            .unwrap();
        assert_eq!(second.replies[0].text, first.replies[0].text);
        assert_eq!(second.replies[0].metadata, first.replies[0].metadata);
        assert_ne!(second.replies[0].id, first.replies[0].id);

        let log = f.service.conversations().list_messages(&conv).await.unwrap();
        let senders: Vec<_> = log.iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            vec![Sender::User, Sender::Assistant, Sender::User, Sender::Assistant]
        );
        assert!(f.service.get_history(&amina()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_escalations_force_a_human() {
        let f = fixture();
        f.history
            .append(&amina(), EscalationReason::FatwaRequest)
            .await
            .unwrap();
        f.history
            .append(&amina(), EscalationReason::PaymentIssue)
            .await
            .unwrap();
        let conv = support(&f.service).await;

        let ex = f
            .service
            .handle_user_message(&conv, &amina(), "hello")
            .await
            .unwrap();
        assert_eq!(ex.reason, Some(EscalationReason::ConfusionAfterAi));
        assert_eq!(ex.category, Some(ReplyCategory::Clarification));
        // Clarification replies are unflagged, so a handoff notice follows.
        assert_eq!(ex.replies.len(), 2);
        assert!(!ex.replies[0].escalation_flag());
        assert!(ex.replies[1].escalation_flag());
        assert_eq!(ex.session.unwrap().priority, Priority::Normal);
    }

    #[tokio::test]
    async fn flagged_reply_alone_escalates_and_is_recorded() {
        let f = fixture();
        let conv = support(&f.service).await;
        let ex = f
            .service
            .handle_user_message(&conv, &amina(), "I would like to ask a scholar")
            .await
            .unwrap();
        assert_eq!(ex.category, Some(ReplyCategory::Escalation));
        assert_eq!(ex.reason, Some(EscalationReason::AdminRequest));
        assert_eq!(
            f.service.get_history(&amina()).await.unwrap(),
            vec![EscalationReason::AdminRequest]
        );

        let conv2 = f
            .service
            .conversations()
            .create_ticket_conversation(&amina(), "uploads")
            .await
            .unwrap()
            .id;
        let ex = f
            .service
            .handle_user_message(&conv2, &amina(), "the upload failed")
            .await
            .unwrap();
        assert_eq!(ex.category, Some(ReplyCategory::TechnicalHelp));
        assert_eq!(ex.reason, Some(EscalationReason::TechnicalSupport));
    }

    #[tokio::test]
    async fn accepting_twice_is_an_invalid_transition() {
        let f = fixture();
        let ticket = f
            .service
            .open_ticket(&amina(), "Refund", EscalationReason::PaymentIssue, None)
            .await
            .unwrap();
        f.service.accept(&ticket.id, &operator()).await.unwrap();
        let err = f.service.accept(&ticket.id, &operator()).await.unwrap_err();
        assert!(matches!(
            err,
            MishkatError::InvalidStateTransition {
                from: SessionStatus::Active,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn waiting_session_takes_messages_without_the_assistant() {
        let f = fixture();
        let conv = support(&f.service).await;
        let first = f
            .service
            .handle_user_message(&conv, &amina(), "talk to a human please")
            .await
            .unwrap();
        let session_id = first.session.unwrap().id;

        let ex = f
            .service
            .handle_user_message(&conv, &amina(), "are you there?")
            .await
            .unwrap();
        assert!(ex.replies.is_empty());
        assert!(!ex.escalated());
        assert_eq!(ex.session.unwrap().id, session_id);
        assert_eq!(f.service.get_history(&amina()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn message_after_resolution_reopens_the_session() {
        let f = fixture();
        let conv = support(&f.service).await;
        let session = f
            .service
            .handle_user_message(&conv, &amina(), "I need a fatwa")
            .await
            .unwrap()
            .session
            .unwrap();
        f.service.accept(&session.id, &operator()).await.unwrap();
        f.service.resolve(&session.id).await.unwrap();

        let ex = f
            .service
            .handle_user_message(&conv, &amina(), "one more question")
            .await
            .unwrap();
        let reopened = ex.session.unwrap();
        assert_eq!(reopened.id, session.id);
        assert_eq!(reopened.status, SessionStatus::Waiting);
        assert!(reopened.assigned_operator.is_none());
        assert!(ex.replies.is_empty());
    }

    #[tokio::test]
    async fn closed_ticket_falls_back_to_the_assistant() {
        let f = fixture();
        let ticket = f
            .service
            .open_ticket(&amina(), "Bookmarks", EscalationReason::TechnicalSupport, None)
            .await
            .unwrap();
        f.service.close(&ticket.id).await.unwrap();

        let ex = f
            .service
            .handle_user_message(&ticket.conversation_id, &amina(), "how do i bookmark a page")
            .await
            .unwrap();
        assert_eq!(ex.category, Some(ReplyCategory::AppGuidance));
        assert!(!ex.escalated());
        assert!(ex.session.is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn generation_timeout_fails_safe_to_an_operator() {
        let mut config = MishkatConfig::default();
        config.generator.timeout_ms = 20;
        let f = fixture_with(config, Arc::new(MemoryStore::new()));
        let service = f
            .service
            .with_content_lookup(Arc::new(SlowContentLookup::new(Duration::from_secs(5))));
        let conv = service.open_support_conversation(&amina()).await.unwrap().id;

        let ex = service
            .handle_user_message(&conv, &amina(), "explain this hadith")
            .await
            .unwrap();
        assert_eq!(ex.reason, Some(EscalationReason::AssistantUnavailable));
        let session = ex.session.unwrap();
        assert_eq!(session.priority, Priority::High);
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(ex.replies.len(), 1);
        assert!(ex.replies[0].escalation_flag());
        assert!(service.get_history(&amina()).await.unwrap().is_empty());
        assert!(logs_contain("reply generation timed out"));
    }

    #[tokio::test]
    async fn cancelled_generation_leaves_only_the_user_message() {
        let store = Arc::new(MemoryStore::new());
        let f = fixture_with(MishkatConfig::default(), store);
        let service = Arc::new(
            f.service
                .with_content_lookup(Arc::new(SlowContentLookup::new(Duration::from_secs(30)))),
        );
        let conv = service.open_support_conversation(&amina()).await.unwrap().id;

        let canceller = {
            let service = service.clone();
            let conv = conv.clone();
            tokio::spawn(async move {
                while !service.cancel_conversation(&conv) {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        let err = service
            .handle_user_message(&conv, &amina(), "explain this hadith")
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, MishkatError::Cancelled));

        let log = service.conversations().list_messages(&conv).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(service.waiting_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_escalations_do_not_count_as_strikes() {
        let f = fixture();
        let service = Arc::new(
            f.service
                .with_content_lookup(Arc::new(SlowContentLookup::new(Duration::from_secs(30)))),
        );
        let conv = service.open_support_conversation(&amina()).await.unwrap().id;

        for _ in 0..2 {
            let canceller = {
                let service = service.clone();
                let conv = conv.clone();
                tokio::spawn(async move {
                    while !service.cancel_conversation(&conv) {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                })
            };
            let err = service
                .handle_user_message(&conv, &amina(), "is this hadith authentic?")
                .await
                .unwrap_err();
            canceller.await.unwrap();
            assert!(matches!(err, MishkatError::Cancelled));
        }

        assert!(service.get_history(&amina()).await.unwrap().is_empty());
        let ex = service
            .handle_user_message(&conv, &amina(), "hello")
            .await
            .unwrap();
        assert_ne!(ex.reason, Some(EscalationReason::ConfusionAfterAi));
        assert!(!ex.escalated());
    }

    #[tokio::test]
    async fn finished_calls_leave_nothing_to_cancel() {
        let f = fixture();
        let conv = support(&f.service).await;
        f.service
            .handle_user_message(&conv, &amina(), "what time is prayer")
            .await
            .unwrap();
        assert!(!f.service.cancel_conversation(&conv));

        f.service
            .handle_user_message(&ConversationId::new("nope"), &amina(), "hi")
            .await
            .unwrap_err();
        assert!(!f.service.cancel_conversation(&ConversationId::new("nope")));
    }

    #[tokio::test]
    async fn failed_user_message_stays_visible() {
        let mut config = MishkatConfig::default();
        config.persistence.max_attempts = 1;
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new()));
        let f = fixture_with(config, flaky.clone());
        let conv = support(&f.service).await;

        flaky.fail_next(1);
        let err = f
            .service
            .handle_user_message(&conv, &amina(), "salaam")
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let listed = f.service.conversations().list_with_status(&conv).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0.text, "salaam");
        assert_eq!(listed[0].1, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn retried_support_message_is_classified() {
        let mut config = MishkatConfig::default();
        config.persistence.max_attempts = 1;
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new()));
        let f = fixture_with(config, flaky.clone());
        let conv = support(&f.service).await;

        flaky.fail_next(1);
        f.service
            .handle_user_message(&conv, &amina(), "I need a fatwa")
            .await
            .unwrap_err();
        let held = f.service.conversations().failed_messages(&conv).await.unwrap();
        assert_eq!(held.len(), 1);

        let ex = f
            .service
            .retry_user_message(&conv, &held[0].id)
            .await
            .unwrap();
        assert_eq!(ex.message.id, held[0].id);
        assert_eq!(ex.reason, Some(EscalationReason::FatwaRequest));
        assert_eq!(f.service.waiting_queue().await.unwrap().len(), 1);
        assert_eq!(
            f.service.conversations().list_messages(&conv).await.unwrap().len(),
            2
        );
        assert!(
            f.service
                .conversations()
                .failed_messages(&conv)
                .await
                .unwrap()
                .is_empty()
        );

        let again = f
            .service
            .retry_user_message(&conv, &held[0].id)
            .await
            .unwrap_err();
        assert!(matches!(again, MishkatError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn operator_replies_need_the_assigned_operator() {
        let f = fixture();
        let conv = support(&f.service).await;
        let session = f
            .service
            .handle_user_message(&conv, &amina(), "I need a fatwa")
            .await
            .unwrap()
            .session
            .unwrap();

        let early = f
            .service
            .operator_reply(&session.id, &operator(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(early, MishkatError::InvalidStateTransition { .. }));

        f.service.accept(&session.id, &operator()).await.unwrap();
        let wrong = f
            .service
            .operator_reply(&session.id, &UserId::new("op-other"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(wrong, MishkatError::OperatorMismatch { .. }));

        let reply = f
            .service
            .operator_reply(&session.id, &operator(), "Wa alaykum salaam, how can I help?")
            .await
            .unwrap();
        assert_eq!(reply.sender, Sender::Operator);

        let conversations = f.service.conversations();
        assert!(
            conversations
                .get(&conv)
                .await
                .unwrap()
                .participants
                .contains(&operator())
        );
        // Assistant reply plus operator reply.
        assert_eq!(conversations.unread_count(&conv, &amina()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn accept_rejects_operators_outside_the_roster() {
        let mut config = MishkatConfig::default();
        config.operators = OperatorsConfig {
            ids: vec!["op-bilal".to_string()],
        };
        let f = fixture_with(config, Arc::new(MemoryStore::new()));
        let ticket = f
            .service
            .open_ticket(&amina(), "Login", EscalationReason::TechnicalSupport, None)
            .await
            .unwrap();
        assert!(matches!(
            f.service
                .accept(&ticket.id, &UserId::new("stranger"))
                .await
                .unwrap_err(),
            MishkatError::OperatorMismatch { .. }
        ));
        f.service.accept(&ticket.id, &operator()).await.unwrap();
    }

    #[tokio::test]
    async fn posts_skip_the_assistant_and_require_membership() {
        let f = fixture();
        let room = f
            .service
            .conversations()
            .create_room("Halaqa", &amina())
            .await
            .unwrap();
        let msg = f
            .service
            .post(&room.id, &amina(), "I need a fatwa")
            .await
            .unwrap();
        assert_eq!(msg.sender, Sender::User);
        assert_eq!(
            f.service.conversations().list_messages(&room.id).await.unwrap().len(),
            1
        );
        assert!(f.service.waiting_queue().await.unwrap().is_empty());

        assert!(matches!(
            f.service
                .post(&room.id, &UserId::new("yusuf"), "hi")
                .await
                .unwrap_err(),
            MishkatError::InvalidRequest(_)
        ));

        let conv = support(&f.service).await;
        assert!(matches!(
            f.service.post(&conv, &amina(), "hi").await.unwrap_err(),
            MishkatError::InvalidRequest(_)
        ));
        assert!(matches!(
            f.service
                .handle_user_message(&room.id, &amina(), "hi")
                .await
                .unwrap_err(),
            MishkatError::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn unknown_conversation_is_reported() {
        let f = fixture();
        let err = f
            .service
            .handle_user_message(&ConversationId::new("nope"), &amina(), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, MishkatError::UnknownConversation { .. }));
    }

    #[tokio::test]
    async fn escalation_emits_events_in_order() {
        let f = fixture();
        let conv = support(&f.service).await;
        let mut rx = f.service.subscribe();
        f.service
            .handle_user_message(&conv, &amina(), "I need a fatwa")
            .await
            .unwrap();

        let kinds: Vec<_> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .iter()
        .map(ChatEvent::kind)
        .collect();
        assert_eq!(kinds, vec!["new_message", "new_message", "session_escalated"]);
    }

    #[tokio::test]
    async fn clearing_history_resets_the_two_strikes_rule() {
        let f = fixture();
        let conv = support(&f.service).await;
        f.service
            .handle_user_message(&conv, &amina(), "I need a fatwa")
            .await
            .unwrap();
        assert_eq!(f.service.get_history(&amina()).await.unwrap().len(), 1);
        f.service.clear_history(&amina()).await.unwrap();
        assert!(f.service.get_history(&amina()).await.unwrap().is_empty());
    }
}
