// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automated reply generation.
//!
//! Replies are built from per-category templates and cached by normalized
//! message text. A cache hit is returned as a fresh message without
//! re-categorizing, so identical text always yields the same reply and the
//! same escalation flag regardless of conversation context.

use std::sync::Arc;
use std::time::Duration;

use mishkat_classifier::ReplyCategorizer;
use mishkat_config::model::GeneratorConfig;
use mishkat_core::{
    CachedReply, ConfidenceLevel, ContentLookup, ConversationId, Message, MishkatError,
    ReplyCategory, Responder, ResponderMetadata, ResponseCache, UserId,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const HADITH_TEMPLATE: &str = "Hadith are best read with their chain of narration and the \
     commentary of the scholars. Open the hadith in the reader to see its grading and \
     related narrations.";
const APP_TEMPLATE: &str = "You can search the collection from the top bar, tap the bookmark \
     icon to save a hadith, and find your saved items under Profile > Saved.";
const TECHNICAL_TEMPLATE: &str = "Sorry you are running into trouble. I have flagged this for \
     our support team, who can look at your account directly.";
const GENERAL_TEMPLATE: &str = "That is a good question. I can share general guidance, but for \
     anything specific to your situation please consult a qualified scholar.";
const ESCALATION_TEMPLATE: &str = "This needs someone with the right authority to answer. I am \
     connecting you with a member of our team.";
const CLARIFICATION_TEMPLATE: &str = "Could you tell me a little more? I can help with hadith, \
     using the app, and general questions.";

/// An assistant message together with how it was produced.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub message: Message,
    pub category: ReplyCategory,
    pub from_cache: bool,
}

/// Normalized cache key: trimmed and lower-cased.
pub fn cache_key(text: &str) -> String {
    text.trim().to_lowercase()
}

fn template(category: ReplyCategory) -> (&'static str, ResponderMetadata) {
    let meta = |confidence, escalation_flag| ResponderMetadata {
        responder: Responder::Assistant,
        confidence,
        escalation_flag,
    };
    match category {
        ReplyCategory::HadithExplanation => (HADITH_TEMPLATE, meta(ConfidenceLevel::High, false)),
        ReplyCategory::AppGuidance => (APP_TEMPLATE, meta(ConfidenceLevel::High, false)),
        ReplyCategory::TechnicalHelp => (TECHNICAL_TEMPLATE, meta(ConfidenceLevel::Medium, true)),
        ReplyCategory::GeneralIslamic => (GENERAL_TEMPLATE, meta(ConfidenceLevel::Medium, false)),
        ReplyCategory::Escalation => (ESCALATION_TEMPLATE, meta(ConfidenceLevel::High, true)),
        ReplyCategory::Clarification => (CLARIFICATION_TEMPLATE, meta(ConfidenceLevel::Low, false)),
    }
}

/// Template-based reply generator with a pluggable cache and content lookup.
pub struct ResponseGenerator {
    categorizer: ReplyCategorizer,
    cache: Arc<dyn ResponseCache>,
    content: Option<Arc<dyn ContentLookup>>,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(cache: Arc<dyn ResponseCache>, config: &GeneratorConfig) -> Self {
        Self {
            categorizer: ReplyCategorizer::new(),
            cache,
            content: None,
            timeout: config.timeout(),
        }
    }

    pub fn with_content_lookup(mut self, content: Arc<dyn ContentLookup>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Generate a reply to `text`.
    ///
    /// Fails with `ClassificationTimeout` when the configured bound elapses
    /// and with `Cancelled` when `cancel` fires first.
    pub async fn generate_reply(
        &self,
        conversation_id: &ConversationId,
        user: &UserId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<GeneratedReply, MishkatError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(conversation_id = %conversation_id, "generation cancelled");
                Err(MishkatError::Cancelled)
            }
            result = tokio::time::timeout(self.timeout, self.compose(conversation_id, user, text)) => {
                result.map_err(|_| MishkatError::ClassificationTimeout { duration: self.timeout })
            }
        }
    }

    async fn compose(
        &self,
        conversation_id: &ConversationId,
        user: &UserId,
        text: &str,
    ) -> GeneratedReply {
        let key = cache_key(text);

        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                debug!(user = %user, category = %hit.category, "reply served from cache");
                return GeneratedReply {
                    message: Message::from_assistant(conversation_id.clone(), hit.text, hit.metadata),
                    category: hit.category,
                    from_cache: true,
                };
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "response cache read failed, generating fresh reply"),
        }

        let category = self.categorizer.categorize(text);
        let (base, metadata) = template(category);
        let reply_text = match category {
            ReplyCategory::HadithExplanation => self.with_excerpt(base, text).await,
            _ => base.to_string(),
        };

        let cached = CachedReply {
            text: reply_text,
            category,
            metadata,
        };
        if let Err(e) = self.cache.put(&key, &cached).await {
            warn!(error = %e, "response cache write failed");
        }
        debug!(user = %user, category = %category, "reply generated");

        GeneratedReply {
            message: Message::from_assistant(conversation_id.clone(), cached.text, metadata),
            category,
            from_cache: false,
        }
    }

    async fn with_excerpt(&self, base: &str, query: &str) -> String {
        let Some(content) = &self.content else {
            return base.to_string();
        };
        match content.lookup(query).await {
            Ok(Some(excerpt)) => format!("{excerpt}\n\n{base}"),
            Ok(None) => base.to_string(),
            Err(e) => {
                warn!(error = %e, "content lookup failed");
                base.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mishkat_storage::MemoryResponseCache;
    use mishkat_test_utils::{SlowContentLookup, StaticContentLookup};

    fn generator() -> (ResponseGenerator, Arc<MemoryResponseCache>) {
        let cache = Arc::new(MemoryResponseCache::new(16));
        (
            ResponseGenerator::new(cache.clone(), &GeneratorConfig::default()),
            cache,
        )
    }

    fn conv() -> ConversationId {
        ConversationId::new("support-1")
    }

    fn user() -> UserId {
        UserId::new("amina")
    }

    #[test]
    fn cache_key_normalizes() {
        assert_eq!(
            cache_key("  What is the Hadith about SMILING "),
            "what is the hadith about smiling"
        );
    }

    #[tokio::test]
    async fn payment_trouble_gets_flagged_technical_reply() {
        let (g, _) = generator();
        let reply = g
            .generate_reply(&conv(), &user(), "my payment failed", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.category, ReplyCategory::TechnicalHelp);
        assert!(reply.message.escalation_flag());
        assert_eq!(reply.message.metadata.unwrap().confidence, ConfidenceLevel::Medium);
    }

    #[tokio::test]
    async fn hadith_reply_is_cached_under_normalized_key() {
        let (g, cache) = generator();
        let text = "what is the hadith about smiling";
        let first = g
            .generate_reply(&conv(), &user(), text, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.category, ReplyCategory::HadithExplanation);
        assert!(!first.from_cache);
        assert!(!first.message.escalation_flag());

        let stored = cache.get(text).await.unwrap().unwrap();
        assert_eq!(stored.text, first.message.text);

        let second = g
            .generate_reply(&conv(), &user(), "  What is the hadith about smiling", &CancellationToken::new())
            .await
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(second.message.text, first.message.text);
        assert_eq!(second.message.metadata, first.message.metadata);
        assert_ne!(second.message.id, first.message.id);
    }

    #[tokio::test]
    async fn hadith_reply_embeds_content_excerpt() {
        let (g, _) = generator();
        let g = g.with_content_lookup(Arc::new(StaticContentLookup::new(
            "smiling",
            "Your smiling in the face of your brother is charity. (Tirmidhi)",
        )));
        let reply = g
            .generate_reply(&conv(), &user(), "hadith about smiling", &CancellationToken::new())
            .await
            .unwrap();
        assert!(reply.message.text.starts_with("Your smiling in the face"));
        assert!(reply.message.text.contains(HADITH_TEMPLATE));
    }

    struct BrokenCache;

    #[async_trait]
    impl ResponseCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<CachedReply>, MishkatError> {
            Err(MishkatError::persistence("cache offline"))
        }
        async fn put(&self, _key: &str, _reply: &CachedReply) -> Result<(), MishkatError> {
            Err(MishkatError::persistence("cache offline"))
        }
        async fn clear(&self) -> Result<(), MishkatError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cache_failures_do_not_block_replies() {
        let g = ResponseGenerator::new(Arc::new(BrokenCache), &GeneratorConfig::default());
        let reply = g
            .generate_reply(&conv(), &user(), "hello", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.category, ReplyCategory::Clarification);
        assert_eq!(reply.message.metadata.unwrap().confidence, ConfidenceLevel::Low);
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let config = GeneratorConfig {
            timeout_ms: 20,
            ..GeneratorConfig::default()
        };
        let g = ResponseGenerator::new(Arc::new(MemoryResponseCache::new(4)), &config)
            .with_content_lookup(Arc::new(SlowContentLookup::new(Duration::from_secs(5))));
        let err = g
            .generate_reply(&conv(), &user(), "explain this hadith", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MishkatError::ClassificationTimeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_wins_over_slow_generation() {
        let g = ResponseGenerator::new(
            Arc::new(MemoryResponseCache::new(4)),
            &GeneratorConfig::default(),
        )
        .with_content_lookup(Arc::new(SlowContentLookup::new(Duration::from_secs(5))));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = g
            .generate_reply(&conv(), &user(), "explain this hadith", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MishkatError::Cancelled));
    }
}
