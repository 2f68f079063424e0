// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword-based escalation classification.
//!
//! Rules are evaluated in a fixed order against the lower-cased message and
//! the first match wins. Several keyword sets overlap ("payment" reads as
//! both billing and a technical failure), so the order is the tie-breaker.

use std::sync::Arc;

use async_trait::async_trait;
use mishkat_config::model::EscalationConfig;
use mishkat_core::{
    Classifier, EscalationDecision, EscalationHistoryStore, EscalationReason, MishkatError, UserId,
};
use tracing::debug;

/// How a rule matches a lower-cased message.
enum Pattern {
    /// Any of the terms appears as a substring.
    Any(&'static [&'static str]),
    /// At least one term from each list appears.
    Both(&'static [&'static str], &'static [&'static str]),
}

impl Pattern {
    fn matches(&self, lower: &str) -> bool {
        let any = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));
        match self {
            Pattern::Any(terms) => any(terms),
            Pattern::Both(first, second) => any(first) && any(second),
        }
    }
}

const ADMIN_TERMS: &[&str] = &[
    "admin",
    "human support",
    "talk to human",
    "talk to a human",
    "real person",
    "speak to someone",
];

const FATWA_TERMS: &[&str] = &["fatwa", "legal ruling", "islamic law", "is it haram", "is it halal"];

const SENSITIVE_TERMS: &[&str] = &[
    "divorce",
    "inheritance",
    "sectarian",
    "political",
    "politics",
    "controversial",
    "apostasy",
    "takfir",
];

const PAYMENT_TERMS: &[&str] = &[
    "payment",
    "subscription",
    "billing",
    "refund",
    "charged",
    "invoice",
    "premium plan",
];

const TECHNICAL_TERMS: &[&str] = &[
    "bug",
    "error",
    "crash",
    "not working",
    "broken",
    "login",
    "log in",
    "sign in",
    "password",
];

const DOUBT_TERMS: &[&str] = &[
    "authentic",
    "fabricated",
    "fake",
    "weak",
    "doubt",
    "daif",
    "da'if",
    "reliable",
];

const DISTRESS_TERMS: &[&str] = &[
    "confused",
    "frustrated",
    "worried",
    "anxious",
    "upset",
    "stressed",
    "hopeless",
    "depressed",
];

/// Ordered rule table. Order is significant.
const RULES: &[(EscalationReason, Pattern)] = &[
    (EscalationReason::AdminRequest, Pattern::Any(ADMIN_TERMS)),
    (EscalationReason::FatwaRequest, Pattern::Any(FATWA_TERMS)),
    (EscalationReason::SensitiveTopic, Pattern::Any(SENSITIVE_TERMS)),
    (EscalationReason::PaymentIssue, Pattern::Any(PAYMENT_TERMS)),
    (EscalationReason::TechnicalSupport, Pattern::Any(TECHNICAL_TERMS)),
    (
        EscalationReason::DisputeAuthenticity,
        Pattern::Both(DOUBT_TERMS, &["hadith"]),
    ),
    (EscalationReason::EmotionalSupport, Pattern::Any(DISTRESS_TERMS)),
];

/// Evaluate the keyword rules only, without consulting any history.
pub fn match_rules(text: &str) -> Option<EscalationReason> {
    let lower = text.to_lowercase();
    RULES
        .iter()
        .find(|(_, pattern)| pattern.matches(&lower))
        .map(|(reason, _)| *reason)
}

/// Keyword classifier with the repeated-confusion fallback.
///
/// A user whose history already holds `repeat_threshold` escalations is
/// routed to a human on every further message. Classifying never writes the
/// history; escalations are recorded once they have actually happened.
pub struct KeywordClassifier {
    history: Arc<dyn EscalationHistoryStore>,
    repeat_threshold: usize,
}

impl KeywordClassifier {
    pub fn new(history: Arc<dyn EscalationHistoryStore>, config: &EscalationConfig) -> Self {
        Self {
            history,
            repeat_threshold: config.repeat_threshold,
        }
    }

    /// Escalation reasons recorded for `user`, oldest first.
    pub async fn get_history(&self, user: &UserId) -> Result<Vec<EscalationReason>, MishkatError> {
        self.history.history(user).await
    }

    pub async fn clear_history(&self, user: &UserId) -> Result<(), MishkatError> {
        self.history.clear(user).await
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str, user: &UserId) -> Result<EscalationDecision, MishkatError> {
        if let Some(reason) = match_rules(text) {
            return Ok(EscalationDecision::escalate(reason));
        }

        let prior = self.history.history(user).await?.len();
        if prior >= self.repeat_threshold {
            debug!(user = %user, prior, "repeated escalations, forcing human handoff");
            return Ok(EscalationDecision::escalate(
                EscalationReason::ConfusionAfterAi,
            ));
        }

        Ok(EscalationDecision::automated())
    }

    async fn record_escalation(
        &self,
        user: &UserId,
        reason: EscalationReason,
    ) -> Result<(), MishkatError> {
        self.history.append(user, reason).await
    }
}
