// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable escalation classification.

use async_trait::async_trait;

use crate::error::MishkatError;
use crate::types::{EscalationDecision, EscalationReason, UserId};

/// Decides whether a user message must be handled by a human.
///
/// The keyword classifier is the default; a model-backed classifier can be
/// swapped in without touching the session state machine.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies `text` sent by `user`. Reads the user's escalation history
    /// but never writes it.
    async fn classify(&self, text: &str, user: &UserId) -> Result<EscalationDecision, MishkatError>;

    /// Records an escalation that actually routed the user to a human.
    async fn record_escalation(
        &self,
        user: &UserId,
        reason: EscalationReason,
    ) -> Result<(), MishkatError>;
}
