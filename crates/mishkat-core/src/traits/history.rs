// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user escalation history used by the repeated-confusion rule.

use async_trait::async_trait;

use crate::error::MishkatError;
use crate::types::{EscalationReason, UserId};

/// Ordered record of the escalation reasons previously triggered per user.
///
/// Implementations may cap the number of retained entries per user; the
/// most recent entries are kept.
#[async_trait]
pub trait EscalationHistoryStore: Send + Sync {
    async fn append(&self, user: &UserId, reason: EscalationReason) -> Result<(), MishkatError>;

    /// Reasons in the order they were recorded.
    async fn history(&self, user: &UserId) -> Result<Vec<EscalationReason>, MishkatError>;

    async fn clear(&self, user: &UserId) -> Result<(), MishkatError>;
}
