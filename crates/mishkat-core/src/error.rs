// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mishkat chat core.

use thiserror::Error;

use crate::types::SessionStatus;

/// The primary error type used across all Mishkat traits and core operations.
#[derive(Debug, Error)]
pub enum MishkatError {
    /// An illegal session/ticket transition was attempted.
    #[error("cannot {action} session {session_id} while it is {from}")]
    InvalidStateTransition {
        session_id: String,
        from: SessionStatus,
        action: &'static str,
    },

    /// Classification or reply generation exceeded its time allowance.
    #[error("classification timed out after {duration:?}")]
    ClassificationTimeout { duration: std::time::Duration },

    /// The backing store rejected a create/append/update.
    #[error("persistence failure: {source}")]
    Persistence {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No conversation or session exists with the given id.
    #[error("unknown conversation or session: {id}")]
    UnknownConversation { id: String },

    /// An operator tried to act on a session assigned to someone else.
    #[error("session {session_id} is not assigned to operator {operator_id}")]
    OperatorMismatch {
        session_id: String,
        operator_id: String,
    },

    /// The caller asked for something the target does not allow, such as
    /// posting to a conversation it is not part of.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller cancelled an in-flight generation.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MishkatError {
    /// Wraps any error as a [`MishkatError::Persistence`].
    pub fn persistence<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        MishkatError::Persistence {
            source: source.into(),
        }
    }

    /// Shorthand for [`MishkatError::UnknownConversation`].
    pub fn unknown(id: impl std::fmt::Display) -> Self {
        MishkatError::UnknownConversation { id: id.to_string() }
    }

    /// Whether retrying the same (idempotent) operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MishkatError::Persistence { .. })
    }
}
