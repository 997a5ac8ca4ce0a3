// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Classified errors carried inside reply envelopes.
//!
//! Every failure surfaced to the peer travels as a [`ClassifiedError`]: a
//! human readable message plus one [`ErrorKind`] out of a closed set.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of error kinds understood by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No active session with the wrapped engine.
    Connection,
    /// A referenced context, worker or operation id is unknown.
    #[serde(rename = "entity_not_exists")]
    EntityNotFound,
    /// Engine-level business failure.
    #[serde(rename = "custom")]
    Application,
    /// The operation was canceled.
    #[serde(rename = "cancelled")]
    Canceled,
    /// The operation timed out.
    Timeout,
    /// The workflow was terminated.
    Terminated,
    /// Workflow or activity code panicked.
    Panic,
    /// The external workflow execution does not exist.
    #[serde(rename = "unknown_external")]
    UnknownExternalExecution,
    /// Anything that could not be classified more precisely.
    Generic,
}

impl ErrorKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::EntityNotFound => "entity_not_exists",
            Self::Application => "custom",
            Self::Canceled => "cancelled",
            Self::Timeout => "timeout",
            Self::Terminated => "terminated",
            Self::Panic => "panic",
            Self::UnknownExternalExecution => "unknown_external",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error with a kind the peer can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    /// Classified kind.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Error message.
    #[serde(rename = "string")]
    pub message: String,
}

impl ClassifiedError {
    /// Create a new classified error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The engine has no session; the peer must connect first.
    pub fn connection() -> Self {
        Self::new(
            ErrorKind::Connection,
            "could not establish a connection with the workflow engine",
        )
    }

    /// The referenced entity does not exist.
    pub fn entity_not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::EntityNotFound, format!("{} does not exist", what))
    }

    /// The operation was canceled.
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }

    /// The operation timed out.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Fallback classification.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, message)
    }
}
