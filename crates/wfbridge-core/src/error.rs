// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for wfbridge-core.
//!
//! Handler failures are [`BridgeError`]s; each one maps to exactly one
//! [`ClassifiedError`] carried in the reply. [`DispatchError`] covers the few
//! failures that cannot be expressed as a reply at all.

use thiserror::Error;

use wfbridge_protocol::{ClassifiedError, ErrorKind, ProtocolError, TransportError};

use crate::engine::EngineError;

/// Result type using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failure of a single request handler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// No engine session; the peer must connect first.
    #[error("not connected to the workflow engine")]
    NotConnected,

    /// Connecting to the engine failed.
    #[error("could not connect to the workflow engine: {0}")]
    Connection(String),

    /// A referenced context, child, worker or operation does not exist.
    #[error("{entity} {id} does not exist")]
    EntityNotFound {
        /// Kind of entity.
        entity: &'static str,
        /// The id that was not found.
        id: i64,
    },

    /// The engine rejected or failed the call.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An outcome that already carries a classification.
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    /// The request payload could not be decoded, or a reply could not be built.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Delivering a message to the peer failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BridgeError {
    /// Shorthand for [`BridgeError::EntityNotFound`].
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::EntityNotFound { entity, id }
    }

    /// Convert this error to the classified error sent to the peer.
    pub fn to_classified(&self) -> ClassifiedError {
        match self {
            Self::NotConnected | Self::Connection(_) => {
                ClassifiedError::new(ErrorKind::Connection, self.to_string())
            }
            Self::EntityNotFound { entity, id } => {
                ClassifiedError::entity_not_found(format!("{} {}", entity, id))
            }
            Self::Engine(err) => classify(err),
            Self::Classified(err) => err.clone(),
            Self::Protocol(_) | Self::Transport(_) => ClassifiedError::generic(self.to_string()),
        }
    }

    /// Classified kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.to_classified().kind
    }
}

/// Classify an engine failure.
///
/// A failure that already carries a kind keeps it; otherwise the engine's
/// predicates are consulted in order; anything left is an application error.
pub fn classify(err: &EngineError) -> ClassifiedError {
    if let EngineError::Classified(classified) = err {
        return classified.clone();
    }

    let kind = if err.is_canceled() {
        ErrorKind::Canceled
    } else if err.is_application() {
        ErrorKind::Application
    } else if err.is_panic() {
        ErrorKind::Panic
    } else if err.is_terminated() {
        ErrorKind::Terminated
    } else if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_unknown_external_execution() {
        ErrorKind::UnknownExternalExecution
    } else if err.is_entity_not_found() {
        ErrorKind::EntityNotFound
    } else if err.is_connection() {
        ErrorKind::Connection
    } else {
        ErrorKind::Application
    };

    ClassifiedError::new(kind, err.to_string())
}

/// Failures the dispatcher cannot turn into a reply.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The message type tag has no handler.
    #[error("unrecognized message type: {0}")]
    UnrecognizedMessageType(i32),

    /// The reply envelope could not be built.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The reply could not be delivered to the peer.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
