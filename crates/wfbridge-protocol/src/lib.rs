// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wfbridge protocol - message envelope, payloads and outbound gateway
//!
//! This crate provides the wire protocol spoken between the bridge and its
//! peer process (the "library" that hosts workflow and activity code).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    wfbridge-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: ProxyMessage { type, request_id, error, payload }│
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: JSON (serde_json), bytes as base64          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: HTTP PUT (reqwest gateway / axum listener)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Requests and replies come in pairs: every request type has exactly one
//! reply type, and a reply echoes the request id of the request it answers.
//! Either side may originate requests. The peer drives engine operations
//! (connect, execute, signal, ...) and the bridge drives workflow and
//! activity code running in the peer (invoke, signal invoke, query invoke).
//!
//! # Usage
//!
//! ```ignore
//! use wfbridge_protocol::{MessageType, ProxyMessage, payloads};
//!
//! let request = ProxyMessage::new(
//!     MessageType::WorkflowRegisterRequest,
//!     1,
//!     &payloads::WorkflowRegisterRequest { name: "Order".into() },
//! )?;
//! let bytes = request.encode()?;
//!
//! let decoded = ProxyMessage::decode(&bytes)?;
//! let reply = decoded.reply()?;
//! assert_eq!(reply.request_id, 1);
//! ```

pub mod error;
pub mod gateway;
pub mod message;
pub mod payloads;

pub use error::{ClassifiedError, ErrorKind};
pub use gateway::{Gateway, TransportError};
#[cfg(feature = "http")]
pub use gateway::{HttpGateway, HttpGatewayConfig};
pub use message::{MAX_MESSAGE_SIZE, MessageType, ProtocolError, ProxyMessage};
