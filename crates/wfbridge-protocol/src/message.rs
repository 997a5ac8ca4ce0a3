// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message envelope and wire codec.
//!
//! Every message exchanged with the peer is a [`ProxyMessage`]:
//! - `type`: message type tag (i32, see [`MessageType`])
//! - `request_id`: echoed verbatim in the matching reply
//! - `error`: classified error (replies only)
//! - `payload`: type-specific JSON payload
//!
//! The tag stays a raw `i32` inside the envelope so a message with a tag this
//! build does not know still decodes and can be reported by the dispatcher.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ClassifiedError;

/// Maximum encoded message size (64 MB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Errors that can occur during message encoding/decoding
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("unknown message type: {0}")]
    UnknownMessageType(i32),

    #[error("{0:?} is not a request type")]
    NotARequest(MessageType),

    #[error("invalid {message_type} payload: {source}")]
    InvalidPayload {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

macro_rules! message_types {
    ($( $name:ident = $code:literal ),* $(,)?) => {
        /// Message type tags.
        ///
        /// Requests carry odd codes; the paired reply is always `request + 1`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum MessageType {
            $( $name = $code, )*
        }

        impl MessageType {
            /// Every known message type.
            pub const ALL: &'static [MessageType] = &[$( MessageType::$name ),*];

            /// Type name as used in logs.
            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name), )*
                }
            }
        }

        impl TryFrom<i32> for MessageType {
            type Error = ProtocolError;

            fn try_from(value: i32) -> Result<Self, ProtocolError> {
                match value {
                    $( $code => Ok(Self::$name), )*
                    other => Err(ProtocolError::UnknownMessageType(other)),
                }
            }
        }
    };
}

message_types! {
    Unspecified = 0,

    // Client
    InitializeRequest = 1,
    InitializeReply = 2,
    ConnectRequest = 3,
    ConnectReply = 4,
    TerminateRequest = 5,
    TerminateReply = 6,
    DomainRegisterRequest = 7,
    DomainRegisterReply = 8,
    DomainDescribeRequest = 9,
    DomainDescribeReply = 10,
    DomainUpdateRequest = 11,
    DomainUpdateReply = 12,
    HeartbeatRequest = 13,
    HeartbeatReply = 14,
    CancelRequest = 15,
    CancelReply = 16,
    NewWorkerRequest = 17,
    NewWorkerReply = 18,
    StopWorkerRequest = 19,
    StopWorkerReply = 20,
    PingRequest = 21,
    PingReply = 22,

    // Workflow
    WorkflowRegisterRequest = 101,
    WorkflowRegisterReply = 102,
    WorkflowExecuteRequest = 103,
    WorkflowExecuteReply = 104,
    WorkflowCancelRequest = 105,
    WorkflowCancelReply = 106,
    WorkflowTerminateRequest = 107,
    WorkflowTerminateReply = 108,
    WorkflowSignalWithStartRequest = 109,
    WorkflowSignalWithStartReply = 110,
    WorkflowSetCacheSizeRequest = 111,
    WorkflowSetCacheSizeReply = 112,
    WorkflowQueryRequest = 113,
    WorkflowQueryReply = 114,
    WorkflowMutableRequest = 115,
    WorkflowMutableReply = 116,
    WorkflowDescribeExecutionRequest = 117,
    WorkflowDescribeExecutionReply = 118,
    WorkflowGetResultRequest = 119,
    WorkflowGetResultReply = 120,
    WorkflowSignalSubscribeRequest = 121,
    WorkflowSignalSubscribeReply = 122,
    WorkflowSignalRequest = 123,
    WorkflowSignalReply = 124,
    WorkflowHasLastResultRequest = 125,
    WorkflowHasLastResultReply = 126,
    WorkflowGetLastResultRequest = 127,
    WorkflowGetLastResultReply = 128,
    WorkflowDisconnectContextRequest = 129,
    WorkflowDisconnectContextReply = 130,
    WorkflowGetTimeRequest = 131,
    WorkflowGetTimeReply = 132,
    WorkflowSleepRequest = 133,
    WorkflowSleepReply = 134,
    WorkflowExecuteChildRequest = 135,
    WorkflowExecuteChildReply = 136,
    WorkflowWaitForChildRequest = 137,
    WorkflowWaitForChildReply = 138,
    WorkflowSignalChildRequest = 139,
    WorkflowSignalChildReply = 140,
    WorkflowCancelChildRequest = 141,
    WorkflowCancelChildReply = 142,
    WorkflowSetQueryHandlerRequest = 143,
    WorkflowSetQueryHandlerReply = 144,
    WorkflowInvokeRequest = 145,
    WorkflowInvokeReply = 146,
    WorkflowSignalInvokeRequest = 147,
    WorkflowSignalInvokeReply = 148,
    WorkflowQueryInvokeRequest = 149,
    WorkflowQueryInvokeReply = 150,

    // Activity
    ActivityRegisterRequest = 201,
    ActivityRegisterReply = 202,
    ActivityExecuteRequest = 203,
    ActivityExecuteReply = 204,
    ActivityInvokeRequest = 205,
    ActivityInvokeReply = 206,
    ActivityGetHeartbeatDetailsRequest = 207,
    ActivityGetHeartbeatDetailsReply = 208,
    ActivityRecordHeartbeatRequest = 209,
    ActivityRecordHeartbeatReply = 210,
    ActivityHasHeartbeatDetailsRequest = 211,
    ActivityHasHeartbeatDetailsReply = 212,
    ActivityStoppingRequest = 213,
    ActivityStoppingReply = 214,
    ActivityExecuteLocalRequest = 215,
    ActivityExecuteLocalReply = 216,
    ActivityInvokeLocalRequest = 217,
    ActivityInvokeLocalReply = 218,
    ActivityGetInfoRequest = 219,
    ActivityGetInfoReply = 220,
    ActivityCompleteRequest = 221,
    ActivityCompleteReply = 222,
}

impl MessageType {
    /// Wire code of this type.
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// True for request types (odd codes).
    pub fn is_request(&self) -> bool {
        self.code() % 2 == 1
    }

    /// True for reply types.
    pub fn is_reply(&self) -> bool {
        *self != MessageType::Unspecified && !self.is_request()
    }

    /// The reply type paired with this request type.
    pub fn reply_type(&self) -> Option<MessageType> {
        if !self.is_request() {
            return None;
        }
        MessageType::try_from(self.code() + 1).ok()
    }

    /// True for replies that carry the outcome of an operation this process
    /// started by sending an invoke request to the peer.
    pub fn is_operation_reply(&self) -> bool {
        matches!(
            self,
            MessageType::WorkflowInvokeReply
                | MessageType::WorkflowSignalInvokeReply
                | MessageType::WorkflowQueryInvokeReply
                | MessageType::ActivityInvokeReply
                | MessageType::ActivityStoppingReply
                | MessageType::ActivityInvokeLocalReply
        )
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyMessage {
    /// Raw message type tag.
    #[serde(rename = "type")]
    pub type_code: i32,
    /// Request identifier, echoed in the matching reply.
    #[serde(default)]
    pub request_id: i64,
    /// Classified error (replies only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    /// Type-specific payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl ProxyMessage {
    /// Create a message with a typed payload.
    pub fn new<P: Serialize>(
        message_type: MessageType,
        request_id: i64,
        payload: &P,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            type_code: message_type.code(),
            request_id,
            error: None,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Create a message without payload.
    pub fn empty(message_type: MessageType, request_id: i64) -> Self {
        Self {
            type_code: message_type.code(),
            request_id,
            error: None,
            payload: Value::Null,
        }
    }

    /// Resolve the type tag.
    pub fn message_type(&self) -> Result<MessageType, ProtocolError> {
        MessageType::try_from(self.type_code)
    }

    /// Start the reply paired with this request, echoing its request id.
    pub fn reply(&self) -> Result<ProxyMessage, ProtocolError> {
        let message_type = self.message_type()?;
        let reply_type = message_type
            .reply_type()
            .ok_or(ProtocolError::NotARequest(message_type))?;
        Ok(ProxyMessage::empty(reply_type, self.request_id))
    }

    /// Decode the payload as `P`.
    ///
    /// A missing payload decodes like an empty object so payload types whose
    /// fields all have defaults accept it.
    pub fn decode_payload<P: DeserializeOwned>(&self) -> Result<P, ProtocolError> {
        let value = match &self.payload {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload {
            message_type: self.type_name(),
            source,
        })
    }

    /// Encode the message for wire transmission.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(bytes.len()));
        }
        Ok(Bytes::from(bytes))
    }

    /// Decode a message from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(bytes.len()));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    fn type_name(&self) -> String {
        match self.message_type() {
            Ok(t) => t.name().to_string(),
            Err(_) => format!("type {}", self.type_code),
        }
    }
}
