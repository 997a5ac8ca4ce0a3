// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Envelope encoding/decoding tests for wfbridge-protocol.

use serde_json::json;
use wfbridge_protocol::payloads::{ResultReply, WorkflowExecuteRequest, WorkflowRegisterRequest};
use wfbridge_protocol::{
    ClassifiedError, ErrorKind, MAX_MESSAGE_SIZE, MessageType, ProtocolError, ProxyMessage,
};

#[test]
fn test_message_type_conversions() {
    assert_eq!(
        MessageType::try_from(1).unwrap(),
        MessageType::InitializeRequest
    );
    assert_eq!(
        MessageType::try_from(146).unwrap(),
        MessageType::WorkflowInvokeReply
    );
    assert_eq!(
        MessageType::try_from(221).unwrap(),
        MessageType::ActivityCompleteRequest
    );

    assert!(matches!(
        MessageType::try_from(9999),
        Err(ProtocolError::UnknownMessageType(9999))
    ));
    assert!(MessageType::try_from(-1).is_err());
}

#[test]
fn test_codes_are_unique() {
    let mut codes: Vec<i32> = MessageType::ALL.iter().map(|t| t.code()).collect();
    let total = codes.len();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), total);
}

#[test]
fn test_operation_replies() {
    let operation_replies: Vec<_> = MessageType::ALL
        .iter()
        .filter(|t| t.is_operation_reply())
        .collect();
    assert_eq!(operation_replies.len(), 6);
    assert!(operation_replies.iter().all(|t| t.is_reply()));
    assert!(!MessageType::WorkflowExecuteReply.is_operation_reply());
}

#[test]
fn test_envelope_wire_shape() {
    let msg = ProxyMessage::new(
        MessageType::WorkflowRegisterRequest,
        42,
        &WorkflowRegisterRequest {
            name: "Order".into(),
        },
    )
    .unwrap();

    let json: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
    assert_eq!(
        json,
        json!({"type": 101, "request_id": 42, "payload": {"name": "Order"}})
    );
}

#[test]
fn test_error_reply_wire_shape() {
    let mut reply = ProxyMessage::empty(MessageType::WorkflowInvokeReply, 7);
    reply.error = Some(ClassifiedError::canceled("workflow canceled"));

    let json: serde_json::Value = serde_json::from_slice(&reply.encode().unwrap()).unwrap();
    assert_eq!(json["error"]["type"], "cancelled");
    assert_eq!(json["error"]["string"], "workflow canceled");
    assert!(json.get("payload").is_none());
}

#[test]
fn test_decode_keeps_unknown_type_code() {
    let msg = ProxyMessage::decode(br#"{"type": 777, "request_id": 3}"#).unwrap();
    assert_eq!(msg.type_code, 777);
    assert_eq!(msg.request_id, 3);
    assert!(matches!(
        msg.message_type(),
        Err(ProtocolError::UnknownMessageType(777))
    ));
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(matches!(
        ProxyMessage::decode(b"not json"),
        Err(ProtocolError::Json(_))
    ));
    assert!(ProxyMessage::decode(br#"{"request_id": 3}"#).is_err());
}

#[test]
fn test_decode_rejects_oversized_input() {
    let big = vec![b' '; MAX_MESSAGE_SIZE + 1];
    assert!(matches!(
        ProxyMessage::decode(&big),
        Err(ProtocolError::MessageTooLarge(_))
    ));
}

#[test]
fn test_decode_payload_reports_type() {
    let msg = ProxyMessage {
        type_code: MessageType::WorkflowExecuteRequest.code(),
        request_id: 1,
        error: None,
        payload: json!({"domain": 5}),
    };

    let err = msg.decode_payload::<WorkflowExecuteRequest>().unwrap_err();
    match err {
        ProtocolError::InvalidPayload { message_type, .. } => {
            assert_eq!(message_type, "WorkflowExecuteRequest")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_missing_payload_decodes_as_defaults() {
    let msg = ProxyMessage::empty(MessageType::WorkflowInvokeReply, 1);
    let reply: ResultReply = msg.decode_payload().unwrap();
    assert_eq!(reply.result, None);
}

#[test]
fn test_reply_with_error_round_trips() {
    let mut reply = ProxyMessage::new(
        MessageType::ActivityInvokeReply,
        12,
        &ResultReply::new(Some(vec![9])),
    )
    .unwrap();
    reply.error = Some(ClassifiedError::new(ErrorKind::Panic, "boom"));

    let decoded = ProxyMessage::decode(&reply.encode().unwrap()).unwrap();
    assert_eq!(decoded, reply);
}
