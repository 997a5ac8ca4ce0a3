// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dispatcher tests: routing, session gating, error replies, terminate.

mod common;

use std::time::Duration;

use common::*;
use serde_json::json;
use wfbridge_core::DispatchError;
use wfbridge_core::dispatcher::dispatch;
use wfbridge_protocol::payloads::{
    CancelReply, CancelRequest, ConnectRequest, ContextRequest, Empty, InitializeRequest,
    WorkflowRegisterRequest,
};
use wfbridge_protocol::{ErrorKind, MessageType, ProxyMessage};

#[tokio::test]
async fn test_unrecognized_message_type() {
    let mut bridge = TestBridge::connected().await;

    let message = ProxyMessage::empty(MessageType::PingRequest, 5);
    let message = ProxyMessage {
        type_code: 9999,
        ..message
    };

    let result = dispatch(&bridge.state, message).await;
    assert!(matches!(
        result,
        Err(DispatchError::UnrecognizedMessageType(9999))
    ));
    assert!(bridge.nothing_pending(MessageType::Unspecified));
}

#[tokio::test]
async fn test_plain_reply_is_not_routed() {
    let bridge = TestBridge::connected().await;

    let result = dispatch(&bridge.state, ProxyMessage::empty(MessageType::PingReply, 1)).await;
    assert!(matches!(
        result,
        Err(DispatchError::UnrecognizedMessageType(code)) if code == MessageType::PingReply.code()
    ));
}

#[tokio::test]
async fn test_requests_before_connect_fail_with_connection_error() {
    let mut bridge = TestBridge::new();

    let reply = bridge
        .request(
            MessageType::WorkflowRegisterRequest,
            &WorkflowRegisterRequest {
                name: "Order".into(),
            },
        )
        .await;

    assert_eq!(
        reply.message_type().unwrap(),
        MessageType::WorkflowRegisterReply
    );
    let error = reply.error.expect("expected an error");
    assert_eq!(error.kind, ErrorKind::Connection);
}

#[tokio::test]
async fn test_session_free_requests_work_before_connect() {
    let mut bridge = TestBridge::new();

    let reply = bridge.request(MessageType::PingRequest, &Empty {}).await;
    assert!(reply.error.is_none());

    let reply = bridge.request(MessageType::HeartbeatRequest, &Empty {}).await;
    assert!(reply.error.is_none());

    let reply = bridge
        .request(
            MessageType::InitializeRequest,
            &InitializeRequest {
                library_address: "127.0.0.1".into(),
                library_port: 5001,
            },
        )
        .await;
    assert!(reply.error.is_none());
    assert_eq!(
        bridge.gateway.endpoint().as_deref(),
        Some("http://127.0.0.1:5001/")
    );
}

#[tokio::test]
async fn test_connect_overrides_client_timeout() {
    let mut bridge = TestBridge::new();
    assert!(!bridge.state.is_connected());

    let reply = bridge
        .request(
            MessageType::ConnectRequest,
            &ConnectRequest {
                endpoints: "memory://local".into(),
                client_timeout_ms: 1500,
                ..Default::default()
            },
        )
        .await;

    assert!(reply.error.is_none());
    assert!(bridge.state.is_connected());
    assert_eq!(bridge.state.client_timeout(), Duration::from_millis(1500));
}

#[tokio::test]
async fn test_connect_to_unreachable_engine() {
    let mut bridge = TestBridge::new();
    bridge.connector.set_reachable(false);

    let reply = bridge
        .request(
            MessageType::ConnectRequest,
            &ConnectRequest {
                endpoints: "10.0.0.1:7933".into(),
                ..Default::default()
            },
        )
        .await;

    let error = reply.error.expect("expected an error");
    assert_eq!(error.kind, ErrorKind::Connection);
    assert!(error.message.contains("10.0.0.1:7933"));
    assert!(!bridge.state.is_connected());
}

#[tokio::test]
async fn test_unknown_context_is_entity_not_found() {
    let mut bridge = TestBridge::connected().await;

    let reply = bridge
        .request(
            MessageType::WorkflowGetTimeRequest,
            &ContextRequest { context_id: 77 },
        )
        .await;

    let error = reply.error.expect("expected an error");
    assert_eq!(error.kind, ErrorKind::EntityNotFound);
    assert_eq!(error.message, "workflow context 77 does not exist");

    let reply = bridge
        .request(
            MessageType::ActivityGetInfoRequest,
            &ContextRequest { context_id: 77 },
        )
        .await;
    assert_eq!(reply.error.unwrap().kind, ErrorKind::EntityNotFound);
}

#[tokio::test]
async fn test_malformed_payload_is_generic_error() {
    let mut bridge = TestBridge::connected().await;

    let mut message = ProxyMessage::empty(MessageType::WorkflowSleepRequest, 12);
    message.payload = json!({ "context_id": "not a number" });

    let reply = dispatch(&bridge.state, message)
        .await
        .unwrap()
        .expect("expected a reply");

    assert_eq!(reply.request_id, 12);
    assert_eq!(reply.error.unwrap().kind, ErrorKind::Generic);
    let _ = bridge.next_message(MessageType::WorkflowSleepReply).await;
}

#[tokio::test]
async fn test_cancel_unknown_operation() {
    let mut bridge = TestBridge::new();

    let reply = bridge
        .request(
            MessageType::CancelRequest,
            &CancelRequest {
                target_request_id: 424242,
            },
        )
        .await;

    let cancel: CancelReply = payload(&reply);
    assert!(!cancel.was_cancelled);
}

#[tokio::test]
async fn test_terminate_replies_then_shuts_down() {
    let mut bridge = TestBridge::new();
    let shutdown = bridge.state.shutdown_token();
    assert!(!shutdown.is_cancelled());

    let reply = bridge.request(MessageType::TerminateRequest, &Empty {}).await;

    assert!(reply.error.is_none());
    assert_eq!(reply.message_type().unwrap(), MessageType::TerminateReply);
    assert!(shutdown.is_cancelled());
}

#[tokio::test]
async fn test_failed_reply_delivery_is_transport_error() {
    let bridge = TestBridge::new();
    bridge.gateway.fail_sends();

    let result = dispatch(&bridge.state, ProxyMessage::empty(MessageType::PingRequest, 3)).await;
    assert!(matches!(result, Err(DispatchError::Transport(_))));
}
