// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for wfbridge-core integration tests.
//!
//! Provides TestBridge, which wires a bridge to the in-process engine and a
//! recording gateway that stands in for the peer.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use wfbridge_core::dispatcher::dispatch;
use wfbridge_core::engine::memory::{MemoryEngine, MemoryEngineConnector};
use wfbridge_core::engine::{Engine, FunctionResult, WorkflowHandle, workflow_fn};
use wfbridge_core::state::BridgeState;
use wfbridge_protocol::payloads::{ConnectRequest, ResultReply, StartWorkflowOptions};
use wfbridge_protocol::{ClassifiedError, Gateway, MessageType, ProxyMessage, TransportError};

/// Upper bound for every wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Gateway that hands every outbound message to the test.
pub struct RecordingGateway {
    tx: mpsc::UnboundedSender<ProxyMessage>,
    endpoint: Mutex<Option<String>>,
    fail: Mutex<bool>,
}

impl RecordingGateway {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ProxyMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Arc::new(Self {
            tx,
            endpoint: Mutex::new(None),
            fail: Mutex::new(false),
        });
        (gateway, rx)
    }

    pub fn endpoint(&self) -> Option<String> {
        self.endpoint.lock().clone()
    }

    /// Make every following send fail.
    pub fn fail_sends(&self) {
        *self.fail.lock() = true;
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send(&self, message: &ProxyMessage) -> Result<(), TransportError> {
        if *self.fail.lock() {
            return Err(TransportError::Status(503));
        }
        self.tx
            .send(message.clone())
            .map_err(|_| TransportError::Closed)
    }

    async fn set_endpoint(&self, endpoint: String) -> Result<(), TransportError> {
        *self.endpoint.lock() = Some(endpoint);
        Ok(())
    }
}

/// A bridge plus a simulated peer on the other side of the gateway.
pub struct TestBridge {
    pub state: Arc<BridgeState>,
    pub connector: Arc<MemoryEngineConnector>,
    pub gateway: Arc<RecordingGateway>,
    outbound: mpsc::UnboundedReceiver<ProxyMessage>,
    skipped: VecDeque<ProxyMessage>,
    request_ids: Arc<AtomicI64>,
}

impl TestBridge {
    /// Bridge without an engine session.
    pub fn new() -> Self {
        let connector = Arc::new(MemoryEngineConnector::new());
        let (gateway, outbound) = RecordingGateway::new();
        let state = Arc::new(
            BridgeState::new(connector.clone(), gateway.clone())
                .with_operation_timeout(Duration::from_secs(30)),
        );

        Self {
            state,
            connector,
            gateway,
            outbound,
            skipped: VecDeque::new(),
            request_ids: Arc::new(AtomicI64::new(1000)),
        }
    }

    /// Bridge with an open engine session.
    pub async fn connected() -> Self {
        let mut bridge = Self::new();
        let reply = bridge
            .request(
                MessageType::ConnectRequest,
                &ConnectRequest {
                    endpoints: "memory://local".into(),
                    identity: "test".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(reply.error.is_none(), "connect failed: {:?}", reply.error);
        bridge
    }

    pub fn engine(&self) -> MemoryEngine {
        self.connector.engine()
    }

    fn next_request_id(&self) -> i64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request as the peer and return the bridge's reply.
    ///
    /// The copy of the reply that went through the gateway is dropped.
    pub async fn request<P: Serialize>(&mut self, message_type: MessageType, payload: &P) -> ProxyMessage {
        let message = ProxyMessage::new(message_type, self.next_request_id(), payload).unwrap();
        let request_id = message.request_id;
        let reply = tokio::time::timeout(WAIT, dispatch(&self.state, message))
            .await
            .expect("dispatch timed out")
            .expect("dispatch failed")
            .expect("request produced no reply");

        assert_eq!(reply.request_id, request_id);
        let sent = self.reply_for(message_type, request_id).await;
        assert_eq!(sent, reply);
        reply
    }

    /// Send a request whose reply is expected later, e.g. a sleep.
    ///
    /// Returns the request id; collect the reply with [`Self::reply_for`].
    pub fn spawn_request<P: Serialize>(
        &self,
        message_type: MessageType,
        payload: &P,
    ) -> (i64, JoinHandle<()>) {
        let message = ProxyMessage::new(message_type, self.next_request_id(), payload).unwrap();
        let request_id = message.request_id;
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            let _ = dispatch(&state, message).await;
        });
        (request_id, task)
    }

    /// Wait for the reply to a request started with [`Self::spawn_request`].
    pub async fn reply_for(&mut self, message_type: MessageType, request_id: i64) -> ProxyMessage {
        let reply_type = message_type.reply_type().unwrap();
        self.next_matching(|m| m.type_code == reply_type.code() && m.request_id == request_id)
            .await
    }

    /// Next outbound message of the given type; other messages are kept
    /// for later calls.
    pub async fn next_message(&mut self, message_type: MessageType) -> ProxyMessage {
        self.next_matching(|m| m.type_code == message_type.code())
            .await
    }

    async fn next_matching(&mut self, matches: impl Fn(&ProxyMessage) -> bool) -> ProxyMessage {
        if let Some(pos) = self.skipped.iter().position(&matches) {
            return self.skipped.remove(pos).unwrap();
        }

        loop {
            let message = tokio::time::timeout(WAIT, self.outbound.recv())
                .await
                .expect("timed out waiting for outbound message")
                .expect("gateway closed");
            if matches(&message) {
                return message;
            }
            self.skipped.push_back(message);
        }
    }

    /// True if no message of the given type is waiting right now.
    pub fn nothing_pending(&mut self, message_type: MessageType) -> bool {
        while let Ok(message) = self.outbound.try_recv() {
            self.skipped.push_back(message);
        }
        !self
            .skipped
            .iter()
            .any(|m| m.type_code == message_type.code())
    }

    /// Answer an invoke the bridge sent to the peer.
    pub async fn answer(&self, invoke: &ProxyMessage, result: Result<Option<Vec<u8>>, ClassifiedError>) {
        let mut reply = invoke.reply().unwrap();
        match result {
            Ok(bytes) => reply.payload = serde_json::to_value(ResultReply::new(bytes)).unwrap(),
            Err(error) => reply.error = Some(error),
        }

        let outcome = tokio::time::timeout(WAIT, dispatch(&self.state, reply))
            .await
            .expect("dispatch timed out")
            .expect("dispatch failed");
        assert!(outcome.is_none(), "invoke replies are not answered");
    }
}

/// Decode a reply payload, failing the test on a classified error.
pub fn payload<T: DeserializeOwned>(reply: &ProxyMessage) -> T {
    assert!(reply.error.is_none(), "unexpected error: {:?}", reply.error);
    reply.decode_payload().unwrap()
}

/// Decode the payload of an invoke the bridge sent.
pub fn invoke_payload<T: DeserializeOwned>(invoke: &ProxyMessage) -> T {
    invoke.decode_payload().unwrap()
}

/// Start a workflow on `engine` that never finishes and return its handle.
pub async fn parked_workflow(engine: &MemoryEngine, workflow_type: &str) -> Arc<dyn WorkflowHandle> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine
        .register_workflow(
            workflow_type,
            workflow_fn(move |handle, _args| {
                let _ = tx.send(handle);
                std::future::pending::<FunctionResult>()
            }),
        )
        .unwrap();
    engine
        .execute_workflow("default", workflow_type, None, &StartWorkflowOptions::default())
        .await
        .unwrap();

    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("workflow did not start")
        .unwrap()
}
