// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP gateway tests against a local listener.

use std::net::SocketAddr;

use axum::Router;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::put;
use tokio::sync::mpsc;
use wfbridge_protocol::{
    Gateway, HttpGateway, HttpGatewayConfig, MessageType, ProxyMessage, TransportError,
};

async fn spawn_listener(status: StatusCode) -> (SocketAddr, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route(
        "/",
        put(move |body: Bytes| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                status
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, rx)
}

#[tokio::test]
async fn test_send_puts_encoded_message() {
    let (addr, mut rx) = spawn_listener(StatusCode::OK).await;

    let gateway = HttpGateway::new(HttpGatewayConfig::default()).unwrap();
    gateway
        .set_endpoint(format!("http://{}/", addr))
        .await
        .unwrap();

    let msg = ProxyMessage::empty(MessageType::WorkflowInvokeRequest, 5);
    gateway.send(&msg).await.unwrap();

    let body = rx.recv().await.unwrap();
    let received = ProxyMessage::decode(&body).unwrap();
    assert_eq!(received, msg);
}

#[tokio::test]
async fn test_send_reports_rejection() {
    let (addr, _rx) = spawn_listener(StatusCode::BAD_REQUEST).await;

    let gateway = HttpGateway::new(HttpGatewayConfig {
        endpoint: Some(format!("http://{}/", addr)),
        ..Default::default()
    })
    .unwrap();

    let msg = ProxyMessage::empty(MessageType::PingReply, 1);
    let result = gateway.send(&msg).await;
    assert!(matches!(result, Err(TransportError::Status(400))));
}

#[tokio::test]
async fn test_endpoint_can_be_replaced() {
    let gateway = HttpGateway::new(HttpGatewayConfig::default()).unwrap();
    assert_eq!(gateway.endpoint().await, None);

    gateway
        .set_endpoint("http://127.0.0.1:5001/".into())
        .await
        .unwrap();
    assert_eq!(
        gateway.endpoint().await.as_deref(),
        Some("http://127.0.0.1:5001/")
    );

    assert!(matches!(
        gateway.set_endpoint("::bad::".into()).await,
        Err(TransportError::InvalidEndpoint(_))
    ));
    assert_eq!(
        gateway.endpoint().await.as_deref(),
        Some("http://127.0.0.1:5001/")
    );
}
