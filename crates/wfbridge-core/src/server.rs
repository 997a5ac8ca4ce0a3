// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inbound HTTP listener for wfbridge-core.
//!
//! The peer PUTs one JSON-encoded message per request to `/`. The listener
//! acknowledges receipt immediately and dispatches the message on its own
//! task; replies travel back through the outbound gateway, not in the HTTP
//! response.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::put;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

use wfbridge_protocol::{MAX_MESSAGE_SIZE, ProxyMessage};

use crate::dispatcher::dispatch;
use crate::state::BridgeState;

/// Router accepting messages for `state`.
pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/", put(receive))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_SIZE))
        .with_state(state)
}

async fn receive(State(state): State<Arc<BridgeState>>, body: Bytes) -> StatusCode {
    let message = match ProxyMessage::decode(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Rejected inbound message");
            return StatusCode::BAD_REQUEST;
        }
    };

    tokio::spawn(async move {
        let request_id = message.request_id;
        if let Err(e) = dispatch(&state, message).await {
            error!(request_id, error = %e, "Dispatch failed");
        }
    });

    StatusCode::OK
}

/// Serve on `listener` until the bridge's shutdown token fires.
#[instrument(skip(listener, state))]
pub async fn run_server(listener: TcpListener, state: Arc<BridgeState>) -> std::io::Result<()> {
    let shutdown = state.shutdown_token();
    info!(addr = %listener.local_addr()?, "Bridge listener starting");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Bridge listener stopped");
    Ok(())
}
