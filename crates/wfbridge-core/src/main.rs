// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wfbridge - workflow engine bridge
//!
//! Listens for messages from the peer process, runs them against the engine
//! and sends replies and invokes back to the peer.
//!
//! The binary wires in the in-process engine; embed [`BridgeRuntime`] with
//! another connector to bridge a real engine.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use wfbridge_core::config::Config;
use wfbridge_core::engine::memory::MemoryEngineConnector;
use wfbridge_core::runtime::BridgeRuntime;
use wfbridge_protocol::{HttpGateway, HttpGatewayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wfbridge_core=info".parse()?),
        )
        .init();

    info!("Starting wfbridge");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        listen_addr = %config.listen_addr,
        peer_url = ?config.peer_url,
        client_timeout_ms = config.client_timeout.as_millis() as u64,
        operation_timeout_ms = config.operation_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let gateway = HttpGateway::new(HttpGatewayConfig {
        endpoint: config.peer_url.clone(),
        request_timeout_ms: config.gateway_timeout.as_millis() as u64,
    })?;

    let runtime = BridgeRuntime::builder()
        .connector(Arc::new(MemoryEngineConnector::new()))
        .gateway(Arc::new(gateway))
        .bind_addr(config.listen_addr)
        .client_timeout(config.client_timeout)
        .operation_timeout(config.operation_timeout)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "wfbridge initialized successfully");

    // Wait for ctrl-c or a terminate request from the peer
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted");
        }
        _ = runtime.terminated() => {
            info!("Terminated by peer");
        }
    }

    info!("Shutting down...");
    runtime.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}
