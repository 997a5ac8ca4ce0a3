// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for wfbridge-core.
//!
//! This module provides [`BridgeRuntime`] which runs the bridge inside an
//! existing tokio application instead of as the standalone `wfbridge` binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wfbridge_core::engine::memory::MemoryEngineConnector;
//! use wfbridge_core::runtime::BridgeRuntime;
//! use wfbridge_protocol::{HttpGateway, HttpGatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BridgeRuntime::builder()
//!         .connector(Arc::new(MemoryEngineConnector::new()))
//!         .gateway(Arc::new(HttpGateway::new(HttpGatewayConfig::default())?))
//!         .bind_addr("127.0.0.1:5000".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... until the peer sends TerminateRequest ...
//!     runtime.terminated().await;
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use wfbridge_protocol::Gateway;

use crate::engine::EngineConnector;
use crate::server::run_server;
use crate::state::{BridgeState, DEFAULT_CLIENT_TIMEOUT, DEFAULT_OPERATION_TIMEOUT};

/// Builder for creating a [`BridgeRuntime`].
pub struct BridgeRuntimeBuilder {
    connector: Option<Arc<dyn EngineConnector>>,
    gateway: Option<Arc<dyn Gateway>>,
    bind_addr: SocketAddr,
    client_timeout: Duration,
    operation_timeout: Duration,
}

impl std::fmt::Debug for BridgeRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntimeBuilder")
            .field("connector", &self.connector.as_ref().map(|_| "..."))
            .field("gateway", &self.gateway.as_ref().map(|_| "..."))
            .field("bind_addr", &self.bind_addr)
            .field("client_timeout", &self.client_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl Default for BridgeRuntimeBuilder {
    fn default() -> Self {
        Self {
            connector: None,
            gateway: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl BridgeRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine connector (required).
    pub fn connector(mut self, connector: Arc<dyn EngineConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the outbound gateway (required).
    pub fn gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Set the bind address for the inbound listener.
    ///
    /// Default: `127.0.0.1:5000`. Port 0 picks a free port; see
    /// [`BridgeRuntime::local_addr`].
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Bound for engine client calls until the peer's connect overrides it.
    pub fn client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    /// Bound for waits on replies from the peer.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<BridgeRuntimeConfig> {
        let connector = self
            .connector
            .ok_or_else(|| anyhow::anyhow!("engine connector is required"))?;
        let gateway = self
            .gateway
            .ok_or_else(|| anyhow::anyhow!("gateway is required"))?;

        Ok(BridgeRuntimeConfig {
            connector,
            gateway,
            bind_addr: self.bind_addr,
            client_timeout: self.client_timeout,
            operation_timeout: self.operation_timeout,
        })
    }
}

/// Configuration for a [`BridgeRuntime`].
pub struct BridgeRuntimeConfig {
    connector: Arc<dyn EngineConnector>,
    gateway: Arc<dyn Gateway>,
    bind_addr: SocketAddr,
    client_timeout: Duration,
    operation_timeout: Duration,
}

impl std::fmt::Debug for BridgeRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntimeConfig")
            .field("connector", &"...")
            .field("gateway", &"...")
            .field("bind_addr", &self.bind_addr)
            .field("client_timeout", &self.client_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl BridgeRuntimeConfig {
    /// Bind the listener and start serving.
    pub async fn start(self) -> Result<BridgeRuntime> {
        let state = Arc::new(
            BridgeState::new(self.connector, self.gateway)
                .with_client_timeout(self.client_timeout)
                .with_operation_timeout(self.operation_timeout),
        );

        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let server_handle = tokio::spawn(run_server(listener, state.clone()));

        info!(addr = %local_addr, "BridgeRuntime started");

        Ok(BridgeRuntime {
            server_handle,
            state,
            local_addr,
        })
    }
}

/// A running bridge embedded in an application.
///
/// Stops when [`shutdown`](Self::shutdown) is called or when the peer sends
/// `TerminateRequest`.
pub struct BridgeRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    state: Arc<BridgeState>,
    local_addr: SocketAddr,
}

impl BridgeRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> BridgeRuntimeBuilder {
        BridgeRuntimeBuilder::new()
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared bridge state.
    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    /// Resolves once shutdown has been requested, by the peer or locally.
    pub async fn terminated(&self) {
        let token = self.state.shutdown_token();
        token.cancelled().await;
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops accepting messages and waits for the listener to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("BridgeRuntime shutting down...");
        self.state.shutdown();

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("BridgeRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("BridgeRuntime listener error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("BridgeRuntime listener task panicked: {}", e);
                Err(anyhow::anyhow!("listener task panicked: {}", e))
            }
        }
    }

    /// Check if the listener is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
    }
}

impl std::fmt::Debug for BridgeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntime")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state)
            .field("running", &self.is_running())
            .finish()
    }
}
