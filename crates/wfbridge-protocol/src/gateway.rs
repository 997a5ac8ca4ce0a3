// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outbound gateway: delivers messages to the peer process.
//!
//! The gateway is a seam. The bridge only depends on [`Gateway`]; the
//! `http` feature provides [`HttpGateway`], which PUTs each encoded message
//! to the endpoint announced by the peer during initialization.

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{ProtocolError, ProxyMessage};

/// Errors that can occur while delivering a message to the peer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no peer endpoint configured")]
    NoEndpoint,

    #[error("invalid peer endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("encode error: {0}")]
    Encode(#[from] ProtocolError),

    #[error("peer responded with status {0}")]
    Status(u16),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Send(String),

    #[error("gateway closed")]
    Closed,
}

/// Sends messages to the peer.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Deliver one message. Success means the peer accepted it.
    async fn send(&self, message: &ProxyMessage) -> Result<(), TransportError>;

    /// Point the gateway at a (new) peer endpoint.
    async fn set_endpoint(&self, endpoint: String) -> Result<(), TransportError>;
}

#[cfg(feature = "http")]
pub use self::http::{HttpGateway, HttpGatewayConfig};

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::RwLock;
    use tracing::{debug, instrument, warn};

    use super::{Gateway, TransportError};
    use crate::message::ProxyMessage;

    /// Content type of encoded messages.
    pub const CONTENT_TYPE: &str = "application/json";

    /// Configuration for the HTTP gateway
    #[derive(Debug, Clone)]
    pub struct HttpGatewayConfig {
        /// Initial peer endpoint (normally announced later by the peer)
        pub endpoint: Option<String>,
        /// Per-request timeout in milliseconds
        pub request_timeout_ms: u64,
    }

    impl Default for HttpGatewayConfig {
        fn default() -> Self {
            Self {
                endpoint: None,
                request_timeout_ms: 10_000,
            }
        }
    }

    /// Gateway that PUTs each message to the peer over HTTP.
    pub struct HttpGateway {
        client: reqwest::Client,
        endpoint: RwLock<Option<reqwest::Url>>,
        config: HttpGatewayConfig,
    }

    impl HttpGateway {
        /// Create a new gateway with the given configuration
        pub fn new(config: HttpGatewayConfig) -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(config.request_timeout_ms))
                .build()
                .map_err(|e| TransportError::Send(e.to_string()))?;

            let endpoint = match &config.endpoint {
                Some(e) => Some(parse_endpoint(e)?),
                None => None,
            };

            Ok(Self {
                client,
                endpoint: RwLock::new(endpoint),
                config,
            })
        }

        /// Current peer endpoint, if any.
        pub async fn endpoint(&self) -> Option<String> {
            self.endpoint.read().await.as_ref().map(|u| u.to_string())
        }
    }

    fn parse_endpoint(endpoint: &str) -> Result<reqwest::Url, TransportError> {
        reqwest::Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))
    }

    #[async_trait]
    impl Gateway for HttpGateway {
        #[instrument(skip(self, message), fields(message_type = message.type_code, request_id = message.request_id))]
        async fn send(&self, message: &ProxyMessage) -> Result<(), TransportError> {
            let url = self
                .endpoint
                .read()
                .await
                .clone()
                .ok_or(TransportError::NoEndpoint)?;

            let body = message.encode()?;

            let response = self
                .client
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
                .body(body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TransportError::Timeout(self.config.request_timeout_ms)
                    } else {
                        TransportError::Send(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                warn!(status = status.as_u16(), "peer rejected message");
                return Err(TransportError::Status(status.as_u16()));
            }

            debug!("message delivered");
            Ok(())
        }

        async fn set_endpoint(&self, endpoint: String) -> Result<(), TransportError> {
            let url = parse_endpoint(&endpoint)?;
            debug!(endpoint = %url, "peer endpoint set");
            *self.endpoint.write().await = Some(url);
            Ok(())
        }
    }

}
