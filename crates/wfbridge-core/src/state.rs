// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared state handed to every handler.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use wfbridge_protocol::{ClassifiedError, Gateway, MessageType, ProxyMessage};

use crate::context::{ActivityContext, WorkflowContext};
use crate::engine::{Engine, EngineConnector, EngineError, Worker};
use crate::error::BridgeError;
use crate::ids::IdGenerator;
use crate::operations::{Operation, OperationResult, OperationTable};
use crate::registry::Registry;

/// Default bound for engine client calls.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for waits on the peer.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Registries, correlation table and collaborators of one bridge instance.
///
/// Nothing here is global: every bridge (and every test) builds its own.
pub struct BridgeState {
    /// Running workflows by context id.
    pub workflows: Registry<WorkflowContext>,
    /// Running activities by context id.
    pub activities: Registry<ActivityContext>,
    /// Started workers by worker id.
    pub workers: Registry<dyn Worker>,
    /// Outstanding requests sent to the peer.
    pub operations: OperationTable,
    child_ids: Arc<IdGenerator>,
    engine: RwLock<Option<Arc<dyn Engine>>>,
    connector: Arc<dyn EngineConnector>,
    gateway: Arc<dyn Gateway>,
    client_timeout_ms: AtomicU64,
    operation_timeout: Duration,
    shutdown: CancellationToken,
}

impl BridgeState {
    /// Create state with default timeouts.
    pub fn new(connector: Arc<dyn EngineConnector>, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            workflows: Registry::new(),
            activities: Registry::new(),
            workers: Registry::new(),
            operations: OperationTable::new(),
            child_ids: Arc::new(IdGenerator::new()),
            engine: RwLock::new(None),
            connector,
            gateway,
            client_timeout_ms: AtomicU64::new(DEFAULT_CLIENT_TIMEOUT.as_millis() as u64),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the default engine call timeout.
    pub fn with_client_timeout(self, timeout: Duration) -> Self {
        self.set_client_timeout(timeout);
        self
    }

    /// Override the bound for waits on the peer.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn connector(&self) -> &Arc<dyn EngineConnector> {
        &self.connector
    }

    /// Shared generator for child ids.
    pub fn child_ids(&self) -> Arc<IdGenerator> {
        self.child_ids.clone()
    }

    /// Current engine session, or [`BridgeError::NotConnected`].
    pub fn engine(&self) -> Result<Arc<dyn Engine>, BridgeError> {
        self.engine.read().clone().ok_or(BridgeError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.engine.read().is_some()
    }

    pub fn set_engine(&self, engine: Arc<dyn Engine>) {
        *self.engine.write() = Some(engine);
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_client_timeout(&self, timeout: Duration) {
        self.client_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Cancelled when the bridge should shut down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Look up a workflow context or fail with `EntityNotFound`.
    pub fn workflow(&self, context_id: i64) -> Result<Arc<WorkflowContext>, BridgeError> {
        self.workflows
            .get(context_id)
            .ok_or(BridgeError::not_found("workflow context", context_id))
    }

    /// Look up an activity context or fail with `EntityNotFound`.
    pub fn activity(&self, context_id: i64) -> Result<Arc<ActivityContext>, BridgeError> {
        self.activities
            .get(context_id)
            .ok_or(BridgeError::not_found("activity context", context_id))
    }

    /// Run an engine client call bounded by the client timeout.
    pub async fn engine_call<T, F>(&self, call: F) -> Result<T, BridgeError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let timeout = self.client_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(BridgeError::from),
            Err(_) => Err(BridgeError::Engine(EngineError::Timeout(format!(
                "engine call did not complete within {}ms",
                timeout.as_millis()
            )))),
        }
    }

    /// Send an invoke request to the peer and wait for its reply.
    ///
    /// The operation is registered before the message leaves, so a reply can
    /// never overtake its own registration. The wait ends with the reply, the
    /// operation timeout, or `cancel`. If the caller's future is dropped
    /// first, the operation is unregistered.
    pub async fn invoke<P: Serialize>(
        &self,
        message_type: MessageType,
        payload: &P,
        context_id: Option<i64>,
        cancel: Option<CancellationToken>,
    ) -> OperationResult {
        let request_id = self.operations.next_request_id();
        let message = ProxyMessage::new(message_type, request_id, payload)
            .map_err(|e| ClassifiedError::generic(e.to_string()))?;

        let (operation, pending) = Operation::new(message.clone(), context_id);
        self.operations.register(operation);
        let _unregister = Unregister {
            table: &self.operations,
            request_id,
        };

        debug!(request_id, ?context_id, %message_type, "sending invoke");
        if let Err(e) = self.gateway.send(&message).await {
            error!(request_id, %message_type, error = %e, "failed to deliver invoke");
            return Err(ClassifiedError::generic(format!(
                "failed to deliver {}: {}",
                message_type, e
            )));
        }

        pending
            .wait(&self.operations, self.operation_timeout, cancel)
            .await
    }
}

/// Removes an operation from its table when dropped.
struct Unregister<'a> {
    table: &'a OperationTable,
    request_id: i64,
}

impl Drop for Unregister<'_> {
    fn drop(&mut self) {
        self.table.remove(self.request_id);
    }
}

impl std::fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeState")
            .field("workflows", &self.workflows.len())
            .field("activities", &self.activities.len())
            .field("workers", &self.workers.len())
            .field("operations", &self.operations.len())
            .field("connected", &self.is_connected())
            .field("client_timeout", &self.client_timeout())
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}
