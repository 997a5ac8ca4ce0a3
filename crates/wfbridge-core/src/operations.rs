// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Correlation of outbound requests with the replies that resume them.
//!
//! When the bridge sends an invoke request to the peer, it registers an
//! [`Operation`] under the request id and suspends on the paired [`Pending`].
//! The peer's reply arrives later as an independent inbound message; the
//! dispatcher hands it to [`OperationTable::fulfill`], which completes the
//! operation exactly once and removes it.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use wfbridge_protocol::{ClassifiedError, ProxyMessage};

use crate::engine::Payload;
use crate::ids::IdGenerator;

/// Outcome delivered to a suspended operation.
pub type OperationResult = Result<Payload, ClassifiedError>;

/// Descriptive part of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationInfo {
    /// Request id, unique while the operation is outstanding.
    pub request_id: i64,
    /// The outgoing request.
    pub request: ProxyMessage,
    /// Context that owns the operation, if any.
    pub context_id: Option<i64>,
}

/// One outstanding request awaiting exactly one reply.
#[derive(Debug)]
pub struct Operation {
    info: OperationInfo,
    completion: oneshot::Sender<OperationResult>,
}

impl Operation {
    /// Create an operation for `request` and the handle its caller waits on.
    pub fn new(request: ProxyMessage, context_id: Option<i64>) -> (Self, Pending) {
        let (tx, rx) = oneshot::channel();
        let request_id = request.request_id;
        let operation = Self {
            info: OperationInfo {
                request_id,
                request,
                context_id,
            },
            completion: tx,
        };
        (operation, Pending { request_id, rx })
    }

    pub fn request_id(&self) -> i64 {
        self.info.request_id
    }

    pub fn info(&self) -> &OperationInfo {
        &self.info
    }

    /// Deliver the outcome. Consumes the operation, so it can only happen once.
    /// Returns false if the waiter is gone.
    fn complete(self, outcome: OperationResult) -> bool {
        self.completion.send(outcome).is_ok()
    }
}

/// Receiving side of an [`Operation`].
#[derive(Debug)]
pub struct Pending {
    request_id: i64,
    rx: oneshot::Receiver<OperationResult>,
}

impl Pending {
    pub fn request_id(&self) -> i64 {
        self.request_id
    }

    /// Wait for the outcome.
    ///
    /// Resolves with [`ErrorKind::Timeout`](wfbridge_protocol::ErrorKind::Timeout)
    /// after `timeout`, or with
    /// [`ErrorKind::Canceled`](wfbridge_protocol::ErrorKind::Canceled) once
    /// `cancel` fires; either way the operation is removed from `table`.
    pub async fn wait(
        self,
        table: &OperationTable,
        timeout: Duration,
        cancel: Option<CancellationToken>,
    ) -> OperationResult {
        let Pending { request_id, rx } = self;

        let cancelled = async move {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            outcome = rx => match outcome {
                Ok(outcome) => outcome,
                Err(_) => Err(ClassifiedError::generic(format!(
                    "operation {} was dropped without a reply",
                    request_id
                ))),
            },
            _ = tokio::time::sleep(timeout) => {
                table.remove(request_id);
                debug!(request_id, timeout_ms = timeout.as_millis() as u64, "operation timed out");
                Err(ClassifiedError::timeout(format!(
                    "operation {} timed out after {}ms",
                    request_id,
                    timeout.as_millis()
                )))
            }
            _ = cancelled => {
                table.remove(request_id);
                debug!(request_id, "operation canceled");
                Err(ClassifiedError::canceled(format!("operation {} canceled", request_id)))
            }
        }
    }
}

/// Request id → outstanding operation.
#[derive(Debug, Default)]
pub struct OperationTable {
    operations: DashMap<i64, Operation>,
    request_ids: IdGenerator,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh request id for an outbound request.
    pub fn next_request_id(&self) -> i64 {
        self.request_ids.next()
    }

    /// Track `operation` until it is fulfilled.
    ///
    /// Returns false, dropping `operation`, if its request id is already
    /// outstanding. The dropped operation's waiter then resolves with a
    /// generic error.
    pub fn register(&self, operation: Operation) -> bool {
        match self.operations.entry(operation.request_id()) {
            Entry::Occupied(_) => {
                warn!(
                    request_id = operation.request_id(),
                    "request id already has an outstanding operation"
                );
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(operation);
                true
            }
        }
    }

    /// Complete the operation for `request_id` and remove it.
    ///
    /// Returns false (and logs the anomaly) if no such operation is
    /// outstanding, e.g. a duplicate reply or one arriving after a timeout.
    pub fn fulfill(&self, request_id: i64, outcome: OperationResult) -> bool {
        match self.operations.remove(&request_id) {
            Some((_, operation)) => {
                if !operation.complete(outcome) {
                    debug!(request_id, "operation waiter already gone");
                }
                true
            }
            None => {
                warn!(request_id, "reply for unknown operation ignored");
                false
            }
        }
    }

    /// Resolve the operation for `request_id` with a cancellation error.
    pub fn cancel(&self, request_id: i64) -> bool {
        match self.operations.remove(&request_id) {
            Some((_, operation)) => {
                operation.complete(Err(ClassifiedError::canceled(format!(
                    "operation {} canceled",
                    request_id
                ))));
                true
            }
            None => false,
        }
    }

    /// Snapshot of an outstanding operation.
    pub fn lookup(&self, request_id: i64) -> Option<OperationInfo> {
        self.operations.get(&request_id).map(|op| op.info.clone())
    }

    /// Stop tracking `request_id` without completing it.
    pub fn remove(&self, request_id: i64) -> bool {
        self.operations.remove(&request_id).is_some()
    }

    pub fn contains(&self, request_id: i64) -> bool {
        self.operations.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfbridge_protocol::{ErrorKind, MessageType};

    fn invoke(table: &OperationTable, context_id: Option<i64>) -> (i64, Pending) {
        let request_id = table.next_request_id();
        let request = ProxyMessage::empty(MessageType::WorkflowInvokeRequest, request_id);
        let (operation, pending) = Operation::new(request, context_id);
        assert!(table.register(operation));
        (request_id, pending)
    }

    #[tokio::test]
    async fn test_fulfill_delivers_once() {
        let table = OperationTable::new();
        let (id, pending) = invoke(&table, Some(7));

        assert!(table.fulfill(id, Ok(Some(vec![1, 2]))));
        assert!(!table.fulfill(id, Ok(Some(vec![3]))));

        let outcome = pending
            .wait(&table, Duration::from_secs(5), None)
            .await
            .unwrap();
        assert_eq!(outcome, Some(vec![1, 2]));
        assert!(table.is_empty());
    }

    #[test]
    fn test_fulfill_unknown_id() {
        let table = OperationTable::new();
        assert!(!table.fulfill(42, Ok(None)));
    }

    #[test]
    fn test_lookup() {
        let table = OperationTable::new();
        let (id, _pending) = invoke(&table, Some(3));

        let info = table.lookup(id).unwrap();
        assert_eq!(info.request_id, id);
        assert_eq!(info.context_id, Some(3));
        assert_eq!(
            info.request.message_type().unwrap(),
            MessageType::WorkflowInvokeRequest
        );
        assert!(table.lookup(id + 1).is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let table = OperationTable::new();
        let request = ProxyMessage::empty(MessageType::ActivityInvokeRequest, 5);
        let (first, _p1) = Operation::new(request.clone(), None);
        let (second, _p2) = Operation::new(request, None);

        assert!(table.register(first));
        assert!(!table.register(second));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_operation_resolves_generic() {
        let table = OperationTable::new();
        let request = ProxyMessage::empty(MessageType::ActivityInvokeRequest, 5);
        let (first, _p1) = Operation::new(request.clone(), None);
        let (second, p2) = Operation::new(request, None);
        table.register(first);
        table.register(second);

        let err = p2
            .wait(&table, Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Generic);
        // The first registration is untouched.
        assert!(table.contains(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_removes_entry() {
        let table = OperationTable::new();
        let (id, pending) = invoke(&table, None);

        let err = pending
            .wait(&table, Duration::from_millis(100), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(!table.contains(id));
        assert!(!table.fulfill(id, Ok(None)));
    }

    #[tokio::test]
    async fn test_wait_cancelled_by_token() {
        let table = OperationTable::new();
        let (id, pending) = invoke(&table, Some(1));
        let token = CancellationToken::new();
        token.cancel();

        let err = pending
            .wait(&table, Duration::from_secs(60), Some(token))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Canceled);
        assert!(!table.contains(id));
    }

    #[tokio::test]
    async fn test_cancel_by_request_id() {
        let table = OperationTable::new();
        let (id, pending) = invoke(&table, None);

        assert!(table.cancel(id));
        assert!(!table.cancel(id));

        let err = pending
            .wait(&table, Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Canceled);
    }

    #[test]
    fn test_request_ids_increase() {
        let table = OperationTable::new();
        let a = table.next_request_id();
        let b = table.next_request_id();
        assert!(b > a);
    }
}
