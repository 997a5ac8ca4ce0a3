// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution contexts: the bridge's handles onto workflow, activity and
//! child workflow runs.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::engine::{ActivityHandle, ChildWorkflowHandle, WorkflowHandle};
use crate::ids::IdGenerator;
use crate::registry::Registry;

/// A running workflow.
///
/// Owns the native handle, the cancellation token every operation started
/// on behalf of the workflow listens to, and the workflow's children.
pub struct WorkflowContext {
    name: String,
    handle: RwLock<Arc<dyn WorkflowHandle>>,
    cancel: RwLock<CancellationToken>,
    children: Registry<ChildContext>,
}

impl WorkflowContext {
    /// Wrap `handle`. The context's token is cancelled together with the
    /// workflow, or on its own through [`cancel`](Self::cancel).
    pub fn new(
        name: impl Into<String>,
        handle: Arc<dyn WorkflowHandle>,
        child_ids: Arc<IdGenerator>,
    ) -> Self {
        let cancel = handle.cancellation().child_token();
        Self {
            name: name.into(),
            handle: RwLock::new(handle),
            cancel: RwLock::new(cancel),
            children: Registry::with_ids(child_ids),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current native handle.
    pub fn handle(&self) -> Arc<dyn WorkflowHandle> {
        self.handle.read().clone()
    }

    pub fn set_handle(&self, handle: Arc<dyn WorkflowHandle>) {
        *self.handle.write() = handle;
    }

    /// Current cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.read().clone()
    }

    pub fn set_cancel_token(&self, token: CancellationToken) {
        *self.cancel.write() = token;
    }

    /// Cancel everything waiting on the current token.
    pub fn cancel(&self) {
        self.cancel.read().cancel();
    }

    /// Switch to a disconnected handle so later operations survive
    /// cancellation of the workflow (cleanup code).
    pub fn disconnect(&self) {
        let handle = self.handle().disconnected();
        let token = handle.cancellation().child_token();
        self.set_handle(handle);
        self.set_cancel_token(token);
    }

    /// Register a child, returning its id.
    pub fn add_child(&self, child: ChildContext) -> i64 {
        self.children.insert(child)
    }

    pub fn get_child(&self, child_id: i64) -> Option<Arc<ChildContext>> {
        self.children.get(child_id)
    }

    /// Release a child.
    pub fn remove_child(&self, child_id: i64) -> Option<Arc<ChildContext>> {
        self.children.remove(child_id)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("name", &self.name)
            .field("execution", &self.handle().info().execution)
            .field("cancelled", &self.cancel_token().is_cancelled())
            .field("children", &self.children.ids())
            .finish()
    }
}

/// A running activity.
pub struct ActivityContext {
    name: String,
    handle: Arc<dyn ActivityHandle>,
}

impl ActivityContext {
    pub fn new(name: impl Into<String>, handle: Arc<dyn ActivityHandle>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Arc<dyn ActivityHandle> {
        self.handle.clone()
    }
}

impl std::fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityContext")
            .field("name", &self.name)
            .field("activity_id", &self.handle.info().activity_id)
            .finish()
    }
}

/// A started child workflow, owned by its parent's child map.
pub struct ChildContext {
    handle: Arc<dyn ChildWorkflowHandle>,
    cancel: CancellationToken,
}

impl ChildContext {
    pub fn new(handle: Arc<dyn ChildWorkflowHandle>, cancel: CancellationToken) -> Self {
        Self { handle, cancel }
    }

    pub fn handle(&self) -> Arc<dyn ChildWorkflowHandle> {
        self.handle.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation of the child.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ChildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildContext")
            .field("execution", &self.handle.execution())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
