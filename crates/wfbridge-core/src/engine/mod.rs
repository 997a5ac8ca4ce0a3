// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Boundary to the wrapped workflow engine.
//!
//! The bridge never schedules or replays workflow code itself. Everything it
//! needs from the engine goes through the traits in this module:
//!
//! - [`EngineConnector`] opens a client session ([`Engine`])
//! - [`Engine`] covers client-side calls (domains, workers, starting,
//!   signalling and querying executions) and function registration
//! - [`WorkflowHandle`] is the native context handed to a running workflow
//!   function; [`ChildWorkflowHandle`] and [`ActivityHandle`] likewise for
//!   children and activities
//!
//! [`memory`] provides an in-process implementation used by tests and local
//! development.

pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wfbridge_protocol::ClassifiedError;
use wfbridge_protocol::payloads::{
    ActivityInfo, ActivityOptions, ChildWorkflowOptions, ConnectRequest, DomainDescription,
    DomainRegisterRequest, DomainUpdateRequest, LocalActivityOptions, StartWorkflowOptions,
    WorkerOptions, WorkflowExecution, WorkflowExecutionDescription, WorkflowSignalWithStartRequest,
};

/// Boxed future returned by registered functions.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Encoded value crossing the engine boundary. `None` means "no value".
pub type Payload = Option<Vec<u8>>;

/// Result of a workflow, activity, or query function.
pub type FunctionResult = Result<Payload, EngineError>;

/// Workflow function registered with the engine.
pub type WorkflowFn =
    Arc<dyn Fn(Arc<dyn WorkflowHandle>, Payload) -> BoxFuture<FunctionResult> + Send + Sync>;

/// Activity function registered with the engine (also used for local activities).
pub type ActivityFn =
    Arc<dyn Fn(Arc<dyn ActivityHandle>, Payload) -> BoxFuture<FunctionResult> + Send + Sync>;

/// Query handler attached to a running workflow.
pub type QueryFn = Arc<dyn Fn(Payload) -> BoxFuture<FunctionResult> + Send + Sync>;

/// Box an async closure as a [`WorkflowFn`].
pub fn workflow_fn<F, Fut>(f: F) -> WorkflowFn
where
    F: Fn(Arc<dyn WorkflowHandle>, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FunctionResult> + Send + 'static,
{
    Arc::new(
        move |handle: Arc<dyn WorkflowHandle>, args: Payload| -> BoxFuture<FunctionResult> {
            Box::pin(f(handle, args))
        },
    )
}

/// Box an async closure as an [`ActivityFn`].
pub fn activity_fn<F, Fut>(f: F) -> ActivityFn
where
    F: Fn(Arc<dyn ActivityHandle>, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FunctionResult> + Send + 'static,
{
    Arc::new(
        move |handle: Arc<dyn ActivityHandle>, args: Payload| -> BoxFuture<FunctionResult> {
            Box::pin(f(handle, args))
        },
    )
}

/// Box an async closure as a [`QueryFn`].
pub fn query_fn<F, Fut>(f: F) -> QueryFn
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FunctionResult> + Send + 'static,
{
    Arc::new(move |args: Payload| -> BoxFuture<FunctionResult> { Box::pin(f(args)) })
}

/// Errors reported by the engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Failure that already carries a classification.
    #[error("{0}")]
    Classified(ClassifiedError),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("{0} does not exist")]
    EntityNotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("canceled")]
    Canceled,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("terminated: {0}")]
    Terminated(String),

    #[error("panic: {0}")]
    Panic(String),

    #[error("unknown external workflow execution: {0}")]
    UnknownExternalExecution(String),

    /// Business failure raised by workflow or activity code.
    #[error("{0}")]
    Application(String),

    /// Failure the engine did not classify.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }

    pub fn is_application(&self) -> bool {
        matches!(self, Self::Application(_) | Self::AlreadyExists(_))
    }

    pub fn is_unknown_external_execution(&self) -> bool {
        matches!(self, Self::UnknownExternalExecution(_))
    }

    pub fn is_entity_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<ClassifiedError> for EngineError {
    fn from(err: ClassifiedError) -> Self {
        EngineError::Classified(err)
    }
}

/// Value recorded by a mutable side effect.
///
/// Only two shapes are recorded: a payload or a classified error. Equality
/// decides whether a new value is recorded; a missing payload differs from
/// an empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffectValue {
    Bytes(Payload),
    Error(ClassifiedError),
}

/// Static information about a running workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowInfo {
    pub execution: WorkflowExecution,
    pub workflow_type: String,
    pub domain: String,
    pub task_list: String,
    pub execution_start_to_close_timeout: Option<Duration>,
}

/// Opens client sessions with the engine.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Establish a session. Fails with [`EngineError::Connection`] when the
    /// engine cannot be reached.
    async fn connect(&self, request: &ConnectRequest) -> Result<Arc<dyn Engine>, EngineError>;
}

/// A client session with the engine.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn register_domain(&self, request: &DomainRegisterRequest) -> Result<(), EngineError>;

    async fn describe_domain(&self, name: &str) -> Result<DomainDescription, EngineError>;

    async fn update_domain(&self, request: &DomainUpdateRequest) -> Result<(), EngineError>;

    /// Start polling `task_list` in `domain`.
    async fn start_worker(
        &self,
        domain: &str,
        task_list: &str,
        options: &WorkerOptions,
    ) -> Result<Arc<dyn Worker>, EngineError>;

    /// Register a workflow function under `name`.
    fn register_workflow(&self, name: &str, function: WorkflowFn) -> Result<(), EngineError>;

    /// Register an activity function under `name`.
    fn register_activity(&self, name: &str, function: ActivityFn) -> Result<(), EngineError>;

    async fn execute_workflow(
        &self,
        domain: &str,
        workflow: &str,
        args: Payload,
        options: &StartWorkflowOptions,
    ) -> Result<WorkflowExecution, EngineError>;

    async fn cancel_workflow(&self, execution: &WorkflowExecution) -> Result<(), EngineError>;

    async fn terminate_workflow(
        &self,
        execution: &WorkflowExecution,
        reason: &str,
        details: Payload,
    ) -> Result<(), EngineError>;

    async fn signal_workflow(
        &self,
        execution: &WorkflowExecution,
        signal_name: &str,
        args: Payload,
    ) -> Result<(), EngineError>;

    /// Signal the workflow, starting it first if it is not running.
    async fn signal_with_start_workflow(
        &self,
        request: &WorkflowSignalWithStartRequest,
    ) -> Result<WorkflowExecution, EngineError>;

    async fn query_workflow(
        &self,
        execution: &WorkflowExecution,
        query_name: &str,
        args: Payload,
    ) -> Result<Payload, EngineError>;

    async fn describe_workflow_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowExecutionDescription, EngineError>;

    /// Wait for the execution to close and return its result.
    async fn get_workflow_result(&self, execution: &WorkflowExecution) -> Result<Payload, EngineError>;

    /// Size of the sticky workflow cache.
    fn set_sticky_cache_size(&self, size: usize);

    /// Complete an activity by task token, outside the activity function.
    async fn complete_activity(
        &self,
        task_token: &[u8],
        result: Payload,
        error: Option<ClassifiedError>,
    ) -> Result<(), EngineError>;
}

/// A running worker.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Stop polling; signals running activities through
    /// [`ActivityHandle::worker_stop`] first.
    async fn stop(&self);
}

/// Native context of a running workflow function.
#[async_trait]
pub trait WorkflowHandle: Send + Sync {
    fn info(&self) -> WorkflowInfo;

    /// Cancelled when cancellation of the workflow is requested.
    fn cancellation(&self) -> CancellationToken;

    /// Deterministic workflow time.
    fn now(&self) -> DateTime<Utc>;

    /// Durable timer; fails with [`EngineError::Canceled`] when `cancel` fires.
    async fn sleep(&self, duration: Duration, cancel: CancellationToken)
    -> Result<(), EngineError>;

    /// Record `value` under `id` unless it equals the value already recorded.
    /// Returns the recorded value.
    async fn mutable_side_effect(
        &self,
        id: &str,
        value: SideEffectValue,
    ) -> Result<SideEffectValue, EngineError>;

    fn has_last_completion_result(&self) -> bool;

    fn last_completion_result(&self) -> Result<Payload, EngineError>;

    /// A handle whose operations ignore cancellation of the workflow.
    fn disconnected(&self) -> Arc<dyn WorkflowHandle>;

    /// Subscribe to a named signal channel.
    fn signal_channel(&self, name: &str) -> mpsc::UnboundedReceiver<Payload>;

    fn set_query_handler(&self, name: &str, handler: QueryFn) -> Result<(), EngineError>;

    async fn execute_activity(
        &self,
        activity: &str,
        args: Payload,
        options: &ActivityOptions,
        cancel: CancellationToken,
    ) -> Result<Payload, EngineError>;

    async fn execute_local_activity(
        &self,
        function: ActivityFn,
        args: Payload,
        options: &LocalActivityOptions,
        cancel: CancellationToken,
    ) -> Result<Payload, EngineError>;

    /// Start a child workflow; the child is cancelled when `cancel` fires.
    async fn start_child(
        &self,
        workflow: &str,
        args: Payload,
        options: &ChildWorkflowOptions,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn ChildWorkflowHandle>, EngineError>;
}

/// Handle to a started child workflow.
#[async_trait]
pub trait ChildWorkflowHandle: Send + Sync {
    fn execution(&self) -> WorkflowExecution;

    async fn signal(&self, signal_name: &str, args: Payload) -> Result<(), EngineError>;

    /// Wait for the child to close and return its result.
    async fn result(&self) -> Result<Payload, EngineError>;
}

/// Native context of a running activity function.
pub trait ActivityHandle: Send + Sync {
    fn info(&self) -> ActivityInfo;

    fn record_heartbeat(&self, details: Payload) -> Result<(), EngineError>;

    fn has_heartbeat_details(&self) -> bool;

    fn heartbeat_details(&self) -> Result<Payload, EngineError>;

    /// Cancelled when the worker running this activity is stopping.
    fn worker_stop(&self) -> CancellationToken;
}
