// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process engine.
//!
//! Runs registered workflow and activity functions directly on tokio tasks.
//! Nothing is persisted and nothing is replayed: a workflow function runs
//! exactly once, start to finish. Good enough for tests and for running the
//! bridge locally without a real engine.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wfbridge_protocol::ClassifiedError;
use wfbridge_protocol::payloads::{
    ActivityInfo, ActivityOptions, ChildWorkflowOptions, ConnectRequest, DomainDescription,
    DomainRegisterRequest, DomainUpdateRequest, LocalActivityOptions, StartWorkflowOptions,
    WorkerOptions, WorkflowExecution, WorkflowExecutionDescription, WorkflowSignalWithStartRequest,
};

use super::{
    ActivityFn, ActivityHandle, ChildWorkflowHandle, Engine, EngineConnector, EngineError,
    FunctionResult, Payload, QueryFn, SideEffectValue, Worker, WorkflowFn, WorkflowHandle,
    WorkflowInfo,
};

/// Connector handing out sessions to one shared [`MemoryEngine`].
pub struct MemoryEngineConnector {
    engine: MemoryEngine,
    reachable: AtomicBool,
}

impl MemoryEngineConnector {
    pub fn new() -> Self {
        Self {
            engine: MemoryEngine::new(),
            reachable: AtomicBool::new(true),
        }
    }

    /// The engine every session talks to.
    pub fn engine(&self) -> MemoryEngine {
        self.engine.clone()
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }
}

impl Default for MemoryEngineConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineConnector for MemoryEngineConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<Arc<dyn Engine>, EngineError> {
        if !self.reachable.load(Ordering::Relaxed) {
            return Err(EngineError::Connection(format!(
                "engine at '{}' is unreachable",
                request.endpoints
            )));
        }
        info!(endpoints = %request.endpoints, identity = %request.identity, "memory engine session opened");
        Ok(Arc::new(self.engine.clone()))
    }
}

/// In-process engine. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    domains: DashMap<String, DomainDescription>,
    workflows: DashMap<String, WorkflowFn>,
    activities: DashMap<String, ActivityFn>,
    executions: DashMap<String, Arc<Execution>>,
    workers: DashMap<String, CancellationToken>,
    pending_activities: DashMap<Vec<u8>, oneshot::Sender<FunctionResult>>,
    activity_ids: AtomicI64,
    sticky_cache_size: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current sticky cache size.
    pub fn sticky_cache_size(&self) -> usize {
        self.shared.sticky_cache_size.load(Ordering::Relaxed)
    }

    /// Number of executions started so far (latest run per workflow id).
    pub fn execution_count(&self) -> usize {
        self.shared.executions.len()
    }

    fn find(&self, execution: &WorkflowExecution) -> Result<Arc<Execution>, EngineError> {
        self.shared
            .executions
            .get(&execution.id)
            .map(|e| e.value().clone())
            .filter(|e| execution.run_id.is_empty() || e.execution.run_id == execution.run_id)
            .ok_or_else(|| EngineError::EntityNotFound(format!("workflow execution {}", execution.id)))
    }

    fn find_running(&self, execution: &WorkflowExecution) -> Result<Arc<Execution>, EngineError> {
        let found = self.find(execution)?;
        if !found.is_running() {
            return Err(EngineError::EntityNotFound(format!(
                "running workflow execution {}",
                execution.id
            )));
        }
        Ok(found)
    }

    fn start_execution(&self, start: StartExecution) -> Result<Arc<Execution>, EngineError> {
        let function = self
            .shared
            .workflows
            .get(&start.workflow_type)
            .map(|f| f.value().clone())
            .ok_or_else(|| {
                EngineError::EntityNotFound(format!("workflow type {}", start.workflow_type))
            })?;

        let id = start.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let last_completion = match self.shared.executions.get(&id) {
            Some(previous) if previous.is_running() => {
                return Err(EngineError::AlreadyExists(format!("workflow execution {}", id)));
            }
            Some(previous) => previous.completion_result(),
            None => None,
        };

        let execution = Arc::new(Execution::new(
            WorkflowExecution::new(id.clone(), Uuid::new_v4().to_string()),
            start.workflow_type,
            start.domain,
            start.task_list,
            start.timeout,
            last_completion,
        ));
        self.shared.executions.insert(id, execution.clone());

        let handle: Arc<dyn WorkflowHandle> = Arc::new(MemoryWorkflowHandle {
            engine: self.clone(),
            execution: execution.clone(),
            detached: None,
        });

        debug!(
            workflow_id = %execution.execution.id,
            run_id = %execution.execution.run_id,
            workflow_type = %execution.workflow_type,
            "workflow started"
        );

        let running = execution.clone();
        let args = start.args;
        tokio::spawn(async move {
            let task = tokio::spawn(function(handle, args));
            let abort = task.abort_handle();
            let outcome = tokio::select! {
                joined = task => join_outcome(joined),
                _ = running.terminate.cancelled() => {
                    abort.abort();
                    Err(EngineError::Terminated(running.terminate_reason()))
                }
                _ = maybe_sleep(running.timeout) => {
                    abort.abort();
                    Err(EngineError::Timeout(format!(
                        "workflow {} exceeded its start-to-close timeout",
                        running.execution.id
                    )))
                }
            };
            running.close(outcome);
        });

        Ok(execution)
    }

    async fn run_activity(
        &self,
        function: ActivityFn,
        run: RunActivity,
        args: Payload,
        cancel: CancellationToken,
    ) -> Result<Payload, EngineError> {
        let task_token = Uuid::new_v4().as_bytes().to_vec();
        let activity_id = self.shared.activity_ids.fetch_add(1, Ordering::Relaxed) + 1;
        let worker_stop = self
            .shared
            .workers
            .get(&run.task_list)
            .map(|t| t.value().clone())
            .unwrap_or_default();

        let handle = Arc::new(MemoryActivityHandle {
            info: ActivityInfo {
                task_token: task_token.clone(),
                workflow_execution: run.workflow_execution,
                activity_id: activity_id.to_string(),
                activity_type: run.activity_type,
                task_list: run.task_list,
                attempt: 1,
                deadline: run
                    .timeout
                    .and_then(|d| chrono::Duration::from_std(d).ok())
                    .map(|d| Utc::now() + d),
            },
            heartbeat: Mutex::new(None),
            worker_stop,
        });

        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_activities
            .insert(task_token.clone(), tx);

        let task = tokio::spawn(function(handle, args));
        let abort = task.abort_handle();
        let outcome = tokio::select! {
            joined = task => join_outcome(joined),
            completed = rx => {
                abort.abort();
                completed.unwrap_or_else(|_| {
                    Err(EngineError::Other("activity completion dropped".to_string()))
                })
            }
            _ = cancel.cancelled() => {
                abort.abort();
                Err(EngineError::Canceled)
            }
            _ = maybe_sleep(run.timeout) => {
                abort.abort();
                Err(EngineError::Timeout(format!("activity {} timed out", activity_id)))
            }
        };

        self.shared.pending_activities.remove(&task_token);
        outcome
    }
}

struct StartExecution {
    domain: String,
    workflow_type: String,
    id: Option<String>,
    task_list: String,
    timeout: Option<Duration>,
    args: Payload,
}

struct RunActivity {
    activity_type: String,
    workflow_execution: WorkflowExecution,
    task_list: String,
    timeout: Option<Duration>,
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

async fn maybe_sleep(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

fn join_outcome(joined: Result<FunctionResult, JoinError>) -> FunctionResult {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(EngineError::Panic(panic_message(e.into_panic()))),
        Err(e) => Err(EngineError::Other(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    TimedOut,
}

impl ExecutionStatus {
    fn from_outcome(outcome: &FunctionResult) -> Self {
        match outcome {
            Ok(_) => Self::Completed,
            Err(EngineError::Canceled) => Self::Canceled,
            Err(EngineError::Classified(e)) if e.kind == wfbridge_protocol::ErrorKind::Canceled => {
                Self::Canceled
            }
            Err(EngineError::Terminated(_)) => Self::Terminated,
            Err(EngineError::Timeout(_)) => Self::TimedOut,
            Err(_) => Self::Failed,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Terminated => "TERMINATED",
            Self::TimedOut => "TIMED_OUT",
        }
    }
}

struct ExecutionState {
    status: ExecutionStatus,
    close_time: Option<DateTime<Utc>>,
    terminate_reason: String,
    subscribers: HashMap<String, mpsc::UnboundedSender<Payload>>,
    buffered_signals: HashMap<String, Vec<Payload>>,
}

struct Execution {
    execution: WorkflowExecution,
    workflow_type: String,
    domain: String,
    task_list: String,
    timeout: Option<Duration>,
    start_time: DateTime<Utc>,
    last_completion: Payload,
    cancel: CancellationToken,
    terminate: CancellationToken,
    state: Mutex<ExecutionState>,
    closed: watch::Sender<Option<FunctionResult>>,
    queries: DashMap<String, QueryFn>,
    side_effects: DashMap<String, SideEffectValue>,
    history_length: AtomicI64,
}

impl Execution {
    fn new(
        execution: WorkflowExecution,
        workflow_type: String,
        domain: String,
        task_list: String,
        timeout: Option<Duration>,
        last_completion: Payload,
    ) -> Self {
        Self {
            execution,
            workflow_type,
            domain,
            task_list,
            timeout,
            start_time: Utc::now(),
            last_completion,
            cancel: CancellationToken::new(),
            terminate: CancellationToken::new(),
            state: Mutex::new(ExecutionState {
                status: ExecutionStatus::Running,
                close_time: None,
                terminate_reason: String::new(),
                subscribers: HashMap::new(),
                buffered_signals: HashMap::new(),
            }),
            closed: watch::channel(None).0,
            queries: DashMap::new(),
            side_effects: DashMap::new(),
            history_length: AtomicI64::new(1),
        }
    }

    fn is_running(&self) -> bool {
        self.state.lock().status == ExecutionStatus::Running
    }

    fn record_event(&self) {
        self.history_length.fetch_add(1, Ordering::Relaxed);
    }

    fn terminate_reason(&self) -> String {
        self.state.lock().terminate_reason.clone()
    }

    fn terminate(&self, reason: &str) {
        self.state.lock().terminate_reason = reason.to_string();
        self.terminate.cancel();
    }

    fn close(&self, outcome: FunctionResult) {
        let status = ExecutionStatus::from_outcome(&outcome);
        {
            let mut state = self.state.lock();
            state.status = status;
            state.close_time = Some(Utc::now());
            state.subscribers.clear();
        }
        self.record_event();
        debug!(workflow_id = %self.execution.id, status = status.as_str(), "workflow closed");
        self.closed.send_replace(Some(outcome));
    }

    /// Result of a successfully completed run, if any.
    fn completion_result(&self) -> Payload {
        match &*self.closed.borrow() {
            Some(Ok(result)) => result.clone(),
            _ => None,
        }
    }

    async fn wait(&self) -> FunctionResult {
        let mut rx = self.closed.subscribe();
        let closed = rx.wait_for(|outcome| outcome.is_some()).await;
        match closed {
            Ok(outcome) => match &*outcome {
                Some(result) => result.clone(),
                None => Err(EngineError::Other("execution closed without outcome".into())),
            },
            Err(_) => Err(EngineError::Other("execution dropped".into())),
        }
    }

    fn deliver_signal(&self, name: &str, args: Payload) {
        self.record_event();
        let mut state = self.state.lock();
        let args = match state.subscribers.get(name) {
            Some(tx) => match tx.send(args) {
                Ok(()) => return,
                Err(mpsc::error::SendError(args)) => args,
            },
            None => args,
        };
        state
            .buffered_signals
            .entry(name.to_string())
            .or_default()
            .push(args);
    }

    fn subscribe(&self, name: &str) -> mpsc::UnboundedReceiver<Payload> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        if let Some(buffered) = state.buffered_signals.remove(name) {
            for args in buffered {
                let _ = tx.send(args);
            }
        }
        state.subscribers.insert(name.to_string(), tx);
        rx
    }

    fn describe(&self) -> WorkflowExecutionDescription {
        let state = self.state.lock();
        WorkflowExecutionDescription {
            execution: self.execution.clone(),
            workflow_type: self.workflow_type.clone(),
            status: state.status.as_str().to_string(),
            start_time: self.start_time,
            close_time: state.close_time,
            history_length: self.history_length.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn register_domain(&self, request: &DomainRegisterRequest) -> Result<(), EngineError> {
        use dashmap::mapref::entry::Entry;

        match self.shared.domains.entry(request.name.clone()) {
            Entry::Occupied(_) => Err(EngineError::AlreadyExists(format!(
                "domain {}",
                request.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(DomainDescription {
                    name: request.name.clone(),
                    description: request.description.clone(),
                    owner_email: request.owner_email.clone(),
                    status: "REGISTERED".to_string(),
                    emit_metrics: request.emit_metrics,
                    retention_days: request.retention_days,
                });
                Ok(())
            }
        }
    }

    async fn describe_domain(&self, name: &str) -> Result<DomainDescription, EngineError> {
        self.shared
            .domains
            .get(name)
            .map(|d| d.value().clone())
            .ok_or_else(|| EngineError::EntityNotFound(format!("domain {}", name)))
    }

    async fn update_domain(&self, request: &DomainUpdateRequest) -> Result<(), EngineError> {
        let mut domain = self
            .shared
            .domains
            .get_mut(&request.name)
            .ok_or_else(|| EngineError::EntityNotFound(format!("domain {}", request.name)))?;

        if let Some(description) = &request.description {
            domain.description = description.clone();
        }
        if let Some(owner_email) = &request.owner_email {
            domain.owner_email = owner_email.clone();
        }
        if let Some(emit_metrics) = request.emit_metrics {
            domain.emit_metrics = emit_metrics;
        }
        if let Some(retention_days) = request.retention_days {
            domain.retention_days = retention_days;
        }
        Ok(())
    }

    async fn start_worker(
        &self,
        domain: &str,
        task_list: &str,
        _options: &WorkerOptions,
    ) -> Result<Arc<dyn Worker>, EngineError> {
        let stop = CancellationToken::new();
        self.shared
            .workers
            .insert(task_list.to_string(), stop.clone());
        debug!(domain, task_list, "worker started");
        Ok(Arc::new(MemoryWorker {
            engine: self.clone(),
            task_list: task_list.to_string(),
            stop,
        }))
    }

    fn register_workflow(&self, name: &str, function: WorkflowFn) -> Result<(), EngineError> {
        if self
            .shared
            .workflows
            .insert(name.to_string(), function)
            .is_some()
        {
            debug!(workflow_type = name, "workflow registration replaced");
        }
        Ok(())
    }

    fn register_activity(&self, name: &str, function: ActivityFn) -> Result<(), EngineError> {
        if self
            .shared
            .activities
            .insert(name.to_string(), function)
            .is_some()
        {
            debug!(activity_type = name, "activity registration replaced");
        }
        Ok(())
    }

    async fn execute_workflow(
        &self,
        domain: &str,
        workflow: &str,
        args: Payload,
        options: &StartWorkflowOptions,
    ) -> Result<WorkflowExecution, EngineError> {
        let execution = self.start_execution(StartExecution {
            domain: domain.to_string(),
            workflow_type: workflow.to_string(),
            id: options.id.clone(),
            task_list: options.task_list.clone(),
            timeout: millis(options.execution_start_to_close_timeout_ms),
            args,
        })?;
        Ok(execution.execution.clone())
    }

    async fn cancel_workflow(&self, execution: &WorkflowExecution) -> Result<(), EngineError> {
        let found = self.find_running(execution)?;
        found.record_event();
        found.cancel.cancel();
        Ok(())
    }

    async fn terminate_workflow(
        &self,
        execution: &WorkflowExecution,
        reason: &str,
        _details: Payload,
    ) -> Result<(), EngineError> {
        let found = self.find_running(execution)?;
        found.terminate(reason);
        Ok(())
    }

    async fn signal_workflow(
        &self,
        execution: &WorkflowExecution,
        signal_name: &str,
        args: Payload,
    ) -> Result<(), EngineError> {
        let found = self.find_running(execution)?;
        found.deliver_signal(signal_name, args);
        Ok(())
    }

    async fn signal_with_start_workflow(
        &self,
        request: &WorkflowSignalWithStartRequest,
    ) -> Result<WorkflowExecution, EngineError> {
        let lookup = WorkflowExecution::new(request.workflow_id.clone(), "");
        let found = match self.find_running(&lookup) {
            Ok(found) => found,
            Err(_) => self.start_execution(StartExecution {
                domain: request.domain.clone(),
                workflow_type: request.workflow.clone(),
                id: Some(request.workflow_id.clone()),
                task_list: request.options.task_list.clone(),
                timeout: millis(request.options.execution_start_to_close_timeout_ms),
                args: request.workflow_args.clone(),
            })?,
        };
        found.deliver_signal(&request.signal_name, request.signal_args.clone());
        Ok(found.execution.clone())
    }

    async fn query_workflow(
        &self,
        execution: &WorkflowExecution,
        query_name: &str,
        args: Payload,
    ) -> Result<Payload, EngineError> {
        let found = self.find(execution)?;
        let handler = found
            .queries
            .get(query_name)
            .map(|h| h.value().clone())
            .ok_or_else(|| EngineError::EntityNotFound(format!("query handler {}", query_name)))?;
        handler(args).await
    }

    async fn describe_workflow_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowExecutionDescription, EngineError> {
        Ok(self.find(execution)?.describe())
    }

    async fn get_workflow_result(&self, execution: &WorkflowExecution) -> Result<Payload, EngineError> {
        self.find(execution)?.wait().await
    }

    fn set_sticky_cache_size(&self, size: usize) {
        self.shared.sticky_cache_size.store(size, Ordering::Relaxed);
    }

    async fn complete_activity(
        &self,
        task_token: &[u8],
        result: Payload,
        error: Option<ClassifiedError>,
    ) -> Result<(), EngineError> {
        let (_, completion) = self
            .shared
            .pending_activities
            .remove(task_token)
            .ok_or_else(|| EngineError::EntityNotFound("activity task".to_string()))?;

        let outcome = match error {
            Some(error) => Err(EngineError::Classified(error)),
            None => Ok(result),
        };
        if completion.send(outcome).is_err() {
            warn!("activity completed after it stopped waiting");
        }
        Ok(())
    }
}

struct MemoryWorker {
    engine: MemoryEngine,
    task_list: String,
    stop: CancellationToken,
}

#[async_trait]
impl Worker for MemoryWorker {
    async fn stop(&self) {
        self.stop.cancel();
        self.engine
            .shared
            .workers
            .remove_if(&self.task_list, |_, token| token.is_cancelled());
        debug!(task_list = %self.task_list, "worker stopped");
    }
}

struct MemoryWorkflowHandle {
    engine: MemoryEngine,
    execution: Arc<Execution>,
    /// Set on disconnected handles: their own, never cancelled token.
    detached: Option<CancellationToken>,
}

#[async_trait]
impl WorkflowHandle for MemoryWorkflowHandle {
    fn info(&self) -> WorkflowInfo {
        WorkflowInfo {
            execution: self.execution.execution.clone(),
            workflow_type: self.execution.workflow_type.clone(),
            domain: self.execution.domain.clone(),
            task_list: self.execution.task_list.clone(),
            execution_start_to_close_timeout: self.execution.timeout,
        }
    }

    fn cancellation(&self) -> CancellationToken {
        match &self.detached {
            Some(token) => token.clone(),
            None => self.execution.cancel.clone(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(
        &self,
        duration: Duration,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        self.execution.record_event();
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = cancel.cancelled() => Err(EngineError::Canceled),
        }
    }

    async fn mutable_side_effect(
        &self,
        id: &str,
        value: SideEffectValue,
    ) -> Result<SideEffectValue, EngineError> {
        let recorded = self
            .execution
            .side_effects
            .get(id)
            .map(|r| r.value().clone());
        if recorded.as_ref() == Some(&value) {
            return Ok(value);
        }
        self.execution
            .side_effects
            .insert(id.to_string(), value.clone());
        self.execution.record_event();
        Ok(value)
    }

    fn has_last_completion_result(&self) -> bool {
        self.execution.last_completion.is_some()
    }

    fn last_completion_result(&self) -> Result<Payload, EngineError> {
        Ok(self.execution.last_completion.clone())
    }

    fn disconnected(&self) -> Arc<dyn WorkflowHandle> {
        Arc::new(MemoryWorkflowHandle {
            engine: self.engine.clone(),
            execution: self.execution.clone(),
            detached: Some(CancellationToken::new()),
        })
    }

    fn signal_channel(&self, name: &str) -> mpsc::UnboundedReceiver<Payload> {
        self.execution.subscribe(name)
    }

    fn set_query_handler(&self, name: &str, handler: QueryFn) -> Result<(), EngineError> {
        self.execution.queries.insert(name.to_string(), handler);
        Ok(())
    }

    async fn execute_activity(
        &self,
        activity: &str,
        args: Payload,
        options: &ActivityOptions,
        cancel: CancellationToken,
    ) -> Result<Payload, EngineError> {
        let function = self
            .engine
            .shared
            .activities
            .get(activity)
            .map(|f| f.value().clone())
            .ok_or_else(|| EngineError::EntityNotFound(format!("activity type {}", activity)))?;

        self.execution.record_event();
        let timeout = millis(options.start_to_close_timeout_ms)
            .or_else(|| millis(options.schedule_to_close_timeout_ms));
        let task_list = options
            .task_list
            .clone()
            .unwrap_or_else(|| self.execution.task_list.clone());

        self.engine
            .run_activity(
                function,
                RunActivity {
                    activity_type: activity.to_string(),
                    workflow_execution: self.execution.execution.clone(),
                    task_list,
                    timeout,
                },
                args,
                cancel,
            )
            .await
    }

    async fn execute_local_activity(
        &self,
        function: ActivityFn,
        args: Payload,
        options: &LocalActivityOptions,
        cancel: CancellationToken,
    ) -> Result<Payload, EngineError> {
        self.execution.record_event();
        self.engine
            .run_activity(
                function,
                RunActivity {
                    activity_type: "local".to_string(),
                    workflow_execution: self.execution.execution.clone(),
                    task_list: self.execution.task_list.clone(),
                    timeout: millis(options.schedule_to_close_timeout_ms),
                },
                args,
                cancel,
            )
            .await
    }

    async fn start_child(
        &self,
        workflow: &str,
        args: Payload,
        options: &ChildWorkflowOptions,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn ChildWorkflowHandle>, EngineError> {
        self.execution.record_event();
        let child = self.engine.start_execution(StartExecution {
            domain: options
                .domain
                .clone()
                .unwrap_or_else(|| self.execution.domain.clone()),
            workflow_type: workflow.to_string(),
            id: options.workflow_id.clone(),
            task_list: options
                .task_list
                .clone()
                .unwrap_or_else(|| self.execution.task_list.clone()),
            timeout: millis(options.execution_start_to_close_timeout_ms),
            args,
        })?;

        let watched = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => watched.cancel.cancel(),
                _ = watched.wait() => {}
            }
        });

        Ok(Arc::new(MemoryChildHandle { execution: child }))
    }
}

struct MemoryChildHandle {
    execution: Arc<Execution>,
}

#[async_trait]
impl ChildWorkflowHandle for MemoryChildHandle {
    fn execution(&self) -> WorkflowExecution {
        self.execution.execution.clone()
    }

    async fn signal(&self, signal_name: &str, args: Payload) -> Result<(), EngineError> {
        if !self.execution.is_running() {
            return Err(EngineError::UnknownExternalExecution(
                self.execution.execution.id.clone(),
            ));
        }
        self.execution.deliver_signal(signal_name, args);
        Ok(())
    }

    async fn result(&self) -> Result<Payload, EngineError> {
        self.execution.wait().await
    }
}

struct MemoryActivityHandle {
    info: ActivityInfo,
    /// `Some` once a heartbeat was recorded.
    heartbeat: Mutex<Option<Payload>>,
    worker_stop: CancellationToken,
}

impl ActivityHandle for MemoryActivityHandle {
    fn info(&self) -> ActivityInfo {
        self.info.clone()
    }

    fn record_heartbeat(&self, details: Payload) -> Result<(), EngineError> {
        *self.heartbeat.lock() = Some(details);
        Ok(())
    }

    fn has_heartbeat_details(&self) -> bool {
        self.heartbeat.lock().is_some()
    }

    fn heartbeat_details(&self) -> Result<Payload, EngineError> {
        Ok(self.heartbeat.lock().clone().flatten())
    }

    fn worker_stop(&self) -> CancellationToken {
        self.worker_stop.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::engine::workflow_fn;

    fn echo_workflow() -> WorkflowFn {
        workflow_fn(|_handle, args| async move { Ok::<_, EngineError>(args) })
    }

    #[tokio::test]
    async fn test_execute_and_get_result() {
        let engine = MemoryEngine::new();
        engine.register_workflow("Echo", echo_workflow()).unwrap();

        let execution = engine
            .execute_workflow("test", "Echo", Some(vec![7]), &Default::default())
            .await
            .unwrap();
        let result = engine.get_workflow_result(&execution).await.unwrap();
        assert_eq!(result, Some(vec![7]));

        let description = engine
            .describe_workflow_execution(&execution)
            .await
            .unwrap();
        assert_eq!(description.status, "COMPLETED");
        assert!(description.close_time.is_some());
    }

    #[tokio::test]
    async fn test_unknown_workflow_type() {
        let engine = MemoryEngine::new();
        let err = engine
            .execute_workflow("test", "Missing", None, &Default::default())
            .await
            .unwrap_err();
        assert!(err.is_entity_not_found());
    }

    #[tokio::test]
    async fn test_panicking_workflow_fails_with_panic() {
        let engine = MemoryEngine::new();
        engine
            .register_workflow(
                "Boom",
                workflow_fn(|_handle, args: Payload| async move {
                    match args {
                        Some(args) => Ok::<_, EngineError>(Some(args)),
                        None => panic!("kaboom"),
                    }
                }),
            )
            .unwrap();

        let execution = engine
            .execute_workflow("test", "Boom", None, &Default::default())
            .await
            .unwrap();
        let err = engine.get_workflow_result(&execution).await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "panic: kaboom");
    }

    #[tokio::test]
    async fn test_duplicate_running_id_rejected() {
        let engine = MemoryEngine::new();
        engine
            .register_workflow(
                "Forever",
                workflow_fn(|handle: Arc<dyn WorkflowHandle>, _args| async move {
                    handle.cancellation().cancelled().await;
                    Err::<Payload, _>(EngineError::Canceled)
                }),
            )
            .unwrap();

        let options = StartWorkflowOptions {
            id: Some("wf-1".into()),
            ..Default::default()
        };
        let execution = engine
            .execute_workflow("test", "Forever", None, &options)
            .await
            .unwrap();
        let err = engine
            .execute_workflow("test", "Forever", None, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));

        engine.cancel_workflow(&execution).await.unwrap();
        assert!(engine.get_workflow_result(&execution).await.unwrap_err().is_canceled());
    }

    #[tokio::test]
    async fn test_last_completion_result_carries_over() {
        let engine = MemoryEngine::new();
        engine
            .register_workflow(
                "Cron",
                workflow_fn(|handle: Arc<dyn WorkflowHandle>, args: Payload| async move {
                    handle
                        .last_completion_result()
                        .map(|previous| previous.or(args))
                }),
            )
            .unwrap();

        let options = StartWorkflowOptions {
            id: Some("cron".into()),
            ..Default::default()
        };
        let first = engine
            .execute_workflow("test", "Cron", Some(vec![1]), &options)
            .await
            .unwrap();
        assert_eq!(engine.get_workflow_result(&first).await.unwrap(), Some(vec![1]));

        let second = engine
            .execute_workflow("test", "Cron", Some(vec![2]), &options)
            .await
            .unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(engine.get_workflow_result(&second).await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn test_buffered_signals_reach_late_subscriber() {
        let execution = Execution::new(
            WorkflowExecution::new("wf", "run"),
            "T".into(),
            "d".into(),
            "tl".into(),
            None,
            None,
        );
        execution.deliver_signal("go", Some(vec![1]));
        execution.deliver_signal("go", Some(vec![2]));

        let mut rx = execution.subscribe("go");
        assert_eq!(rx.recv().await, Some(Some(vec![1])));
        assert_eq!(rx.recv().await, Some(Some(vec![2])));

        execution.deliver_signal("go", None);
        assert_eq!(rx.recv().await, Some(None));
    }

    #[tokio::test]
    async fn test_domains() {
        let engine = MemoryEngine::new();
        let request = DomainRegisterRequest {
            name: "orders".into(),
            description: "order workflows".into(),
            retention_days: 7,
            ..Default::default()
        };
        engine.register_domain(&request).await.unwrap();
        assert!(matches!(
            engine.register_domain(&request).await,
            Err(EngineError::AlreadyExists(_))
        ));

        engine
            .update_domain(&DomainUpdateRequest {
                name: "orders".into(),
                retention_days: Some(30),
                ..Default::default()
            })
            .await
            .unwrap();

        let domain = engine.describe_domain("orders").await.unwrap();
        assert_eq!(domain.description, "order workflows");
        assert_eq!(domain.retention_days, 30);
        assert!(engine.describe_domain("missing").await.unwrap_err().is_entity_not_found());
    }
}
