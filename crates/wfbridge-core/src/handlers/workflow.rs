// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow handlers.
//!
//! Client-side calls (execute, cancel, signal, query, ...) go straight to the
//! engine session. Calls made from inside running workflow code address a
//! workflow context by id and act on its native handle.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use wfbridge_protocol::MessageType;
use wfbridge_protocol::payloads::{
    ChildRequest, ContextRequest, HasResultReply, ResultReply, WorkflowCancelRequest,
    WorkflowDescribeExecutionReply, WorkflowExecuteChildReply, WorkflowExecuteChildRequest,
    WorkflowExecuteReply, WorkflowExecuteRequest, WorkflowExecution, WorkflowExecutionRequest,
    WorkflowGetTimeReply, WorkflowInvokeRequest, WorkflowMutableRequest, WorkflowQueryInvokeRequest,
    WorkflowQueryRequest, WorkflowRegisterRequest, WorkflowSetCacheSizeRequest,
    WorkflowSetQueryHandlerRequest, WorkflowSignalChildRequest, WorkflowSignalInvokeRequest,
    WorkflowSignalRequest, WorkflowSignalSubscribeRequest, WorkflowSignalWithStartRequest,
    WorkflowSleepRequest, WorkflowTerminateRequest,
};

use super::upgrade;
use crate::context::{ChildContext, WorkflowContext};
use crate::engine::{
    EngineError, FunctionResult, Payload, SideEffectValue, WorkflowHandle, query_fn, workflow_fn,
};
use crate::error::{BridgeError, Result};
use crate::state::BridgeState;

// ============================================================================
// Registration
// ============================================================================

/// Register a workflow type with the engine.
///
/// Each time the engine runs the workflow, a new workflow context is created
/// and a `WorkflowInvokeRequest` asks the peer to run the workflow code. The
/// peer's reply becomes the workflow's result.
#[instrument(skip(state, request), fields(workflow = %request.name))]
pub async fn handle_register(
    state: &Arc<BridgeState>,
    request: WorkflowRegisterRequest,
) -> Result<()> {
    let engine = state.engine()?;
    let bridge = Arc::downgrade(state);
    let name = request.name.clone();

    engine.register_workflow(
        &request.name,
        workflow_fn(move |handle, args| run_workflow(bridge.clone(), name.clone(), handle, args)),
    )?;

    info!("Workflow registered");
    Ok(())
}

async fn run_workflow(
    bridge: Weak<BridgeState>,
    name: String,
    handle: Arc<dyn WorkflowHandle>,
    args: Payload,
) -> FunctionResult {
    let state = upgrade(&bridge)?;
    let info = handle.info();

    let context = Arc::new(WorkflowContext::new(name, handle, state.child_ids()));
    let cancel = context.cancel_token();
    let context_id = state.workflows.insert(context);

    debug!(context_id, workflow_id = %info.execution.id, "Invoking workflow");
    let request = WorkflowInvokeRequest {
        context_id,
        workflow_type: info.workflow_type,
        domain: info.domain,
        task_list: info.task_list,
        execution: info.execution,
        execution_start_to_close_timeout_ms: info
            .execution_start_to_close_timeout
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0),
        args,
    };

    state
        .invoke(
            MessageType::WorkflowInvokeRequest,
            &request,
            Some(context_id),
            Some(cancel),
        )
        .await
        .map_err(EngineError::from)
}

// ============================================================================
// Client-side calls
// ============================================================================

#[instrument(skip(state, request), fields(workflow = %request.workflow, domain = %request.domain))]
pub async fn handle_execute(
    state: &Arc<BridgeState>,
    request: WorkflowExecuteRequest,
) -> Result<WorkflowExecuteReply> {
    let engine = state.engine()?;
    let execution = state
        .engine_call(engine.execute_workflow(
            &request.domain,
            &request.workflow,
            request.args,
            &request.options,
        ))
        .await?;

    info!(workflow_id = %execution.id, run_id = %execution.run_id, "Workflow started");
    Ok(WorkflowExecuteReply { execution })
}

#[instrument(skip(state, request), fields(workflow_id = %request.workflow_id))]
pub async fn handle_cancel(state: &Arc<BridgeState>, request: WorkflowCancelRequest) -> Result<()> {
    let engine = state.engine()?;
    let execution = WorkflowExecution::new(request.workflow_id, request.run_id);
    state.engine_call(engine.cancel_workflow(&execution)).await?;
    Ok(())
}

#[instrument(skip(state, request), fields(workflow_id = %request.workflow_id))]
pub async fn handle_terminate(
    state: &Arc<BridgeState>,
    request: WorkflowTerminateRequest,
) -> Result<()> {
    let engine = state.engine()?;
    let execution = WorkflowExecution::new(request.workflow_id, request.run_id);
    state
        .engine_call(engine.terminate_workflow(&execution, &request.reason, request.details))
        .await?;
    info!(reason = %request.reason, "Workflow terminated");
    Ok(())
}

#[instrument(skip(state, request), fields(workflow_id = %request.workflow_id, signal = %request.signal_name))]
pub async fn handle_signal_with_start(
    state: &Arc<BridgeState>,
    request: WorkflowSignalWithStartRequest,
) -> Result<WorkflowExecuteReply> {
    let engine = state.engine()?;
    let execution = state
        .engine_call(engine.signal_with_start_workflow(&request))
        .await?;
    Ok(WorkflowExecuteReply { execution })
}

pub async fn handle_set_cache_size(
    state: &Arc<BridgeState>,
    request: WorkflowSetCacheSizeRequest,
) -> Result<()> {
    state.engine()?.set_sticky_cache_size(request.size);
    Ok(())
}

#[instrument(skip(state, request), fields(workflow_id = %request.workflow_id, query = %request.query_name))]
pub async fn handle_query(
    state: &Arc<BridgeState>,
    request: WorkflowQueryRequest,
) -> Result<ResultReply> {
    let engine = state.engine()?;
    let execution = WorkflowExecution::new(request.workflow_id, request.run_id);
    let result = state
        .engine_call(engine.query_workflow(&execution, &request.query_name, request.query_args))
        .await?;
    Ok(ResultReply::new(result))
}

#[instrument(skip(state, request), fields(workflow_id = %request.workflow_id))]
pub async fn handle_describe_execution(
    state: &Arc<BridgeState>,
    request: WorkflowExecutionRequest,
) -> Result<WorkflowDescribeExecutionReply> {
    let engine = state.engine()?;
    let execution = WorkflowExecution::new(request.workflow_id, request.run_id);
    let details = state
        .engine_call(engine.describe_workflow_execution(&execution))
        .await?;
    Ok(WorkflowDescribeExecutionReply { details })
}

#[instrument(skip(state, request), fields(workflow_id = %request.workflow_id))]
pub async fn handle_get_result(
    state: &Arc<BridgeState>,
    request: WorkflowExecutionRequest,
) -> Result<ResultReply> {
    let engine = state.engine()?;
    let execution = WorkflowExecution::new(request.workflow_id, request.run_id);
    let result = state
        .engine_call(engine.get_workflow_result(&execution))
        .await?;
    Ok(ResultReply::new(result))
}

#[instrument(skip(state, request), fields(workflow_id = %request.workflow_id, signal = %request.signal_name))]
pub async fn handle_signal(state: &Arc<BridgeState>, request: WorkflowSignalRequest) -> Result<()> {
    let engine = state.engine()?;
    let execution = WorkflowExecution::new(request.workflow_id, request.run_id);
    state
        .engine_call(engine.signal_workflow(&execution, &request.signal_name, request.signal_args))
        .await?;
    Ok(())
}

// ============================================================================
// Calls from workflow code
// ============================================================================

/// Record a mutable side effect and reply with the recorded value.
///
/// When the recorded value is an error, the reply carries that error.
#[instrument(skip(state, request), fields(context_id = request.context_id, mutable_id = %request.mutable_id))]
pub async fn handle_mutable(
    state: &Arc<BridgeState>,
    request: WorkflowMutableRequest,
) -> Result<ResultReply> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;

    let value = match request.error {
        Some(error) => SideEffectValue::Error(error),
        None => SideEffectValue::Bytes(request.result),
    };

    match context
        .handle()
        .mutable_side_effect(&request.mutable_id, value)
        .await?
    {
        SideEffectValue::Bytes(result) => Ok(ResultReply::new(result)),
        SideEffectValue::Error(error) => Err(BridgeError::Classified(error)),
    }
}

/// Forward every signal named in the request to the peer.
///
/// Replies as soon as the subscription is in place. Each received signal is
/// sent as a `WorkflowSignalInvokeRequest`; the next one is not sent before
/// the peer has replied to the previous one.
#[instrument(skip(state, request), fields(context_id = request.context_id, signal = %request.signal_name))]
pub async fn handle_signal_subscribe(
    state: &Arc<BridgeState>,
    request: WorkflowSignalSubscribeRequest,
) -> Result<()> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    let signals = context.handle().signal_channel(&request.signal_name);

    tokio::spawn(forward_signals(
        Arc::downgrade(state),
        request.context_id,
        request.signal_name,
        signals,
    ));
    Ok(())
}

async fn forward_signals(
    bridge: Weak<BridgeState>,
    context_id: i64,
    signal_name: String,
    mut signals: mpsc::UnboundedReceiver<Payload>,
) {
    while let Some(signal_args) = signals.recv().await {
        let Some(state) = bridge.upgrade() else {
            break;
        };
        let Some(context) = state.workflows.get(context_id) else {
            break;
        };

        let request = WorkflowSignalInvokeRequest {
            context_id,
            signal_name: signal_name.clone(),
            signal_args,
        };
        if let Err(e) = state
            .invoke(
                MessageType::WorkflowSignalInvokeRequest,
                &request,
                Some(context_id),
                Some(context.cancel_token()),
            )
            .await
        {
            warn!(context_id, signal = %signal_name, error = %e, "Signal invoke failed");
        }
    }
    debug!(context_id, signal = %signal_name, "Signal subscription closed");
}

pub async fn handle_has_last_result(
    state: &Arc<BridgeState>,
    request: ContextRequest,
) -> Result<HasResultReply> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    Ok(HasResultReply {
        has_result: context.handle().has_last_completion_result(),
    })
}

pub async fn handle_get_last_result(
    state: &Arc<BridgeState>,
    request: ContextRequest,
) -> Result<ResultReply> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    Ok(ResultReply::new(context.handle().last_completion_result()?))
}

/// Switch the context to a handle that ignores workflow cancellation.
#[instrument(skip(state, request), fields(context_id = request.context_id))]
pub async fn handle_disconnect_context(
    state: &Arc<BridgeState>,
    request: ContextRequest,
) -> Result<()> {
    state.engine()?;
    state.workflow(request.context_id)?.disconnect();
    debug!("Context disconnected");
    Ok(())
}

pub async fn handle_get_time(
    state: &Arc<BridgeState>,
    request: ContextRequest,
) -> Result<WorkflowGetTimeReply> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    Ok(WorkflowGetTimeReply {
        time: context.handle().now(),
    })
}

#[instrument(skip(state, request), fields(context_id = request.context_id, duration_ms = request.duration_ms))]
pub async fn handle_sleep(state: &Arc<BridgeState>, request: WorkflowSleepRequest) -> Result<()> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    context
        .handle()
        .sleep(
            Duration::from_millis(request.duration_ms),
            context.cancel_token(),
        )
        .await?;
    Ok(())
}

/// Start a child workflow and track it under the parent context.
#[instrument(skip(state, request), fields(context_id = request.context_id, workflow = %request.workflow))]
pub async fn handle_execute_child(
    state: &Arc<BridgeState>,
    request: WorkflowExecuteChildRequest,
) -> Result<WorkflowExecuteChildReply> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;

    let cancel = context.cancel_token().child_token();
    let child = context
        .handle()
        .start_child(&request.workflow, request.args, &request.options, cancel.clone())
        .await?;

    let execution = child.execution();
    let child_id = context.add_child(ChildContext::new(child, cancel));
    debug!(child_id, workflow_id = %execution.id, "Child workflow started");
    Ok(WorkflowExecuteChildReply {
        child_id,
        execution,
    })
}

/// Wait for a child to close; the child is released afterwards.
#[instrument(skip(state, request), fields(context_id = request.context_id, child_id = request.child_id))]
pub async fn handle_wait_for_child(
    state: &Arc<BridgeState>,
    request: ChildRequest,
) -> Result<ResultReply> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    let child = context
        .get_child(request.child_id)
        .ok_or(BridgeError::not_found("child workflow", request.child_id))?;

    let outcome = child.handle().result().await;
    context.remove_child(request.child_id);
    Ok(ResultReply::new(outcome?))
}

#[instrument(skip(state, request), fields(context_id = request.context_id, child_id = request.child_id))]
pub async fn handle_signal_child(
    state: &Arc<BridgeState>,
    request: WorkflowSignalChildRequest,
) -> Result<()> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    let child = context
        .get_child(request.child_id)
        .ok_or(BridgeError::not_found("child workflow", request.child_id))?;

    child
        .handle()
        .signal(&request.signal_name, request.signal_args)
        .await?;
    Ok(())
}

/// Cancel a child and release it.
#[instrument(skip(state, request), fields(context_id = request.context_id, child_id = request.child_id))]
pub async fn handle_cancel_child(state: &Arc<BridgeState>, request: ChildRequest) -> Result<()> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    let child = context
        .remove_child(request.child_id)
        .ok_or(BridgeError::not_found("child workflow", request.child_id))?;

    child.cancel();
    debug!("Child workflow cancel requested");
    Ok(())
}

/// Answer queries for `query_name` by asking the peer.
#[instrument(skip(state, request), fields(context_id = request.context_id, query = %request.query_name))]
pub async fn handle_set_query_handler(
    state: &Arc<BridgeState>,
    request: WorkflowSetQueryHandlerRequest,
) -> Result<()> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;

    let bridge = Arc::downgrade(state);
    let context_id = request.context_id;
    let query_name = request.query_name.clone();
    let handler = query_fn(move |args| invoke_query(bridge.clone(), context_id, query_name.clone(), args));

    context
        .handle()
        .set_query_handler(&request.query_name, handler)?;
    Ok(())
}

async fn invoke_query(
    bridge: Weak<BridgeState>,
    context_id: i64,
    query_name: String,
    query_args: Payload,
) -> FunctionResult {
    let state = upgrade(&bridge)?;
    let cancel = state.workflow(context_id).ok().map(|c| c.cancel_token());
    let request = WorkflowQueryInvokeRequest {
        context_id,
        query_name,
        query_args,
    };
    state
        .invoke(
            MessageType::WorkflowQueryInvokeRequest,
            &request,
            Some(context_id),
            cancel,
        )
        .await
        .map_err(EngineError::from)
}
