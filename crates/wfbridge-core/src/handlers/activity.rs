// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity handlers.

use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use wfbridge_protocol::MessageType;
use wfbridge_protocol::payloads::{
    ActivityCompleteRequest, ActivityContextRequest, ActivityExecuteLocalRequest,
    ActivityExecuteRequest, ActivityGetInfoReply, ActivityInvokeLocalRequest,
    ActivityInvokeRequest, ActivityRecordHeartbeatRequest, ActivityRegisterRequest,
    ActivityStoppingRequest, HasHeartbeatDetailsReply, ResultReply,
};

use super::upgrade;
use crate::context::ActivityContext;
use crate::engine::{ActivityHandle, EngineError, FunctionResult, Payload, activity_fn};
use crate::error::Result;
use crate::state::BridgeState;

/// Register an activity type with the engine.
///
/// Each run creates an activity context and sends an `ActivityInvokeRequest`
/// to the peer. If the worker running the activity starts stopping before the
/// peer replies, an `ActivityStoppingRequest` is sent as well.
#[instrument(skip(state, request), fields(activity = %request.name))]
pub async fn handle_register(
    state: &Arc<BridgeState>,
    request: ActivityRegisterRequest,
) -> Result<()> {
    let engine = state.engine()?;
    let bridge = Arc::downgrade(state);
    let name = request.name.clone();

    engine.register_activity(
        &request.name,
        activity_fn(move |handle, args| run_activity(bridge.clone(), name.clone(), handle, args)),
    )?;

    info!("Activity registered");
    Ok(())
}

async fn run_activity(
    bridge: Weak<BridgeState>,
    name: String,
    handle: Arc<dyn ActivityHandle>,
    args: Payload,
) -> FunctionResult {
    let state = upgrade(&bridge)?;
    let worker_stop = handle.worker_stop();
    let activity_id = handle.info().activity_id;
    let context_id = state
        .activities
        .insert(ActivityContext::new(name.clone(), handle));

    let done = CancellationToken::new();
    tokio::spawn(notify_stopping(
        state.clone(),
        context_id,
        activity_id,
        worker_stop,
        done.clone(),
    ));

    debug!(context_id, activity = %name, "Invoking activity");
    let request = ActivityInvokeRequest {
        context_id,
        activity: name,
        args,
    };
    let outcome = state
        .invoke(
            MessageType::ActivityInvokeRequest,
            &request,
            Some(context_id),
            None,
        )
        .await;

    done.cancel();
    outcome.map_err(EngineError::from)
}

/// Tell the peer its activity's worker is stopping, unless the activity
/// finishes first.
async fn notify_stopping(
    state: Arc<BridgeState>,
    context_id: i64,
    activity_id: String,
    worker_stop: CancellationToken,
    done: CancellationToken,
) {
    tokio::select! {
        _ = worker_stop.cancelled() => {}
        _ = done.cancelled() => return,
    }

    debug!(context_id, "Worker stopping, notifying peer");
    let request = ActivityStoppingRequest {
        context_id,
        activity_id,
    };
    if let Err(e) = state
        .invoke(
            MessageType::ActivityStoppingRequest,
            &request,
            Some(context_id),
            None,
        )
        .await
    {
        warn!(context_id, error = %e, "Activity stopping notification failed");
    }
}

/// Schedule an activity from workflow code and wait for its result.
#[instrument(skip(state, request), fields(context_id = request.context_id, activity = %request.activity))]
pub async fn handle_execute(
    state: &Arc<BridgeState>,
    request: ActivityExecuteRequest,
) -> Result<ResultReply> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;
    let result = context
        .handle()
        .execute_activity(
            &request.activity,
            request.args,
            &request.options,
            context.cancel_token(),
        )
        .await?;
    Ok(ResultReply::new(result))
}

/// Run a local activity whose code lives in the peer.
///
/// A zero schedule-to-close timeout falls back to the engine call timeout.
#[instrument(skip(state, request), fields(context_id = request.context_id, activity_type_id = request.activity_type_id))]
pub async fn handle_execute_local(
    state: &Arc<BridgeState>,
    request: ActivityExecuteLocalRequest,
) -> Result<ResultReply> {
    state.engine()?;
    let context = state.workflow(request.context_id)?;

    let mut options = request.options;
    if options.schedule_to_close_timeout_ms == 0 {
        options.schedule_to_close_timeout_ms = state.client_timeout().as_millis() as u64;
    }

    let bridge = Arc::downgrade(state);
    let context_id = request.context_id;
    let activity_type_id = request.activity_type_id;
    let function = activity_fn(move |handle, args| {
        invoke_local(bridge.clone(), context_id, activity_type_id, handle, args)
    });

    let result = context
        .handle()
        .execute_local_activity(function, request.args, &options, context.cancel_token())
        .await?;
    Ok(ResultReply::new(result))
}

async fn invoke_local(
    bridge: Weak<BridgeState>,
    context_id: i64,
    activity_type_id: i64,
    handle: Arc<dyn ActivityHandle>,
    args: Payload,
) -> FunctionResult {
    let state = upgrade(&bridge)?;
    let activity_context_id = state.activities.insert(ActivityContext::new(
        format!("local:{}", activity_type_id),
        handle,
    ));

    let request = ActivityInvokeLocalRequest {
        context_id,
        activity_context_id,
        activity_type_id,
        args,
    };
    state
        .invoke(
            MessageType::ActivityInvokeLocalRequest,
            &request,
            Some(activity_context_id),
            None,
        )
        .await
        .map_err(EngineError::from)
}

/// Complete an activity by task token.
#[instrument(skip_all)]
pub async fn handle_complete(
    state: &Arc<BridgeState>,
    request: ActivityCompleteRequest,
) -> Result<()> {
    let engine = state.engine()?;
    state
        .engine_call(engine.complete_activity(&request.task_token, request.result, request.error))
        .await?;
    Ok(())
}

#[instrument(skip(state, request), fields(context_id = request.context_id))]
pub async fn handle_record_heartbeat(
    state: &Arc<BridgeState>,
    request: ActivityRecordHeartbeatRequest,
) -> Result<()> {
    state.engine()?;
    let context = state.activity(request.context_id)?;
    context.handle().record_heartbeat(request.details)?;
    Ok(())
}

pub async fn handle_has_heartbeat_details(
    state: &Arc<BridgeState>,
    request: ActivityContextRequest,
) -> Result<HasHeartbeatDetailsReply> {
    state.engine()?;
    let context = state.activity(request.context_id)?;
    Ok(HasHeartbeatDetailsReply {
        has_details: context.handle().has_heartbeat_details(),
    })
}

pub async fn handle_get_heartbeat_details(
    state: &Arc<BridgeState>,
    request: ActivityContextRequest,
) -> Result<ResultReply> {
    state.engine()?;
    let context = state.activity(request.context_id)?;
    Ok(ResultReply::new(context.handle().heartbeat_details()?))
}

pub async fn handle_get_info(
    state: &Arc<BridgeState>,
    request: ActivityContextRequest,
) -> Result<ActivityGetInfoReply> {
    state.engine()?;
    let context = state.activity(request.context_id)?;
    Ok(ActivityGetInfoReply {
        info: context.handle().info(),
    })
}
