// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client handlers: session setup, liveness, domains and workers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use wfbridge_protocol::payloads::{
    CancelReply, CancelRequest, ConnectRequest, DomainDescribeReply, DomainDescribeRequest,
    DomainRegisterRequest, DomainUpdateRequest, Empty, InitializeRequest, NewWorkerReply,
    NewWorkerRequest, StopWorkerRequest,
};

use crate::error::{BridgeError, Result};
use crate::state::BridgeState;

// ============================================================================
// Session
// ============================================================================

/// Point the outbound gateway at the peer's listener.
#[instrument(skip(state, request), fields(endpoint = %request.endpoint()))]
pub async fn handle_initialize(state: &Arc<BridgeState>, request: InitializeRequest) -> Result<()> {
    state.gateway().set_endpoint(request.endpoint()).await?;
    info!("Peer endpoint set");
    Ok(())
}

/// Open an engine session.
///
/// A non-zero `client_timeout_ms` replaces the configured engine call
/// timeout. Any failure to reach the engine is reported as a connection
/// error.
#[instrument(skip(state, request), fields(endpoints = %request.endpoints))]
pub async fn handle_connect(state: &Arc<BridgeState>, request: ConnectRequest) -> Result<()> {
    if request.client_timeout_ms > 0 {
        state.set_client_timeout(Duration::from_millis(request.client_timeout_ms));
    }

    let engine = state
        .engine_call(state.connector().connect(&request))
        .await
        .map_err(|e| BridgeError::Connection(e.to_string()))?;

    state.set_engine(engine);
    info!(identity = %request.identity, "Connected to workflow engine");
    Ok(())
}

pub async fn handle_heartbeat(_state: &Arc<BridgeState>, _request: Empty) -> Result<()> {
    debug!("Heartbeat");
    Ok(())
}

pub async fn handle_ping(_state: &Arc<BridgeState>, _request: Empty) -> Result<()> {
    Ok(())
}

/// Cancel an outstanding operation; its waiter resolves as canceled.
#[instrument(skip(state, request), fields(target_request_id = request.target_request_id))]
pub async fn handle_cancel(state: &Arc<BridgeState>, request: CancelRequest) -> Result<CancelReply> {
    let was_cancelled = state.operations.cancel(request.target_request_id);
    debug!(was_cancelled, "Cancel requested");
    Ok(CancelReply { was_cancelled })
}

/// Acknowledge a terminate request. The dispatcher shuts the bridge down
/// once the reply is on its way.
#[instrument(skip_all)]
pub async fn handle_terminate(_state: &Arc<BridgeState>, _request: Empty) -> Result<()> {
    info!("Terminate requested by peer");
    Ok(())
}

// ============================================================================
// Domains
// ============================================================================

#[instrument(skip(state, request), fields(domain = %request.name))]
pub async fn handle_domain_register(
    state: &Arc<BridgeState>,
    request: DomainRegisterRequest,
) -> Result<()> {
    let engine = state.engine()?;
    state.engine_call(engine.register_domain(&request)).await?;
    info!("Domain registered");
    Ok(())
}

#[instrument(skip(state, request), fields(domain = %request.name))]
pub async fn handle_domain_describe(
    state: &Arc<BridgeState>,
    request: DomainDescribeRequest,
) -> Result<DomainDescribeReply> {
    let engine = state.engine()?;
    let domain = state
        .engine_call(engine.describe_domain(&request.name))
        .await?;
    Ok(DomainDescribeReply { domain })
}

#[instrument(skip(state, request), fields(domain = %request.name))]
pub async fn handle_domain_update(
    state: &Arc<BridgeState>,
    request: DomainUpdateRequest,
) -> Result<()> {
    let engine = state.engine()?;
    state.engine_call(engine.update_domain(&request)).await?;
    Ok(())
}

// ============================================================================
// Workers
// ============================================================================

/// Start a worker and track it under a fresh worker id.
#[instrument(skip(state, request), fields(domain = %request.domain, task_list = %request.task_list))]
pub async fn handle_new_worker(
    state: &Arc<BridgeState>,
    request: NewWorkerRequest,
) -> Result<NewWorkerReply> {
    let engine = state.engine()?;
    let worker = state
        .engine_call(engine.start_worker(&request.domain, &request.task_list, &request.options))
        .await?;

    let worker_id = state.workers.insert(worker);
    info!(worker_id, "Worker started");
    Ok(NewWorkerReply { worker_id })
}

/// Stop and forget a worker.
#[instrument(skip(state, request), fields(worker_id = request.worker_id))]
pub async fn handle_stop_worker(state: &Arc<BridgeState>, request: StopWorkerRequest) -> Result<()> {
    state.engine()?;
    let worker = state
        .workers
        .remove(request.worker_id)
        .ok_or(BridgeError::not_found("worker", request.worker_id))?;

    worker.stop().await;
    info!("Worker stopped");
    Ok(())
}
