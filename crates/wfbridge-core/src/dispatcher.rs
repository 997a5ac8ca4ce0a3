// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Routes inbound messages to their handlers.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument};

use wfbridge_protocol::{MessageType, ProtocolError, ProxyMessage};

use crate::error::{BridgeError, DispatchError};
use crate::handlers::{activity, client, invoke, workflow};
use crate::reply::build_reply;
use crate::state::BridgeState;

/// Handle one inbound message.
///
/// Invoke replies fulfill their operation and produce nothing. Any other
/// request is routed to its handler; the reply is sent to the peer and
/// returned. A handler failure is part of the reply, never an `Err`.
#[instrument(skip(state, message), fields(request_id = message.request_id, type_code = message.type_code))]
pub async fn dispatch(
    state: &Arc<BridgeState>,
    message: ProxyMessage,
) -> Result<Option<ProxyMessage>, DispatchError> {
    let message_type = MessageType::try_from(message.type_code)
        .map_err(|_| DispatchError::UnrecognizedMessageType(message.type_code))?;

    if message_type.is_operation_reply() {
        invoke::handle_invoke_reply(state, &message);
        return Ok(None);
    }

    if !is_inbound_request(message_type) {
        return Err(DispatchError::UnrecognizedMessageType(message.type_code));
    }

    let reply = if requires_session(message_type) && !state.is_connected() {
        build_reply::<()>(&message, Err(BridgeError::NotConnected))?
    } else {
        route(state, message_type, &message).await?
    };

    debug!(reply_type = %message_type.reply_type().unwrap_or(MessageType::Unspecified), failed = reply.error.is_some(), "Sending reply");
    let sent = state.gateway().send(&reply).await;

    if message_type == MessageType::TerminateRequest {
        info!("Shutting down after terminate");
        state.shutdown();
    }

    if let Err(e) = sent {
        error!(error = %e, "Failed to deliver reply");
        return Err(e.into());
    }
    Ok(Some(reply))
}

/// Requests the peer may send to the bridge.
fn is_inbound_request(message_type: MessageType) -> bool {
    message_type.is_request()
        && !matches!(
            message_type,
            MessageType::WorkflowInvokeRequest
                | MessageType::WorkflowSignalInvokeRequest
                | MessageType::WorkflowQueryInvokeRequest
                | MessageType::ActivityInvokeRequest
                | MessageType::ActivityStoppingRequest
                | MessageType::ActivityInvokeLocalRequest
        )
}

/// Everything but session setup and liveness needs an engine session.
fn requires_session(message_type: MessageType) -> bool {
    !matches!(
        message_type,
        MessageType::InitializeRequest
            | MessageType::ConnectRequest
            | MessageType::HeartbeatRequest
            | MessageType::PingRequest
            | MessageType::CancelRequest
            | MessageType::TerminateRequest
    )
}

async fn route(
    state: &Arc<BridgeState>,
    message_type: MessageType,
    message: &ProxyMessage,
) -> Result<ProxyMessage, DispatchError> {
    use MessageType as T;

    let reply = match message_type {
        // Client
        T::InitializeRequest => run(message, |r| client::handle_initialize(state, r)).await,
        T::ConnectRequest => run(message, |r| client::handle_connect(state, r)).await,
        T::TerminateRequest => run(message, |r| client::handle_terminate(state, r)).await,
        T::DomainRegisterRequest => {
            run(message, |r| client::handle_domain_register(state, r)).await
        }
        T::DomainDescribeRequest => {
            run(message, |r| client::handle_domain_describe(state, r)).await
        }
        T::DomainUpdateRequest => run(message, |r| client::handle_domain_update(state, r)).await,
        T::HeartbeatRequest => run(message, |r| client::handle_heartbeat(state, r)).await,
        T::CancelRequest => run(message, |r| client::handle_cancel(state, r)).await,
        T::NewWorkerRequest => run(message, |r| client::handle_new_worker(state, r)).await,
        T::StopWorkerRequest => run(message, |r| client::handle_stop_worker(state, r)).await,
        T::PingRequest => run(message, |r| client::handle_ping(state, r)).await,

        // Workflow
        T::WorkflowRegisterRequest => run(message, |r| workflow::handle_register(state, r)).await,
        T::WorkflowExecuteRequest => run(message, |r| workflow::handle_execute(state, r)).await,
        T::WorkflowCancelRequest => run(message, |r| workflow::handle_cancel(state, r)).await,
        T::WorkflowTerminateRequest => {
            run(message, |r| workflow::handle_terminate(state, r)).await
        }
        T::WorkflowSignalWithStartRequest => {
            run(message, |r| workflow::handle_signal_with_start(state, r)).await
        }
        T::WorkflowSetCacheSizeRequest => {
            run(message, |r| workflow::handle_set_cache_size(state, r)).await
        }
        T::WorkflowQueryRequest => run(message, |r| workflow::handle_query(state, r)).await,
        T::WorkflowMutableRequest => run(message, |r| workflow::handle_mutable(state, r)).await,
        T::WorkflowDescribeExecutionRequest => {
            run(message, |r| workflow::handle_describe_execution(state, r)).await
        }
        T::WorkflowGetResultRequest => {
            run(message, |r| workflow::handle_get_result(state, r)).await
        }
        T::WorkflowSignalSubscribeRequest => {
            run(message, |r| workflow::handle_signal_subscribe(state, r)).await
        }
        T::WorkflowSignalRequest => run(message, |r| workflow::handle_signal(state, r)).await,
        T::WorkflowHasLastResultRequest => {
            run(message, |r| workflow::handle_has_last_result(state, r)).await
        }
        T::WorkflowGetLastResultRequest => {
            run(message, |r| workflow::handle_get_last_result(state, r)).await
        }
        T::WorkflowDisconnectContextRequest => {
            run(message, |r| workflow::handle_disconnect_context(state, r)).await
        }
        T::WorkflowGetTimeRequest => run(message, |r| workflow::handle_get_time(state, r)).await,
        T::WorkflowSleepRequest => run(message, |r| workflow::handle_sleep(state, r)).await,
        T::WorkflowExecuteChildRequest => {
            run(message, |r| workflow::handle_execute_child(state, r)).await
        }
        T::WorkflowWaitForChildRequest => {
            run(message, |r| workflow::handle_wait_for_child(state, r)).await
        }
        T::WorkflowSignalChildRequest => {
            run(message, |r| workflow::handle_signal_child(state, r)).await
        }
        T::WorkflowCancelChildRequest => {
            run(message, |r| workflow::handle_cancel_child(state, r)).await
        }
        T::WorkflowSetQueryHandlerRequest => {
            run(message, |r| workflow::handle_set_query_handler(state, r)).await
        }

        // Activity
        T::ActivityRegisterRequest => run(message, |r| activity::handle_register(state, r)).await,
        T::ActivityExecuteRequest => run(message, |r| activity::handle_execute(state, r)).await,
        T::ActivityExecuteLocalRequest => {
            run(message, |r| activity::handle_execute_local(state, r)).await
        }
        T::ActivityCompleteRequest => run(message, |r| activity::handle_complete(state, r)).await,
        T::ActivityRecordHeartbeatRequest => {
            run(message, |r| activity::handle_record_heartbeat(state, r)).await
        }
        T::ActivityHasHeartbeatDetailsRequest => {
            run(message, |r| activity::handle_has_heartbeat_details(state, r)).await
        }
        T::ActivityGetHeartbeatDetailsRequest => {
            run(message, |r| activity::handle_get_heartbeat_details(state, r)).await
        }
        T::ActivityGetInfoRequest => run(message, |r| activity::handle_get_info(state, r)).await,

        other => return Err(DispatchError::UnrecognizedMessageType(other.code())),
    };

    Ok(reply?)
}

/// Decode the request payload, run `handler` and build the reply.
///
/// A payload that does not decode is answered with a generic error.
async fn run<Req, Resp, F, Fut>(message: &ProxyMessage, handler: F) -> Result<ProxyMessage, ProtocolError>
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Result<Resp, BridgeError>>,
{
    let result = match message.decode_payload::<Req>() {
        Ok(request) => handler(request).await,
        Err(e) => Err(BridgeError::Protocol(e)),
    };
    build_reply(message, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_free_requests() {
        for message_type in [
            MessageType::InitializeRequest,
            MessageType::ConnectRequest,
            MessageType::HeartbeatRequest,
            MessageType::PingRequest,
            MessageType::CancelRequest,
            MessageType::TerminateRequest,
        ] {
            assert!(!requires_session(message_type), "{}", message_type);
        }
        assert!(requires_session(MessageType::WorkflowSleepRequest));
        assert!(requires_session(MessageType::ActivityGetInfoRequest));
    }

    #[test]
    fn test_outbound_requests_are_not_inbound() {
        assert!(is_inbound_request(MessageType::WorkflowExecuteRequest));
        assert!(!is_inbound_request(MessageType::WorkflowInvokeRequest));
        assert!(!is_inbound_request(MessageType::ActivityStoppingRequest));
        assert!(!is_inbound_request(MessageType::PingReply));
        assert!(!is_inbound_request(MessageType::Unspecified));
    }
}
