// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replies from the peer to invokes sent by the bridge.

use tracing::{debug, instrument};

use wfbridge_protocol::payloads::InvokeReply;
use wfbridge_protocol::{ClassifiedError, ProxyMessage};

use crate::operations::OperationResult;
use crate::state::BridgeState;

/// Fulfill the operation `reply` answers.
///
/// The outcome is the reply's error if it carries one, otherwise the result
/// bytes from its payload. Returns false if no operation was waiting.
#[instrument(skip(state, reply), fields(request_id = reply.request_id))]
pub fn handle_invoke_reply(state: &BridgeState, reply: &ProxyMessage) -> bool {
    let outcome: OperationResult = match &reply.error {
        Some(error) => Err(error.clone()),
        None => match reply.decode_payload::<InvokeReply>() {
            Ok(payload) => Ok(payload.result),
            Err(e) => Err(ClassifiedError::generic(e.to_string())),
        },
    };

    debug!(failed = outcome.is_err(), "invoke reply received");
    state.operations.fulfill(reply.request_id, outcome)
}
