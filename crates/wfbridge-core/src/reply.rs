// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Building reply envelopes from handler results.

use serde::Serialize;
use tracing::warn;

use wfbridge_protocol::{ClassifiedError, ProtocolError, ProxyMessage};

use crate::error::BridgeError;

/// Build the reply to `request` from a handler result.
///
/// The reply has the request's paired reply type and echoes its request id.
/// On success the value becomes the payload; on failure the error is
/// classified and attached. A payload that cannot be serialized is reported
/// as a generic error rather than dropped.
pub fn build_reply<T: Serialize>(
    request: &ProxyMessage,
    result: Result<T, BridgeError>,
) -> Result<ProxyMessage, ProtocolError> {
    let mut reply = request.reply()?;

    match result {
        Ok(value) => match serde_json::to_value(&value) {
            Ok(payload) => reply.payload = payload,
            Err(e) => {
                warn!(request_id = request.request_id, error = %e, "reply payload not serializable");
                reply.error = Some(ClassifiedError::generic(format!(
                    "reply payload not serializable: {}",
                    e
                )));
            }
        },
        Err(e) => reply.error = Some(e.to_classified()),
    }

    Ok(reply)
}
