// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request handlers for wfbridge-core.
//!
//! One async function per inbound request type. Handlers return a typed reply
//! payload or a [`BridgeError`](crate::error::BridgeError); the dispatcher turns
//! either into the reply envelope.
//!
//! Functions registered with the engine (workflow and activity bodies, query
//! handlers, local activities) hold only a weak reference to the bridge state,
//! so the engine never keeps a stopped bridge alive.

pub mod activity;
pub mod client;
pub mod invoke;
pub mod workflow;

use std::sync::{Arc, Weak};

use crate::engine::EngineError;
use crate::state::BridgeState;

/// Upgrade a registered function's reference to the bridge.
fn upgrade(bridge: &Weak<BridgeState>) -> Result<Arc<BridgeState>, EngineError> {
    bridge
        .upgrade()
        .ok_or_else(|| EngineError::Other("bridge has shut down".to_string()))
}
