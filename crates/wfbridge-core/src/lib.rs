// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wfbridge Core - Correlation and Context Lifecycle
//!
//! This crate lets a workflow client running in another process (the peer)
//! drive workflows and activities executing inside a workflow engine. It
//! routes the peer's requests to the engine, and forwards the engine's calls
//! into workflow and activity code back to the peer as invokes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Peer process                               │
//! │                (workflow/activity code, client library)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//!            │ requests, invoke replies              ▲ replies, invokes
//!            │ (HTTP PUT /)                          │ (Gateway)
//!            ▼                                       │
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          wfbridge-core (this crate)                     │
//! │                                                                         │
//! │   server ──► dispatcher ──► handlers ──► reply builder ──► gateway      │
//! │                  │              │                                       │
//! │                  │ fulfill      │ register / lookup                     │
//! │                  ▼              ▼                                       │
//! │          operation table    registries (workflow, activity, child,      │
//! │          (request id →      worker contexts)                            │
//! │           pending reply)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Workflow engine (engine::Engine traits)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invokes and Correlation
//!
//! When the engine runs a registered workflow or activity, the bridge creates
//! an execution context, registers an operation under a fresh request id, and
//! sends an invoke to the peer. The engine-side function stays suspended on
//! the operation until the peer's invoke reply arrives with the same request
//! id, or until the operation is canceled or times out.
//!
//! | Invoke | Sent when | Reply resolves |
//! |--------|-----------|----------------|
//! | `WorkflowInvokeRequest` | the engine runs a registered workflow | the workflow result |
//! | `WorkflowSignalInvokeRequest` | a subscribed signal arrives | signal delivery |
//! | `WorkflowQueryInvokeRequest` | the engine answers a query | the query result |
//! | `ActivityInvokeRequest` | the engine runs a registered activity | the activity result |
//! | `ActivityStoppingRequest` | the activity's worker is stopping | acknowledgement |
//! | `ActivityInvokeLocalRequest` | a local activity runs | the local activity result |
//!
//! # Error Kinds
//!
//! Every handler failure reaches the peer as a classified error:
//!
//! | Kind | Raised for |
//! |------|------------|
//! | `connection` | no engine session, or connecting failed |
//! | `entity_not_exists` | unknown context, child, worker, or engine entity |
//! | `custom` | application failures (the default) |
//! | `cancelled` | canceled operations and workflows |
//! | `timeout` | engine call or operation timeouts |
//! | `terminated` | terminated workflows |
//! | `panic` | workflow or activity code panicked |
//! | `unknown_external` | signalling a workflow that is gone |
//! | `generic` | undecodable payloads and transport failures |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `WFBRIDGE_LISTEN_ADDR` | No | `127.0.0.1:5000` | Inbound HTTP listener |
//! | `WFBRIDGE_PEER_URL` | No | - | Peer endpoint (else set by `InitializeRequest`) |
//! | `WFBRIDGE_CLIENT_TIMEOUT_MS` | No | `30000` | Engine call timeout |
//! | `WFBRIDGE_OPERATION_TIMEOUT_MS` | No | `86400000` | Peer reply timeout |
//! | `WFBRIDGE_GATEWAY_TIMEOUT_MS` | No | `10000` | Outbound send timeout |
//!
//! # Modules
//!
//! - [`ids`], [`registry`], [`context`]: id generators and context registries
//! - [`operations`]: the correlation table
//! - [`engine`]: engine boundary traits and the in-process engine
//! - [`handlers`], [`dispatcher`], [`reply`]: request handling
//! - [`state`]: per-bridge shared state
//! - `server`, `runtime`: HTTP listener and embeddable runtime (feature `server`)

/// Server configuration loaded from environment variables.
pub mod config;

/// Workflow, activity and child execution contexts.
pub mod context;

/// Inbound message routing.
pub mod dispatcher;

/// Engine boundary traits and the in-process engine.
pub mod engine;

/// Error types with classified error mapping.
pub mod error;

/// Request handlers (client, workflow, activity, invoke replies).
pub mod handlers;

/// Process-unique id generators.
pub mod ids;

/// Correlation of outbound requests with their replies.
pub mod operations;

/// Id-keyed context registries.
pub mod registry;

/// Reply envelope construction.
pub mod reply;

/// Shared state of one bridge instance.
pub mod state;

/// HTTP listener for inbound messages.
#[cfg(feature = "server")]
pub mod server;

/// Embeddable runtime.
#[cfg(feature = "server")]
pub mod runtime;

pub use error::{BridgeError, DispatchError};
pub use state::BridgeState;
