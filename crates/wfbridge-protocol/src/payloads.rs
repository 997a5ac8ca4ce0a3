// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed request and reply payloads.
//!
//! Binary fields (workflow arguments, results, heartbeat details) travel as
//! base64 strings. Durations travel as milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClassifiedError;

/// Serde adapter for `Vec<u8>` fields encoded as base64 strings.
pub mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<Vec<u8>>` fields encoded as base64 strings.
pub mod base64_bytes_opt {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Shared types
// ============================================================================

/// Identifies one run of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    #[serde(default)]
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            run_id: run_id.into(),
        }
    }
}

/// Options for starting a top-level workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartWorkflowOptions {
    pub id: Option<String>,
    pub task_list: String,
    pub execution_start_to_close_timeout_ms: u64,
    pub decision_task_start_to_close_timeout_ms: u64,
}

/// Options for starting a child workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildWorkflowOptions {
    pub domain: Option<String>,
    pub workflow_id: Option<String>,
    pub task_list: Option<String>,
    pub execution_start_to_close_timeout_ms: u64,
    pub task_start_to_close_timeout_ms: u64,
}

/// Options for scheduling an activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityOptions {
    pub task_list: Option<String>,
    pub schedule_to_close_timeout_ms: u64,
    pub schedule_to_start_timeout_ms: u64,
    pub start_to_close_timeout_ms: u64,
    pub heartbeat_timeout_ms: u64,
}

/// Options for scheduling a local activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalActivityOptions {
    pub schedule_to_close_timeout_ms: u64,
}

/// Options for starting a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    pub identity: Option<String>,
    pub max_concurrent_activity_executions: usize,
    pub max_concurrent_workflow_executions: usize,
    pub disable_workflow_worker: bool,
    pub disable_activity_worker: bool,
}

/// Domain metadata as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainDescription {
    pub name: String,
    pub description: String,
    pub owner_email: String,
    pub status: String,
    pub emit_metrics: bool,
    pub retention_days: i32,
}

/// Status and timing of a workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionDescription {
    pub execution: WorkflowExecution,
    pub workflow_type: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history_length: i64,
}

/// Information about a running activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityInfo {
    #[serde(with = "base64_bytes")]
    pub task_token: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub activity_id: String,
    pub activity_type: String,
    pub task_list: String,
    pub attempt: i32,
    pub deadline: Option<DateTime<Utc>>,
}

// ============================================================================
// Generic replies
// ============================================================================

/// Reply carrying an optional encoded result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultReply {
    #[serde(default, with = "base64_bytes_opt")]
    pub result: Option<Vec<u8>>,
}

impl ResultReply {
    pub fn new(result: Option<Vec<u8>>) -> Self {
        Self { result }
    }
}

/// Payload of an operation reply sent back by the peer.
pub type InvokeReply = ResultReply;

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializeRequest {
    pub library_address: String,
    pub library_port: u16,
}

impl InitializeRequest {
    /// Endpoint the outbound gateway delivers messages to.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/", self.library_address, self.library_port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectRequest {
    pub endpoints: String,
    pub identity: String,
    pub domain: Option<String>,
    /// Zero keeps the configured client timeout.
    pub client_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainRegisterRequest {
    pub name: String,
    pub description: String,
    pub owner_email: String,
    pub emit_metrics: bool,
    pub retention_days: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainDescribeRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainDescribeReply {
    pub domain: DomainDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainUpdateRequest {
    pub name: String,
    pub description: Option<String>,
    pub owner_email: Option<String>,
    pub emit_metrics: Option<bool>,
    pub retention_days: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub target_request_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelReply {
    pub was_cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewWorkerRequest {
    pub domain: String,
    pub task_list: String,
    #[serde(default)]
    pub options: WorkerOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewWorkerReply {
    pub worker_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopWorkerRequest {
    pub worker_id: i64,
}

/// Payload for requests that carry no fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Empty {}

// ============================================================================
// Workflow
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRegisterRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecuteRequest {
    pub domain: String,
    pub workflow: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub args: Option<Vec<u8>>,
    #[serde(default)]
    pub options: StartWorkflowOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecuteReply {
    pub execution: WorkflowExecution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCancelRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTerminateRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub details: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSignalWithStartRequest {
    pub domain: String,
    pub workflow: String,
    pub workflow_id: String,
    pub signal_name: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub signal_args: Option<Vec<u8>>,
    #[serde(default, with = "base64_bytes_opt")]
    pub workflow_args: Option<Vec<u8>>,
    #[serde(default)]
    pub options: StartWorkflowOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSetCacheSizeRequest {
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowQueryRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
    pub query_name: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub query_args: Option<Vec<u8>>,
}

/// Records a side effect whose value may change between replays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMutableRequest {
    pub context_id: i64,
    pub mutable_id: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub result: Option<Vec<u8>>,
    /// When set, the recorded value is this error instead of `result`.
    #[serde(default)]
    pub error: Option<ClassifiedError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
}

pub type WorkflowDescribeExecutionRequest = WorkflowExecutionRequest;
pub type WorkflowGetResultRequest = WorkflowExecutionRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescribeExecutionReply {
    pub details: WorkflowExecutionDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSignalSubscribeRequest {
    pub context_id: i64,
    pub signal_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSignalRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
    pub signal_name: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub signal_args: Option<Vec<u8>>,
}

/// Payload for workflow requests that only address a context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextRequest {
    pub context_id: i64,
}

pub type WorkflowHasLastResultRequest = ContextRequest;
pub type WorkflowGetLastResultRequest = ContextRequest;
pub type WorkflowDisconnectContextRequest = ContextRequest;
pub type WorkflowGetTimeRequest = ContextRequest;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HasResultReply {
    pub has_result: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGetTimeReply {
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSleepRequest {
    pub context_id: i64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecuteChildRequest {
    pub context_id: i64,
    pub workflow: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub args: Option<Vec<u8>>,
    #[serde(default)]
    pub options: ChildWorkflowOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecuteChildReply {
    pub child_id: i64,
    pub execution: WorkflowExecution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildRequest {
    pub context_id: i64,
    pub child_id: i64,
}

pub type WorkflowWaitForChildRequest = ChildRequest;
pub type WorkflowCancelChildRequest = ChildRequest;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSignalChildRequest {
    pub context_id: i64,
    pub child_id: i64,
    pub signal_name: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub signal_args: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSetQueryHandlerRequest {
    pub context_id: i64,
    pub query_name: String,
}

// ----------------------------------------------------------------------------
// Outbound workflow invokes
// ----------------------------------------------------------------------------

/// Asks the peer to run workflow code for a new workflow context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInvokeRequest {
    pub context_id: i64,
    pub workflow_type: String,
    pub domain: String,
    pub task_list: String,
    pub execution: WorkflowExecution,
    pub execution_start_to_close_timeout_ms: u64,
    #[serde(default, with = "base64_bytes_opt")]
    pub args: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSignalInvokeRequest {
    pub context_id: i64,
    pub signal_name: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub signal_args: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowQueryInvokeRequest {
    pub context_id: i64,
    pub query_name: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub query_args: Option<Vec<u8>>,
}

// ============================================================================
// Activity
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRegisterRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityExecuteRequest {
    /// Workflow context scheduling the activity.
    pub context_id: i64,
    pub activity: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub args: Option<Vec<u8>>,
    #[serde(default)]
    pub options: ActivityOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityExecuteLocalRequest {
    /// Workflow context scheduling the activity.
    pub context_id: i64,
    /// Activity type id previously agreed with the peer.
    pub activity_type_id: i64,
    #[serde(default, with = "base64_bytes_opt")]
    pub args: Option<Vec<u8>>,
    #[serde(default)]
    pub options: LocalActivityOptions,
}

/// Payload for activity requests that only address an activity context.
pub type ActivityContextRequest = ContextRequest;

pub type ActivityGetHeartbeatDetailsRequest = ActivityContextRequest;
pub type ActivityHasHeartbeatDetailsRequest = ActivityContextRequest;
pub type ActivityGetInfoRequest = ActivityContextRequest;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecordHeartbeatRequest {
    pub context_id: i64,
    #[serde(default, with = "base64_bytes_opt")]
    pub details: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HasHeartbeatDetailsReply {
    pub has_details: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityGetInfoReply {
    pub info: ActivityInfo,
}

/// Completes an activity asynchronously, outside the invoking context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityCompleteRequest {
    #[serde(with = "base64_bytes")]
    pub task_token: Vec<u8>,
    #[serde(default, with = "base64_bytes_opt")]
    pub result: Option<Vec<u8>>,
    #[serde(default)]
    pub error: Option<ClassifiedError>,
}

// ----------------------------------------------------------------------------
// Outbound activity invokes
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityInvokeRequest {
    pub context_id: i64,
    pub activity: String,
    #[serde(default, with = "base64_bytes_opt")]
    pub args: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStoppingRequest {
    pub context_id: i64,
    pub activity_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityInvokeLocalRequest {
    /// Workflow context the local activity runs under.
    pub context_id: i64,
    pub activity_context_id: i64,
    pub activity_type_id: i64,
    #[serde(default, with = "base64_bytes_opt")]
    pub args: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_travel_as_base64() {
        let reply = ResultReply::new(Some(vec![1, 2]));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["result"], "AQI=");

        let back: ResultReply = serde_json::from_value(json).unwrap();
        assert_eq!(back.result, Some(vec![1, 2]));
    }

    #[test]
    fn test_missing_optional_bytes_decode_as_none() {
        let reply: ResultReply = serde_json::from_str("{}").unwrap();
        assert_eq!(reply.result, None);

        let reply: ResultReply = serde_json::from_str(r#"{"result":null}"#).unwrap();
        assert_eq!(reply.result, None);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let result: Result<ResultReply, _> = serde_json::from_str(r#"{"result":"!!!"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_initialize_endpoint() {
        let req = InitializeRequest {
            library_address: "127.0.0.1".into(),
            library_port: 5001,
        };
        assert_eq!(req.endpoint(), "http://127.0.0.1:5001/");
    }

    #[test]
    fn test_execute_request_defaults_options() {
        let req: WorkflowExecuteRequest =
            serde_json::from_str(r#"{"domain":"test","workflow":"Order"}"#).unwrap();
        assert_eq!(req.workflow, "Order");
        assert_eq!(req.args, None);
        assert_eq!(req.options, StartWorkflowOptions::default());
    }
}
