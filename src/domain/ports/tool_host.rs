//! Tool host port: the single RPC shape for all external tools.
//!
//! The kernel treats tool ids as opaque strings. On timeout the host
//! returns `status = Timeout` rather than failing the call; transport
//! errors are the only `Err` case.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::KernelResult;
use crate::domain::models::ids::TraceId;
use crate::domain::models::outcome::CostTelemetry;

/// One tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_id: String,
    pub args: serde_json::Value,
    pub trace_id: TraceId,
    pub timeout_ms: u64,
}

impl ToolCall {
    pub fn new(tool_id: impl Into<String>, args: serde_json::Value, trace_id: TraceId) -> Self {
        Self { tool_id: tool_id.into(), args, trace_id, timeout_ms: 30_000 }
    }
}

/// Completion status of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    /// The host-side deadline elapsed. Not an error at the transport level.
    Timeout,
    /// The tool accepted the work and will finish later; poll or await a
    /// webhook keyed by the continuation.
    Pending {
        continuation: String,
        poll_after_ms: u64,
    },
    /// The tool failed. `code` follows HTTP semantics where applicable.
    Error { code: u16, message: String },
}

/// Response envelope for a tool invocation.
///
/// `status` flattens into the top level, so the wire form reads
/// `{"status": "pending", "continuation": ..., "payload": ..., "cost": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(flatten)]
    pub status: ToolStatus,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub cost: CostTelemetry,
}

impl ToolResponse {
    pub fn ok(payload: serde_json::Value, cost: CostTelemetry) -> Self {
        Self { status: ToolStatus::Ok, payload, cost }
    }

    pub fn timeout() -> Self {
        Self {
            status: ToolStatus::Timeout,
            payload: serde_json::Value::Null,
            cost: CostTelemetry::zero(),
        }
    }
}

/// RPC interface to the tool-server population.
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Invoke a tool. Retries re-send the identical `trace_id`.
    async fn invoke(&self, call: ToolCall) -> KernelResult<ToolResponse>;

    /// Cheap liveness probe used during panic recovery.
    async fn health(&self) -> KernelResult<()>;
}
