//! Kernel error taxonomy and the structured error envelope.
//!
//! Primitives and assembled nodes never raise across a tier boundary:
//! failures travel as [`ErrorEnvelope`] values inside results. Only the
//! lifecycle controller translates errors into process-visible outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Kernel-level errors.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Input validation failed at gate {gate}: {message}")]
    InputRejected { gate: String, message: String },

    #[error("Transient external failure talking to {endpoint}: {message}")]
    TransientExternal { endpoint: String, message: String },

    #[error("Permanent external failure talking to {endpoint}: status {status}, {message}")]
    PermanentExternal {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Plan rejected by {gate}: {rationale}")]
    PolicyRejection { gate: String, rationale: String },

    #[error("Resource limit reached: {0}")]
    ResourceExhausted(String),

    #[error("Kernel invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown skill tag: {0}")]
    UnknownSkill(String),

    #[error("Node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("DAG not found: {0}")]
    DagNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

pub type KernelResult<T> = Result<T, KernelError>;

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Serialization(err.to_string())
    }
}

impl KernelError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientExternal { .. })
    }

    /// The taxonomy kind this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputRejected { .. } => ErrorKind::Input,
            Self::TransientExternal { .. } => ErrorKind::TransientExternal,
            Self::PermanentExternal { .. } => ErrorKind::PermanentExternal,
            Self::PolicyRejection { .. } => ErrorKind::PolicyRejection,
            Self::ResourceExhausted(_) => ErrorKind::Resource,
            Self::InvariantViolation(_) => ErrorKind::Fatal,
            _ => ErrorKind::Internal,
        }
    }
}

/// Coarse error classification used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Validation gate failure; surfaced to the caller, never retried.
    Input,
    /// Timeout or 5xx from an external peer; retried per policy.
    TransientExternal,
    /// Non-retryable 4xx from an external peer.
    PermanentExternal,
    /// Guardrail or what-if rejection; triggers replan.
    PolicyRejection,
    /// Budget exhaustion or unrelievable memory pressure.
    Resource,
    /// Invariant violation; escalated to terminate.
    Fatal,
    /// Anything else internal to the kernel.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::TransientExternal => "transient_external",
            Self::PermanentExternal => "permanent_external",
            Self::PolicyRejection => "policy_rejection",
            Self::Resource => "resource",
            Self::Fatal => "fatal",
            Self::Internal => "internal",
        }
    }
}

/// Structured error payload carried inside [`ExecutionResult`]s and events.
///
/// [`ExecutionResult`]: crate::domain::models::outcome::ExecutionResult
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    /// Node that produced the error, when one is involved.
    pub node_id: Option<Uuid>,
    /// Whether the dispatcher may retry the operation.
    pub retryable: bool,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_id: None,
            retryable: kind == ErrorKind::TransientExternal,
            occurred_at: Utc::now(),
        }
    }

    pub fn for_node(mut self, node_id: Uuid) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn from_kernel_error(err: &KernelError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        let err = KernelError::TransientExternal {
            endpoint: "tool-host".into(),
            message: "timeout".into(),
        };
        assert!(err.is_transient());
        let env = ErrorEnvelope::from_kernel_error(&err);
        assert!(env.retryable);
        assert_eq!(env.kind, ErrorKind::TransientExternal);
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        let err = KernelError::PermanentExternal {
            endpoint: "vault".into(),
            status: 404,
            message: "not found".into(),
        };
        assert!(!err.is_transient());
        assert!(!ErrorEnvelope::from_kernel_error(&err).retryable);
    }

    #[test]
    fn invariant_violations_are_fatal() {
        let err = KernelError::InvariantViolation("cyclic DAG emitted".into());
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
