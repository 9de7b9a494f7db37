//! Error types for task scheduling, decoding and execution.

use thiserror::Error;

use crate::protocol::{TaskId, FALLBACK_LOG_STREAM_NAME};

/// Failure reported by an external collaborator (pub/sub, audit log,
/// identity service).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PortError {
    message: String,
}

impl PortError {
    /// Creates a port error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Reasons a task request message is rejected at dispatch time.
///
/// Every variant is terminal: the message is audited and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The message is not a JSON object.
    #[error("task request is not a JSON object: {reason}")]
    MalformedPayload {
        /// Why the payload could not be read
        reason: String,
    },

    /// The message carries no task identifier.
    #[error("task request has no task_id")]
    MissingTaskId,

    /// Required fields are absent or have the wrong type.
    #[error("task request {task_id} is missing required data: {}", .fields.join(", "))]
    MissingFields {
        /// Identifier of the rejected task
        task_id: TaskId,
        /// Names of the absent or malformed fields
        fields: Vec<String>,
    },

    /// The client name is not in the task registry.
    #[error("task request {task_id} names unknown client '{client_name}'")]
    UnknownClient {
        /// Identifier of the rejected task
        task_id: TaskId,
        /// The unregistered client name
        client_name: String,
    },

    /// The protocol version is outside the supported range.
    #[error("task request {task_id} uses unsupported protocol version {version}")]
    UnsupportedVersion {
        /// Identifier of the rejected task
        task_id: TaskId,
        /// The version carried by the message
        version: i64,
    },
}

impl ProtocolError {
    /// Task identifier recovered from the message, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::MalformedPayload { .. } | Self::MissingTaskId => None,
            Self::MissingFields { task_id, .. }
            | Self::UnknownClient { task_id, .. }
            | Self::UnsupportedVersion { task_id, .. } => Some(task_id),
        }
    }

    /// Audit log key for the exception entry: the task id when known,
    /// otherwise the fallback stream.
    pub fn log_key(&self) -> &str {
        self.task_id().map_or(FALLBACK_LOG_STREAM_NAME, TaskId::as_str)
    }

    /// Human-readable message recorded in the audit entry.
    pub fn message(&self) -> &'static str {
        match self {
            Self::MalformedPayload { .. } => "Could not parse request payload",
            Self::MissingTaskId => "Could not find task_id",
            Self::MissingFields { .. } => "Request payload missing required data",
            Self::UnknownClient { .. } => "Request payload names an unknown client",
            Self::UnsupportedVersion { .. } => "Message version not supported",
        }
    }
}

/// Errors returned from [`crate::TaskScheduler::schedule_task`].
///
/// None of these are retried internally; the caller decides.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Caller identity (account, region) could not be resolved.
    #[error("failed to resolve caller identity: {0}")]
    Identity(#[source] PortError),

    /// Task request could not be serialized.
    #[error("failed to serialize task request: {message}")]
    Serialization {
        /// Serializer error message
        message: String,
    },

    /// Publishing to the worker topic failed.
    #[error("failed to publish task {task_id}: {source}")]
    Publish {
        /// Identifier of the task that was not published
        task_id: TaskId,
        /// Underlying publisher failure
        #[source]
        source: PortError,
    },

    /// The task was published but the scheduled audit entry was not written.
    #[error("task {task_id} published but audit entry failed: {source}")]
    Audit {
        /// Identifier of the published task
        task_id: TaskId,
        /// Underlying audit log failure
        #[source]
        source: PortError,
    },
}

/// Errors raised by task implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The task state does not match what the task expects.
    #[error("invalid task state: {message}")]
    InvalidState {
        /// Description of the mismatch
        message: String,
    },

    /// A unit of work failed.
    #[error("task unit failed: {message}")]
    UnitFailed {
        /// Failure description
        message: String,
    },
}

impl TaskError {
    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Creates a unit failure error.
    pub fn unit_failed(message: impl Into<String>) -> Self {
        Self::UnitFailed { message: message.into() }
    }
}
