//! Append-only audit log of task lifecycle events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PortError;

/// Lifecycle action recorded in an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    /// The task request was published.
    Scheduled,
    /// A worker started running the task.
    Running,
    /// The runtime budget ran out before the task completed.
    Rescheduled,
    /// The task produced its result.
    Complete,
    /// The request was rejected or the task failed.
    Exception,
}

/// One structured audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// What happened.
    pub action: LogAction,
    /// Request payload, task state or task result, depending on the action.
    pub payload: Value,
    /// Human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error text for exception entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl AuditEntry {
    /// Creates an entry with no message or exception.
    pub fn new(action: LogAction, payload: Value) -> Self {
        Self { action, payload, message: None, exception: None }
    }

    /// Creates an exception entry.
    pub fn exception(
        message: impl Into<String>,
        payload: Value,
        exception: impl Into<String>,
    ) -> Self {
        Self {
            action: LogAction::Exception,
            payload,
            message: Some(message.into()),
            exception: Some(exception.into()),
        }
    }
}

/// Write-only sink for audit entries, keyed by task id or a fallback
/// stream name.
#[async_trait]
pub trait AuditLog: Send + Sync + std::fmt::Debug {
    /// Appends `entry` to the stream named `key`.
    async fn append(&self, key: &str, entry: AuditEntry) -> Result<(), PortError>;
}
