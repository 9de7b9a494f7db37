//! Publishing task requests to the worker topic.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    audit::{AuditEntry, AuditLog, LogAction},
    error::SchedulerError,
    protocol::{self, TaskId},
    pubsub::{IdentityResolver, PubSubPublisher, TopicArn},
};

/// Hands tasks off to the worker pool.
///
/// Publish failures are returned to the caller unchanged; the scheduler
/// never retries.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    publisher: Arc<dyn PubSubPublisher>,
    audit: Arc<dyn AuditLog>,
    identity: Arc<dyn IdentityResolver>,
    topic_name: String,
}

impl TaskScheduler {
    /// Creates a scheduler publishing to `topic_name` in the caller's
    /// account and region.
    pub fn new(
        publisher: Arc<dyn PubSubPublisher>,
        audit: Arc<dyn AuditLog>,
        identity: Arc<dyn IdentityResolver>,
        topic_name: impl Into<String>,
    ) -> Self {
        Self { publisher, audit, identity, topic_name: topic_name.into() }
    }

    /// Creates a scheduler using the topic named in `config`.
    pub fn from_config(
        config: &dss_core::Config,
        publisher: Arc<dyn PubSubPublisher>,
        audit: Arc<dyn AuditLog>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self::new(publisher, audit, identity, config.chunked_task_topic.clone())
    }

    /// Publishes a new task request and records a `scheduled` audit entry.
    ///
    /// Returns the freshly generated task id.
    ///
    /// # Errors
    ///
    /// - `Identity` if the topic cannot be addressed
    /// - `Publish` if the publisher rejects the message
    /// - `Audit` if the message was published but the audit entry failed
    pub async fn schedule_task(
        &self,
        client_name: &str,
        state: Value,
    ) -> Result<TaskId, SchedulerError> {
        let task_id = TaskId::generate();
        let payload = protocol::encode(client_name, task_id.clone(), state).to_value();

        let identity = self.identity.caller_identity().await.map_err(SchedulerError::Identity)?;
        let topic = TopicArn::for_topic(&identity, &self.topic_name);

        let message = serde_json::to_string(&payload)
            .map_err(|e| SchedulerError::Serialization { message: e.to_string() })?;

        if let Err(source) = self.publisher.publish(&topic, message).await {
            warn!(%task_id, client_name, %topic, error = %source, "failed to publish task");
            return Err(SchedulerError::Publish { task_id, source });
        }

        self.audit
            .append(task_id.as_str(), AuditEntry::new(LogAction::Scheduled, payload))
            .await
            .map_err(|source| SchedulerError::Audit { task_id: task_id.clone(), source })?;

        info!(%task_id, client_name, %topic, "scheduled task");
        Ok(task_id)
    }
}
