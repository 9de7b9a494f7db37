//! Queue-driven delivery worker.
//!
//! Handles one received queue message at a time: decode the notification,
//! attempt delivery, and on failure either re-enqueue the notification with
//! one attempt spent or drop it. The worker never changes a message in
//! place. A retry is always a fresh message.

use std::{sync::Arc, time::Duration};

use dss_core::{Clock, Config};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    client::DeliveryClient,
    error::{NotifyError, Result},
    notification::Notification,
    queue::{NotificationQueue, QueueMessage},
    retry::{attempt_number, decide, RetryDecision},
};

/// Settings for [`NotificationWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Budget a fresh notification starts with, used to number attempts.
    pub total_attempts: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl WorkerConfig {
    /// Reads the attempt budget and request timeout from the loaded
    /// configuration.
    pub fn from_config(config: &Config) -> Self {
        Self { total_attempts: config.notify_attempts, timeout: config.notify_timeout() }
    }
}

/// Result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The endpoint answered 2xx.
    Delivered,
    /// Delivery failed and the notification was re-enqueued.
    Requeued {
        /// Attempts left on the re-enqueued notification
        attempts_left: u32,
    },
    /// The message was discarded without further attempts.
    Dropped {
        /// Why the message was discarded
        reason: String,
    },
}

/// Counters for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Messages delivered with a 2xx answer.
    pub delivered: u64,
    /// Failed deliveries re-enqueued with an attempt spent.
    pub requeued: u64,
    /// Messages discarded for good.
    pub dropped: u64,
}

/// Delivers notifications received from a queue.
#[derive(Debug)]
pub struct NotificationWorker {
    queue: Arc<dyn NotificationQueue>,
    client: DeliveryClient,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    stats: Arc<RwLock<WorkerStats>>,
}

impl NotificationWorker {
    /// Worker that pushes retries to `queue`.
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        client: DeliveryClient,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self { queue, client, clock, config, stats: Arc::new(RwLock::new(WorkerStats::default())) }
    }

    /// Snapshot of the worker counters.
    pub async fn stats(&self) -> WorkerStats {
        self.stats.read().await.clone()
    }

    /// Processes one received message.
    ///
    /// # Errors
    ///
    /// Fails only when a retry cannot be enqueued. The caller should then
    /// leave the original message on its queue so it is received again.
    pub async fn handle(&self, message: &QueueMessage) -> Result<WorkerOutcome> {
        let notification = match Notification::from_wire_message(message) {
            Ok(notification) => notification,
            Err(e) => {
                error!(
                    message_deduplication_id = %message.message_deduplication_id,
                    error = %e,
                    "dropping undecodable queue message"
                );
                return Ok(self.dropped(e.to_string()).await);
            },
        };

        if let Some(queued_at) = notification.queued_at() {
            debug!(latency_seconds = self.clock.unix_seconds() - queued_at, "received {}", notification);
        }

        let attempt = attempt_number(self.config.total_attempts, notification.attempts());
        let error = match notification
            .deliver_or_raise(&self.client, Some(self.config.timeout), Some(attempt))
            .await
        {
            Ok(_) => {
                self.stats.write().await.delivered += 1;
                return Ok(WorkerOutcome::Delivered);
            },
            Err(e) => e,
        };

        match decide(&notification, &error) {
            RetryDecision::Requeue(spent) => {
                let attempts_left = spent.attempts();
                self.queue.enqueue(spent.to_wire_message(self.clock.as_ref())).await?;
                info!(attempts_left, category = category(&error), error = %error, "requeued {}", spent);
                self.stats.write().await.requeued += 1;
                Ok(WorkerOutcome::Requeued { attempts_left })
            },
            RetryDecision::GiveUp { reason } => {
                warn!(
                    category = category(&error),
                    error = %error,
                    reason = %reason,
                    "giving up on {}",
                    notification
                );
                Ok(self.dropped(reason).await)
            },
        }
    }

    async fn dropped(&self, reason: String) -> WorkerOutcome {
        self.stats.write().await.dropped += 1;
        WorkerOutcome::Dropped { reason }
    }
}

/// Log label for a failure: the delivery category, or `notify` for errors
/// raised before a request was sent.
fn category(error: &NotifyError) -> &'static str {
    error.category().map_or("notify", |c| c.as_str())
}
