//! Retry decisions for failed deliveries.
//!
//! The attempt budget travels with the notification. Every failed delivery
//! spends one attempt and the notification is re-enqueued while attempts
//! remain. Failures caused by the subscription itself (an encoding the
//! delivery path cannot produce, an unusable method) are dropped at once.

use crate::{error::NotifyError, notification::Notification};

/// What to do with a notification whose delivery failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Put the spent notification back on the queue.
    Requeue(Notification),
    /// Stop trying.
    GiveUp {
        /// Why no further attempt is made
        reason: String,
    },
}

/// Decides the fate of `notification` after `error`.
pub fn decide(notification: &Notification, error: &NotifyError) -> RetryDecision {
    if error.is_fatal() {
        return RetryDecision::GiveUp { reason: format!("permanent failure: {error}") };
    }

    match notification.spend_attempt() {
        Ok(spent) if spent.attempts() > 0 => RetryDecision::Requeue(spent),
        Ok(_) | Err(_) => RetryDecision::GiveUp { reason: "attempt budget exhausted".to_string() },
    }
}

/// 1-based number of the attempt about to be made.
pub fn attempt_number(total_attempts: u32, remaining: u32) -> u32 {
    total_attempts.saturating_sub(remaining) + 1
}
