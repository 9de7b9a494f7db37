//! Queue message shape and the queue port the worker pushes retries to.
//!
//! Field names follow the SQS `SendMessage` request, so a message can be
//! handed to a FIFO queue client unchanged.

use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One typed message attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttribute {
    /// Attribute type, `String` for everything this crate writes.
    pub data_type: String,
    /// Attribute value.
    pub string_value: String,
}

impl MessageAttribute {
    /// A `String`-typed attribute.
    pub fn string(value: impl Into<String>) -> Self {
        Self { data_type: "String".to_string(), string_value: value.into() }
    }
}

/// A message as sent to a FIFO queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueMessage {
    /// Wire-form notification body.
    pub message_body: String,
    /// Id the queue uses to drop duplicate sends. Unique per attempt.
    pub message_deduplication_id: String,
    /// Ordering group, the subscription id.
    pub message_group_id: String,
    /// Notification fields other than the body.
    pub message_attributes: BTreeMap<String, MessageAttribute>,
}

impl QueueMessage {
    /// String value of attribute `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.message_attributes.get(name).map(|a| a.string_value.as_str())
    }
}

/// Destination for notifications awaiting (re)delivery.
#[async_trait]
pub trait NotificationQueue: Send + Sync + Debug {
    /// Adds `message` to the queue.
    ///
    /// A queue may silently drop a message whose deduplication id it has
    /// seen before. Retries carry a fresh id, so only a repeated send of the
    /// same attempt is dropped.
    async fn enqueue(&self, message: QueueMessage) -> Result<()>;
}
