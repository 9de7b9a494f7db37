//! Pub/sub publishing and caller identity ports used by the scheduler.

use std::fmt;

use async_trait::async_trait;

use crate::error::PortError;

/// Fully qualified identifier of a pub/sub topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicArn(String);

impl TopicArn {
    /// Builds the topic identifier for `topic_name` owned by `identity`.
    pub fn for_topic(identity: &CallerIdentity, topic_name: &str) -> Self {
        Self(format!("arn:aws:sns:{}:{}:{topic_name}", identity.region, identity.account_id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account and region of the calling process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Cloud account identifier.
    pub account_id: String,
    /// Region the caller runs in.
    pub region: String,
}

/// Resolves the caller's account and region.
#[async_trait]
pub trait IdentityResolver: Send + Sync + fmt::Debug {
    /// Returns the identity of the calling process.
    async fn caller_identity(&self) -> Result<CallerIdentity, PortError>;
}

/// Publishes messages to a pub/sub topic.
///
/// Delivery is at-least-once with no ordering guarantee.
#[async_trait]
pub trait PubSubPublisher: Send + Sync + fmt::Debug {
    /// Publishes `message` to `topic`.
    async fn publish(&self, topic: &TopicArn, message: String) -> Result<(), PortError>;
}
