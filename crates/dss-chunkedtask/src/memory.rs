//! In-memory implementations of the scheduler and dispatcher ports.
//!
//! Used by tests and local runs where no pub/sub service or audit stream is
//! available. Each fake records what it receives and can be told to fail.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    audit::{AuditEntry, AuditLog},
    error::PortError,
    pubsub::{CallerIdentity, IdentityResolver, PubSubPublisher, TopicArn},
};

/// Audit log that keeps entries in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<RwLock<Vec<(String, AuditEntry)>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl MemoryAuditLog {
    /// Creates an empty audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent append fail with `message`.
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }

    /// All entries with their keys.
    pub async fn entries(&self) -> Vec<(String, AuditEntry)> {
        self.entries.read().await.clone()
    }

    /// Entries appended under `key`.
    pub async fn entries_for(&self, key: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, key: &str, entry: AuditEntry) -> Result<(), PortError> {
        if let Some(message) = self.failure.read().await.as_ref() {
            return Err(PortError::new(message.clone()));
        }
        self.entries.write().await.push((key.to_string(), entry));
        Ok(())
    }
}

/// Publisher that records published messages.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    messages: Arc<RwLock<Vec<(TopicArn, String)>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl MemoryPublisher {
    /// Creates a publisher with no messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail with `message`.
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }

    /// Published messages with their topics.
    pub async fn messages(&self) -> Vec<(TopicArn, String)> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl PubSubPublisher for MemoryPublisher {
    async fn publish(&self, topic: &TopicArn, message: String) -> Result<(), PortError> {
        if let Some(failure) = self.failure.read().await.as_ref() {
            return Err(PortError::new(failure.clone()));
        }
        self.messages.write().await.push((topic.clone(), message));
        Ok(())
    }
}

/// Identity resolver returning a fixed identity.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    identity: CallerIdentity,
}

impl StaticIdentity {
    /// Creates a resolver for the given account and region.
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self { identity: CallerIdentity { account_id: account_id.into(), region: region.into() } }
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn caller_identity(&self) -> Result<CallerIdentity, PortError> {
        Ok(self.identity.clone())
    }
}
