//! In-memory implementations of the notification ports for tests and
//! local runs.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    net::IpAddr,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::{NotifyError, Result},
    guard::HostResolver,
    queue::{NotificationQueue, QueueMessage},
};

/// Resolver answering from a fixed host table.
///
/// Unknown hosts fail resolution.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    /// An empty host table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host entry.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        self.hosts.insert(host.into(), addresses);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        self.hosts.get(host).cloned().ok_or_else(|| NotifyError::Resolution {
            host: host.to_string(),
            message: "Name or service not known".to_string(),
        })
    }
}

/// FIFO queue that drops a message whose deduplication id it has seen
/// before, pending or already received.
///
/// Ids are remembered for the lifetime of the queue, which is a stricter
/// window than a hosted FIFO queue keeps.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    messages: Arc<RwLock<VecDeque<QueueMessage>>>,
    seen: Arc<RwLock<HashSet<String>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl MemoryQueue {
    /// An empty queue that accepts every enqueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `enqueue` fail with `message`.
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }

    /// Removes and returns the oldest pending message.
    pub async fn receive(&self) -> Option<QueueMessage> {
        self.messages.write().await.pop_front()
    }

    /// Snapshot of the pending messages.
    pub async fn pending(&self) -> Vec<QueueMessage> {
        self.messages.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<()> {
        if let Some(reason) = self.failure.read().await.clone() {
            return Err(NotifyError::Queue { message: reason });
        }

        if !self.seen.write().await.insert(message.message_deduplication_id.clone()) {
            return Ok(());
        }
        self.messages.write().await.push_back(message);
        Ok(())
    }
}
