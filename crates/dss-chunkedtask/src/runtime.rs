//! Execution environments a task runs inside.
//!
//! A runtime binds the identity of one invocation (task id, client name,
//! invocation context), reports how much of the invocation's time budget
//! is left, and writes audit entries. The fast-test runtime has the same
//! logging contract but a short fixed budget so test executions stay
//! bounded.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use dss_core::Clock;
use tracing::error;

use crate::{
    audit::{AuditEntry, AuditLog},
    protocol::TaskId,
    registry::FAST_TEST_CLIENT_NAME,
};

/// Time budget granted to a fast-test invocation.
pub const FAST_TEST_BUDGET: Duration = Duration::from_secs(5);

/// Identity and deadline of the worker invocation handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    /// Identifier assigned by the worker platform.
    pub invocation_id: String,
    /// Moment the platform terminates the invocation.
    pub deadline: SystemTime,
}

impl InvocationContext {
    /// Creates a context with an absolute deadline.
    pub fn new(invocation_id: impl Into<String>, deadline: SystemTime) -> Self {
        Self { invocation_id: invocation_id.into(), deadline }
    }

    /// Creates a context whose deadline is `timeout` from now.
    pub fn with_timeout(
        invocation_id: impl Into<String>,
        clock: &dyn Clock,
        timeout: Duration,
    ) -> Self {
        Self::new(invocation_id, clock.now_system() + timeout)
    }
}

/// Capability a task runs against.
#[async_trait]
pub trait Runtime: Send + Sync + fmt::Debug {
    /// Task this runtime was created for.
    fn task_id(&self) -> &TaskId;

    /// Client name of the task.
    fn client_name(&self) -> &str;

    /// Time left before the invocation deadline.
    fn remaining_time(&self) -> Duration;

    /// Appends one audit entry under `key`.
    ///
    /// Failures are logged and swallowed; auditing never fails a task.
    async fn log(&self, key: &str, entry: AuditEntry);
}

/// Runtime for every registered client except the fast-test client.
#[derive(Debug, Clone)]
pub struct ProductionRuntime {
    context: InvocationContext,
    client_name: String,
    task_id: TaskId,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl ProductionRuntime {
    /// Binds a runtime to one invocation of `client_name`/`task_id`.
    pub fn new(
        context: InvocationContext,
        client_name: impl Into<String>,
        task_id: TaskId,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { context, client_name: client_name.into(), task_id, audit, clock }
    }
}

#[async_trait]
impl Runtime for ProductionRuntime {
    fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    fn client_name(&self) -> &str {
        &self.client_name
    }

    fn remaining_time(&self) -> Duration {
        time_until(self.context.deadline, self.clock.as_ref())
    }

    async fn log(&self, key: &str, entry: AuditEntry) {
        append_or_report(self.audit.as_ref(), key, entry).await;
    }
}

/// Runtime selected for [`FAST_TEST_CLIENT_NAME`].
#[derive(Debug, Clone)]
pub struct FastTestRuntime {
    task_id: TaskId,
    deadline: SystemTime,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl FastTestRuntime {
    /// Binds a fast-test runtime; its deadline is the earlier of the
    /// invocation deadline and [`FAST_TEST_BUDGET`] from now.
    pub fn new(
        context: InvocationContext,
        task_id: TaskId,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let deadline = context.deadline.min(clock.now_system() + FAST_TEST_BUDGET);
        Self { task_id, deadline, audit, clock }
    }
}

#[async_trait]
impl Runtime for FastTestRuntime {
    fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    fn client_name(&self) -> &str {
        FAST_TEST_CLIENT_NAME
    }

    fn remaining_time(&self) -> Duration {
        time_until(self.deadline, self.clock.as_ref())
    }

    async fn log(&self, key: &str, entry: AuditEntry) {
        append_or_report(self.audit.as_ref(), key, entry).await;
    }
}

fn time_until(deadline: SystemTime, clock: &dyn Clock) -> Duration {
    deadline.duration_since(clock.now_system()).unwrap_or(Duration::ZERO)
}

async fn append_or_report(audit: &dyn AuditLog, key: &str, entry: AuditEntry) {
    let action = entry.action;
    if let Err(e) = audit.append(key, entry).await {
        error!(key, ?action, error = %e, "failed to write audit entry");
    }
}

#[cfg(test)]
mod tests {
    use dss_core::TestClock;
    use serde_json::json;

    use super::*;
    use crate::{audit::LogAction, memory::MemoryAuditLog};

    #[test]
    fn production_runtime_tracks_context_deadline() {
        let clock = Arc::new(TestClock::at_unix_seconds(1_000));
        let context = InvocationContext::with_timeout("inv-1", clock.as_ref(), Duration::from_secs(60));
        let runtime = ProductionRuntime::new(
            context,
            "some-client",
            TaskId::from("t1"),
            Arc::new(MemoryAuditLog::new()),
            clock.clone(),
        );

        assert_eq!(runtime.remaining_time(), Duration::from_secs(60));
        clock.advance(Duration::from_secs(45));
        assert_eq!(runtime.remaining_time(), Duration::from_secs(15));
        clock.advance(Duration::from_secs(30));
        assert_eq!(runtime.remaining_time(), Duration::ZERO);
    }

    #[test]
    fn fast_test_runtime_caps_budget() {
        let clock = Arc::new(TestClock::at_unix_seconds(1_000));
        let context = InvocationContext::with_timeout("inv-1", clock.as_ref(), Duration::from_secs(900));
        let runtime =
            FastTestRuntime::new(context, TaskId::from("t1"), Arc::new(MemoryAuditLog::new()), clock);

        assert_eq!(runtime.remaining_time(), FAST_TEST_BUDGET);
        assert_eq!(runtime.client_name(), FAST_TEST_CLIENT_NAME);
    }

    #[test]
    fn fast_test_runtime_respects_shorter_deadline() {
        let clock = Arc::new(TestClock::at_unix_seconds(1_000));
        let context = InvocationContext::with_timeout("inv-1", clock.as_ref(), Duration::from_secs(2));
        let runtime =
            FastTestRuntime::new(context, TaskId::from("t1"), Arc::new(MemoryAuditLog::new()), clock);

        assert_eq!(runtime.remaining_time(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn log_appends_under_given_key() {
        let clock = Arc::new(TestClock::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let context = InvocationContext::with_timeout("inv-1", clock.as_ref(), Duration::from_secs(1));
        let runtime = ProductionRuntime::new(context, "c", TaskId::from("t1"), audit.clone(), clock);

        runtime.log("t1", AuditEntry::new(LogAction::Running, json!({}))).await;

        let entries = audit.entries_for("t1").await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, LogAction::Running);
    }

    #[tokio::test]
    async fn log_failures_are_swallowed() {
        let clock = Arc::new(TestClock::new());
        let audit = Arc::new(MemoryAuditLog::new());
        audit.fail_with("stream throttled").await;
        let context = InvocationContext::with_timeout("inv-1", clock.as_ref(), Duration::from_secs(1));
        let runtime = FastTestRuntime::new(context, TaskId::from("t1"), audit.clone(), clock);

        runtime.log("t1", AuditEntry::new(LogAction::Running, json!({}))).await;

        assert!(audit.entries().await.is_empty());
    }
}
