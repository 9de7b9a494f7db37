//! Task contract and the runner that drives a task against a runtime.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    audit::{AuditEntry, LogAction},
    error::TaskError,
    runtime::Runtime,
};

/// A unit-of-work task.
///
/// Work is split into units short enough to fit in one invocation; the
/// state returned by [`Task::state`] is enough to resume the task later.
#[async_trait]
pub trait Task: Send {
    /// Runs one unit. Returns the final result once the task is done.
    async fn run_one_unit(&mut self) -> Result<Option<Value>, TaskError>;

    /// Current resumable state.
    fn state(&self) -> Value;

    /// Upper bound on the duration of a single unit.
    fn expected_max_one_unit_runtime(&self) -> Duration;
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The task finished with `result`.
    Completed {
        /// Value returned by the final unit
        result: Value,
    },
    /// The runtime budget ran out; `state` resumes the task.
    Suspended {
        /// Resumable task state
        state: Value,
    },
}

/// Binds a task to a runtime.
pub struct Runner {
    task: Box<dyn Task>,
    runtime: Box<dyn Runtime>,
}

impl Runner {
    /// Creates a runner for `task` inside `runtime`.
    pub fn new(task: Box<dyn Task>, runtime: Box<dyn Runtime>) -> Self {
        Self { task, runtime }
    }

    /// Runs units until the task completes or the next unit would not fit
    /// in the remaining time.
    ///
    /// # Errors
    ///
    /// Returns the task's error if a unit fails. The failure is audited
    /// before returning.
    pub async fn run(mut self) -> Result<RunOutcome, TaskError> {
        let key = self.runtime.task_id().to_string();
        info!(task_id = %key, client_name = self.runtime.client_name(), "running task");
        self.runtime.log(&key, AuditEntry::new(LogAction::Running, self.task.state())).await;

        let mut units = 0_u64;
        loop {
            if self.runtime.remaining_time() < self.task.expected_max_one_unit_runtime() {
                let state = self.task.state();
                info!(task_id = %key, units, "time budget exhausted, suspending task");
                self.runtime.log(&key, AuditEntry::new(LogAction::Rescheduled, state.clone())).await;
                return Ok(RunOutcome::Suspended { state });
            }

            match self.task.run_one_unit().await {
                Ok(Some(result)) => {
                    info!(task_id = %key, units, "task complete");
                    self.runtime.log(&key, AuditEntry::new(LogAction::Complete, result.clone())).await;
                    return Ok(RunOutcome::Completed { result });
                },
                Ok(None) => {
                    units += 1;
                    debug!(task_id = %key, units, "unit finished");
                },
                Err(e) => {
                    warn!(task_id = %key, units, error = %e, "task unit failed");
                    let entry =
                        AuditEntry::exception("Task unit failed", self.task.state(), e.to_string());
                    self.runtime.log(&key, entry).await;
                    return Err(e);
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dss_core::TestClock;
    use serde_json::json;

    use super::*;
    use crate::{
        memory::MemoryAuditLog,
        protocol::TaskId,
        runtime::{InvocationContext, ProductionRuntime},
    };

    /// Task whose units each advance the shared clock by one second.
    struct SlowTask {
        clock: Arc<TestClock>,
        remaining: u32,
        fail_at: Option<u32>,
    }

    #[async_trait]
    impl Task for SlowTask {
        async fn run_one_unit(&mut self) -> Result<Option<Value>, TaskError> {
            self.clock.advance(Duration::from_secs(1));
            if self.fail_at == Some(self.remaining) {
                return Err(TaskError::unit_failed("disk full"));
            }
            if self.remaining == 0 {
                return Ok(Some(json!("done")));
            }
            self.remaining -= 1;
            Ok(None)
        }

        fn state(&self) -> Value {
            json!({"remaining": self.remaining})
        }

        fn expected_max_one_unit_runtime(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    fn runner(
        remaining: u32,
        fail_at: Option<u32>,
        budget: Duration,
    ) -> (Runner, Arc<MemoryAuditLog>) {
        let clock = Arc::new(TestClock::at_unix_seconds(0));
        let audit = Arc::new(MemoryAuditLog::new());
        let context = InvocationContext::with_timeout("inv", clock.as_ref(), budget);
        let runtime =
            ProductionRuntime::new(context, "slow", TaskId::from("t1"), audit.clone(), clock.clone());
        let task = SlowTask { clock, remaining, fail_at };
        (Runner::new(Box::new(task), Box::new(runtime)), audit)
    }

    fn actions(entries: &[AuditEntry]) -> Vec<LogAction> {
        entries.iter().map(|entry| entry.action).collect()
    }

    #[tokio::test]
    async fn completes_within_budget() {
        let (runner, audit) = runner(2, None, Duration::from_secs(10));

        let outcome = runner.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed { result: json!("done") });
        let entries = audit.entries_for("t1").await;
        assert_eq!(actions(&entries), vec![LogAction::Running, LogAction::Complete]);
    }

    #[tokio::test]
    async fn suspends_when_budget_runs_out() {
        let (runner, audit) = runner(10, None, Duration::from_secs(3));

        let outcome = runner.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Suspended { state: json!({"remaining": 7}) });
        let entries = audit.entries_for("t1").await;
        assert_eq!(actions(&entries), vec![LogAction::Running, LogAction::Rescheduled]);
        assert_eq!(entries[1].payload, json!({"remaining": 7}));
    }

    #[tokio::test]
    async fn unit_failure_is_audited_and_returned() {
        let (runner, audit) = runner(3, Some(2), Duration::from_secs(10));

        let error = runner.run().await.unwrap_err();

        assert_eq!(error, TaskError::unit_failed("disk full"));
        let entries = audit.entries_for("t1").await;
        assert_eq!(actions(&entries), vec![LogAction::Running, LogAction::Exception]);
    }
}
