//! Per-message entry point of a chunked-task worker.

use std::sync::Arc;

use dss_core::Clock;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    audit::{AuditEntry, AuditLog},
    error::{ProtocolError, TaskError},
    protocol,
    registry::{TaskRegistration, FAST_TEST_CLIENT_NAME},
    runner::{RunOutcome, Runner},
    runtime::{FastTestRuntime, InvocationContext, ProductionRuntime, Runtime},
};

/// Result of dispatching one message.
///
/// Dispatch never fails: rejected and failed messages are audited and the
/// outcome only tells the caller what happened.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The message was invalid and has been dropped.
    Rejected(ProtocolError),
    /// The task ran.
    Ran(RunOutcome),
    /// The task could not be constructed or a unit failed.
    Failed(TaskError),
}

/// Decodes task requests and runs them.
#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    registry: &'static [TaskRegistration],
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl TaskDispatcher {
    /// Creates a dispatcher resolving clients in `registry`.
    pub fn new(
        registry: &'static [TaskRegistration],
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { registry, audit, clock }
    }

    /// Dispatches a raw message body.
    ///
    /// Bodies that are not JSON are audited under the fallback stream and
    /// dropped.
    pub async fn dispatch_message(&self, context: InvocationContext, body: &str) -> DispatchOutcome {
        match serde_json::from_str::<Value>(body) {
            Ok(payload) => self.dispatch(context, &payload).await,
            Err(e) => {
                let error = ProtocolError::MalformedPayload { reason: e.to_string() };
                self.reject(Value::String(body.to_string()), error).await
            },
        }
    }

    /// Decodes `payload`, selects the runtime and runs the task.
    pub async fn dispatch(&self, context: InvocationContext, payload: &Value) -> DispatchOutcome {
        let decoded = match protocol::decode(payload, self.registry) {
            Ok(decoded) => decoded,
            Err(error) => return self.reject(payload.clone(), error).await,
        };
        let request = decoded.request;

        let runtime: Box<dyn Runtime> = if request.client_name == FAST_TEST_CLIENT_NAME {
            Box::new(FastTestRuntime::new(
                context,
                request.task_id.clone(),
                self.audit.clone(),
                self.clock.clone(),
            ))
        } else {
            Box::new(ProductionRuntime::new(
                context,
                request.client_name.clone(),
                request.task_id.clone(),
                self.audit.clone(),
                self.clock.clone(),
            ))
        };

        let task = match (decoded.registration.factory)(request.state.clone()) {
            Ok(task) => task,
            Err(e) => {
                error!(task_id = %request.task_id, client_name = %request.client_name, error = %e, "failed to construct task");
                let entry =
                    AuditEntry::exception("Could not construct task", request.to_value(), e.to_string());
                runtime.log(request.task_id.as_str(), entry).await;
                return DispatchOutcome::Failed(e);
            },
        };

        info!(task_id = %request.task_id, client_name = %request.client_name, "dispatching task");
        match Runner::new(task, runtime).run().await {
            Ok(outcome) => DispatchOutcome::Ran(outcome),
            Err(e) => DispatchOutcome::Failed(e),
        }
    }

    async fn reject(&self, payload: Value, error: ProtocolError) -> DispatchOutcome {
        warn!(key = error.log_key(), error = %error, "dropping invalid task request");
        let entry = AuditEntry::exception(error.message(), payload, error.to_string());
        if let Err(e) = self.audit.append(error.log_key(), entry).await {
            error!(key = error.log_key(), error = %e, "failed to audit rejected task request");
        }
        DispatchOutcome::Rejected(error)
    }
}
