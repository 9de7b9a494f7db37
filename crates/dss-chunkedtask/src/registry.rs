//! Compile-time registry mapping client names to task factories.
//!
//! The set of clients a worker can run is the static [`CLIENTS`] table; there
//! is no runtime registration. Dispatchers take the table by reference so a
//! deployment (or a test) can supply its own.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{error::TaskError, runner::Task};

/// Client name of the fast-test task. Dispatching it selects the fast-test
/// runtime.
pub const FAST_TEST_CLIENT_NAME: &str = "fast-test-client";

/// Builds a task from its decoded state.
pub type TaskFactory = fn(Value) -> Result<Box<dyn Task>, TaskError>;

/// One registry entry.
#[derive(Clone, Copy)]
pub struct TaskRegistration {
    /// Name carried in the `client_name` field of a task request.
    pub client_name: &'static str,
    /// Factory for the task implementation.
    pub factory: TaskFactory,
}

impl fmt::Debug for TaskRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistration").field("client_name", &self.client_name).finish()
    }
}

/// Clients known to this build.
pub static CLIENTS: &[TaskRegistration] =
    &[TaskRegistration { client_name: FAST_TEST_CLIENT_NAME, factory: FastTestTask::from_state }];

/// Finds the registration for `client_name`.
pub fn lookup(
    registry: &'static [TaskRegistration],
    client_name: &str,
) -> Option<&'static TaskRegistration> {
    registry.iter().find(|registration| registration.client_name == client_name)
}

/// Task used by integration tests of the dispatch path.
///
/// Its state is `{"remaining": n}`; each unit decrements the counter and the
/// task completes once it reaches zero. Missing counters mean zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastTestTask {
    remaining: u64,
    completed: u64,
}

impl FastTestTask {
    /// Expected upper bound for one unit of work.
    pub const UNIT_RUNTIME: Duration = Duration::from_millis(10);

    /// Factory registered under [`FAST_TEST_CLIENT_NAME`].
    ///
    /// # Errors
    ///
    /// Returns `TaskError::InvalidState` if the state is neither an object
    /// nor null, or if a counter is not a non-negative integer.
    pub fn from_state(state: Value) -> Result<Box<dyn Task>, TaskError> {
        let object = match &state {
            Value::Null => return Ok(Box::new(Self { remaining: 0, completed: 0 })),
            Value::Object(object) => object,
            other => {
                return Err(TaskError::invalid_state(format!("expected an object, got {other}")))
            },
        };

        let counter = |key: &str| match object.get(key) {
            None => Ok(0),
            Some(value) => value.as_u64().ok_or_else(|| {
                TaskError::invalid_state(format!("'{key}' must be a non-negative integer"))
            }),
        };

        Ok(Box::new(Self { remaining: counter("remaining")?, completed: counter("completed")? }))
    }
}

#[async_trait]
impl Task for FastTestTask {
    async fn run_one_unit(&mut self) -> Result<Option<Value>, TaskError> {
        if self.remaining == 0 {
            return Ok(Some(json!({"completed": self.completed})));
        }
        self.remaining -= 1;
        self.completed += 1;
        Ok(None)
    }

    fn state(&self) -> Value {
        json!({"remaining": self.remaining, "completed": self.completed})
    }

    fn expected_max_one_unit_runtime(&self) -> Duration {
        Self::UNIT_RUNTIME
    }
}
