//! Chunked background task dispatch.
//!
//! Request-serving code hands long-running work to an independently scaled
//! worker pool by publishing a versioned task request to a pub/sub topic.
//! Each worker receives one message, decodes it, resolves the registered
//! task and the runtime it runs in, and drives it with a [`Runner`].
//!
//! # Flow
//!
//! 1. **Schedule** - [`TaskScheduler::schedule_task`] publishes the request
//!    and records a `scheduled` audit entry
//! 2. **Decode** - [`protocol::decode`] validates the message; malformed
//!    requests are audited and dropped, never retried
//! 3. **Resolve** - the client name selects the task factory and either the
//!    production or the fast-test runtime
//! 4. **Run** - the [`Runner`] executes units until the task completes or
//!    the runtime's time budget is spent
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dss_chunkedtask::{
//!     memory::{MemoryAuditLog, MemoryPublisher, StaticIdentity},
//!     registry::FAST_TEST_CLIENT_NAME,
//!     TaskScheduler,
//! };
//!
//! # async fn example() -> Result<(), dss_chunkedtask::SchedulerError> {
//! let scheduler = TaskScheduler::new(
//!     Arc::new(MemoryPublisher::new()),
//!     Arc::new(MemoryAuditLog::new()),
//!     Arc::new(StaticIdentity::new("123456789012", "us-east-1")),
//!     "dss-chunked-task-worker",
//! );
//! let task_id = scheduler.schedule_task(FAST_TEST_CLIENT_NAME, serde_json::json!({"remaining": 3})).await?;
//! println!("scheduled {task_id}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod pubsub;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod scheduler;

pub use audit::{AuditEntry, AuditLog, LogAction};
pub use dispatcher::{DispatchOutcome, TaskDispatcher};
pub use error::{PortError, ProtocolError, SchedulerError, TaskError};
pub use protocol::{TaskId, TaskRequest};
pub use runner::{RunOutcome, Runner, Task};
pub use runtime::{FastTestRuntime, InvocationContext, ProductionRuntime, Runtime};
pub use scheduler::TaskScheduler;
