//! Shared primitives for the DSS asynchronous execution backbone.
//!
//! Holds the deployment configuration, the deployment stage that gates
//! security checks, the injectable clock used for queue timestamps and
//! runtime deadlines, and the tracing bootstrap used by worker binaries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod telemetry;
pub mod time;

pub use config::{Config, DeploymentStage};
pub use time::{Clock, RealClock, TestClock};
