//! Runs the fast-test client through the scheduler and dispatcher with
//! in-memory ports and prints the audit trail.
//!
//! Usage: `dss-chunkedtask-local [units]`

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dss_chunkedtask::{
    memory::{MemoryAuditLog, MemoryPublisher, StaticIdentity},
    registry::{CLIENTS, FAST_TEST_CLIENT_NAME},
    DispatchOutcome, InvocationContext, TaskDispatcher, TaskScheduler,
};
use dss_core::{telemetry::init_tracing, Config, RealClock};
use tracing::info;

const INVOCATION_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    let units: u64 = match std::env::args().nth(1) {
        Some(raw) => raw.parse().context("units must be a non-negative integer")?,
        None => 5,
    };

    let audit = Arc::new(MemoryAuditLog::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let clock = Arc::new(RealClock::new());

    let scheduler = TaskScheduler::from_config(
        &config,
        publisher.clone(),
        audit.clone(),
        Arc::new(StaticIdentity::new("000000000000", "us-east-1")),
    );
    let task_id = scheduler
        .schedule_task(FAST_TEST_CLIENT_NAME, serde_json::json!({ "remaining": units }))
        .await?;
    info!(%task_id, units, "task scheduled");

    let dispatcher = TaskDispatcher::new(CLIENTS, audit.clone(), clock.clone());
    for (topic, message) in publisher.messages().await {
        let context = InvocationContext::with_timeout(
            format!("local-{task_id}"),
            clock.as_ref(),
            INVOCATION_TIMEOUT,
        );
        info!(%topic, "dispatching");
        match dispatcher.dispatch_message(context, &message).await {
            DispatchOutcome::Ran(outcome) => info!(?outcome, "task ran"),
            DispatchOutcome::Rejected(error) => anyhow::bail!("task rejected: {error}"),
            DispatchOutcome::Failed(error) => anyhow::bail!("task failed: {error}"),
        }
    }

    for (key, entry) in audit.entries().await {
        println!("{key}\t{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}
