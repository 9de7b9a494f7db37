//! Delivers one notification to a callback URL, retrying through an
//! in-memory queue until it succeeds or the attempt budget runs out.
//!
//! Usage: `dss-notify-deliver <callback-url> [json-body]`

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dss_core::{telemetry::init_tracing, Config, RealClock};
use dss_notify::{
    memory::MemoryQueue, DeliveryClient, NewNotification, Notification, NotificationQueue,
    NotificationWorker, NotifySettings, SystemResolver, WorkerConfig, WorkerOutcome,
};
use tracing::{info, warn};

const RETRY_PAUSE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    let mut args = std::env::args().skip(1);
    let url = args.next().context("usage: dss-notify-deliver <callback-url> [json-body]")?;
    let body = match args.next() {
        Some(raw) => serde_json::from_str(&raw).context("body is not valid JSON")?,
        None => serde_json::json!({}),
    };

    info!(stage = %config.deployment_stage, attempts = config.notify_attempts, "configuration loaded");

    let notification = Notification::create(
        NewNotification::new(notification_id(), "local", url, body),
        &NotifySettings::from_config(&config),
        &SystemResolver,
    )
    .await?;

    let clock = Arc::new(RealClock::new());
    let queue = Arc::new(MemoryQueue::new());
    queue.enqueue(notification.to_wire_message(clock.as_ref())).await?;

    let worker = NotificationWorker::new(
        queue.clone(),
        DeliveryClient::with_defaults()?,
        clock,
        WorkerConfig::from_config(&config),
    );

    while let Some(message) = queue.receive().await {
        match worker.handle(&message).await? {
            WorkerOutcome::Delivered => info!("delivered"),
            WorkerOutcome::Requeued { attempts_left } => {
                warn!(attempts_left, "delivery failed, retrying");
                tokio::time::sleep(RETRY_PAUSE).await;
            },
            WorkerOutcome::Dropped { reason } => anyhow::bail!("delivery abandoned: {reason}"),
        }
    }

    Ok(())
}

fn notification_id() -> String {
    let mut raw = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut raw);
    hex::encode(raw)
}
