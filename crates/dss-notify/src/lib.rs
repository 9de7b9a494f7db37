//! Webhook notifications for DSS subscriptions.
//!
//! A subscription with a callback URL turns matching events into
//! [`Notification`]s. A notification is validated once at creation,
//! travels through a FIFO queue as a [`QueueMessage`] and is delivered by a
//! [`NotificationWorker`] that owns the retry budget.
//!
//! # Delivery
//!
//! 1. **Create** - check the callback URL against the deployment stage and
//!    encode the body for the queue
//! 2. **Enqueue** - serialize to a queue message keyed by notification and
//!    subscription id
//! 3. **Deliver** - build the HTTP request (attempt header, optional
//!    HMAC signature, JSON or multipart body) and send it without following
//!    redirects
//! 4. **Retry** - on failure spend one attempt and re-enqueue while the
//!    budget lasts
//!
//! # Example
//!
//! ```no_run
//! use dss_core::Config;
//! use dss_notify::{NewNotification, Notification, NotifySettings, SystemResolver};
//! use serde_json::json;
//!
//! # async fn example(config: Config) -> dss_notify::Result<()> {
//! let settings = NotifySettings::from_config(&config);
//! let notification = Notification::create(
//!     NewNotification::new("n-1", "sub-1", "https://hooks.example.com/dss", json!({"bundle": "b1"})),
//!     &settings,
//!     &SystemResolver,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod guard;
pub mod memory;
pub mod multipart;
pub mod notification;
pub mod queue;
pub mod retry;
pub mod signing;
pub mod worker;

pub use client::{ClientConfig, DeliveryClient, DeliveryResponse, PreparedRequest};
pub use endpoint::{BodyEncoding, Endpoint, EndpointPatch};
pub use error::{DeliveryError, ErrorCategory, NotifyError, Result};
pub use guard::{HostResolver, SystemResolver};
pub use notification::{NewNotification, Notification, NotifySettings, ATTEMPT_HEADER};
pub use queue::{MessageAttribute, NotificationQueue, QueueMessage};
pub use retry::RetryDecision;
pub use signing::HttpSignature;
pub use worker::{NotificationWorker, WorkerConfig, WorkerOutcome, WorkerStats};
