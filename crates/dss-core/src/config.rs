//! Deployment configuration for task dispatch and notification delivery.

use std::{fmt, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "dss.toml";

/// Deployment stage of the running process.
///
/// Production enables the strict notification URL checks: HTTPS only, and
/// callback hosts must resolve exclusively to globally routable addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStage {
    /// Developer sandbox.
    Dev,
    /// Shared integration environment.
    Integration,
    /// Pre-production staging.
    Staging,
    /// Production.
    Prod,
}

impl DeploymentStage {
    /// Returns `true` for the production stage.
    pub fn is_prod(self) -> bool {
        matches!(self, Self::Prod)
    }

    /// Returns the stage name as used in environment variables.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Integration => "integration",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for DeploymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(Self::Dev),
            "integration" => Ok(Self::Integration),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            other => anyhow::bail!("unknown deployment stage '{other}'"),
        }
    }
}

/// Process-wide configuration.
///
/// Loaded in priority order:
/// 1. Environment variables (`DSS_*` and `RUST_LOG`)
/// 2. Configuration file (`dss.toml`)
/// 3. Built-in defaults
///
/// # Example
///
/// ```no_run
/// use dss_core::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
/// println!("running in {}", config.deployment_stage);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Deployment stage.
    ///
    /// Environment variable: `DSS_DEPLOYMENT_STAGE`
    #[serde(default = "default_stage")]
    pub deployment_stage: DeploymentStage,

    /// Delivery attempts given to a notification created without an
    /// explicit budget.
    ///
    /// Environment variable: `DSS_NOTIFY_ATTEMPTS`
    #[serde(default = "default_notify_attempts")]
    pub notify_attempts: u32,

    /// Timeout for a single webhook delivery in seconds.
    ///
    /// Environment variable: `DSS_NOTIFY_TIMEOUT_SECONDS`
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_seconds: u64,

    /// Name of the pub/sub topic chunked-task workers subscribe to.
    ///
    /// Environment variable: `DSS_CHUNKED_TASK_TOPIC`
    #[serde(default = "default_topic")]
    pub chunked_task_topic: String,

    /// Log filter used when `RUST_LOG` is not set.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `dss.toml` and the environment,
    /// then validates it.
    pub fn load() -> Result<Self> {
        let config: Self = Self::figment().extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the layered figment `load` extracts from.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("DSS_"))
            .merge(Env::raw().only(&["RUST_LOG"]))
    }

    /// Timeout for a single delivery attempt.
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.notify_attempts == 0 {
            anyhow::bail!("notify_attempts must be greater than 0");
        }

        if self.notify_timeout_seconds == 0 {
            anyhow::bail!("notify_timeout_seconds must be greater than 0");
        }

        if self.chunked_task_topic.trim().is_empty() {
            anyhow::bail!("chunked_task_topic must not be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deployment_stage: default_stage(),
            notify_attempts: default_notify_attempts(),
            notify_timeout_seconds: default_notify_timeout(),
            chunked_task_topic: default_topic(),
            rust_log: default_log_level(),
        }
    }
}

fn default_stage() -> DeploymentStage {
    DeploymentStage::Dev
}

fn default_notify_attempts() -> u32 {
    10
}

fn default_notify_timeout() -> u64 {
    30
}

fn default_topic() -> String {
    "dss-chunked-task-worker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
