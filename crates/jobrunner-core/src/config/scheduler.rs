//! Scheduled runner configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Fixed-rate scheduled runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of firings executing at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Prefix used to identify scheduled registrations in logs.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Seconds to wait for in-flight firings on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl SchedulerConfig {
    /// Shutdown bound as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Check the firing pool size.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.workers == 0 {
            return Err(AppError::validation("scheduler.workers must be at least 1"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            name_prefix: default_name_prefix(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_name_prefix() -> String {
    "scheduled".to_string()
}

fn default_shutdown_timeout() -> u64 {
    60
}
