//! Pool statistics reporter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Timing for the periodic pool statistics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Whether the report is scheduled at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Delay in seconds before the first report.
    #[serde(default)]
    pub initial_delay_seconds: u64,
    /// Seconds between report start times.
    #[serde(default = "default_period")]
    pub period_seconds: u64,
}

impl ReporterConfig {
    /// Initial delay as a [`Duration`].
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_seconds)
    }

    /// Period as a [`Duration`].
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    /// A zero period is only allowed while the reporter is disabled.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.enabled && self.period_seconds == 0 {
            return Err(AppError::validation(
                "reporter.period_seconds must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_seconds: 0,
            period_seconds: default_period(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_period() -> u64 {
    300
}
