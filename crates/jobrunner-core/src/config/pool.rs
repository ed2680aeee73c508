//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Elastic worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers kept alive while idle.
    #[serde(default = "default_core_workers")]
    pub core_workers: usize,
    /// Upper bound the pool may grow to under queue pressure.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Idle time in seconds after which a worker above the core count retires.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
    /// Prefix used to identify workers in logs.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Graceful drain bound in seconds before running jobs are cancelled.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl PoolConfig {
    /// Create a configuration with explicit worker bounds and defaults elsewhere.
    pub fn with_workers(core_workers: usize, max_workers: usize) -> Self {
        Self {
            core_workers,
            max_workers,
            ..Self::default()
        }
    }

    /// Idle keep-alive as a [`Duration`].
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    /// Shutdown bound as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Check worker bounds.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.core_workers == 0 {
            return Err(AppError::validation("pool.core_workers must be at least 1"));
        }
        if self.max_workers < self.core_workers {
            return Err(AppError::validation(format!(
                "pool.max_workers ({}) must not be below pool.core_workers ({})",
                self.max_workers, self.core_workers
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_workers: default_core_workers(),
            max_workers: default_max_workers(),
            keep_alive_seconds: default_keep_alive(),
            name_prefix: default_name_prefix(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_core_workers() -> usize {
    available_parallelism() * 2
}

fn default_max_workers() -> usize {
    available_parallelism() * 4
}

fn default_keep_alive() -> u64 {
    60
}

fn default_name_prefix() -> String {
    "worker".to_string()
}

fn default_shutdown_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_core_rejected() {
        let config = PoolConfig::with_workers(0, 4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_equal_bounds_accepted() {
        let config = PoolConfig::with_workers(2, 2);
        assert!(config.validate().is_ok());
        assert_eq!(config.keep_alive(), Duration::from_secs(60));
    }
}
