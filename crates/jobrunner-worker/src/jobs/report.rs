//! Periodic worker pool statistics report.

use std::sync::Arc;

use async_trait::async_trait;
use tracing;

use crate::job::{Job, JobError};
use crate::pool::{PoolStats, WorkerPool};

/// Logs a snapshot of a worker pool's statistics as JSON
#[derive(Debug)]
pub struct PoolReportJob {
    /// Pool being reported on
    pool: Arc<WorkerPool>,
    /// Job name, derived from the pool's prefix
    name: String,
}

impl PoolReportJob {
    /// Create a report job for `pool`
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        let name = format!("pool_report@{}", pool.name_prefix());
        Self { pool, name }
    }
}

#[async_trait]
impl Job for PoolReportJob {
    type Output = PoolStats;

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<PoolStats, JobError> {
        let stats = self.pool.stats();
        let report = serde_json::to_string(&stats)
            .map_err(|e| JobError::failed(format!("Failed to serialize pool stats: {}", e)))?;

        tracing::info!("Worker pool report: {}", report);
        Ok(stats)
    }
}
