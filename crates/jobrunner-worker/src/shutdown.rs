//! Shutdown outcome shared by the pool and the scheduled runner.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing;

/// What happened during a shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Everything finished within the grace period
    pub graceful: bool,
    /// Tasks that were still running at the deadline and got aborted
    pub aborted_tasks: usize,
    /// Queued work discarded without running
    pub dropped_tasks: usize,
}

impl ShutdownReport {
    /// Report for a shutdown that had nothing left to do
    pub fn already_stopped() -> Self {
        Self {
            graceful: true,
            ..Self::default()
        }
    }
}

/// Wait for `handles` until `grace` elapses, then abort the stragglers.
///
/// Returns the number of aborted tasks.
pub(crate) async fn join_or_abort(handles: Vec<JoinHandle<()>>, grace: Duration) -> usize {
    let deadline = Instant::now() + grace;
    let mut aborted = 0;

    for mut handle in handles {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => {
                tracing::error!("Task panicked during shutdown: {}", e);
            }
            Ok(Err(_)) => {}
            Err(_) => {
                handle.abort();
                let _ = handle.await;
                aborted += 1;
            }
        }
    }

    aborted
}
