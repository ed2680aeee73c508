//! Job executor — runs one submission with its retry policy.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tracing;

use crate::job::{Job, JobError};

/// Execute one submission of `job`, applying its retry policy.
///
/// `on_failure` is invoked at most once, and only when the submission fails
/// terminally. A panic escaping the retry logic itself is caught here and
/// treated as a terminal failure.
pub(crate) async fn execute<J: Job>(job: &J) -> Result<J::Output, JobError> {
    let reported = AtomicBool::new(false);

    match AssertUnwindSafe(execute_with_policy(job, &reported))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => {
            let err = JobError::from_panic(job.name(), payload);
            tracing::error!("Worker harness failed for job '{}': {}", job.name(), err);
            report_failure(job, &err, &reported);
            Err(err)
        }
    }
}

async fn execute_with_policy<J: Job>(
    job: &J,
    reported: &AtomicBool,
) -> Result<J::Output, JobError> {
    tracing::info!(
        "Starting job '{}' (retryable={}, max_retries={})",
        job.name(),
        job.is_retryable(),
        job.max_retries()
    );

    if !job.is_retryable() {
        return match attempt(job).await {
            Ok(value) => {
                tracing::debug!("Job '{}' completed", job.name());
                Ok(value)
            }
            Err(err) => {
                tracing::error!("Job '{}' failed: {}", job.name(), err);
                report_failure(job, &err, reported);
                Err(err)
            }
        };
    }

    let max_retries = job.max_retries();
    if max_retries == 0 {
        let err = JobError::NoRetryBudget {
            job: job.name().to_string(),
        };
        tracing::error!("Job '{}' failed: {}", job.name(), err);
        report_failure(job, &err, reported);
        return Err(err);
    }

    let mut retries = 0;
    loop {
        match attempt(job).await {
            Ok(value) => {
                tracing::debug!(
                    "Job '{}' completed after {} failed attempt(s)",
                    job.name(),
                    retries
                );
                return Ok(value);
            }
            Err(err) => {
                retries += 1;
                tracing::warn!(
                    "Retry job '{}', count={}/{}, error: {}",
                    job.name(),
                    retries,
                    max_retries,
                    err
                );
                if retries >= max_retries {
                    tracing::error!(
                        "Job '{}' failed after {} attempts: {}",
                        job.name(),
                        retries,
                        err
                    );
                    report_failure(job, &err, reported);
                    return Err(err);
                }
            }
        }
    }
}

/// Run `execute` once, turning a panic into a [`JobError::Panicked`].
pub(crate) async fn attempt<J: Job>(job: &J) -> Result<J::Output, JobError> {
    match AssertUnwindSafe(job.execute()).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(JobError::from_panic(job.name(), payload)),
    }
}

/// Invoke the failure hook unless it already ran for this submission.
fn report_failure<J: Job>(job: &J, err: &JobError, reported: &AtomicBool) {
    if reported.swap(true, Ordering::AcqRel) {
        return;
    }
    invoke_on_failure(job, err);
}

/// Invoke the failure hook, containing any panic it raises.
pub(crate) fn invoke_on_failure<J: Job>(job: &J, err: &JobError) {
    let hook = std::panic::catch_unwind(AssertUnwindSafe(|| job.on_failure(err)));
    if hook.is_err() {
        tracing::error!("Failure hook of job '{}' panicked", job.name());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Fails until `succeed_on` attempts have been made
    struct FlakyJob {
        retryable: bool,
        max_retries: u32,
        succeed_on: Option<u32>,
        calls: AtomicU32,
        failures: AtomicU32,
    }

    impl FlakyJob {
        fn new(retryable: bool, max_retries: u32, succeed_on: Option<u32>) -> Self {
            Self {
                retryable,
                max_retries,
                succeed_on,
                calls: AtomicU32::new(0),
                failures: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Job for FlakyJob {
        type Output = &'static str;

        fn name(&self) -> &str {
            "flaky"
        }

        fn is_retryable(&self) -> bool {
            self.retryable
        }

        fn max_retries(&self) -> u32 {
            self.max_retries
        }

        async fn execute(&self) -> Result<&'static str, JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_on {
                Some(n) if call >= n => Ok("ok"),
                _ => Err(JobError::failed(format!("attempt {call} failed"))),
            }
        }

        fn on_failure(&self, _error: &JobError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_non_retryable_success() {
        let job = FlakyJob::new(false, 10, Some(1));
        assert_eq!(execute(&job).await.unwrap(), "ok");
        assert_eq!(job.calls.load(Ordering::SeqCst), 1);
        assert_eq!(job.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_runs_once() {
        let job = FlakyJob::new(false, 10, None);
        let err = execute(&job).await.unwrap_err();
        assert_eq!(err.to_string(), "Job execution failed: attempt 1 failed");
        assert_eq!(job.calls.load(Ordering::SeqCst), 1);
        assert_eq!(job.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_stops_at_first_success() {
        let job = FlakyJob::new(true, 3, Some(3));
        assert_eq!(execute(&job).await.unwrap(), "ok");
        assert_eq!(job.calls.load(Ordering::SeqCst), 3);
        assert_eq!(job.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_last_error() {
        let job = FlakyJob::new(true, 4, None);
        let err = execute(&job).await.unwrap_err();
        assert_eq!(err.to_string(), "Job execution failed: attempt 4 failed");
        assert_eq!(job.calls.load(Ordering::SeqCst), 4);
        assert_eq!(job.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_never_executes() {
        let job = FlakyJob::new(true, 0, Some(1));
        let err = execute(&job).await.unwrap_err();
        assert!(matches!(err, JobError::NoRetryBudget { ref job } if job == "flaky"));
        assert_eq!(job.calls.load(Ordering::SeqCst), 0);
        assert_eq!(job.failures.load(Ordering::SeqCst), 1);
    }

    struct PanickingJob {
        failures: AtomicU32,
    }

    #[async_trait]
    impl Job for PanickingJob {
        type Output = ();

        fn name(&self) -> &str {
            "panicky"
        }

        async fn execute(&self) -> Result<(), JobError> {
            panic!("exploded");
        }

        fn on_failure(&self, _error: &JobError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            panic!("hook exploded too");
        }
    }

    #[tokio::test]
    async fn test_panics_become_failures() {
        let job = PanickingJob {
            failures: AtomicU32::new(0),
        };
        let err = execute(&job).await.unwrap_err();
        assert!(
            matches!(err, JobError::Panicked { ref message, .. } if message == "exploded")
        );
        assert_eq!(job.failures.load(Ordering::SeqCst), 1);
    }
}
