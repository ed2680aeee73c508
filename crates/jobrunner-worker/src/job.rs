//! Job contract and job-level errors.

use std::time::Duration;

use async_trait::async_trait;

use jobrunner_core::error::AppError;

/// A unit of work that can be submitted to a [`WorkerPool`](crate::WorkerPool)
/// or registered with a [`ScheduledRunner`](crate::ScheduledRunner).
///
/// The name is the key used for in-flight tracking, so it should be unique
/// per logical job instance.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Value produced by a successful execution.
    type Output: Send + 'static;

    /// Name of this job, stable for the duration of a submission.
    fn name(&self) -> &str;

    /// Whether failed executions are retried.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Total number of attempts allowed when retry is enabled.
    fn max_retries(&self) -> u32 {
        0
    }

    /// Run the job once.
    async fn execute(&self) -> Result<Self::Output, JobError>;

    /// Called once when a submission or firing terminally fails.
    fn on_failure(&self, _error: &JobError) {}
}

/// Failure of a single job submission.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The job reported a failure from `execute`.
    #[error("Job execution failed: {0}")]
    Failed(String),

    /// The job propagated an application error.
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),

    /// The job or its harness panicked.
    #[error("Job '{job}' panicked: {message}")]
    Panicked {
        /// Job name
        job: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// Retry was enabled with a budget of zero attempts.
    #[error("Job '{job}' is retryable but has no retry budget")]
    NoRetryBudget {
        /// Job name
        job: String,
    },

    /// The job was cancelled before it could deliver a result.
    #[error("Job '{job}' was cancelled")]
    Cancelled {
        /// Job name
        job: String,
    },

    /// The pool was already shutting down when the job was submitted.
    #[error("Job '{job}' rejected: pool is shut down")]
    Rejected {
        /// Job name
        job: String,
    },

    /// A bounded wait on the result elapsed.
    #[error("Timed out after {timeout:?} waiting for job '{job}'")]
    WaitTimeout {
        /// Job name
        job: String,
        /// The bound that elapsed
        timeout: Duration,
    },
}

impl JobError {
    /// Create an execution failure from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this failure came from shutdown cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Build a panic failure from a caught panic payload.
    pub(crate) fn from_panic(job: &str, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked {
            job: job.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_panic_extracts_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let err = JobError::from_panic("j1", payload);
        assert_eq!(err.to_string(), "Job 'j1' panicked: boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        match JobError::from_panic("j2", payload) {
            JobError::Panicked { job, message } => {
                assert_eq!(job, "j2");
                assert_eq!(message, "owned boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_app_error_converts() {
        let err: JobError = AppError::internal("db down").into();
        assert!(matches!(err, JobError::Internal(_)));
        assert!(!err.is_cancelled());
        assert!(
            JobError::Cancelled {
                job: "x".to_string()
            }
            .is_cancelled()
        );
    }
}
