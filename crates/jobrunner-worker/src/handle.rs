//! One-shot handle for the result of a submitted job.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::job::JobError;

/// Eventual outcome of one submission.
///
/// Resolves exactly once, with the job's value or its failure. Awaiting the
/// handle (or calling [`wait`](Self::wait)) suspends the caller only. If the
/// worker running the job goes away without delivering a result, as happens
/// on forced shutdown, the handle resolves with [`JobError::Cancelled`].
#[derive(Debug)]
#[must_use = "dropping a JobHandle discards the job's result"]
pub struct JobHandle<T> {
    /// Name of the submitted job
    job: String,
    /// Receiving half of the result slot
    receiver: oneshot::Receiver<Result<T, JobError>>,
}

impl<T> JobHandle<T> {
    /// Create a handle together with the sender the worker resolves it through
    pub(crate) fn channel(job: &str) -> (oneshot::Sender<Result<T, JobError>>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                job: job.to_string(),
                receiver,
            },
        )
    }

    /// Create a handle that is already resolved
    pub(crate) fn resolved(job: &str, result: Result<T, JobError>) -> Self {
        let (sender, handle) = Self::channel(job);
        let _ = sender.send(result);
        handle
    }

    /// Name of the job this handle belongs to
    pub fn job_name(&self) -> &str {
        &self.job
    }

    /// Wait for the result
    pub async fn wait(self) -> Result<T, JobError> {
        self.await
    }

    /// Wait for the result, giving up after `timeout`
    pub async fn wait_timeout(self, timeout: Duration) -> Result<T, JobError> {
        let job = self.job.clone();
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => Err(JobError::WaitTimeout { job, timeout }),
        }
    }

    /// Block the current thread until the result arrives.
    ///
    /// For synchronous callers only: this panics when called from within an
    /// asynchronous execution context.
    pub fn blocking_wait(self) -> Result<T, JobError> {
        let job = self.job;
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(JobError::Cancelled { job }))
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, JobError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(JobError::Cancelled {
                job: this.job.clone(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolved_handle() {
        let handle = JobHandle::resolved("j1", Ok(7));
        assert_eq!(handle.job_name(), "j1");
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_dropped_sender_is_cancellation() {
        let (sender, handle) = JobHandle::<u32>::channel("j2");
        drop(sender);
        let err = handle.wait().await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout() {
        let (_sender, handle) = JobHandle::<u32>::channel("slow");
        let err = handle
            .wait_timeout(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::WaitTimeout { ref job, .. } if job == "slow"));
    }

    #[test]
    fn test_blocking_wait_from_plain_thread() {
        let (sender, handle) = JobHandle::channel("sync");
        let waiter = std::thread::spawn(move || handle.blocking_wait());
        sender.send(Ok("done")).unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), "done");
    }
}
