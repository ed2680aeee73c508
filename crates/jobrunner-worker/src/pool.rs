//! Elastic worker pool: workers drain a shared queue and run submitted jobs.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{self, Instrument};

use jobrunner_core::config::pool::PoolConfig;
use jobrunner_core::error::{AppError, ErrorKind};
use jobrunner_core::result::AppResult;

use crate::executor;
use crate::handle::JobHandle;
use crate::job::{Job, JobError};
use crate::queue::{Dequeued, TaskQueue};
use crate::registry::InFlightRegistry;
use crate::shutdown::{self, ShutdownReport};

/// Bounded, elastic pool of workers executing [`Job`]s.
///
/// The pool keeps up to `core_workers` workers alive, grows toward
/// `max_workers` while queued work outnumbers idle workers, and retires the
/// extra workers after `keep_alive_seconds` without work.
///
/// Construct one pool at process start and share it by reference or `Arc`.
/// Dropping the pool closes its queue; queued work still runs to completion.
#[derive(Debug)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

#[derive(Debug)]
struct PoolShared {
    /// Pool configuration
    config: PoolConfig,
    /// Runtime the workers are spawned on
    runtime: Handle,
    /// Submitted work waiting for a worker
    queue: TaskQueue,
    /// Names of jobs between submission and resolution
    in_flight: InFlightRegistry,
    /// Join handles of spawned workers
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Live workers
    worker_count: AtomicUsize,
    /// Workers waiting for work
    idle_workers: AtomicUsize,
    /// Workers running a job
    active_workers: AtomicUsize,
    /// Sequence for worker names
    next_worker_id: AtomicUsize,
    /// Jobs accepted since construction
    submitted: AtomicU64,
    /// Jobs that ran to a result
    completed: AtomicU64,
    /// Shutdown has begun
    shutdown: AtomicBool,
    /// Shutdown has finished
    terminated: AtomicBool,
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Worker name prefix
    pub name_prefix: String,
    /// Configured core worker count
    pub core_workers: usize,
    /// Configured maximum worker count
    pub max_workers: usize,
    /// Workers currently alive
    pub pool_size: usize,
    /// Workers currently running a job
    pub active_workers: usize,
    /// Jobs that ran to a result
    pub completed_tasks: u64,
    /// Jobs accepted since construction
    pub submitted_tasks: u64,
    /// Shutdown has begun
    pub is_shutdown: bool,
    /// Shutdown has finished
    pub is_terminated: bool,
    /// Names of jobs in flight
    pub in_flight: Vec<String>,
    /// Jobs waiting for a worker
    pub queue_depth: usize,
}

impl WorkerPool {
    /// Create a pool on the current Tokio runtime.
    ///
    /// Workers are spawned lazily as jobs arrive.
    pub fn new(config: PoolConfig) -> AppResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            AppError::with_source(
                ErrorKind::Internal,
                "WorkerPool must be created inside a Tokio runtime",
                e,
            )
        })?;

        tracing::info!(
            "Worker pool '{}' created: core={}, max={}, keep_alive={}s",
            config.name_prefix,
            config.core_workers,
            config.max_workers,
            config.keep_alive_seconds
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                runtime,
                queue: TaskQueue::new(),
                in_flight: InFlightRegistry::new(),
                workers: Mutex::new(Vec::new()),
                worker_count: AtomicUsize::new(0),
                idle_workers: AtomicUsize::new(0),
                active_workers: AtomicUsize::new(0),
                next_worker_id: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
            }),
        })
    }

    /// Submit a job and get a handle to its eventual result.
    ///
    /// The job's name is in flight from this call until the handle resolves.
    /// After shutdown has begun the handle resolves with
    /// [`JobError::Rejected`].
    pub fn submit<J: Job>(&self, job: J) -> JobHandle<J::Output> {
        let name = job.name().to_string();
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return self.reject(&name);
        }

        let (sender, handle) = JobHandle::channel(&name);
        let guard = self.shared.in_flight.track(&name);
        let shared = Arc::clone(&self.shared);

        let task = async move {
            let result = executor::execute(&job).await;
            drop(guard);
            shared.completed.fetch_add(1, Ordering::SeqCst);
            if sender.send(result).is_err() {
                tracing::trace!("Result of job '{}' discarded, handle dropped", job.name());
            }
        }
        .boxed();

        if self.shared.queue.push(task).is_err() {
            return self.reject(&name);
        }
        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "Enqueued job '{}', queue depth={}",
            name,
            self.shared.queue.depth()
        );

        self.shared.ensure_workers();
        handle
    }

    /// Submit a job and run `on_result` with its value once it succeeds.
    ///
    /// The callback runs on the pool's runtime. Failures never reach it: they
    /// are logged at debug level and dropped. Use
    /// [`submit_with_result_callback`](Self::submit_with_result_callback)
    /// to observe them.
    pub fn submit_with_callback<J, F>(&self, job: J, on_result: F)
    where
        J: Job,
        F: FnOnce(J::Output) + Send + 'static,
    {
        let handle = self.submit(job);
        self.shared.runtime.spawn(async move {
            let name = handle.job_name().to_string();
            match handle.await {
                Ok(value) => on_result(value),
                Err(e) => {
                    tracing::debug!("Callback skipped for failed job '{}': {}", name, e);
                }
            }
        });
    }

    /// Submit a job and run `on_result` with its full outcome.
    pub fn submit_with_result_callback<J, F>(&self, job: J, on_result: F)
    where
        J: Job,
        F: FnOnce(Result<J::Output, JobError>) + Send + 'static,
    {
        let handle = self.submit(job);
        self.shared.runtime.spawn(async move {
            on_result(handle.await);
        });
    }

    /// Snapshot of the pool's counters and in-flight jobs.
    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            name_prefix: shared.config.name_prefix.clone(),
            core_workers: shared.config.core_workers,
            max_workers: shared.config.max_workers,
            pool_size: shared.worker_count.load(Ordering::SeqCst),
            active_workers: shared.active_workers.load(Ordering::SeqCst),
            completed_tasks: shared.completed.load(Ordering::SeqCst),
            submitted_tasks: shared.submitted.load(Ordering::SeqCst),
            is_shutdown: shared.shutdown.load(Ordering::SeqCst),
            is_terminated: shared.terminated.load(Ordering::SeqCst),
            in_flight: shared.in_flight.snapshot(),
            queue_depth: shared.queue.depth(),
        }
    }

    /// Sorted names of jobs in flight
    pub fn in_flight_jobs(&self) -> Vec<String> {
        self.shared.in_flight.snapshot()
    }

    /// Whether a job with this name is in flight
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.shared.in_flight.contains(name)
    }

    /// Worker name prefix
    pub fn name_prefix(&self) -> &str {
        &self.shared.config.name_prefix
    }

    /// Whether shutdown has begun
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Whether shutdown has finished
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::SeqCst)
    }

    /// Shut down using the configured grace period.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_with_timeout(self.shared.config.shutdown_timeout())
            .await
    }

    /// Stop accepting jobs and drain the queue.
    ///
    /// Queued and running jobs get `grace` to finish. After that, running
    /// jobs are aborted and queued ones discarded; their handles resolve with
    /// [`JobError::Cancelled`].
    pub async fn shutdown_with_timeout(&self, grace: Duration) -> ShutdownReport {
        let shared = &self.shared;
        if shared.shutdown.swap(true, Ordering::SeqCst) {
            return ShutdownReport::already_stopped();
        }

        tracing::info!(
            "Worker pool '{}' shutting down: {} queued, {} in flight, grace={:?}",
            shared.config.name_prefix,
            shared.queue.depth(),
            shared.in_flight.len(),
            grace
        );

        shared.queue.close();

        let deadline = Instant::now() + grace;
        let mut aborted_tasks = 0;
        loop {
            let handles = std::mem::take(
                &mut *shared.workers.lock().unwrap_or_else(|e| e.into_inner()),
            );
            if handles.is_empty() {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            aborted_tasks += shutdown::join_or_abort(handles, remaining).await;
        }

        let dropped_tasks = shared.queue.discard_pending().await;

        shared.worker_count.store(0, Ordering::SeqCst);
        shared.idle_workers.store(0, Ordering::SeqCst);
        shared.active_workers.store(0, Ordering::SeqCst);
        shared.terminated.store(true, Ordering::SeqCst);

        let report = ShutdownReport {
            graceful: aborted_tasks == 0 && dropped_tasks == 0,
            aborted_tasks,
            dropped_tasks,
        };

        if report.graceful {
            tracing::info!("Worker pool '{}' shut down", shared.config.name_prefix);
        } else {
            tracing::warn!(
                "Worker pool '{}' forced shutdown: {} aborted, {} discarded",
                shared.config.name_prefix,
                aborted_tasks,
                dropped_tasks
            );
        }

        report
    }

    fn reject<T>(&self, name: &str) -> JobHandle<T> {
        tracing::warn!(
            "Rejected job '{}': pool '{}' is shut down",
            name,
            self.shared.config.name_prefix
        );
        JobHandle::resolved(
            name,
            Err(JobError::Rejected {
                job: name.to_string(),
            }),
        )
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.queue.close();
    }
}

impl PoolShared {
    /// Spawn a worker when below core size, or when queued work outnumbers
    /// idle workers and the pool is below its maximum.
    fn ensure_workers(self: &Arc<Self>) {
        if self.try_reserve_worker(self.config.core_workers) {
            self.spawn_worker();
            return;
        }

        let idle = self.idle_workers.load(Ordering::SeqCst);
        if self.queue.depth() > idle && self.try_reserve_worker(self.config.max_workers) {
            self.spawn_worker();
        }
    }

    fn try_reserve_worker(&self, limit: usize) -> bool {
        self.worker_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < limit).then_some(count + 1)
            })
            .is_ok()
    }

    fn try_retire_worker(&self) -> bool {
        let core = self.config.core_workers;
        self.worker_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count > core).then(|| count - 1)
            })
            .is_ok()
    }

    fn spawn_worker(self: &Arc<Self>) {
        let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst) + 1;
        let worker_name = format!("{}-{}", self.config.name_prefix, id);
        let span = tracing::info_span!("worker", id = %worker_name);
        let shared = Arc::clone(self);

        let handle = self
            .runtime
            .spawn(async move { shared.work(worker_name).await }.instrument(span));

        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.retain(|h| !h.is_finished());
        workers.push(handle);
    }

    async fn work(&self, worker_name: String) {
        tracing::debug!("Worker '{}' started", worker_name);
        let keep_alive = self.config.keep_alive();

        loop {
            self.idle_workers.fetch_add(1, Ordering::SeqCst);
            let next = self.queue.pop(keep_alive).await;
            self.idle_workers.fetch_sub(1, Ordering::SeqCst);

            match next {
                Dequeued::Task(task) => {
                    self.active_workers.fetch_add(1, Ordering::SeqCst);
                    if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                        tracing::error!("Worker '{}' recovered from a panicking task", worker_name);
                    }
                    self.active_workers.fetch_sub(1, Ordering::SeqCst);
                }
                Dequeued::Idle => {
                    if self.try_retire_worker() {
                        tracing::debug!("Worker '{}' retired after idling", worker_name);
                        return;
                    }
                    tracing::trace!("Worker '{}' idle", worker_name);
                }
                Dequeued::Closed => break,
            }
        }

        self.worker_count.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("Worker '{}' stopped", worker_name);
    }
}
