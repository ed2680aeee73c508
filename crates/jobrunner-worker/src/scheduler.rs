//! Fixed-rate scheduler that fires registered jobs on a timer.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{self, Instrument};

use jobrunner_core::config::scheduler::SchedulerConfig;
use jobrunner_core::error::{AppError, ErrorKind};
use jobrunner_core::result::AppResult;

use crate::executor;
use crate::job::Job;
use crate::registry::InFlightRegistry;
use crate::shutdown::{self, ShutdownReport};

/// Lifecycle of one scheduled registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    /// Not firing: not yet started, cancelled, or shut down
    Idle,
    /// Waiting for the next firing
    Waiting {
        /// When the next firing is due
        next_fire: Instant,
    },
    /// A firing is running
    Executing,
}

/// Runs registered jobs at a fixed rate.
///
/// Each registration fires after its initial delay and then once per
/// period, measured start to start. A registration never overlaps itself;
/// late firings are caught up back to back. At most `workers` firings run at
/// the same time across all registrations. Failed firings are logged and
/// reported to the job's failure hook without affecting later firings.
#[derive(Debug)]
pub struct ScheduledRunner {
    /// Scheduler configuration
    config: SchedulerConfig,
    /// Runtime registrations are spawned on
    runtime: Handle,
    /// Limits concurrent firings
    permits: Arc<Semaphore>,
    /// Names of jobs currently firing
    executing: InFlightRegistry,
    /// Parent of every registration's cancellation token
    cancel: CancellationToken,
    /// Join handles of registration loops
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Sequence for registration names
    next_id: AtomicUsize,
    /// Shutdown has begun
    shutdown: AtomicBool,
}

/// Handle to one registration.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    shared: Arc<RegistrationShared>,
}

#[derive(Debug)]
struct RegistrationShared {
    /// Job name
    name: String,
    /// Current state
    state: watch::Sender<ScheduleState>,
    /// Firings started
    firings: AtomicU64,
    /// Firings that failed
    failures: AtomicU64,
    /// Stops this registration only
    cancel: CancellationToken,
}

impl ScheduledJob {
    /// Name of the scheduled job
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current state of the registration
    pub fn state(&self) -> ScheduleState {
        *self.shared.state.borrow()
    }

    /// Number of firings started so far
    pub fn firings(&self) -> u64 {
        self.shared.firings.load(Ordering::SeqCst)
    }

    /// Number of firings that failed
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::SeqCst)
    }

    /// Stop future firings of this registration. A running firing completes.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// Whether the registration will fire again
    pub fn is_active(&self) -> bool {
        !self.shared.cancel.is_cancelled()
    }
}

impl ScheduledRunner {
    /// Create a runner on the current Tokio runtime.
    pub fn new(config: SchedulerConfig) -> AppResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            AppError::with_source(
                ErrorKind::Internal,
                "ScheduledRunner must be created inside a Tokio runtime",
                e,
            )
        })?;

        tracing::info!(
            "Scheduled runner '{}' created with {} firing slot(s)",
            config.name_prefix,
            config.workers
        );

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.workers)),
            config,
            runtime,
            executing: InFlightRegistry::new(),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Fire `job` after `initial_delay`, then every `period`.
    ///
    /// The job's retry policy is not applied here; each firing calls
    /// `execute` once.
    pub fn submit<J: Job>(
        &self,
        job: J,
        initial_delay: Duration,
        period: Duration,
    ) -> AppResult<ScheduledJob> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(AppError::service_unavailable(format!(
                "Scheduled runner '{}' is shut down",
                self.config.name_prefix
            )));
        }
        if period.is_zero() {
            return Err(AppError::validation(format!(
                "Period for scheduled job '{}' must be greater than zero",
                job.name()
            )));
        }

        let start = Instant::now() + initial_delay;
        let registration = ScheduledJob {
            shared: Arc::new(RegistrationShared {
                name: job.name().to_string(),
                state: watch::Sender::new(ScheduleState::Waiting { next_fire: start }),
                firings: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                cancel: self.cancel.child_token(),
            }),
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let span = tracing::info_span!(
            "schedule",
            id = %format!("{}-{}", self.config.name_prefix, id),
            job = %job.name()
        );
        let fire_loop = FireLoop {
            job,
            shared: Arc::clone(&registration.shared),
            permits: Arc::clone(&self.permits),
            executing: self.executing.clone(),
        };

        let handle = self
            .runtime
            .spawn(fire_loop.run(start, period).instrument(span));

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);

        tracing::info!(
            "Registered: {} (initial delay {:?}, every {:?})",
            registration.name(),
            initial_delay,
            period
        );
        Ok(registration)
    }

    /// Sorted names of jobs currently firing
    pub fn executing_jobs(&self) -> Vec<String> {
        self.executing.snapshot()
    }

    /// Name prefix of this runner
    pub fn name_prefix(&self) -> &str {
        &self.config.name_prefix
    }

    /// Whether shutdown has begun
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Shut down using the configured timeout.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_with_timeout(self.config.shutdown_timeout())
            .await
    }

    /// Stop all future firings and wait up to `timeout` for running ones.
    ///
    /// Firings still running at the deadline are aborted.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> ShutdownReport {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return ShutdownReport::already_stopped();
        }

        tracing::info!(
            "Scheduled runner '{}' shutting down, {} firing(s) in progress",
            self.config.name_prefix,
            self.executing.len()
        );
        self.cancel.cancel();

        let handles =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        let aborted_tasks = shutdown::join_or_abort(handles, timeout).await;
        self.permits.close();

        if aborted_tasks == 0 {
            tracing::info!("Scheduled runner '{}' shut down", self.config.name_prefix);
        } else {
            tracing::warn!(
                "Scheduled runner '{}' forced shutdown: {} firing(s) aborted",
                self.config.name_prefix,
                aborted_tasks
            );
        }

        ShutdownReport {
            graceful: aborted_tasks == 0,
            aborted_tasks,
            dropped_tasks: 0,
        }
    }
}

/// Timer loop for one registration.
struct FireLoop<J> {
    job: J,
    shared: Arc<RegistrationShared>,
    permits: Arc<Semaphore>,
    executing: InFlightRegistry,
}

impl<J: Job> FireLoop<J> {
    async fn run(self, start: Instant, period: Duration) {
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut next_fire = start;
        let _idle = IdleOnExit(Arc::clone(&self.shared));

        loop {
            self.shared
                .state
                .send_replace(ScheduleState::Waiting { next_fire });

            tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => break,
                scheduled = ticker.tick() => next_fire = scheduled + period,
            }

            let _permit = tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => break,
                permit = self.permits.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            self.shared.state.send_replace(ScheduleState::Executing);
            self.fire().await;
        }

        tracing::debug!("Scheduled job '{}' stopped", self.shared.name);
    }

    async fn fire(&self) {
        let name = self.job.name();
        let _guard = self.executing.track(name);
        let firing = self.shared.firings.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Scheduled job started: '{}' (firing {})", name, firing);

        match executor::attempt(&self.job).await {
            Ok(_) => {
                tracing::debug!("Scheduled job finished: '{}' (firing {})", name, firing);
            }
            Err(err) => {
                self.shared.failures.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    "Scheduled job error: '{}' (firing {}): {}",
                    name,
                    firing,
                    err
                );
                executor::invoke_on_failure(&self.job, &err);
            }
        }
    }
}

/// Marks the registration idle when its loop ends, including on abort.
struct IdleOnExit(Arc<RegistrationShared>);

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        self.0.state.send_replace(ScheduleState::Idle);
    }
}

impl Drop for ScheduledRunner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;
    use crate::job::JobError;

    struct TickJob {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Job for TickJob {
        type Output = ();

        fn name(&self) -> &str {
            "tick"
        }

        async fn execute(&self) -> Result<(), JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn runner() -> ScheduledRunner {
        ScheduledRunner::new(SchedulerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let runner = runner();
        let err = runner
            .submit(
                TickJob {
                    calls: Arc::new(AtomicU32::new(0)),
                },
                Duration::ZERO,
                Duration::ZERO,
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_then_fixed_rate() {
        let runner = runner();
        let calls = Arc::new(AtomicU32::new(0));
        let scheduled = runner
            .submit(
                TickJob {
                    calls: Arc::clone(&calls),
                },
                Duration::from_secs(10),
                Duration::from_secs(5),
            )
            .unwrap();

        assert_eq!(scheduled.name(), "tick");
        assert!(matches!(scheduled.state(), ScheduleState::Waiting { .. }));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(scheduled.firings(), 3);
        assert_eq!(scheduled.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_one_registration() {
        let runner = runner();
        let calls = Arc::new(AtomicU32::new(0));
        let scheduled = runner
            .submit(
                TickJob {
                    calls: Arc::clone(&calls),
                },
                Duration::ZERO,
                Duration::from_secs(1),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        scheduled.cancel();
        assert!(!scheduled.is_active());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduled.state(), ScheduleState::Idle);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let runner = runner();
        let report = runner.shutdown_with_timeout(Duration::from_secs(1)).await;
        assert!(report.graceful);
        assert!(runner.is_shutdown());

        let err = runner
            .submit(
                TickJob {
                    calls: Arc::new(AtomicU32::new(0)),
                },
                Duration::ZERO,
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    }
}
