//! Fixed-delay dispatcher for user synchronizations.
//!
//! Every tick submits each target to a bounded worker pool and returns
//! without waiting. A user whose previous run is still active is skipped
//! by the flow's own gate, and a target that finds every worker busy is
//! skipped by the dispatcher, so overlapping ticks never queue work.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use icalsync_infra::scheduling::{DispatchTarget, Dispatcher, DispatcherConfig};
//!
//! # async fn example(targets: Vec<Arc<dyn DispatchTarget>>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut dispatcher = Dispatcher::new(targets, DispatcherConfig::default());
//!
//! dispatcher.start().await?;
//! // ... application runs ...
//! dispatcher.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use icalsync_core::{SyncRun, UserFlow};
use icalsync_domain::constants::DEFAULT_SCHEDULE_DELAY_SECS;
use icalsync_domain::AppConfig;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Unit of work submitted on every tick.
#[async_trait]
pub trait DispatchTarget: Send + Sync + 'static {
    /// Name used in log fields.
    fn label(&self) -> &str;

    /// Run once; a busy target returns [`SyncRun::Skipped`].
    async fn synchronize(&self) -> SyncRun;
}

#[async_trait]
impl DispatchTarget for UserFlow {
    fn label(&self) -> &str {
        self.user_id()
    }

    async fn synchronize(&self) -> SyncRun {
        UserFlow::synchronize(self).await
    }
}

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Pause between the end of one tick and the next
    pub delay: Duration,
    /// Maximum number of concurrently running targets
    pub worker_pool_size: usize,
    /// Bound on joining the dispatch loop in `stop`
    pub join_timeout: Duration,
    /// Dispatch once right after `start`
    pub run_immediately: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(DEFAULT_SCHEDULE_DELAY_SECS),
            worker_pool_size: 2,
            join_timeout: Duration::from_secs(5),
            run_immediately: true,
        }
    }
}

impl DispatcherConfig {
    /// Delay and pool size from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            delay: config.schedule_delay(),
            worker_pool_size: config.worker_pool_size(),
            ..Self::default()
        }
    }
}

/// Periodically submits every target to the worker pool.
pub struct Dispatcher {
    targets: Arc<Vec<Arc<dyn DispatchTarget>>>,
    config: DispatcherConfig,
    workers: Arc<Semaphore>,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl Dispatcher {
    /// A stopped dispatcher over `targets`.
    pub fn new(targets: Vec<Arc<dyn DispatchTarget>>, config: DispatcherConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Self {
            targets: Arc::new(targets),
            config,
            workers,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the dispatch loop
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(
            targets = self.targets.len(),
            workers = self.config.worker_pool_size,
            delay_secs = self.config.delay.as_secs(),
            "Starting dispatcher"
        );

        // Create a new cancellation token (supports restart after stop)
        self.cancellation_token = CancellationToken::new();

        let targets = Arc::clone(&self.targets);
        let workers = Arc::clone(&self.workers);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::dispatch_loop(targets, workers, config, cancel).await;
        });

        *self.task_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the dispatch loop
    ///
    /// Synchronizations already submitted run to completion.
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher is not running or the loop does not
    /// finish within the join timeout
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping dispatcher");
        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { duration: join_timeout })??;
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    /// Whether the dispatch loop is alive.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Submit every target once, outside the loop.
    ///
    /// Returns handles for the targets that got a worker.
    pub fn dispatch_once(&self) -> Vec<JoinHandle<()>> {
        Self::dispatch(&self.targets, &self.workers)
    }

    async fn dispatch_loop(
        targets: Arc<Vec<Arc<dyn DispatchTarget>>>,
        workers: Arc<Semaphore>,
        config: DispatcherConfig,
        cancel: CancellationToken,
    ) {
        if config.run_immediately {
            Self::dispatch(&targets, &workers);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Dispatch loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.delay) => {
                    Self::dispatch(&targets, &workers);
                }
            }
        }
    }

    /// A worker is claimed before spawning; a target finding the pool full
    /// is skipped until the next tick instead of waiting in a queue.
    ///
    /// Tasks are detached: a failing or panicking target only ends its own
    /// task, and its permit is released on unwind.
    fn dispatch(
        targets: &[Arc<dyn DispatchTarget>],
        workers: &Arc<Semaphore>,
    ) -> Vec<JoinHandle<()>> {
        debug!(targets = targets.len(), "Dispatching synchronizations");

        targets
            .iter()
            .filter_map(|target| {
                let Ok(permit) = Arc::clone(workers).try_acquire_owned() else {
                    info!(user = target.label(), "Worker pool exhausted, skipping until next tick");
                    return None;
                };
                let target = Arc::clone(target);

                Some(tokio::spawn(async move {
                    let _permit = permit;
                    if target.synchronize().await.is_skipped() {
                        debug!(user = target.label(), "Previous synchronization still running");
                    }
                }))
            })
            .collect()
    }
}

/// Ensure the loop is cancelled when the dispatcher is dropped
impl Drop for Dispatcher {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() && self.is_running() {
            warn!("Dispatcher dropped while running; cancelling");
        }
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use icalsync_core::SyncReport;

    use super::*;

    struct CountingTarget {
        label: String,
        runs: Arc<AtomicUsize>,
    }

    impl CountingTarget {
        fn new(label: &str) -> (Arc<Self>, Arc<AtomicUsize>) {
            let runs = Arc::new(AtomicUsize::new(0));
            (Arc::new(Self { label: label.to_string(), runs: runs.clone() }), runs)
        }
    }

    #[async_trait]
    impl DispatchTarget for CountingTarget {
        fn label(&self) -> &str {
            &self.label
        }

        async fn synchronize(&self) -> SyncRun {
            self.runs.fetch_add(1, Ordering::SeqCst);
            SyncRun::Completed(SyncReport { user_id: self.label.clone(), bindings: Vec::new() })
        }
    }

    struct PanickingTarget;

    #[async_trait]
    impl DispatchTarget for PanickingTarget {
        fn label(&self) -> &str {
            "panicking"
        }

        async fn synchronize(&self) -> SyncRun {
            panic!("synchronization blew up");
        }
    }

    /// Tracks the highest number of overlapping runs.
    struct SlowTarget {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DispatchTarget for SlowTarget {
        fn label(&self) -> &str {
            "slow"
        }

        async fn synchronize(&self) -> SyncRun {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            SyncRun::Skipped
        }
    }

    fn config(delay: Duration) -> DispatcherConfig {
        DispatcherConfig { delay, ..DispatcherConfig::default() }
    }

    async fn wait_for(counter: &AtomicUsize, at_least: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < at_least {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("counter did not reach expected value");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispatcher_lifecycle() {
        let (target, _) = CountingTarget::new("alice");
        let mut dispatcher = Dispatcher::new(vec![target], config(Duration::from_secs(3600)));

        assert!(!dispatcher.is_running());
        dispatcher.start().await.unwrap();
        assert!(dispatcher.is_running());
        dispatcher.stop().await.unwrap();
        assert!(!dispatcher.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_double_start_fails() {
        let (target, _) = CountingTarget::new("alice");
        let mut dispatcher = Dispatcher::new(vec![target], config(Duration::from_secs(3600)));

        dispatcher.start().await.unwrap();
        assert!(matches!(dispatcher.start().await, Err(SchedulerError::AlreadyRunning)));
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_without_start_fails() {
        let mut dispatcher = Dispatcher::new(Vec::new(), DispatcherConfig::default());
        assert!(matches!(dispatcher.stop().await, Err(SchedulerError::NotRunning)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_tick_runs_immediately() {
        let (target, runs) = CountingTarget::new("alice");
        let mut dispatcher = Dispatcher::new(vec![target], config(Duration::from_secs(3600)));

        dispatcher.start().await.unwrap();
        wait_for(&runs, 1).await;
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ticks_repeat_after_the_delay() {
        let (alice, alice_runs) = CountingTarget::new("alice");
        let (bob, bob_runs) = CountingTarget::new("bob");
        let mut dispatcher =
            Dispatcher::new(vec![alice, bob], config(Duration::from_millis(20)));

        dispatcher.start().await.unwrap();
        wait_for(&alice_runs, 3).await;
        wait_for(&bob_runs, 3).await;
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_target_does_not_affect_siblings() {
        let (alice, alice_runs) = CountingTarget::new("alice");
        let dispatcher = Dispatcher::new(
            vec![Arc::new(PanickingTarget), alice],
            config(Duration::from_secs(3600)),
        );

        let handles = dispatcher.dispatch_once();
        let mut panics = 0;
        for handle in handles {
            if let Err(err) = handle.await {
                assert!(err.is_panic());
                panics += 1;
            }
        }

        assert_eq!(panics, 1);
        assert_eq!(alice_runs.load(Ordering::SeqCst), 1);

        // Permits were returned despite the panic.
        for handle in dispatcher.dispatch_once() {
            let _ = handle.await;
        }
        assert_eq!(alice_runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn loop_survives_panicking_targets() {
        let (alice, alice_runs) = CountingTarget::new("alice");
        let mut dispatcher = Dispatcher::new(
            vec![Arc::new(PanickingTarget), alice],
            config(Duration::from_millis(10)),
        );

        dispatcher.start().await.unwrap();
        wait_for(&alice_runs, 3).await;
        assert!(dispatcher.is_running());
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_pool_bounds_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let targets: Vec<Arc<dyn DispatchTarget>> = (0..4)
            .map(|_| {
                Arc::new(SlowTarget { active: active.clone(), peak: peak.clone() })
                    as Arc<dyn DispatchTarget>
            })
            .collect();
        let dispatcher = Dispatcher::new(
            targets,
            DispatcherConfig { worker_pool_size: 2, ..DispatcherConfig::default() },
        );

        let handles = dispatcher.dispatch_once();
        assert_eq!(handles.len(), 2);
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_pool_skips_targets_instead_of_queueing() {
        let (alice, alice_runs) = CountingTarget::new("alice");
        let (bob, bob_runs) = CountingTarget::new("bob");
        let dispatcher = Dispatcher::new(
            vec![alice, bob],
            DispatcherConfig { worker_pool_size: 1, ..DispatcherConfig::default() },
        );

        // Hold the only worker, as a long synchronization from an earlier tick would.
        let busy = Arc::clone(&dispatcher.workers).try_acquire_owned().unwrap();
        assert!(dispatcher.dispatch_once().is_empty());
        assert_eq!(alice_runs.load(Ordering::SeqCst), 0);
        assert_eq!(bob_runs.load(Ordering::SeqCst), 0);

        drop(busy);
        let handles = dispatcher.dispatch_once();
        assert_eq!(handles.len(), 1, "one worker serves one target per tick");
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(alice_runs.load(Ordering::SeqCst) + bob_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_follows_application_settings() {
        let app: AppConfig = toml::from_str(
            r#"
users = [{ id = "a", email = "a@example.com" }, { id = "b", email = "b@example.com" }]

[schedule]
delay_seconds = 60

[authorization]
listening_port = 8085
redirect_url_base = "http://localhost:8085"
storage_directory = "creds"
client_secrets_file = "secrets.json"
"#,
        )
        .unwrap();

        let config = DispatcherConfig::from_app_config(&app);
        assert_eq!(config.delay, Duration::from_secs(60));
        assert_eq!(config.worker_pool_size, 4);
        assert!(config.run_immediately);
    }
}
