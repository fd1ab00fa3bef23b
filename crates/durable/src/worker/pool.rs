//! Worker pool for task execution
//!
//! Claims activity tasks, runs them with bounded concurrency and reports
//! every outcome back to the executor, which records it in the workflow log.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::poller::{PollerConfig, TaskPoller};
use crate::activity::{ActivityContext, ActivityError};
use crate::engine::{ActivityHandler, ActivityRegistry, WorkflowExecutor};
use crate::persistence::{ClaimedTask, WorkflowEventStore};
use crate::reliability::duration_millis;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Unique worker ID (generated if not provided)
    pub worker_id: String,

    /// Activity types this worker handles (all registered types when empty)
    pub activity_types: Vec<String>,

    /// Maximum concurrent task executions
    pub max_concurrency: usize,

    /// Poller configuration
    pub poller: PollerConfig,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            activity_types: vec![],
            max_concurrency: 10,
            poller: PollerConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new worker pool configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the pool to the given activity types
    pub fn with_activity_types(mut self, activity_types: Vec<String>) -> Self {
        self.activity_types = activity_types;
        self
    }

    /// Set the worker ID
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set poller configuration
    pub fn with_poller(mut self, config: PollerConfig) -> Self {
        self.poller = config;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Worker is running and accepting tasks
    Running,
    /// Worker is draining (completing current tasks, not accepting new ones)
    Draining,
    /// Worker has stopped
    Stopped,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// Worker already running
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// Nothing to execute
    #[error("no activity types registered")]
    NoActivities,

    /// Shutdown timeout
    #[error("graceful shutdown timed out with {0} tasks in flight")]
    ShutdownTimeout(usize),
}

/// Worker pool for executing activities
///
/// # Example
///
/// ```ignore
/// use docflow_durable::prelude::*;
///
/// let activities = ActivityRegistry::new().with(ChecksumActivity);
/// let pool = WorkerPool::new(executor.clone(), activities, WorkerPoolConfig::new());
///
/// pool.start()?;
/// // ... later, graceful shutdown
/// pool.shutdown().await?;
/// ```
pub struct WorkerPool<S: WorkflowEventStore + ?Sized> {
    executor: Arc<WorkflowExecutor<S>>,
    activities: ActivityRegistry,
    config: WorkerPoolConfig,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<WorkerPoolStatus>,
    active_tasks: Arc<Semaphore>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: WorkflowEventStore + ?Sized> WorkerPool<S> {
    /// Create a new worker pool
    pub fn new(
        executor: Arc<WorkflowExecutor<S>>,
        activities: ActivityRegistry,
        mut config: WorkerPoolConfig,
    ) -> Self {
        if config.activity_types.is_empty() {
            config.activity_types = activities.activity_types();
            config.activity_types.sort();
        }

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            executor,
            activities,
            active_tasks: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            shutdown_tx,
            status: RwLock::new(WorkerPoolStatus::Stopped),
            poll_handle: Mutex::new(None),
        }
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Get the worker ID
    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Number of activities currently executing
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrency - self.active_tasks.available_permits()
    }

    /// Start the polling loop
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub fn start(&self) -> Result<(), WorkerPoolError> {
        {
            let mut status = self.status.write();
            if *status == WorkerPoolStatus::Running {
                return Err(WorkerPoolError::AlreadyRunning);
            }
            if self.config.activity_types.is_empty() {
                return Err(WorkerPoolError::NoActivities);
            }
            *status = WorkerPoolStatus::Running;
        }

        self.shutdown_tx.send_replace(false);

        info!(
            worker_id = %self.config.worker_id,
            activity_types = ?self.config.activity_types,
            max_concurrency = self.config.max_concurrency,
            "Starting worker pool"
        );

        let handle = tokio::spawn(poll_loop(
            self.executor.clone(),
            self.activities.clone(),
            self.config.clone(),
            self.active_tasks.clone(),
            self.shutdown_tx.subscribe(),
        ));
        *self.poll_handle.lock() = Some(handle);

        Ok(())
    }

    /// Shutdown the worker pool gracefully
    ///
    /// Stops claiming new tasks and waits for in-flight activities up to the
    /// configured timeout.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        {
            let mut status = self.status.write();
            if *status == WorkerPoolStatus::Stopped {
                return Ok(());
            }
            *status = WorkerPoolStatus::Draining;
        }

        info!(worker_id = %self.config.worker_id, "Initiating graceful shutdown");
        self.shutdown_tx.send_replace(true);

        let handle = self.poll_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Poll loop terminated abnormally");
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            let in_flight = self.in_flight();
            if in_flight == 0 {
                debug!("All tasks completed");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(remaining_tasks = in_flight, "Shutdown timeout reached");
                *self.status.write() = WorkerPoolStatus::Stopped;
                return Err(WorkerPoolError::ShutdownTimeout(in_flight));
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!(worker_id = %self.config.worker_id, "Worker pool stopped");
        Ok(())
    }
}

async fn poll_loop<S: WorkflowEventStore + ?Sized>(
    executor: Arc<WorkflowExecutor<S>>,
    activities: ActivityRegistry,
    config: WorkerPoolConfig,
    active_tasks: Arc<Semaphore>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let mut poller = TaskPoller::new(
        executor.shared_store(),
        config.worker_id.clone(),
        config.activity_types.clone(),
        config.poller.clone(),
        shutdown_rx,
    );

    loop {
        if poller.is_shutdown() {
            debug!("Poll loop: shutdown requested");
            break;
        }

        match poller.poll(active_tasks.available_permits()).await {
            Ok(tasks) => {
                for task in tasks {
                    let Some(handler) = activities.get(&task.activity_type) else {
                        warn!(activity_type = %task.activity_type, "No handler registered");
                        continue;
                    };

                    // Claims never exceed the free permits, so this only fails on a race
                    let permit = match active_tasks.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };

                    let executor = executor.clone();
                    let worker_id = config.worker_id.clone();
                    tokio::spawn(async move {
                        run_task(executor, handler, task, worker_id).await;
                        drop(permit);
                    });
                }
            }
            Err(e) => {
                error!(error = %e, "Poll error");
            }
        }

        if poller.wait().await {
            break;
        }
    }

    debug!("Poll loop exited");
}

/// Execute one claimed task and record its outcome
#[instrument(
    skip(executor, handler, task),
    fields(workflow_id = %task.workflow_id, activity_id = %task.activity_id, attempt = task.attempt)
)]
async fn run_task<S: WorkflowEventStore + ?Sized>(
    executor: Arc<WorkflowExecutor<S>>,
    handler: ActivityHandler,
    task: ClaimedTask,
    worker_id: String,
) {
    let workflow_id = task.workflow_id;
    let activity_id = task.activity_id.clone();
    let store = executor.shared_store();

    if let Err(e) = executor
        .on_activity_started(workflow_id, &activity_id, task.attempt, &worker_id)
        .await
    {
        warn!(error = %e, "Failed to record activity start");
    }

    let ctx = ActivityContext::new(
        workflow_id,
        activity_id.clone(),
        task.attempt,
        task.max_attempts,
    )
    .with_worker(worker_id);

    let outcome = AssertUnwindSafe(handler(ctx, task.input.clone()))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(ActivityError::retryable("activity panicked").with_type("PANIC"))
        });

    // The task stays claimed until its outcome is in the log
    let err = match outcome {
        Ok(output) => {
            debug!(activity_type = %task.activity_type, "Activity completed");

            match executor
                .on_activity_completed(workflow_id, &activity_id, output)
                .await
            {
                Ok(_) => {
                    if let Err(e) = store.complete_task(task.id).await {
                        error!(task_id = %task.id, error = %e, "Failed to complete task");
                    }
                    return;
                }
                Err(e) => {
                    error!(error = %e, "Failed to record activity completion");
                    ActivityError::retryable(format!("failed to record completion: {}", e))
                        .with_type("RECORD")
                }
            }
        }
        Err(err) => err,
    };

    let will_retry = task.options.retry_policy.allows_retry(&err, task.attempt);
    warn!(
        activity_type = %task.activity_type,
        error = %err,
        will_retry,
        "Activity attempt failed"
    );

    // Record the failure before the retry becomes claimable
    if let Err(e) = executor
        .on_activity_failed(
            workflow_id,
            &activity_id,
            err.clone(),
            task.attempt,
            will_retry,
        )
        .await
    {
        error!(error = %e, "Failed to record activity failure");
    }

    match store.fail_task(task.id, &err).await {
        Ok(outcome) => debug!(?outcome, "Task failure recorded"),
        Err(e) => error!(task_id = %task.id, error = %e, "Failed to fail task"),
    }
}
