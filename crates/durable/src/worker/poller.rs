//! Task claiming with idle backoff
//!
//! The poll interval grows while the queue stays empty and drops back to the
//! minimum as soon as a claim returns work.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, instrument, trace};

use crate::persistence::{ClaimedTask, StoreError, WorkflowEventStore};
use crate::reliability::duration_millis;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Interval right after a successful claim
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Ceiling while idle
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Growth factor per empty poll
    pub backoff_multiplier: f64,

    /// Upper bound on tasks claimed at once
    pub batch_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            backoff_multiplier: 1.5,
            batch_size: 10,
        }
    }
}

impl PollerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// Current wait between polls
#[derive(Debug, Clone)]
struct IdleBackoff {
    interval: Duration,
    min: Duration,
    max: Duration,
    multiplier: f64,
}

impl IdleBackoff {
    fn new(config: &PollerConfig) -> Self {
        Self {
            interval: config.min_interval,
            min: config.min_interval,
            max: config.max_interval.max(config.min_interval),
            multiplier: config.backoff_multiplier,
        }
    }

    fn record(&mut self, claimed: usize) {
        self.interval = if claimed > 0 {
            self.min
        } else {
            self.interval.mul_f64(self.multiplier).min(self.max)
        };
    }
}

/// Claims tasks of the given activity types for one worker
pub struct TaskPoller<S: WorkflowEventStore + ?Sized> {
    store: Arc<S>,
    worker_id: String,
    activity_types: Vec<String>,
    batch_size: usize,
    backoff: IdleBackoff,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: WorkflowEventStore + ?Sized> TaskPoller<S> {
    pub fn new(
        store: Arc<S>,
        worker_id: String,
        activity_types: Vec<String>,
        config: PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            worker_id,
            activity_types,
            batch_size: config.batch_size,
            backoff: IdleBackoff::new(&config),
            shutdown_rx,
        }
    }

    /// Claim up to `capacity` tasks (never more than the batch size)
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn poll(&mut self, capacity: usize) -> Result<Vec<ClaimedTask>, StoreError> {
        if self.is_shutdown() || capacity == 0 {
            return Ok(vec![]);
        }

        let tasks = self
            .store
            .claim_task(
                &self.worker_id,
                &self.activity_types,
                capacity.min(self.batch_size),
            )
            .await?;
        self.backoff.record(tasks.len());

        if tasks.is_empty() {
            trace!(interval_ms = self.backoff.interval.as_millis() as u64, "queue idle");
        } else {
            debug!(count = tasks.len(), "Claimed tasks");
        }
        Ok(tasks)
    }

    /// Sleep for the current interval; `true` when shutdown interrupted it
    pub async fn wait(&mut self) -> bool {
        if self.is_shutdown() {
            return true;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.backoff.interval) => false,
            _ = self.shutdown_rx.changed() => {
                debug!("Shutdown signal received during wait");
                true
            }
        }
    }

    pub fn current_interval(&self) -> Duration {
        self.backoff.interval
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}
