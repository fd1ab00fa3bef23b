//! Storage contract for workflow records, event logs and the task queue

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::ActivityError;
use crate::workflow::{ActivityOptions, WorkflowError, WorkflowEvent};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("workflow already exists: {0}")]
    WorkflowExists(Uuid),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Another writer appended first; reload and try again
    #[error("concurrency conflict: expected sequence {expected}, got {actual}")]
    ConcurrencyConflict { expected: i32, actual: i32 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Lifecycle of a workflow instance
///
/// `Pending` only lasts between creating the record and appending the start
/// event; a crash in between leaves it for recovery to pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// No further events will be appended
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of a task to be enqueued
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub workflow_id: Uuid,
    pub activity_id: String,
    pub activity_type: String,
    pub input: serde_json::Value,
    pub options: ActivityOptions,
    /// Attempt number the task starts at (1 unless resumed after a restart)
    pub attempt: u32,
    /// Delay before the task becomes claimable
    pub delay: Duration,
}

impl TaskDefinition {
    /// Create a task for the first attempt, claimable immediately
    pub fn new(
        workflow_id: Uuid,
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        input: serde_json::Value,
        options: ActivityOptions,
    ) -> Self {
        Self {
            workflow_id,
            activity_id: activity_id.into(),
            activity_type: activity_type.into(),
            input,
            options,
            attempt: 1,
            delay: Duration::ZERO,
        }
    }

    /// Resume at a later attempt
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt.max(1);
        self
    }

    /// Hold the task back for a while
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A task that has been claimed by a worker
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub activity_id: String,
    pub activity_type: String,
    pub input: serde_json::Value,
    pub options: ActivityOptions,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Outcome of failing a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskFailureOutcome {
    /// Task was requeued and becomes claimable after `delay`
    WillRetry { next_attempt: u32, delay: Duration },

    /// No more attempts; the workflow must be told
    ExhaustedRetries,
}

/// The record kept next to each event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub id: Uuid,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub input: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<WorkflowError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence used by the executor and the worker pool
///
/// Events are numbered from 0 in append order. `append_events` must reject
/// the write with [`StoreError::ConcurrencyConflict`] unless
/// `expected_sequence` equals the number of events already stored.
#[async_trait]
pub trait WorkflowEventStore: Send + Sync + 'static {
    // -- workflow records ----------------------------------------------------

    async fn create_workflow(
        &self,
        workflow_id: Uuid,
        workflow_type: &str,
        input: serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn get_workflow_status(&self, workflow_id: Uuid) -> Result<WorkflowStatus, StoreError>;

    async fn get_workflow_info(&self, workflow_id: Uuid) -> Result<WorkflowInfo, StoreError>;

    /// Oldest first
    async fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowInfo>, StoreError>;

    async fn update_workflow_status(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError>;

    // -- event log -----------------------------------------------------------

    /// Returns the number of events stored after the append
    async fn append_events(
        &self,
        workflow_id: Uuid,
        expected_sequence: i32,
        events: Vec<WorkflowEvent>,
    ) -> Result<i32, StoreError>;

    async fn load_events(&self, workflow_id: Uuid)
        -> Result<Vec<(i32, WorkflowEvent)>, StoreError>;

    // -- task queue ----------------------------------------------------------

    async fn enqueue_task(&self, task: TaskDefinition) -> Result<Uuid, StoreError>;

    /// Claim up to `max_tasks` due tasks whose type is in `activity_types`
    async fn claim_task(
        &self,
        worker_id: &str,
        activity_types: &[String],
        max_tasks: usize,
    ) -> Result<Vec<ClaimedTask>, StoreError>;

    async fn complete_task(&self, task_id: Uuid) -> Result<(), StoreError>;

    /// Requeue the task if its retry policy allows another attempt
    async fn fail_task(
        &self,
        task_id: Uuid,
        error: &ActivityError,
    ) -> Result<TaskFailureOutcome, StoreError>;

    /// Queued or claimed
    async fn has_open_task(&self, workflow_id: Uuid, activity_id: &str)
        -> Result<bool, StoreError>;
}
