//! In-memory implementation of WorkflowEventStore

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::queue::TaskQueue;
use super::store::*;
use crate::activity::ActivityError;
use crate::workflow::{WorkflowError, WorkflowEvent};

/// A workflow's metadata together with its event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WorkflowRecord {
    pub(crate) info: WorkflowInfo,
    pub(crate) events: Vec<WorkflowEvent>,
}

impl WorkflowRecord {
    pub(crate) fn new(workflow_id: Uuid, workflow_type: &str, input: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            info: WorkflowInfo {
                id: workflow_id,
                workflow_type: workflow_type.to_string(),
                status: WorkflowStatus::Pending,
                input,
                result: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
            events: vec![],
        }
    }

    pub(crate) fn append(
        &mut self,
        expected_sequence: i32,
        events: Vec<WorkflowEvent>,
    ) -> Result<i32, StoreError> {
        let current_sequence = self.events.len() as i32;
        if current_sequence != expected_sequence {
            return Err(StoreError::ConcurrencyConflict {
                expected: expected_sequence,
                actual: current_sequence,
            });
        }

        self.events.extend(events);
        self.info.updated_at = Utc::now();
        Ok(self.events.len() as i32)
    }

    pub(crate) fn numbered_events(&self) -> Vec<(i32, WorkflowEvent)> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, e)| (i as i32, e.clone()))
            .collect()
    }

    pub(crate) fn set_status(
        &mut self,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) {
        self.info.status = status;
        self.info.result = result;
        self.info.error = error;
        self.info.updated_at = Utc::now();
    }
}

/// Collect workflow infos matching a status filter, oldest first
pub(crate) fn filter_infos<'a>(
    records: impl Iterator<Item = &'a WorkflowRecord>,
    status: Option<WorkflowStatus>,
) -> Vec<WorkflowInfo> {
    let mut infos: Vec<WorkflowInfo> = records
        .filter(|r| status.map_or(true, |s| r.info.status == s))
        .map(|r| r.info.clone())
        .collect();
    infos.sort_by_key(|i| (i.created_at, i.id));
    infos
}

/// In-memory implementation of WorkflowEventStore
///
/// Nothing survives the process. Used by tests and when no durable
/// store path is configured.
///
/// # Example
///
/// ```
/// use docflow_durable::InMemoryWorkflowEventStore;
///
/// let store = InMemoryWorkflowEventStore::new();
/// assert_eq!(store.workflow_count(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryWorkflowEventStore {
    workflows: RwLock<HashMap<Uuid, WorkflowRecord>>,
    tasks: TaskQueue,
}

impl InMemoryWorkflowEventStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of workflows
    pub fn workflow_count(&self) -> usize {
        self.workflows.read().len()
    }

    /// Get the number of tasks waiting to be claimed
    pub fn pending_task_count(&self) -> usize {
        self.tasks.pending_count()
    }

    /// Get the number of queued or running tasks
    pub fn open_task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[async_trait]
impl WorkflowEventStore for InMemoryWorkflowEventStore {
    async fn create_workflow(
        &self,
        workflow_id: Uuid,
        workflow_type: &str,
        input: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        if workflows.contains_key(&workflow_id) {
            return Err(StoreError::WorkflowExists(workflow_id));
        }
        workflows.insert(
            workflow_id,
            WorkflowRecord::new(workflow_id, workflow_type, input),
        );
        Ok(())
    }

    async fn get_workflow_status(&self, workflow_id: Uuid) -> Result<WorkflowStatus, StoreError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .map(|w| w.info.status)
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn get_workflow_info(&self, workflow_id: Uuid) -> Result<WorkflowInfo, StoreError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .map(|w| w.info.clone())
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowInfo>, StoreError> {
        Ok(filter_infos(self.workflows.read().values(), status))
    }

    async fn append_events(
        &self,
        workflow_id: Uuid,
        expected_sequence: i32,
        events: Vec<WorkflowEvent>,
    ) -> Result<i32, StoreError> {
        let mut workflows = self.workflows.write();
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or(StoreError::WorkflowNotFound(workflow_id))?;

        workflow.append(expected_sequence, events)
    }

    async fn load_events(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<(i32, WorkflowEvent)>, StoreError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .map(WorkflowRecord::numbered_events)
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn update_workflow_status(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or(StoreError::WorkflowNotFound(workflow_id))?;

        workflow.set_status(status, result, error);
        Ok(())
    }

    async fn enqueue_task(&self, task: TaskDefinition) -> Result<Uuid, StoreError> {
        Ok(self.tasks.enqueue(task))
    }

    async fn claim_task(
        &self,
        worker_id: &str,
        activity_types: &[String],
        max_tasks: usize,
    ) -> Result<Vec<ClaimedTask>, StoreError> {
        Ok(self.tasks.claim(worker_id, activity_types, max_tasks))
    }

    async fn complete_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.tasks.complete(task_id)
    }

    async fn fail_task(
        &self,
        task_id: Uuid,
        error: &ActivityError,
    ) -> Result<TaskFailureOutcome, StoreError> {
        self.tasks.fail(task_id, error)
    }

    async fn has_open_task(
        &self,
        workflow_id: Uuid,
        activity_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.tasks.has_open_task(workflow_id, activity_id))
    }
}
