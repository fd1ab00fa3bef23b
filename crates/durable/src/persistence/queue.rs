//! In-process activity task queue shared by the store implementations

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::store::{ClaimedTask, StoreError, TaskDefinition, TaskFailureOutcome};
use crate::activity::ActivityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskStatus {
    Pending,
    Claimed,
}

struct QueuedTask {
    definition: TaskDefinition,
    status: TaskStatus,
    attempt: u32,
    claimed_by: Option<String>,
    available_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct QueueState {
    tasks: HashMap<Uuid, QueuedTask>,
    next_seq: u64,
}

/// FIFO task queue with delayed availability for retries
///
/// Tasks leave the queue when completed or when their retries are
/// exhausted. A failed task that may retry keeps its id and becomes
/// claimable again once its backoff delay has elapsed.
#[derive(Default)]
pub(crate) struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub(crate) fn enqueue(&self, task: TaskDefinition) -> Uuid {
        let task_id = Uuid::now_v7();
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;

        state.tasks.insert(
            task_id,
            QueuedTask {
                attempt: task.attempt.max(1),
                available_at: Instant::now() + task.delay,
                definition: task,
                status: TaskStatus::Pending,
                claimed_by: None,
                seq,
            },
        );
        task_id
    }

    pub(crate) fn claim(
        &self,
        worker_id: &str,
        activity_types: &[String],
        max_tasks: usize,
    ) -> Vec<ClaimedTask> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let mut ready: Vec<(u64, Uuid)> = state
            .tasks
            .iter()
            .filter(|(_, t)| {
                t.status == TaskStatus::Pending
                    && t.available_at <= now
                    && activity_types.contains(&t.definition.activity_type)
            })
            .map(|(id, t)| (t.seq, *id))
            .collect();
        ready.sort_unstable();

        let mut claimed = Vec::new();
        for (_, task_id) in ready.into_iter().take(max_tasks) {
            if let Some(task) = state.tasks.get_mut(&task_id) {
                task.status = TaskStatus::Claimed;
                task.claimed_by = Some(worker_id.to_string());

                claimed.push(ClaimedTask {
                    id: task_id,
                    workflow_id: task.definition.workflow_id,
                    activity_id: task.definition.activity_id.clone(),
                    activity_type: task.definition.activity_type.clone(),
                    input: task.definition.input.clone(),
                    options: task.definition.options.clone(),
                    attempt: task.attempt,
                    max_attempts: task.definition.options.retry_policy.max_attempts,
                });
            }
        }

        claimed
    }

    pub(crate) fn complete(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.state
            .lock()
            .tasks
            .remove(&task_id)
            .map(|_| ())
            .ok_or(StoreError::TaskNotFound(task_id))
    }

    pub(crate) fn fail(
        &self,
        task_id: Uuid,
        error: &ActivityError,
    ) -> Result<TaskFailureOutcome, StoreError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;

        let policy = &task.definition.options.retry_policy;
        if !policy.allows_retry(error, task.attempt) {
            state.tasks.remove(&task_id);
            return Ok(TaskFailureOutcome::ExhaustedRetries);
        }

        let next_attempt = task.attempt + 1;
        let delay = policy.delay_for_attempt(next_attempt);

        task.attempt = next_attempt;
        task.status = TaskStatus::Pending;
        task.claimed_by = None;
        task.available_at = Instant::now() + delay;

        Ok(TaskFailureOutcome::WillRetry {
            next_attempt,
            delay,
        })
    }

    pub(crate) fn has_open_task(&self, workflow_id: Uuid, activity_id: &str) -> bool {
        self.state.lock().tasks.values().any(|t| {
            t.definition.workflow_id == workflow_id && t.definition.activity_id == activity_id
        })
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.state
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }
}
