//! End-to-end tests driving workflows through the worker pool
//!
//! Run with: cargo test -p docflow-durable --test worker_pool_test

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use docflow_durable::persistence::{TaskFailureOutcome, WorkflowEventStore};
use docflow_durable::prelude::*;

// ============================================
// Test workflow: upper-case a word, then wrap it in brackets
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShoutInput {
    word: String,
    retry_policy: RetryPolicy,
}

struct ShoutWorkflow {
    input: ShoutInput,
    output: Option<String>,
    error: Option<WorkflowError>,
}

impl ShoutWorkflow {
    fn options(&self) -> ActivityOptions {
        ActivityOptions::default().with_retry(self.input.retry_policy.clone())
    }
}

impl Workflow for ShoutWorkflow {
    const TYPE: &'static str = "shout";
    type Input = ShoutInput;
    type Output = String;

    fn new(input: Self::Input) -> Self {
        Self {
            input,
            output: None,
            error: None,
        }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        vec![WorkflowAction::schedule_activity_with_options(
            "upper-1",
            UpperActivity::TYPE,
            json!(self.input.word),
            self.options(),
        )]
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        match activity_id {
            "upper-1" => vec![WorkflowAction::schedule_activity_with_options(
                "bracket-2",
                BracketActivity::TYPE,
                result,
                self.options(),
            )],
            _ => {
                let output = result.as_str().unwrap_or_default().to_string();
                self.output = Some(output.clone());
                vec![WorkflowAction::complete(json!(output))]
            }
        }
    }

    fn on_activity_failed(
        &mut self,
        _activity_id: &str,
        error: &ActivityError,
    ) -> Vec<WorkflowAction> {
        let error = WorkflowError::from(error);
        self.error = Some(error.clone());
        vec![WorkflowAction::fail(error)]
    }

    fn is_completed(&self) -> bool {
        self.output.is_some() || self.error.is_some()
    }

    fn result(&self) -> Option<String> {
        self.output.clone()
    }

    fn error(&self) -> Option<WorkflowError> {
        self.error.clone()
    }
}

/// Upper-cases its input, failing the first `fail_first` attempts
struct UpperActivity {
    calls: Arc<AtomicU32>,
    fail_first: u32,
}

#[async_trait]
impl Activity for UpperActivity {
    const TYPE: &'static str = "upper";
    type Input = String;
    type Output = String;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: String,
    ) -> Result<String, ActivityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(ctx.attempt, call);
        if call <= self.fail_first {
            return Err(ActivityError::retryable(format!("attempt {} failed", call)));
        }
        Ok(input.to_uppercase())
    }
}

struct BracketActivity {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Activity for BracketActivity {
    const TYPE: &'static str = "bracket";
    type Input = String;
    type Output = String;

    async fn execute(
        &self,
        _ctx: &ActivityContext,
        input: String,
    ) -> Result<String, ActivityError> {
        self.seen.lock().push(input.clone());
        Ok(format!("[{}]", input))
    }
}

struct Harness {
    executor: Arc<WorkflowExecutor<InMemoryWorkflowEventStore>>,
    pool: WorkerPool<InMemoryWorkflowEventStore>,
    upper_calls: Arc<AtomicU32>,
    bracket_seen: Arc<Mutex<Vec<String>>>,
}

fn harness(fail_first: u32) -> Harness {
    let mut executor = WorkflowExecutor::new(InMemoryWorkflowEventStore::new());
    executor.register::<ShoutWorkflow>();
    let executor = Arc::new(executor);

    let upper_calls = Arc::new(AtomicU32::new(0));
    let bracket_seen = Arc::new(Mutex::new(Vec::new()));
    let activities = ActivityRegistry::new()
        .with(UpperActivity {
            calls: upper_calls.clone(),
            fail_first,
        })
        .with(BracketActivity {
            seen: bracket_seen.clone(),
        });

    let config = WorkerPoolConfig::new()
        .with_worker_id("test-worker")
        .with_poller(
            PollerConfig::new()
                .with_min_interval(Duration::from_millis(5))
                .with_max_interval(Duration::from_millis(20)),
        );

    Harness {
        pool: WorkerPool::new(executor.clone(), activities, config),
        executor,
        upper_calls,
        bracket_seen,
    }
}

fn input(word: &str, policy: RetryPolicy) -> ShoutInput {
    ShoutInput {
        word: word.to_string(),
        retry_policy: policy,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::fixed(Duration::from_millis(10), 3)
}

/// In-memory store whose first attempt to record a completion fails
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryWorkflowEventStore,
    completion_failed: AtomicBool,
}

#[async_trait]
impl WorkflowEventStore for FlakyStore {
    async fn create_workflow(
        &self,
        workflow_id: Uuid,
        workflow_type: &str,
        input: Value,
    ) -> Result<(), StoreError> {
        self.inner.create_workflow(workflow_id, workflow_type, input).await
    }

    async fn get_workflow_status(&self, workflow_id: Uuid) -> Result<WorkflowStatus, StoreError> {
        self.inner.get_workflow_status(workflow_id).await
    }

    async fn get_workflow_info(&self, workflow_id: Uuid) -> Result<WorkflowInfo, StoreError> {
        self.inner.get_workflow_info(workflow_id).await
    }

    async fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowInfo>, StoreError> {
        self.inner.list_workflows(status).await
    }

    async fn update_workflow_status(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        result: Option<Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError> {
        self.inner
            .update_workflow_status(workflow_id, status, result, error)
            .await
    }

    async fn append_events(
        &self,
        workflow_id: Uuid,
        expected_sequence: i32,
        events: Vec<WorkflowEvent>,
    ) -> Result<i32, StoreError> {
        let completes = events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::ActivityCompleted { .. }));
        if completes && !self.completion_failed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Storage("disk full".to_string()));
        }
        self.inner
            .append_events(workflow_id, expected_sequence, events)
            .await
    }

    async fn load_events(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<(i32, WorkflowEvent)>, StoreError> {
        self.inner.load_events(workflow_id).await
    }

    async fn enqueue_task(&self, task: TaskDefinition) -> Result<Uuid, StoreError> {
        self.inner.enqueue_task(task).await
    }

    async fn claim_task(
        &self,
        worker_id: &str,
        activity_types: &[String],
        max_tasks: usize,
    ) -> Result<Vec<ClaimedTask>, StoreError> {
        self.inner
            .claim_task(worker_id, activity_types, max_tasks)
            .await
    }

    async fn complete_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.inner.complete_task(task_id).await
    }

    async fn fail_task(
        &self,
        task_id: Uuid,
        error: &ActivityError,
    ) -> Result<TaskFailureOutcome, StoreError> {
        self.inner.fail_task(task_id, error).await
    }

    async fn has_open_task(
        &self,
        workflow_id: Uuid,
        activity_id: &str,
    ) -> Result<bool, StoreError> {
        self.inner.has_open_task(workflow_id, activity_id).await
    }
}

// ============================================
// Tests
// ============================================

#[test_log::test(tokio::test)]
async fn test_workflow_runs_steps_in_order() {
    let h = harness(0);
    h.pool.start().unwrap();

    let workflow_id = h
        .executor
        .start_workflow::<ShoutWorkflow>(input("hello", RetryPolicy::no_retry()))
        .await
        .unwrap();

    let info = h
        .executor
        .wait_for_terminal(workflow_id, Duration::from_secs(5))
        .await
        .unwrap();
    h.pool.shutdown().await.unwrap();

    assert_eq!(info.status, WorkflowStatus::Completed);
    assert_eq!(info.result, Some(json!("[HELLO]")));
    assert_eq!(h.upper_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*h.bracket_seen.lock(), vec!["HELLO".to_string()]);

    let events = h.executor.store().load_events(workflow_id).await.unwrap();
    let kinds: Vec<&str> = events
        .iter()
        .map(|(_, e)| match e {
            WorkflowEvent::WorkflowStarted { .. } => "started",
            WorkflowEvent::ActivityScheduled { .. } => "scheduled",
            WorkflowEvent::ActivityStarted { .. } => "attempt",
            WorkflowEvent::ActivityCompleted { .. } => "completed",
            WorkflowEvent::ActivityFailed { .. } => "failed",
            WorkflowEvent::WorkflowCompleted { .. } => "done",
            WorkflowEvent::WorkflowFailed { .. } => "aborted",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "started",
            "scheduled",
            "attempt",
            "completed",
            "scheduled",
            "attempt",
            "completed",
            "done"
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_transient_failure_is_retried() {
    let h = harness(2);
    h.pool.start().unwrap();

    let workflow_id = h
        .executor
        .start_workflow::<ShoutWorkflow>(input("retry", fast_retry()))
        .await
        .unwrap();

    let info = h
        .executor
        .wait_for_terminal(workflow_id, Duration::from_secs(5))
        .await
        .unwrap();
    h.pool.shutdown().await.unwrap();

    assert_eq!(info.status, WorkflowStatus::Completed);
    assert_eq!(h.upper_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.bracket_seen.lock().len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_exhausted_retries_fail_workflow() {
    let h = harness(u32::MAX);
    h.pool.start().unwrap();

    let workflow_id = h
        .executor
        .start_workflow::<ShoutWorkflow>(input("doomed", fast_retry()))
        .await
        .unwrap();

    let info = h
        .executor
        .wait_for_terminal(workflow_id, Duration::from_secs(5))
        .await
        .unwrap();
    h.pool.shutdown().await.unwrap();

    assert_eq!(info.status, WorkflowStatus::Failed);
    assert_eq!(info.error.unwrap().message, "attempt 3 failed");
    assert_eq!(h.upper_calls.load(Ordering::SeqCst), 3);
    assert!(h.bracket_seen.lock().is_empty());

    let events = h.executor.store().load_events(workflow_id).await.unwrap();
    let failures: Vec<(u32, bool)> = events
        .iter()
        .filter_map(|(_, e)| match e {
            WorkflowEvent::ActivityFailed {
                attempt, will_retry, ..
            } => Some((*attempt, *will_retry)),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![(1, true), (2, true), (3, false)]);
}

#[test_log::test(tokio::test)]
async fn test_file_store_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let policy = fast_retry();

    // First process: run step one by hand, then "crash" before step two runs
    let workflow_id = {
        let store = FileWorkflowEventStore::open(dir.path()).await.unwrap();
        let mut executor = WorkflowExecutor::new(store);
        executor.register::<ShoutWorkflow>();

        let workflow_id = executor
            .start_workflow::<ShoutWorkflow>(input("durable", policy.clone()))
            .await
            .unwrap();
        executor
            .on_activity_completed(workflow_id, "upper-1", json!("DURABLE"))
            .await
            .unwrap();
        workflow_id
    };

    // Second process: recover and let the pool finish
    let store = FileWorkflowEventStore::open(dir.path()).await.unwrap();
    let mut executor = WorkflowExecutor::new(store);
    executor.register::<ShoutWorkflow>();
    let executor = Arc::new(executor);

    let report = executor.recover_workflows().await.unwrap();
    assert_eq!(report.workflows_resumed, 1);
    assert_eq!(report.tasks_requeued, 1);

    let upper_calls = Arc::new(AtomicU32::new(0));
    let bracket_seen = Arc::new(Mutex::new(Vec::new()));
    let activities = ActivityRegistry::new()
        .with(UpperActivity {
            calls: upper_calls.clone(),
            fail_first: 0,
        })
        .with(BracketActivity {
            seen: bracket_seen.clone(),
        });
    let pool = WorkerPool::new(
        executor.clone(),
        activities,
        WorkerPoolConfig::new()
            .with_poller(PollerConfig::new().with_min_interval(Duration::from_millis(5))),
    );
    pool.start().unwrap();

    let info = executor
        .wait_for_terminal(workflow_id, Duration::from_secs(5))
        .await
        .unwrap();
    pool.shutdown().await.unwrap();

    assert_eq!(info.status, WorkflowStatus::Completed);
    assert_eq!(info.result, Some(json!("[DURABLE]")));
    assert_eq!(upper_calls.load(Ordering::SeqCst), 0);
    assert_eq!(*bracket_seen.lock(), vec!["DURABLE".to_string()]);
}

#[test_log::test(tokio::test)]
async fn test_unrecorded_completion_is_retried() {
    let mut executor = WorkflowExecutor::new(FlakyStore::default());
    executor.register::<ShoutWorkflow>();
    let executor = Arc::new(executor);

    let upper_calls = Arc::new(AtomicU32::new(0));
    let bracket_seen = Arc::new(Mutex::new(Vec::new()));
    let activities = ActivityRegistry::new()
        .with(UpperActivity {
            calls: upper_calls.clone(),
            fail_first: 0,
        })
        .with(BracketActivity {
            seen: bracket_seen.clone(),
        });
    let pool = WorkerPool::new(
        executor.clone(),
        activities,
        WorkerPoolConfig::new()
            .with_poller(PollerConfig::new().with_min_interval(Duration::from_millis(5))),
    );
    pool.start().unwrap();

    let workflow_id = executor
        .start_workflow::<ShoutWorkflow>(input("again", fast_retry()))
        .await
        .unwrap();
    let info = executor
        .wait_for_terminal(workflow_id, Duration::from_secs(5))
        .await
        .unwrap();
    pool.shutdown().await.unwrap();

    // The lost completion is retried instead of leaving the workflow stuck
    assert_eq!(info.status, WorkflowStatus::Completed);
    assert_eq!(info.result, Some(json!("[AGAIN]")));
    assert_eq!(upper_calls.load(Ordering::SeqCst), 2);
    assert_eq!(*bracket_seen.lock(), vec!["AGAIN".to_string()]);

    let events = executor.store().load_events(workflow_id).await.unwrap();
    let failure = events.iter().find_map(|(_, e)| match e {
        WorkflowEvent::ActivityFailed { error, will_retry, .. } => {
            Some((error.error_type.clone(), *will_retry))
        }
        _ => None,
    });
    assert_eq!(failure, Some((Some("RECORD".to_string()), true)));
}
