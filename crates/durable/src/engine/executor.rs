//! Workflow executor with replay support
//!
//! The `WorkflowExecutor` is responsible for:
//! - Starting new workflows
//! - Replaying workflows from event history
//! - Applying actions the log does not record yet (scheduling activities,
//!   completing or failing the workflow)
//! - Recording activity lifecycle events reported by workers
//! - Recovering running workflows after a restart

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::activity::ActivityError;
use crate::persistence::{
    StoreError, TaskDefinition, WorkflowEventStore, WorkflowInfo, WorkflowStatus,
};
use crate::workflow::{Workflow, WorkflowAction, WorkflowEvent};

use super::registry::{AnyWorkflow, RegistryError, WorkflowRegistry};

/// Configuration for the workflow executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum events per workflow (for safety)
    pub max_events_per_workflow: usize,

    /// How many times an operation is retried after losing an append race
    pub max_conflict_retries: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_events_per_workflow: 10000,
            max_conflict_retries: 5,
        }
    }
}

/// Errors from executor operations
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Workflow has no event history
    #[error("workflow {0} has no events")]
    EmptyHistory(Uuid),

    /// Replay error (non-determinism detected)
    #[error("replay error in workflow {0}: {1}")]
    ReplayError(Uuid, String),

    /// Too many events
    #[error("workflow {0} has too many events ({1} > {2})")]
    TooManyEvents(Uuid, usize, usize),

    /// Workflow did not finish in time
    #[error("timed out waiting for workflow {0}")]
    Timeout(Uuid),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExecutorError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::ConcurrencyConflict { .. }))
    }
}

/// Result of processing a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    /// Whether the workflow reached a terminal state
    pub completed: bool,

    /// Number of new events written
    pub events_written: usize,

    /// Number of tasks enqueued
    pub tasks_enqueued: usize,
}

/// Summary of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Workflows that were replayed
    pub workflows_resumed: usize,

    /// Activities put back on the task queue
    pub tasks_requeued: usize,

    /// Workflows whose replay failed (left untouched)
    pub workflows_failed: usize,
}

/// State rebuilt from a workflow's event log
struct Replayed {
    workflow: Box<dyn AnyWorkflow>,
    pending: Vec<WorkflowAction>,
    terminal: Option<WorkflowEvent>,
    next_sequence: i32,
}

/// Workflow executor
///
/// The executor drives workflow state machines by replaying events and
/// applying the actions the log does not record yet. It uses optimistic
/// concurrency control to handle concurrent updates.
///
/// # Example
///
/// ```ignore
/// use docflow_durable::prelude::*;
///
/// let mut executor = WorkflowExecutor::new(InMemoryWorkflowEventStore::new());
/// executor.register::<MyWorkflow>();
///
/// // Start a new workflow; its first activity is enqueued immediately
/// let workflow_id = executor.start_workflow::<MyWorkflow>(input).await?;
/// ```
pub struct WorkflowExecutor<S: WorkflowEventStore + ?Sized> {
    store: Arc<S>,
    registry: WorkflowRegistry,
    config: ExecutorConfig,
}

impl<S: WorkflowEventStore> WorkflowExecutor<S> {
    /// Create a new executor with the given store
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }
}

impl<S: WorkflowEventStore + ?Sized> WorkflowExecutor<S> {
    /// Create an executor over a store that is shared with other components
    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            registry: WorkflowRegistry::new(),
            config: ExecutorConfig::default(),
        }
    }

    /// Replace the executor configuration
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a workflow type
    pub fn register<W: Workflow>(&mut self) {
        self.registry.register::<W>();
        info!(workflow_type = W::TYPE, "registered workflow type");
    }

    /// Get a reference to the store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a shared handle to the store
    pub fn shared_store(&self) -> Arc<S> {
        self.store.clone()
    }

    /// Start a new workflow
    ///
    /// Creates the workflow instance, persists the start event, marks it
    /// running and applies its initial actions.
    #[instrument(skip(self, input), fields(workflow_type = W::TYPE))]
    pub async fn start_workflow<W: Workflow>(
        &self,
        input: W::Input,
    ) -> Result<Uuid, ExecutorError> {
        let workflow_id = Uuid::now_v7();
        let input_json = serde_json::to_value(&input)?;

        info!(%workflow_id, "starting new workflow");

        self.store
            .create_workflow(workflow_id, W::TYPE, input_json.clone())
            .await?;

        self.store
            .append_events(
                workflow_id,
                0,
                vec![WorkflowEvent::WorkflowStarted { input: input_json }],
            )
            .await?;

        self.store
            .update_workflow_status(workflow_id, WorkflowStatus::Running, None, None)
            .await?;

        self.process_workflow(workflow_id).await?;

        Ok(workflow_id)
    }

    /// Get the stored record of a workflow
    pub async fn workflow_info(&self, workflow_id: Uuid) -> Result<WorkflowInfo, ExecutorError> {
        Ok(self.store.get_workflow_info(workflow_id).await?)
    }

    /// Poll the store until the workflow reaches a terminal status
    pub async fn wait_for_terminal(
        &self,
        workflow_id: Uuid,
        timeout: Duration,
    ) -> Result<WorkflowInfo, ExecutorError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let info = self.store.get_workflow_info(workflow_id).await?;
            if info.status.is_terminal() {
                return Ok(info);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ExecutorError::Timeout(workflow_id));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Replay a workflow and apply any actions its log does not record yet
    ///
    /// Safe to call repeatedly: actions already recorded in the log are not
    /// applied twice.
    #[instrument(skip(self))]
    pub async fn process_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<ProcessResult, ExecutorError> {
        let mut attempt = 0;
        loop {
            match self.process_once(workflow_id).await {
                Err(e) if e.is_conflict() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    debug!(%workflow_id, attempt, "lost append race, replaying again");
                }
                result => return result,
            }
        }
    }

    /// Record that a worker started an activity attempt
    #[instrument(skip(self))]
    pub async fn on_activity_started(
        &self,
        workflow_id: Uuid,
        activity_id: &str,
        attempt: u32,
        worker_id: &str,
    ) -> Result<(), ExecutorError> {
        self.append_with_retry(
            workflow_id,
            WorkflowEvent::ActivityStarted {
                activity_id: activity_id.to_string(),
                attempt,
                worker_id: worker_id.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    /// Handle activity completion
    ///
    /// Records the result and advances the workflow. A second completion for
    /// an activity that is already closed is ignored.
    #[instrument(skip(self, result))]
    pub async fn on_activity_completed(
        &self,
        workflow_id: Uuid,
        activity_id: &str,
        result: serde_json::Value,
    ) -> Result<ProcessResult, ExecutorError> {
        if self.activity_closed(workflow_id, activity_id).await? {
            warn!(%workflow_id, %activity_id, "activity already closed, ignoring completion");
            return Ok(ProcessResult::default());
        }

        self.append_with_retry(
            workflow_id,
            WorkflowEvent::ActivityCompleted {
                activity_id: activity_id.to_string(),
                result,
            },
        )
        .await?;

        let mut processed = self.process_workflow(workflow_id).await?;
        processed.events_written += 1;
        Ok(processed)
    }

    /// Handle activity failure
    ///
    /// Every failed attempt is recorded. The workflow only reacts once
    /// `will_retry` is false.
    #[instrument(skip(self, error))]
    pub async fn on_activity_failed(
        &self,
        workflow_id: Uuid,
        activity_id: &str,
        error: ActivityError,
        attempt: u32,
        will_retry: bool,
    ) -> Result<ProcessResult, ExecutorError> {
        if self.activity_closed(workflow_id, activity_id).await? {
            warn!(%workflow_id, %activity_id, "activity already closed, ignoring failure");
            return Ok(ProcessResult::default());
        }

        self.append_with_retry(
            workflow_id,
            WorkflowEvent::ActivityFailed {
                activity_id: activity_id.to_string(),
                error,
                attempt,
                will_retry,
            },
        )
        .await?;

        if will_retry {
            return Ok(ProcessResult {
                completed: false,
                events_written: 1,
                tasks_enqueued: 0,
            });
        }

        let mut processed = self.process_workflow(workflow_id).await?;
        processed.events_written += 1;
        Ok(processed)
    }

    /// Resume every unfinished workflow after a restart
    ///
    /// Pending workflows get their start event, running workflows are
    /// replayed, and activities that were scheduled but never closed are put
    /// back on the task queue at the attempt they had reached.
    #[instrument(skip(self))]
    pub async fn recover_workflows(&self) -> Result<RecoveryReport, ExecutorError> {
        let mut report = RecoveryReport::default();

        let mut candidates = self
            .store
            .list_workflows(Some(WorkflowStatus::Pending))
            .await?;
        candidates.extend(
            self.store
                .list_workflows(Some(WorkflowStatus::Running))
                .await?,
        );

        for info in candidates {
            match self.recover_workflow(&info).await {
                Ok(requeued) => {
                    report.workflows_resumed += 1;
                    report.tasks_requeued += requeued;
                }
                Err(e) => {
                    error!(workflow_id = %info.id, error = %e, "failed to recover workflow");
                    report.workflows_failed += 1;
                }
            }
        }

        info!(
            workflows_resumed = report.workflows_resumed,
            tasks_requeued = report.tasks_requeued,
            workflows_failed = report.workflows_failed,
            "recovery finished"
        );

        Ok(report)
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    async fn recover_workflow(&self, info: &WorkflowInfo) -> Result<usize, ExecutorError> {
        let workflow_id = info.id;

        if info.status == WorkflowStatus::Pending {
            let events = self.store.load_events(workflow_id).await?;
            if events.is_empty() {
                self.store
                    .append_events(
                        workflow_id,
                        0,
                        vec![WorkflowEvent::WorkflowStarted {
                            input: info.input.clone(),
                        }],
                    )
                    .await?;
            }
            self.store
                .update_workflow_status(workflow_id, WorkflowStatus::Running, None, None)
                .await?;
        }

        let processed = self.process_workflow(workflow_id).await?;
        if processed.completed {
            return Ok(0);
        }

        let events = self.store.load_events(workflow_id).await?;
        let mut requeued = 0;

        for (activity_id, open) in open_activities(&events) {
            if self.store.has_open_task(workflow_id, &activity_id).await? {
                continue;
            }

            let attempt = open.failed_attempts + 1;
            let delay = open.options.retry_policy.delay_for_attempt(attempt);
            let task = TaskDefinition::new(
                workflow_id,
                activity_id.clone(),
                open.activity_type,
                open.input,
                open.options,
            )
            .with_attempt(attempt)
            .with_delay(delay);

            self.store.enqueue_task(task).await?;
            info!(%workflow_id, %activity_id, attempt, "requeued unfinished activity");
            requeued += 1;
        }

        Ok(requeued)
    }

    async fn process_once(&self, workflow_id: Uuid) -> Result<ProcessResult, ExecutorError> {
        let info = self.store.get_workflow_info(workflow_id).await?;

        if info.status.is_terminal() {
            debug!(%workflow_id, status = %info.status, "workflow already in terminal state");
            return Ok(ProcessResult {
                completed: true,
                ..Default::default()
            });
        }

        let replayed = self.replay(&info).await?;

        if let Some(terminal) = replayed.terminal {
            // The terminal event made it into the log but the status update did not
            self.apply_terminal_status(workflow_id, terminal).await?;
            return Ok(ProcessResult {
                completed: true,
                ..Default::default()
            });
        }

        let (events_written, tasks_enqueued, completed) = self
            .apply_actions(workflow_id, replayed.next_sequence, replayed.pending)
            .await?;

        if !completed && replayed.workflow.is_completed() {
            debug!(%workflow_id, "workflow reports completion without a terminal action");
        }

        Ok(ProcessResult {
            completed,
            events_written,
            tasks_enqueued,
        })
    }

    /// Rebuild workflow state and collect actions the log does not record yet
    async fn replay(&self, info: &WorkflowInfo) -> Result<Replayed, ExecutorError> {
        let workflow_id = info.id;
        let events = self.store.load_events(workflow_id).await?;

        if events.is_empty() {
            return Err(ExecutorError::EmptyHistory(workflow_id));
        }

        if events.len() > self.config.max_events_per_workflow {
            return Err(ExecutorError::TooManyEvents(
                workflow_id,
                events.len(),
                self.config.max_events_per_workflow,
            ));
        }

        if !matches!(&events[0].1, WorkflowEvent::WorkflowStarted { .. }) {
            return Err(ExecutorError::ReplayError(
                workflow_id,
                "first event must be WorkflowStarted".to_string(),
            ));
        }

        let mut workflow = self
            .registry
            .create(&info.workflow_type, info.input.clone())?;
        let mut pending: Vec<WorkflowAction> = Vec::new();
        let mut terminal = None;

        for (seq, event) in &events {
            match event {
                WorkflowEvent::WorkflowStarted { .. } => {
                    pending.extend(workflow.on_start());
                }

                WorkflowEvent::ActivityCompleted {
                    activity_id,
                    result,
                } => {
                    pending.extend(workflow.on_activity_completed(activity_id, result.clone()));
                }

                WorkflowEvent::ActivityFailed {
                    activity_id,
                    error,
                    will_retry: false,
                    ..
                } => {
                    pending.extend(workflow.on_activity_failed(activity_id, error));
                }

                WorkflowEvent::ActivityScheduled { activity_id, .. } => {
                    let position = pending.iter().position(|a| {
                        matches!(
                            a,
                            WorkflowAction::ScheduleActivity { activity_id: id, .. }
                                if id == activity_id
                        )
                    });
                    match position {
                        Some(i) => {
                            pending.remove(i);
                        }
                        None => {
                            return Err(ExecutorError::ReplayError(
                                workflow_id,
                                format!(
                                    "event {} schedules activity {} the workflow never requested",
                                    seq, activity_id
                                ),
                            ));
                        }
                    }
                }

                WorkflowEvent::WorkflowCompleted { .. } => {
                    pending.retain(|a| !matches!(a, WorkflowAction::CompleteWorkflow { .. }));
                    terminal = Some(event.clone());
                }

                WorkflowEvent::WorkflowFailed { .. } => {
                    pending.retain(|a| !matches!(a, WorkflowAction::FailWorkflow { .. }));
                    terminal = Some(event.clone());
                }

                // Informational during replay
                WorkflowEvent::ActivityStarted { .. } | WorkflowEvent::ActivityFailed { .. } => {}
            }
        }

        debug!(%workflow_id, events = events.len(), pending = pending.len(), "replayed events");

        Ok(Replayed {
            workflow,
            pending,
            terminal,
            next_sequence: events.len() as i32,
        })
    }

    /// Apply actions in order, returning (events written, tasks enqueued, terminal)
    async fn apply_actions(
        &self,
        workflow_id: Uuid,
        mut sequence: i32,
        actions: Vec<WorkflowAction>,
    ) -> Result<(usize, usize, bool), ExecutorError> {
        let mut events_written = 0;
        let mut tasks_enqueued = 0;

        for action in actions {
            match action {
                WorkflowAction::ScheduleActivity {
                    activity_id,
                    activity_type,
                    input,
                    options,
                } => {
                    debug!(%workflow_id, %activity_id, %activity_type, "scheduling activity");

                    let event = WorkflowEvent::ActivityScheduled {
                        activity_id: activity_id.clone(),
                        activity_type: activity_type.clone(),
                        input: input.clone(),
                        options: options.clone(),
                    };

                    sequence = self
                        .store
                        .append_events(workflow_id, sequence, vec![event])
                        .await?;
                    events_written += 1;

                    self.store
                        .enqueue_task(TaskDefinition::new(
                            workflow_id,
                            activity_id,
                            activity_type,
                            input,
                            options,
                        ))
                        .await?;
                    tasks_enqueued += 1;
                }

                WorkflowAction::CompleteWorkflow { result } => {
                    info!(%workflow_id, "completing workflow");

                    let event = WorkflowEvent::WorkflowCompleted {
                        result: result.clone(),
                    };
                    self.store
                        .append_events(workflow_id, sequence, vec![event.clone()])
                        .await?;
                    self.apply_terminal_status(workflow_id, event).await?;

                    return Ok((events_written + 1, tasks_enqueued, true));
                }

                WorkflowAction::FailWorkflow { error } => {
                    error!(%workflow_id, error = %error.message, "failing workflow");

                    let event = WorkflowEvent::WorkflowFailed { error };
                    self.store
                        .append_events(workflow_id, sequence, vec![event.clone()])
                        .await?;
                    self.apply_terminal_status(workflow_id, event).await?;

                    return Ok((events_written + 1, tasks_enqueued, true));
                }
            }
        }

        Ok((events_written, tasks_enqueued, false))
    }

    async fn apply_terminal_status(
        &self,
        workflow_id: Uuid,
        terminal: WorkflowEvent,
    ) -> Result<(), ExecutorError> {
        match terminal {
            WorkflowEvent::WorkflowCompleted { result } => {
                self.store
                    .update_workflow_status(
                        workflow_id,
                        WorkflowStatus::Completed,
                        Some(result),
                        None,
                    )
                    .await?;
            }
            WorkflowEvent::WorkflowFailed { error } => {
                self.store
                    .update_workflow_status(workflow_id, WorkflowStatus::Failed, None, Some(error))
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn activity_closed(
        &self,
        workflow_id: Uuid,
        activity_id: &str,
    ) -> Result<bool, ExecutorError> {
        let events = self.store.load_events(workflow_id).await?;
        Ok(events
            .iter()
            .any(|(_, e)| e.closes_activity() && e.activity_id() == Some(activity_id)))
    }

    /// Append a single event at the tail of the log, retrying lost races
    async fn append_with_retry(
        &self,
        workflow_id: Uuid,
        event: WorkflowEvent,
    ) -> Result<i32, ExecutorError> {
        let mut attempt = 0;
        loop {
            let sequence = self.store.load_events(workflow_id).await?.len() as i32;
            match self
                .store
                .append_events(workflow_id, sequence, vec![event.clone()])
                .await
            {
                Err(StoreError::ConcurrencyConflict { .. })
                    if attempt < self.config.max_conflict_retries =>
                {
                    attempt += 1;
                    debug!(
                        %workflow_id,
                        event = event.name(),
                        attempt,
                        "append conflict, retrying"
                    );
                }
                result => return Ok(result?),
            }
        }
    }
}

/// An activity scheduled in the log without a closing event
struct OpenActivity {
    activity_type: String,
    input: serde_json::Value,
    options: crate::workflow::ActivityOptions,
    failed_attempts: u32,
}

/// Activities that were scheduled but never completed or finally failed,
/// in scheduling order
fn open_activities(events: &[(i32, WorkflowEvent)]) -> Vec<(String, OpenActivity)> {
    let mut order: Vec<String> = Vec::new();
    let mut open: HashMap<String, OpenActivity> = HashMap::new();

    for (_, event) in events {
        match event {
            WorkflowEvent::ActivityScheduled {
                activity_id,
                activity_type,
                input,
                options,
            } => {
                order.push(activity_id.clone());
                open.insert(
                    activity_id.clone(),
                    OpenActivity {
                        activity_type: activity_type.clone(),
                        input: input.clone(),
                        options: options.clone(),
                        failed_attempts: 0,
                    },
                );
            }
            WorkflowEvent::ActivityFailed {
                activity_id,
                will_retry: true,
                attempt,
                ..
            } => {
                if let Some(activity) = open.get_mut(activity_id) {
                    activity.failed_attempts = activity.failed_attempts.max(*attempt);
                }
            }
            e if e.closes_activity() => {
                if let Some(id) = e.activity_id() {
                    open.remove(id);
                }
            }
            _ => {}
        }
    }

    order
        .into_iter()
        .filter_map(|id| open.remove(&id).map(|a| (id, a)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryWorkflowEventStore;
    use crate::workflow::WorkflowError;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    // Two-step workflow: fetch, then store what was fetched
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct CopyInput {
        source: String,
    }

    struct CopyWorkflow {
        input: CopyInput,
        stored: Option<String>,
        error: Option<WorkflowError>,
    }

    impl Workflow for CopyWorkflow {
        const TYPE: &'static str = "copy";
        type Input = CopyInput;
        type Output = String;

        fn new(input: Self::Input) -> Self {
            Self {
                input,
                stored: None,
                error: None,
            }
        }

        fn on_start(&mut self) -> Vec<WorkflowAction> {
            vec![WorkflowAction::schedule_activity(
                "fetch-1",
                "fetch",
                json!(self.input.source),
            )]
        }

        fn on_activity_completed(
            &mut self,
            activity_id: &str,
            result: Value,
        ) -> Vec<WorkflowAction> {
            match activity_id {
                "fetch-1" => vec![WorkflowAction::schedule_activity("store-2", "store", result)],
                "store-2" => {
                    let name = result.as_str().unwrap_or_default().to_string();
                    self.stored = Some(name.clone());
                    vec![WorkflowAction::complete(json!(name))]
                }
                _ => vec![],
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
            self.stored.is_some() || self.error.is_some()
        }

        fn result(&self) -> Option<Self::Output> {
            self.stored.clone()
        }

        fn error(&self) -> Option<WorkflowError> {
            self.error.clone()
        }
    }

    // Completes without scheduling anything
    struct NoopWorkflow;

    impl Workflow for NoopWorkflow {
        const TYPE: &'static str = "noop";
        type Input = ();
        type Output = ();

        fn new(_input: ()) -> Self {
            Self
        }

        fn on_start(&mut self) -> Vec<WorkflowAction> {
            vec![WorkflowAction::complete(json!(null))]
        }

        fn on_activity_completed(&mut self, _: &str, _: Value) -> Vec<WorkflowAction> {
            vec![]
        }

        fn on_activity_failed(&mut self, _: &str, _: &ActivityError) -> Vec<WorkflowAction> {
            vec![]
        }

        fn is_completed(&self) -> bool {
            true
        }

        fn result(&self) -> Option<()> {
            Some(())
        }
    }

    fn executor() -> WorkflowExecutor<InMemoryWorkflowEventStore> {
        let mut executor = WorkflowExecutor::new(InMemoryWorkflowEventStore::new());
        executor.register::<CopyWorkflow>();
        executor.register::<NoopWorkflow>();
        executor
    }

    fn input() -> CopyInput {
        CopyInput {
            source: "a.pdf".to_string(),
        }
    }

    async fn scheduled_ids(
        executor: &WorkflowExecutor<InMemoryWorkflowEventStore>,
        id: Uuid,
    ) -> Vec<String> {
        executor
            .store()
            .load_events(id)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|(_, e)| match e {
                WorkflowEvent::ActivityScheduled { activity_id, .. } => Some(activity_id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_start_workflow() {
        let executor = executor();
        let workflow_id = executor.start_workflow::<CopyWorkflow>(input()).await.unwrap();

        let status = executor.store().get_workflow_status(workflow_id).await.unwrap();
        assert_eq!(status, WorkflowStatus::Running);

        let events = executor.store().load_events(workflow_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].1, WorkflowEvent::WorkflowStarted { .. }));
        assert!(matches!(events[1].1, WorkflowEvent::ActivityScheduled { .. }));
        assert_eq!(executor.store().pending_task_count(), 1);
    }

    #[tokio::test]
    async fn test_immediate_completion() {
        let executor = executor();
        let workflow_id = executor.start_workflow::<NoopWorkflow>(()).await.unwrap();

        let info = executor.workflow_info(workflow_id).await.unwrap();
        assert_eq!(info.status, WorkflowStatus::Completed);
        assert_eq!(info.result, Some(json!(null)));
    }

    #[tokio::test]
    async fn test_completion_schedules_next_activity() {
        let executor = executor();
        let workflow_id = executor.start_workflow::<CopyWorkflow>(input()).await.unwrap();

        let result = executor
            .on_activity_completed(workflow_id, "fetch-1", json!("contents"))
            .await
            .unwrap();
        assert!(!result.completed);
        assert_eq!(result.tasks_enqueued, 1);
        assert_eq!(scheduled_ids(&executor, workflow_id).await, vec!["fetch-1", "store-2"]);

        let result = executor
            .on_activity_completed(workflow_id, "store-2", json!("a-out.txt"))
            .await
            .unwrap();
        assert!(result.completed);

        let info = executor.workflow_info(workflow_id).await.unwrap();
        assert_eq!(info.status, WorkflowStatus::Completed);
        assert_eq!(info.result, Some(json!("a-out.txt")));
    }

    #[tokio::test]
    async fn test_process_is_idempotent() {
        let executor = executor();
        let workflow_id = executor.start_workflow::<CopyWorkflow>(input()).await.unwrap();

        let again = executor.process_workflow(workflow_id).await.unwrap();
        assert_eq!(again.events_written, 0);
        assert_eq!(again.tasks_enqueued, 0);
        assert_eq!(scheduled_ids(&executor, workflow_id).await, vec!["fetch-1"]);
    }

    #[tokio::test]
    async fn test_duplicate_completion_ignored() {
        let executor = executor();
        let workflow_id = executor.start_workflow::<CopyWorkflow>(input()).await.unwrap();

        executor
            .on_activity_completed(workflow_id, "fetch-1", json!("contents"))
            .await
            .unwrap();
        let second = executor
            .on_activity_completed(workflow_id, "fetch-1", json!("contents"))
            .await
            .unwrap();

        assert_eq!(second, ProcessResult::default());
        assert_eq!(scheduled_ids(&executor, workflow_id).await, vec!["fetch-1", "store-2"]);
    }

    #[tokio::test]
    async fn test_retrying_failure_does_not_advance() {
        let executor = executor();
        let workflow_id = executor.start_workflow::<CopyWorkflow>(input()).await.unwrap();

        let result = executor
            .on_activity_failed(workflow_id, "fetch-1", ActivityError::retryable("503"), 1, true)
            .await
            .unwrap();
        assert!(!result.completed);

        let status = executor.store().get_workflow_status(workflow_id).await.unwrap();
        assert_eq!(status, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn test_final_failure_fails_workflow() {
        let executor = executor();
        let workflow_id = executor.start_workflow::<CopyWorkflow>(input()).await.unwrap();

        let result = executor
            .on_activity_failed(workflow_id, "fetch-1", ActivityError::retryable("503"), 3, false)
            .await
            .unwrap();
        assert!(result.completed);

        let info = executor.workflow_info(workflow_id).await.unwrap();
        assert_eq!(info.status, WorkflowStatus::Failed);
        assert_eq!(info.error.unwrap().message, "503");
        assert_eq!(scheduled_ids(&executor, workflow_id).await, vec!["fetch-1"]);
    }

    #[tokio::test]
    async fn test_recover_requeues_unfinished_activity() {
        let store = Arc::new(InMemoryWorkflowEventStore::new());
        let workflow_id = Uuid::now_v7();
        let input = json!({"source": "a.pdf"});

        // Log left behind by a crashed process: fetch done, store scheduled and failed once
        store.create_workflow(workflow_id, "copy", input.clone()).await.unwrap();
        store
            .append_events(
                workflow_id,
                0,
                vec![
                    WorkflowEvent::WorkflowStarted { input },
                    WorkflowEvent::ActivityScheduled {
                        activity_id: "fetch-1".to_string(),
                        activity_type: "fetch".to_string(),
                        input: json!("a.pdf"),
                        options: Default::default(),
                    },
                    WorkflowEvent::ActivityCompleted {
                        activity_id: "fetch-1".to_string(),
                        result: json!("contents"),
                    },
                    WorkflowEvent::ActivityScheduled {
                        activity_id: "store-2".to_string(),
                        activity_type: "store".to_string(),
                        input: json!("contents"),
                        options: Default::default(),
                    },
                    WorkflowEvent::ActivityFailed {
                        activity_id: "store-2".to_string(),
                        error: ActivityError::retryable("disk full"),
                        attempt: 1,
                        will_retry: true,
                    },
                ],
            )
            .await
            .unwrap();
        store
            .update_workflow_status(workflow_id, WorkflowStatus::Running, None, None)
            .await
            .unwrap();

        let mut executor = WorkflowExecutor::from_shared(store.clone());
        executor.register::<CopyWorkflow>();

        let report = executor.recover_workflows().await.unwrap();
        assert_eq!(report.workflows_resumed, 1);
        assert_eq!(report.tasks_requeued, 1);
        assert!(store.has_open_task(workflow_id, "store-2").await.unwrap());
        assert!(!store.has_open_task(workflow_id, "fetch-1").await.unwrap());

        // A second pass finds the task already queued
        let report = executor.recover_workflows().await.unwrap();
        assert_eq!(report.tasks_requeued, 0);
    }

    #[tokio::test]
    async fn test_recover_applies_unrecorded_action() {
        let store = Arc::new(InMemoryWorkflowEventStore::new());
        let workflow_id = Uuid::now_v7();
        let input = json!({"source": "a.pdf"});

        // Crashed right after WorkflowStarted, before scheduling
        store.create_workflow(workflow_id, "copy", input.clone()).await.unwrap();
        store
            .append_events(workflow_id, 0, vec![WorkflowEvent::WorkflowStarted { input }])
            .await
            .unwrap();

        let mut executor = WorkflowExecutor::from_shared(store.clone());
        executor.register::<CopyWorkflow>();

        let report = executor.recover_workflows().await.unwrap();
        assert_eq!(report.workflows_resumed, 1);
        assert_eq!(store.get_workflow_status(workflow_id).await.unwrap(), WorkflowStatus::Running);
        assert_eq!(scheduled_ids(&executor, workflow_id).await, vec!["fetch-1"]);
        assert!(store.has_open_task(workflow_id, "fetch-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_rejects_unknown_scheduled_activity() {
        let store = Arc::new(InMemoryWorkflowEventStore::new());
        let workflow_id = Uuid::now_v7();
        let input = json!({"source": "a.pdf"});

        store.create_workflow(workflow_id, "copy", input.clone()).await.unwrap();
        store
            .append_events(
                workflow_id,
                0,
                vec![
                    WorkflowEvent::WorkflowStarted { input },
                    WorkflowEvent::ActivityScheduled {
                        activity_id: "mystery-9".to_string(),
                        activity_type: "mystery".to_string(),
                        input: json!(null),
                        options: Default::default(),
                    },
                ],
            )
            .await
            .unwrap();

        let mut executor = WorkflowExecutor::from_shared(store);
        executor.register::<CopyWorkflow>();

        let result = executor.process_workflow(workflow_id).await;
        assert!(matches!(result, Err(ExecutorError::ReplayError(_, _))));
    }

    #[tokio::test]
    async fn test_terminal_event_repairs_status() {
        let store = Arc::new(InMemoryWorkflowEventStore::new());
        let workflow_id = Uuid::now_v7();

        store.create_workflow(workflow_id, "noop", json!(null)).await.unwrap();
        store
            .append_events(
                workflow_id,
                0,
                vec![
                    WorkflowEvent::WorkflowStarted { input: json!(null) },
                    WorkflowEvent::WorkflowCompleted { result: json!(null) },
                ],
            )
            .await
            .unwrap();
        store
            .update_workflow_status(workflow_id, WorkflowStatus::Running, None, None)
            .await
            .unwrap();

        let mut executor = WorkflowExecutor::from_shared(store.clone());
        executor.register::<NoopWorkflow>();

        let result = executor.process_workflow(workflow_id).await.unwrap();
        assert!(result.completed);
        assert_eq!(result.events_written, 0);
        assert_eq!(
            store.get_workflow_status(workflow_id).await.unwrap(),
            WorkflowStatus::Completed
        );
    }
}
