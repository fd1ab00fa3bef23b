//! Commands a workflow returns from its event handlers

use serde::{Deserialize, Serialize};

use super::WorkflowError;
use crate::reliability::RetryPolicy;

/// Work requested by a workflow
///
/// The executor records every action as a [`WorkflowEvent`](super::WorkflowEvent)
/// before acting on it. On replay, an action whose event is already in the
/// log is dropped, so nothing is scheduled twice. Returning no actions means
/// the workflow is waiting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowAction {
    /// Put an activity on the task queue
    ScheduleActivity {
        /// Unique within the workflow, e.g. `analyze_pdf-1`
        activity_id: String,
        /// Registered activity handler
        activity_type: String,
        input: serde_json::Value,
        options: ActivityOptions,
    },

    /// Finish with a result
    CompleteWorkflow { result: serde_json::Value },

    /// Finish with an error
    FailWorkflow { error: WorkflowError },
}

impl WorkflowAction {
    /// Schedule an activity with the default retry policy
    pub fn schedule_activity(
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::schedule_activity_with_options(
            activity_id,
            activity_type,
            input,
            ActivityOptions::default(),
        )
    }

    pub fn schedule_activity_with_options(
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        input: serde_json::Value,
        options: ActivityOptions,
    ) -> Self {
        Self::ScheduleActivity {
            activity_id: activity_id.into(),
            activity_type: activity_type.into(),
            input,
            options,
        }
    }

    pub fn complete(result: serde_json::Value) -> Self {
        Self::CompleteWorkflow { result }
    }

    pub fn fail(error: WorkflowError) -> Self {
        Self::FailWorkflow { error }
    }

    /// Whether this action ends the workflow
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CompleteWorkflow { .. } | Self::FailWorkflow { .. })
    }
}

/// Per-activity execution options, stored with the scheduled event
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityOptions {
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}
