// Process Document Workflow - Extract → Summarize → Write
//
// This workflow sequences the three pipeline steps for one source document:
// 1. analyze_pdf: download the blob and extract its text
// 2. summarize_text: summarize the extracted text
// 3. write_doc: upload the summary under a timestamped name
//
// Key design principles:
// - Each step is scheduled only after the previous completion is recorded
// - Every step carries the same retry policy, taken from the workflow input
// - The first step to exhaust its attempts fails the workflow; nothing is undone

use docflow_core::{ExtractedText, SummaryResult, WorkItem, WriteRequest};
use docflow_durable::{
    Activity, ActivityError, ActivityOptions, RetryPolicy, Workflow, WorkflowAction,
    WorkflowError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::activities::{AnalyzePdf, SummarizeText, WriteDoc};

/// First retry after 5 seconds, 3 attempts in total
pub fn standard_retry_policy() -> RetryPolicy {
    RetryPolicy::fixed(Duration::from_millis(5000), 3)
}

// ============================================================================
// Input/Output Types
// ============================================================================

/// Workflow input: the document to process and the retry policy for its steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDocumentInput {
    pub blob_name: WorkItem,
    /// Blob version that triggered this run; empty for manual submissions
    #[serde(default)]
    pub blob_version: String,
    #[serde(default = "standard_retry_policy")]
    pub retry_policy: RetryPolicy,
}

impl ProcessDocumentInput {
    pub fn new(blob_name: WorkItem) -> Self {
        Self {
            blob_name,
            blob_version: String::new(),
            retry_policy: standard_retry_policy(),
        }
    }

    pub fn with_blob_version(mut self, version: impl Into<String>) -> Self {
        self.blob_version = version.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

// ============================================================================
// Workflow State
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState {
    Init,
    Analyzing { pending_activity: String },
    Summarizing { pending_activity: String },
    Writing { pending_activity: String },
    /// Terminal: summary written under `output_name`
    Completed { output_name: String },
    /// Terminal: a step ran out of attempts
    Failed { error: WorkflowError },
}

// ============================================================================
// Workflow Implementation
// ============================================================================

#[derive(Debug)]
pub struct ProcessDocumentWorkflow {
    input: ProcessDocumentInput,
    state: DocumentState,
    activity_seq: u32,
}

impl ProcessDocumentWorkflow {
    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    fn next_activity_id(&mut self, prefix: &str) -> String {
        self.activity_seq += 1;
        format!("{}-{}", prefix, self.activity_seq)
    }

    fn options(&self) -> ActivityOptions {
        ActivityOptions::default().with_retry(self.input.retry_policy.clone())
    }

    fn schedule(&mut self, activity_type: &str, input: Value) -> (String, WorkflowAction) {
        let activity_id = self.next_activity_id(activity_type);
        let action = WorkflowAction::schedule_activity_with_options(
            activity_id.clone(),
            activity_type,
            input,
            self.options(),
        );
        (activity_id, action)
    }

    fn fail(&mut self, error: WorkflowError) -> Vec<WorkflowAction> {
        self.state = DocumentState::Failed {
            error: error.clone(),
        };
        vec![WorkflowAction::fail(error)]
    }

    fn invalid_result(&mut self, step: &str, err: serde_json::Error) -> Vec<WorkflowAction> {
        self.fail(
            WorkflowError::new(format!("{} returned an unreadable result: {}", step, err))
                .with_code("INVALID_RESULT"),
        )
    }

    // =========================================================================
    // State Transitions
    // =========================================================================

    fn transition_to_summarize(&mut self, text: ExtractedText) -> Vec<WorkflowAction> {
        let (pending_activity, action) = self.schedule(SummarizeText::TYPE, json!(text));
        self.state = DocumentState::Summarizing { pending_activity };
        vec![action]
    }

    fn transition_to_write(&mut self, summary: SummaryResult) -> Vec<WorkflowAction> {
        let request = WriteRequest::new(&self.input.blob_name, summary);
        let (pending_activity, action) = self.schedule(WriteDoc::TYPE, json!(request));
        self.state = DocumentState::Writing { pending_activity };
        vec![action]
    }

    fn complete(&mut self, output_name: String) -> Vec<WorkflowAction> {
        self.state = DocumentState::Completed {
            output_name: output_name.clone(),
        };
        vec![WorkflowAction::complete(json!(output_name))]
    }

    fn is_pending(&self, activity_id: &str) -> bool {
        match &self.state {
            DocumentState::Analyzing { pending_activity }
            | DocumentState::Summarizing { pending_activity }
            | DocumentState::Writing { pending_activity } => pending_activity == activity_id,
            _ => false,
        }
    }
}

impl Workflow for ProcessDocumentWorkflow {
    const TYPE: &'static str = "process_document";
    type Input = ProcessDocumentInput;
    type Output = String;

    fn new(input: Self::Input) -> Self {
        Self {
            input,
            state: DocumentState::Init,
            activity_seq: 0,
        }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        let (pending_activity, action) =
            self.schedule(AnalyzePdf::TYPE, json!(self.input.blob_name));
        self.state = DocumentState::Analyzing { pending_activity };
        vec![action]
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        if !self.is_pending(activity_id) {
            tracing::warn!(
                activity_id,
                state = ?self.state,
                "Ignoring completion of unexpected activity"
            );
            return vec![];
        }

        match self.state {
            DocumentState::Analyzing { .. } => match serde_json::from_value(result) {
                Ok(text) => self.transition_to_summarize(text),
                Err(e) => self.invalid_result(AnalyzePdf::TYPE, e),
            },
            DocumentState::Summarizing { .. } => match serde_json::from_value(result) {
                Ok(summary) => self.transition_to_write(summary),
                Err(e) => self.invalid_result(SummarizeText::TYPE, e),
            },
            DocumentState::Writing { .. } => match serde_json::from_value(result) {
                Ok(name) => self.complete(name),
                Err(e) => self.invalid_result(WriteDoc::TYPE, e),
            },
            _ => vec![],
        }
    }

    fn on_activity_failed(
        &mut self,
        activity_id: &str,
        error: &ActivityError,
    ) -> Vec<WorkflowAction> {
        if !self.is_pending(activity_id) {
            tracing::warn!(
                activity_id,
                state = ?self.state,
                "Ignoring failure of unexpected activity"
            );
            return vec![];
        }
        self.fail(WorkflowError::from(error))
    }

    fn is_completed(&self) -> bool {
        matches!(
            self.state,
            DocumentState::Completed { .. } | DocumentState::Failed { .. }
        )
    }

    fn result(&self) -> Option<String> {
        match &self.state {
            DocumentState::Completed { output_name } => Some(output_name.clone()),
            _ => None,
        }
    }

    fn error(&self) -> Option<WorkflowError> {
        match &self.state {
            DocumentState::Failed { error } => Some(error.clone()),
            _ => None,
        }
    }
}
