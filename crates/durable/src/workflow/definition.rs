//! The `Workflow` state machine trait and its error type

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::WorkflowAction;
use crate::activity::ActivityError;

/// Why a workflow ended in failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowError {
    pub message: String,
    /// Machine-readable label, e.g. the failing activity's error type
    pub code: Option<String>,
}

impl WorkflowError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl From<&ActivityError> for WorkflowError {
    fn from(error: &ActivityError) -> Self {
        Self {
            message: error.message.clone(),
            code: error.error_type.clone(),
        }
    }
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for WorkflowError {}

/// A deterministic state machine driven by activity outcomes
///
/// The executor never stores workflow state. After a restart it calls
/// [`Workflow::new`] with the original input and replays the recorded
/// outcomes, so the same events must always produce the same actions.
/// Handlers must not perform I/O or read the clock; that belongs in
/// activities.
///
/// # Example
///
/// ```ignore
/// use docflow_durable::prelude::*;
///
/// struct ConvertWorkflow {
///     path: String,
///     done: Option<String>,
/// }
///
/// impl Workflow for ConvertWorkflow {
///     const TYPE: &'static str = "convert";
///     type Input = String;
///     type Output = String;
///
///     fn new(input: Self::Input) -> Self {
///         Self { path: input, done: None }
///     }
///
///     fn on_start(&mut self) -> Vec<WorkflowAction> {
///         vec![WorkflowAction::schedule_activity("convert-1", "convert", json!(self.path))]
///     }
///
///     // ...
/// }
/// ```
pub trait Workflow: Send + Sync + 'static {
    /// Registry key, persisted with every instance
    const TYPE: &'static str;

    type Input: Serialize + DeserializeOwned + Send + Clone;
    type Output: Serialize + DeserializeOwned + Send;

    /// Build a fresh instance; used both on start and on replay
    fn new(input: Self::Input) -> Self;

    fn on_start(&mut self) -> Vec<WorkflowAction>;

    fn on_activity_completed(
        &mut self,
        activity_id: &str,
        result: serde_json::Value,
    ) -> Vec<WorkflowAction>;

    /// Only called once the activity has no attempts left
    fn on_activity_failed(
        &mut self,
        activity_id: &str,
        error: &ActivityError,
    ) -> Vec<WorkflowAction>;

    fn is_completed(&self) -> bool;

    fn result(&self) -> Option<Self::Output>;

    fn error(&self) -> Option<WorkflowError> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        assert_eq!(WorkflowError::new("write failed").to_string(), "write failed");
        assert_eq!(
            WorkflowError::new("write failed")
                .with_code("BLOB_STORE")
                .to_string(),
            "write failed (BLOB_STORE)"
        );
    }

    #[test]
    fn test_from_activity_error_keeps_type() {
        let activity_error = ActivityError::retryable("blob missing").with_type("BLOB_STORE");
        let error = WorkflowError::from(&activity_error);

        assert_eq!(error.message, "blob missing");
        assert_eq!(error.code.as_deref(), Some("BLOB_STORE"));
    }
}
