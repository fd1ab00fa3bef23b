//! Entries of the per-workflow event log

use serde::{Deserialize, Serialize};

use super::{ActivityOptions, WorkflowError};
use crate::activity::ActivityError;

/// One entry in a workflow's append-only log
///
/// Workflow state is never stored directly: it is rebuilt by feeding these
/// events back into a fresh workflow instance in sequence order. Entries are
/// never modified once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        input: serde_json::Value,
    },

    WorkflowCompleted {
        result: serde_json::Value,
    },

    WorkflowFailed {
        error: WorkflowError,
    },

    /// Recorded before the task is queued
    ActivityScheduled {
        activity_id: String,
        activity_type: String,
        input: serde_json::Value,
        options: ActivityOptions,
    },

    /// A worker claimed an attempt; informational only
    ActivityStarted {
        activity_id: String,
        /// 1-based
        attempt: u32,
        worker_id: String,
    },

    ActivityCompleted {
        activity_id: String,
        result: serde_json::Value,
    },

    /// One failed attempt; closes the activity only when `will_retry` is false
    ActivityFailed {
        activity_id: String,
        error: ActivityError,
        attempt: u32,
        will_retry: bool,
    },
}

impl WorkflowEvent {
    /// Serialized tag, for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::WorkflowFailed { .. } => "workflow_failed",
            Self::ActivityScheduled { .. } => "activity_scheduled",
            Self::ActivityStarted { .. } => "activity_started",
            Self::ActivityCompleted { .. } => "activity_completed",
            Self::ActivityFailed { .. } => "activity_failed",
        }
    }

    pub fn activity_id(&self) -> Option<&str> {
        match self {
            Self::ActivityScheduled { activity_id, .. }
            | Self::ActivityStarted { activity_id, .. }
            | Self::ActivityCompleted { activity_id, .. }
            | Self::ActivityFailed { activity_id, .. } => Some(activity_id),
            Self::WorkflowStarted { .. }
            | Self::WorkflowCompleted { .. }
            | Self::WorkflowFailed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted { .. } | Self::WorkflowFailed { .. }
        )
    }

    /// Success, or the final failed attempt
    pub fn closes_activity(&self) -> bool {
        matches!(
            self,
            Self::ActivityCompleted { .. }
                | Self::ActivityFailed {
                    will_retry: false,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failed(attempt: u32, will_retry: bool) -> WorkflowEvent {
        WorkflowEvent::ActivityFailed {
            activity_id: "analyze_pdf-1".to_string(),
            error: ActivityError::retryable("analysis service unavailable"),
            attempt,
            will_retry,
        }
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        let events = vec![
            WorkflowEvent::WorkflowStarted {
                input: json!({"blob_name": "report.pdf"}),
            },
            WorkflowEvent::ActivityStarted {
                activity_id: "analyze_pdf-1".to_string(),
                attempt: 1,
                worker_id: "worker-a".to_string(),
            },
            failed(1, true),
            WorkflowEvent::WorkflowCompleted {
                result: json!("report-20240101T000000Z.txt"),
            },
        ];

        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.name());
            let parsed: WorkflowEvent = serde_json::from_value(value).unwrap();
            assert_eq!(parsed, event);
        }
    }

    #[test]
    fn test_activity_id() {
        assert_eq!(failed(1, true).activity_id(), Some("analyze_pdf-1"));
        assert_eq!(
            WorkflowEvent::WorkflowStarted { input: json!({}) }.activity_id(),
            None
        );
    }

    #[test]
    fn test_only_final_failure_closes_activity() {
        assert!(!failed(1, true).closes_activity());
        assert!(failed(3, false).closes_activity());
        assert!(WorkflowEvent::ActivityCompleted {
            activity_id: "write_doc-3".to_string(),
            result: json!("report-20240101T000000Z.txt"),
        }
        .closes_activity());
    }

    #[test]
    fn test_terminal_events() {
        assert!(WorkflowEvent::WorkflowFailed {
            error: WorkflowError::new("analysis failed")
        }
        .is_terminal());
        assert!(!failed(3, false).is_terminal());
    }
}
