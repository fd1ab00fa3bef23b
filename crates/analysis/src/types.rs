// Form Recognizer Protocol Types
//
// Only the parts of the analyze operation payload the pipeline reads.
// Unknown fields are ignored.

use docflow_core::AnalyzedDocument;
use serde::{Deserialize, Serialize};

/// State of a long-running analyze operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Running)
    }
}

/// Error object reported by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Body returned when polling an analyze operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOperation {
    pub status: OperationStatus,
    #[serde(default)]
    pub analyze_result: Option<AnalyzedDocument>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

/// Envelope used by error responses (`{"error": {...}}`)
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ServiceError,
}
