// Error types for the pipeline capabilities
//
// One enum per capability so provider crates can map their transport
// failures onto a small, matchable surface.

use thiserror::Error;

/// Errors raised by blob storage backends
#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("Blob not found: {container}/{name}")]
    NotFound { container: String, name: String },

    #[error("Invalid blob name: {0}")]
    InvalidName(String),

    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobStoreError {
    pub fn not_found(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            container: container.into(),
            name: name.into(),
        }
    }
}

/// Errors raised by document analysis backends
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Analysis request failed: {0}")]
    Request(String),

    #[error("Analysis service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Analysis operation failed: {0}")]
    OperationFailed(String),

    #[error("Analysis did not finish after {0} polls")]
    PollLimitExceeded(u32),

    #[error("Malformed analysis response: {0}")]
    InvalidResponse(String),
}

impl AnalysisError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}

/// Errors raised by summarization backends
#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("Summarization request failed: {0}")]
    Request(String),

    #[error("Summarization service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Summarization response had no content")]
    EmptyResponse,

    #[error("Malformed summarization response: {0}")]
    InvalidResponse(String),
}

impl SummarizeError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }
}
