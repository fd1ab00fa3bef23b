// Core traits for pluggable backends
//
// These traits let the pipeline steps run against different backends:
// - In-memory implementations for tests and local development
// - Filesystem and HTTP implementations for real deployments

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{AnalyzedDocument, SummaryResult};
use crate::error::{AnalysisError, BlobStoreError, SummarizeError};

// ============================================================================
// BlobStore - Named containers of binary blobs
// ============================================================================

/// A blob listed in a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Name relative to the container, `/`-separated
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Changes whenever the blob is replaced
    pub version: String,
}

/// Trait for reading and writing blobs grouped in containers
///
/// Implementations can:
/// - Keep blobs in memory for testing
/// - Map containers to directories on a local filesystem
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List every blob in a container, sorted by name.
    /// A container that does not exist yet lists as empty.
    async fn list(&self, container: &str) -> Result<Vec<BlobInfo>, BlobStoreError>;

    /// Download a blob in full
    async fn download(&self, container: &str, name: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// Upload a blob, replacing any existing blob with the same name.
    /// A replaced blob lists with a new version.
    async fn upload(&self, container: &str, name: &str, data: Vec<u8>)
        -> Result<(), BlobStoreError>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

// ============================================================================
// DocumentAnalyzer - Layout analysis of documents
// ============================================================================

/// Trait for services that recognize the text layout of a document
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Analyze raw document bytes and wait for the result
    async fn analyze(&self, document: &[u8]) -> Result<AnalyzedDocument, AnalysisError>;

    /// Analyzer name for logs
    fn name(&self) -> &str;
}

// ============================================================================
// Summarizer - Text summarization
// ============================================================================

/// Trait for text summarization backends
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<SummaryResult, SummarizeError>;

    /// Summarizer name for logs
    fn name(&self) -> &str;
}
