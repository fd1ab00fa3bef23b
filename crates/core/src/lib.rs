// Document Pipeline Core
//
// This crate provides the backend-agnostic pieces of the document pipeline:
// the data that flows between steps and the traits each step talks to.
//
// Key design decisions:
// - Uses traits (BlobStore, DocumentAnalyzer, Summarizer) for pluggable backends
// - Clients are built once at startup and injected as Arc<dyn Trait>
// - Domain types keep the wire shapes of step payloads (e.g. `blobName`)
// - Remote service clients live in provider crates (docflow-analysis, docflow-openai)
// - Error handling uses one thiserror enum per capability

// Telemetry (tracing subscriber setup)
pub mod telemetry;

pub mod blob;
pub mod document;
pub mod error;
pub mod naming;
pub mod summarizer;
pub mod traits;

// Re-exports for convenience
pub use blob::{blob_store_from_connection_string, InMemoryBlobStore, LocalBlobStore};
pub use document::{
    AnalyzedDocument, AnalyzedLine, AnalyzedPage, ExtractedText, OutputArtifact, SummaryResult,
    WorkItem, WriteRequest,
};
pub use error::{AnalysisError, BlobStoreError, SummarizeError};
pub use naming::{base_name, output_name, OUTPUT_TIMESTAMP_FORMAT};
pub use summarizer::{MockSummarizer, MOCK_SUMMARY};
pub use traits::{BlobInfo, BlobStore, DocumentAnalyzer, Summarizer};
