// Document Analysis Provider
//
// This crate provides a DocumentAnalyzer backed by the Form Recognizer
// (Document Intelligence) REST API. Analysis is a long-running operation:
// the document is submitted once, then the returned operation URL is polled
// until the service reports success or failure.

mod client;
mod types;


pub use client::{FormRecognizerClient, FormRecognizerConfig};
pub use types::{AnalyzeOperation, OperationStatus, ServiceError};

// Re-export core types for convenience
pub use docflow_core::{AnalysisError, AnalyzedDocument, DocumentAnalyzer};
