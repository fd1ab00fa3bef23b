// Document Pipeline Worker
//
// Wires the pipeline together: a blob trigger starts one process_document
// workflow per uploaded document, and a worker pool executes its steps
// (analyze_pdf → summarize_text → write_doc) on the durable engine.

pub mod activities;
pub mod config;
pub mod pipeline;
pub mod trigger;
pub mod workflow;

// Re-export main types
pub use activities::{AnalyzePdf, Clock, SummarizeText, WriteDoc};
pub use config::{ConfigError, SummarizerMode, SummarizerSettings, WorkerConfig};
pub use pipeline::{
    open_event_store, DocumentExecutor, DocumentPipeline, PipelineServices, PipelineSettings,
    SharedEventStore,
};
pub use trigger::{BlobArrival, BlobTrigger};
pub use workflow::{
    standard_retry_policy, DocumentState, ProcessDocumentInput, ProcessDocumentWorkflow,
};
