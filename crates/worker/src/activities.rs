// Pipeline activities
//
// The three step executors of the document pipeline. Each one wraps an
// injected capability (blob store, analyzer, summarizer) and turns its
// errors into retryable activity failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_core::{
    BlobStore, DocumentAnalyzer, ExtractedText, OutputArtifact, Summarizer, SummaryResult,
    WorkItem, WriteRequest,
};
use docflow_durable::{Activity, ActivityContext, ActivityError};
use std::sync::Arc;
use tracing::info;

/// Source of the current time for output names
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Every step failure is retried; the type only labels the failing capability
fn step_error(error_type: &str, err: impl std::fmt::Display) -> ActivityError {
    ActivityError::retryable(err.to_string()).with_type(error_type)
}

// ============================================================================
// analyze_pdf
// ============================================================================

/// Downloads a document and extracts its text
pub struct AnalyzePdf {
    blobs: Arc<dyn BlobStore>,
    analyzer: Arc<dyn DocumentAnalyzer>,
    container: String,
}

impl AnalyzePdf {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        analyzer: Arc<dyn DocumentAnalyzer>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            analyzer,
            container: container.into(),
        }
    }
}

#[async_trait]
impl Activity for AnalyzePdf {
    const TYPE: &'static str = "analyze_pdf";
    type Input = WorkItem;
    type Output = ExtractedText;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        item: WorkItem,
    ) -> Result<ExtractedText, ActivityError> {
        info!(
            workflow_id = %ctx.workflow_id,
            blob_name = %item,
            attempt = ctx.attempt,
            analyzer = self.analyzer.name(),
            "Analyzing document"
        );

        let bytes = self
            .blobs
            .download(&self.container, item.as_str())
            .await
            .map_err(|e| step_error("BLOB_STORE", e))?;

        let document = self
            .analyzer
            .analyze(&bytes)
            .await
            .map_err(|e| step_error("ANALYSIS", e))?;

        let text = ExtractedText::from_document(&document);
        info!(
            blob_name = %item,
            pages = document.pages.len(),
            text_len = text.len(),
            "Extracted text"
        );
        Ok(text)
    }
}

// ============================================================================
// summarize_text
// ============================================================================

/// Summarizes extracted text
pub struct SummarizeText {
    summarizer: Arc<dyn Summarizer>,
}

impl SummarizeText {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl Activity for SummarizeText {
    const TYPE: &'static str = "summarize_text";
    type Input = ExtractedText;
    type Output = SummaryResult;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        text: ExtractedText,
    ) -> Result<SummaryResult, ActivityError> {
        info!(
            workflow_id = %ctx.workflow_id,
            attempt = ctx.attempt,
            summarizer = self.summarizer.name(),
            "Summarizing text"
        );

        let summary = self
            .summarizer
            .summarize(text.as_str())
            .await
            .map_err(|e| step_error("SUMMARIZE", e))?;

        info!(summary = %summary.content, "Summary ready");
        Ok(summary)
    }
}

// ============================================================================
// write_doc
// ============================================================================

/// Uploads a summary under `<base>-<timestamp>.txt` and returns the name
pub struct WriteDoc {
    blobs: Arc<dyn BlobStore>,
    container: String,
    clock: Clock,
}

impl WriteDoc {
    pub fn new(blobs: Arc<dyn BlobStore>, container: impl Into<String>) -> Self {
        Self {
            blobs,
            container: container.into(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for output names
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl Activity for WriteDoc {
    const TYPE: &'static str = "write_doc";
    type Input = WriteRequest;
    type Output = String;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        request: WriteRequest,
    ) -> Result<String, ActivityError> {
        let OutputArtifact { name, content } = OutputArtifact::for_request(request, (self.clock)());

        self.blobs
            .upload(&self.container, &name, content.into_bytes())
            .await
            .map_err(|e| step_error("BLOB_STORE", e))?;

        info!(workflow_id = %ctx.workflow_id, output = %name, "Summary saved as: {}", name);
        Ok(name)
    }
}
