// Placeholder summarizer
//
// Returns a fixed summary regardless of the input text. Used when no
// chat-completion backend is configured.

use async_trait::async_trait;

use crate::document::SummaryResult;
use crate::error::SummarizeError;
use crate::traits::Summarizer;

/// Summary text produced by [`MockSummarizer`]
pub const MOCK_SUMMARY: &str = "This is a mock summary of the PDF document.";

#[derive(Debug, Clone, Default)]
pub struct MockSummarizer;

impl MockSummarizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, text: &str) -> Result<SummaryResult, SummarizeError> {
        tracing::debug!(text_len = text.len(), "Producing placeholder summary");
        Ok(SummaryResult::new(MOCK_SUMMARY))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
