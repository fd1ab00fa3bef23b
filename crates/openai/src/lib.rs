// OpenAI Summarizer Implementation
//
// This crate provides a Summarizer that asks a chat completion model for a
// summary of the extracted text. It talks to either an Azure OpenAI
// deployment or any OpenAI-compatible chat completion endpoint.

mod summarizer;
mod types;

#[cfg(test)]
mod tests;

pub use summarizer::{ChatApi, ChatSummarizer, ChatSummarizerConfig, DEFAULT_SYSTEM_PROMPT};
pub use types::{ChatMessage, ChatRequest, ChatResponse, MessageRole};

// Re-export core types for convenience
pub use docflow_core::{SummarizeError, Summarizer, SummaryResult};
