// Chat Completion Summarizer
//
// Implements the Summarizer trait from docflow-core by sending the extracted
// text to a chat completion endpoint and returning the first choice.

use async_trait::async_trait;
use docflow_core::{SummarizeError, Summarizer, SummaryResult};
use reqwest::Client;
use tracing::{debug, info};

use crate::types::{ChatMessage, ChatRequest, ChatResponse};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const AZURE_API_VERSION: &str = "2024-02-01";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Which flavour of the chat completion API to call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatApi {
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions`, `api-key` header
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
    /// A full chat completions URL with bearer auth and an explicit model
    OpenAi { api_url: String, model: String },
}

#[derive(Clone)]
pub struct ChatSummarizerConfig {
    pub api: ChatApi,
    pub api_key: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatSummarizerConfig {
    /// Azure OpenAI deployment
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self::with_api(
            ChatApi::Azure {
                endpoint: endpoint.into(),
                deployment: deployment.into(),
                api_version: AZURE_API_VERSION.to_string(),
            },
            api_key,
        )
    }

    /// api.openai.com
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::openai_compatible(OPENAI_API_URL, api_key, model)
    }

    /// Any OpenAI-compatible chat completions URL
    pub fn openai_compatible(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::with_api(
            ChatApi::OpenAi {
                api_url: api_url.into(),
                model: model.into(),
            },
            api_key,
        )
    }

    fn with_api(api: ChatApi, api_key: impl Into<String>) -> Self {
        Self {
            api,
            api_key: api_key.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl std::fmt::Debug for ChatSummarizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSummarizerConfig")
            .field("api", &self.api)
            .field("api_key", &"[REDACTED]")
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Summarizer backed by a chat completion model
///
/// # Example
///
/// ```ignore
/// use docflow_openai::{ChatSummarizer, ChatSummarizerConfig};
///
/// let summarizer = ChatSummarizer::new(ChatSummarizerConfig::azure(endpoint, key, "gpt-4o"));
/// let summary = summarizer.summarize(&text).await?;
/// ```
#[derive(Clone, Debug)]
pub struct ChatSummarizer {
    client: Client,
    config: ChatSummarizerConfig,
}

impl ChatSummarizer {
    pub fn new(config: ChatSummarizerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ChatSummarizerConfig {
        &self.config
    }

    /// Chat completions URL for the configured API
    pub fn api_url(&self) -> String {
        match &self.config.api {
            ChatApi::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
            ChatApi::OpenAi { api_url, .. } => api_url.clone(),
        }
    }

    /// Build the request body for `text`
    pub fn build_request(&self, text: &str) -> ChatRequest {
        let model = match &self.config.api {
            ChatApi::Azure { .. } => None,
            ChatApi::OpenAi { model, .. } => Some(model.clone()),
        };

        ChatRequest {
            model,
            messages: vec![
                ChatMessage::system(self.config.system_prompt.clone()),
                ChatMessage::user(format!(
                    "Summarize the following document:\n\n{}",
                    text
                )),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, text: &str) -> Result<SummaryResult, SummarizeError> {
        let request = self.build_request(text);
        let builder = self.client.post(self.api_url()).json(&request);
        let builder = match &self.config.api {
            ChatApi::Azure { .. } => builder.header("api-key", &self.config.api_key),
            ChatApi::OpenAi { .. } => builder.bearer_auth(&self.config.api_key),
        };

        debug!(text_len = text.len(), url = %self.api_url(), "Requesting summary");

        let response = builder.send().await.map_err(|e| {
            SummarizeError::request(format!("Failed to send chat completion request: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizeError::Service { status, body });
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| SummarizeError::InvalidResponse(e.to_string()))?;

        let content = response
            .first_content()
            .ok_or(SummarizeError::EmptyResponse)?
            .to_string();

        info!(
            model = response.model.as_deref().unwrap_or("unknown"),
            total_tokens = response.usage.as_ref().map(|u| u.total_tokens),
            summary_len = content.len(),
            "Summary generated"
        );

        Ok(SummaryResult::new(content))
    }

    fn name(&self) -> &str {
        match self.config.api {
            ChatApi::Azure { .. } => "azure-openai",
            ChatApi::OpenAi { .. } => "openai",
        }
    }
}
