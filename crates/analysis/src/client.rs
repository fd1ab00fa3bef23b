// Form Recognizer Client
//
// Implements the DocumentAnalyzer trait from docflow-core against the
// Form Recognizer analyze API.

use async_trait::async_trait;
use docflow_core::{AnalysisError, AnalyzedDocument, DocumentAnalyzer};
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{AnalyzeOperation, ErrorEnvelope, OperationStatus};

const API_VERSION: &str = "2023-07-31";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION: &str = "Operation-Location";

/// Connection settings for a Form Recognizer resource
#[derive(Clone)]
pub struct FormRecognizerConfig {
    /// Resource endpoint, e.g. `https://my-resource.cognitiveservices.azure.com`
    pub endpoint: String,
    pub api_key: String,
    /// Analysis model (default: `prebuilt-layout`)
    pub model_id: String,
    /// Document locale hint (default: `en-US`)
    pub locale: String,
    /// Delay between status polls when the service sends no Retry-After
    pub poll_interval: Duration,
    /// Polls before giving up on an operation
    pub max_polls: u32,
}

impl FormRecognizerConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model_id: "prebuilt-layout".to_string(),
            locale: "en-US".to_string(),
            poll_interval: Duration::from_secs(1),
            max_polls: 300,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }
}

impl std::fmt::Debug for FormRecognizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormRecognizerConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("model_id", &self.model_id)
            .field("locale", &self.locale)
            .field("poll_interval", &self.poll_interval)
            .field("max_polls", &self.max_polls)
            .finish()
    }
}

/// Form Recognizer document analyzer
///
/// # Example
///
/// ```ignore
/// use docflow_analysis::{FormRecognizerClient, FormRecognizerConfig};
///
/// let client = FormRecognizerClient::new(FormRecognizerConfig::new(endpoint, key));
/// let document = client.analyze(&pdf_bytes).await?;
/// ```
#[derive(Clone, Debug)]
pub struct FormRecognizerClient {
    client: Client,
    config: FormRecognizerConfig,
}

impl FormRecognizerClient {
    pub fn new(config: FormRecognizerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &FormRecognizerConfig {
        &self.config
    }

    /// URL documents are submitted to
    pub fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model_id
        )
    }

    /// Submit a document and return the operation URL to poll
    async fn submit(&self, document: &[u8]) -> Result<String, AnalysisError> {
        let response = self
            .client
            .post(self.analyze_url())
            .query(&[("api-version", API_VERSION), ("locale", self.config.locale.as_str())])
            .header(KEY_HEADER, &self.config.api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(document.to_vec())
            .send()
            .await
            .map_err(|e| AnalysisError::request(format!("Failed to submit document: {}", e)))?;

        let response = check_status(response).await?;

        response
            .headers()
            .get(OPERATION_LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                AnalysisError::invalid_response("missing Operation-Location header")
            })
    }

    /// Fetch the current state of an operation, plus the server's requested poll delay
    async fn poll(
        &self,
        operation_url: &str,
    ) -> Result<(AnalyzeOperation, Option<Duration>), AnalysisError> {
        let response = self
            .client
            .get(operation_url)
            .header(KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| AnalysisError::request(format!("Failed to poll operation: {}", e)))?;

        let response = check_status(response).await?;

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let operation = response
            .json::<AnalyzeOperation>()
            .await
            .map_err(|e| AnalysisError::invalid_response(e.to_string()))?;

        Ok((operation, retry_after))
    }
}

/// Turn non-2xx responses into service errors, preferring the service's own message
async fn check_status(response: Response) -> Result<Response, AnalysisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| format!("{}: {}", e.error.code, e.error.message))
        .unwrap_or(body);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        warn!(status = status.as_u16(), "Document analysis rejected the subscription key");
    }

    Err(AnalysisError::Service {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DocumentAnalyzer for FormRecognizerClient {
    async fn analyze(&self, document: &[u8]) -> Result<AnalyzedDocument, AnalysisError> {
        let operation_url = self.submit(document).await?;
        debug!(
            model = %self.config.model_id,
            size = document.len(),
            %operation_url,
            "Submitted document for analysis"
        );

        for poll in 1..=self.config.max_polls {
            let (operation, retry_after) = self.poll(&operation_url).await?;

            match operation.status {
                OperationStatus::Succeeded => {
                    let document = operation.analyze_result.ok_or_else(|| {
                        AnalysisError::invalid_response("succeeded without analyzeResult")
                    })?;
                    info!(
                        pages = document.pages.len(),
                        lines = document.line_count(),
                        polls = poll,
                        "Document analysis finished"
                    );
                    return Ok(document);
                }
                OperationStatus::Failed | OperationStatus::Canceled => {
                    let message = operation
                        .error
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_else(|| format!("operation {:?}", operation.status));
                    return Err(AnalysisError::OperationFailed(message));
                }
                OperationStatus::NotStarted | OperationStatus::Running => {
                    tokio::time::sleep(retry_after.unwrap_or(self.config.poll_interval)).await;
                }
            }
        }

        Err(AnalysisError::PollLimitExceeded(self.config.max_polls))
    }

    fn name(&self) -> &str {
        "form-recognizer"
    }
}
