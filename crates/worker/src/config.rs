// Worker configuration
// Decision: All settings come from environment variables (a .env file is loaded first by main)
// Decision: Credentials are required up front so a misconfigured worker fails at startup

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which summarization backend to use
#[derive(Clone, PartialEq, Eq)]
pub enum SummarizerSettings {
    /// Fixed placeholder summary
    Mock,
    /// Azure OpenAI chat completion deployment
    AzureOpenAi {
        endpoint: String,
        api_key: String,
        deployment: String,
    },
}

impl fmt::Debug for SummarizerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mock => f.write_str("Mock"),
            Self::AzureOpenAi {
                endpoint,
                deployment,
                ..
            } => f
                .debug_struct("AzureOpenAi")
                .field("endpoint", endpoint)
                .field("api_key", &"[REDACTED]")
                .field("deployment", deployment)
                .finish(),
        }
    }
}

/// `SUMMARIZER_MODE` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizerMode {
    Mock,
    OpenAi,
}

impl FromStr for SummarizerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openai" | "azure" | "azure-openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown summarizer mode '{}'", other)),
        }
    }
}

/// Configuration for the document pipeline worker
#[derive(Clone)]
pub struct WorkerConfig {
    /// Storage connection string (`memory:`, a path, or `file://` URL)
    pub blob_storage_endpoint: String,
    pub input_container: String,
    pub output_container: String,
    /// Document analysis resource endpoint
    pub analysis_endpoint: String,
    pub analysis_key: String,
    pub summarizer: SummarizerSettings,
    /// Directory for the workflow event log; in memory when unset
    pub durable_store_path: Option<PathBuf>,
    /// How often the input container is listed
    pub trigger_poll_interval: Duration,
    /// Maximum concurrent activities
    pub max_concurrent_tasks: usize,
    /// Worker ID (unique identifier for this worker instance)
    pub worker_id: String,
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("blob_storage_endpoint", &self.blob_storage_endpoint)
            .field("input_container", &self.input_container)
            .field("output_container", &self.output_container)
            .field("analysis_endpoint", &self.analysis_endpoint)
            .field("analysis_key", &"[REDACTED]")
            .field("summarizer", &self.summarizer)
            .field("durable_store_path", &self.durable_store_path)
            .field("trigger_poll_interval", &self.trigger_poll_interval)
            .field("max_concurrent_tasks", &self.max_concurrent_tasks)
            .field("worker_id", &self.worker_id)
            .finish()
    }
}

impl WorkerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let mode = match var("SUMMARIZER_MODE") {
            Some(value) => value.parse::<SummarizerMode>().map_err(|reason| ConfigError::Invalid {
                var: "SUMMARIZER_MODE",
                value,
                reason,
            })?,
            None => SummarizerMode::Mock,
        };

        let summarizer = match mode {
            SummarizerMode::Mock => SummarizerSettings::Mock,
            SummarizerMode::OpenAi => SummarizerSettings::AzureOpenAi {
                endpoint: required("AZURE_OPENAI_ENDPOINT")?,
                api_key: required("AZURE_OPENAI_KEY")?,
                deployment: required("CHAT_MODEL_DEPLOYMENT_NAME")?,
            },
        };

        let trigger_poll_ms: u64 = parse_or(
            "TRIGGER_POLL_INTERVAL_MS",
            var("TRIGGER_POLL_INTERVAL_MS"),
            2000,
        )?;
        let max_concurrent_tasks: usize =
            parse_or("MAX_CONCURRENT_TASKS", var("MAX_CONCURRENT_TASKS"), 10)?;
        if max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_CONCURRENT_TASKS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            blob_storage_endpoint: required("BLOB_STORAGE_ENDPOINT")?,
            input_container: var("INPUT_CONTAINER").unwrap_or_else(|| "input".to_string()),
            output_container: var("OUTPUT_CONTAINER").unwrap_or_else(|| "output".to_string()),
            analysis_endpoint: required("COGNITIVE_SERVICES_ENDPOINT")?,
            analysis_key: required("COGNITIVE_SERVICES_KEY")?,
            summarizer,
            durable_store_path: var("DURABLE_STORE_PATH").map(PathBuf::from),
            trigger_poll_interval: Duration::from_millis(trigger_poll_ms),
            max_concurrent_tasks,
            worker_id: var("WORKER_ID").unwrap_or_else(|| format!("worker-{}", Uuid::now_v7())),
        })
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
