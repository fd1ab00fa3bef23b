// Document pipeline runtime
// Decision: The executor works against Arc<dyn WorkflowEventStore> so file and memory stores are interchangeable
// Decision: Recovery runs before the pool starts so resumed steps are queued ahead of new arrivals

use anyhow::{Context, Result};
use docflow_analysis::{FormRecognizerClient, FormRecognizerConfig};
use docflow_core::{
    blob_store_from_connection_string, BlobStore, DocumentAnalyzer, MockSummarizer, Summarizer,
    WorkItem,
};
use docflow_durable::{
    ActivityRegistry, ExecutorError, FileWorkflowEventStore, InMemoryWorkflowEventStore,
    PollerConfig, RecoveryReport, RetryPolicy, StoreError, WorkerPool, WorkerPoolConfig,
    Workflow, WorkflowEventStore, WorkflowExecutor,
};
use docflow_openai::{ChatSummarizer, ChatSummarizerConfig};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::activities::{AnalyzePdf, SummarizeText, WriteDoc};
use crate::config::{SummarizerSettings, WorkerConfig};
use crate::trigger::{BlobArrival, BlobTrigger};
use crate::workflow::{standard_retry_policy, ProcessDocumentInput, ProcessDocumentWorkflow};

pub type SharedEventStore = Arc<dyn WorkflowEventStore>;
pub type DocumentExecutor = WorkflowExecutor<dyn WorkflowEventStore>;

/// Open the workflow event log: a directory when a path is given, memory otherwise
pub async fn open_event_store(path: Option<&Path>) -> Result<SharedEventStore, StoreError> {
    match path {
        Some(path) => Ok(Arc::new(FileWorkflowEventStore::open(path).await?)),
        None => {
            warn!("DURABLE_STORE_PATH not set, workflow state will not survive a restart");
            Ok(Arc::new(InMemoryWorkflowEventStore::new()))
        }
    }
}

// =============================================================================
// Services and settings
// =============================================================================

/// External capabilities the pipeline steps call
#[derive(Clone)]
pub struct PipelineServices {
    pub blobs: Arc<dyn BlobStore>,
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub summarizer: Arc<dyn Summarizer>,
}

impl PipelineServices {
    /// Build every client once from configuration
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let blobs = blob_store_from_connection_string(&config.blob_storage_endpoint)
            .context("Failed to open blob storage")?;

        let analyzer = FormRecognizerClient::new(FormRecognizerConfig::new(
            config.analysis_endpoint.clone(),
            config.analysis_key.clone(),
        ));

        let summarizer: Arc<dyn Summarizer> = match &config.summarizer {
            SummarizerSettings::Mock => Arc::new(MockSummarizer::new()),
            SummarizerSettings::AzureOpenAi {
                endpoint,
                api_key,
                deployment,
            } => Arc::new(ChatSummarizer::new(ChatSummarizerConfig::azure(
                endpoint.clone(),
                api_key.clone(),
                deployment.clone(),
            ))),
        };

        info!(
            blob_store = %blobs.describe(),
            analyzer = analyzer.name(),
            summarizer = summarizer.name(),
            "Pipeline services ready"
        );

        Ok(Self {
            blobs,
            analyzer: Arc::new(analyzer),
            summarizer,
        })
    }
}

/// Runtime settings for a pipeline instance
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub input_container: String,
    pub output_container: String,
    pub trigger_poll_interval: Duration,
    /// Retry policy recorded into every new workflow
    pub retry_policy: RetryPolicy,
    pub pool: WorkerPoolConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            input_container: "input".to_string(),
            output_container: "output".to_string(),
            trigger_poll_interval: Duration::from_secs(2),
            retry_policy: standard_retry_policy(),
            pool: WorkerPoolConfig::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            input_container: config.input_container.clone(),
            output_container: config.output_container.clone(),
            trigger_poll_interval: config.trigger_poll_interval,
            retry_policy: standard_retry_policy(),
            pool: WorkerPoolConfig::new()
                .with_worker_id(config.worker_id.clone())
                .with_max_concurrency(config.max_concurrent_tasks),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_trigger_poll_interval(mut self, interval: Duration) -> Self {
        self.trigger_poll_interval = interval;
        self
    }

    pub fn with_task_poll_interval(mut self, interval: Duration) -> Self {
        self.pool = self.pool.with_poller(
            PollerConfig::new()
                .with_min_interval(interval)
                .with_max_interval(interval * 4),
        );
        self
    }
}

// =============================================================================
// DocumentPipeline
// =============================================================================

/// Trigger, workflow executor and worker pool wired together
///
/// # Example
///
/// ```ignore
/// let pipeline = DocumentPipeline::from_config(&config).await?;
/// pipeline.start().await?;
/// tokio::signal::ctrl_c().await?;
/// pipeline.shutdown().await?;
/// ```
pub struct DocumentPipeline {
    executor: Arc<DocumentExecutor>,
    pool: WorkerPool<dyn WorkflowEventStore>,
    trigger: Arc<BlobTrigger>,
    settings: PipelineSettings,
    shutdown_tx: watch::Sender<bool>,
    trigger_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DocumentPipeline {
    pub fn new(
        store: SharedEventStore,
        services: PipelineServices,
        settings: PipelineSettings,
    ) -> Self {
        let mut executor = WorkflowExecutor::from_shared(store);
        executor.register::<ProcessDocumentWorkflow>();
        let executor = Arc::new(executor);

        let activities = ActivityRegistry::new()
            .with(AnalyzePdf::new(
                services.blobs.clone(),
                services.analyzer.clone(),
                settings.input_container.clone(),
            ))
            .with(SummarizeText::new(services.summarizer.clone()))
            .with(WriteDoc::new(
                services.blobs.clone(),
                settings.output_container.clone(),
            ));

        let pool = WorkerPool::new(executor.clone(), activities, settings.pool.clone());
        let trigger = Arc::new(BlobTrigger::new(
            services.blobs,
            settings.input_container.clone(),
            settings.trigger_poll_interval,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            executor,
            pool,
            trigger,
            settings,
            shutdown_tx,
            trigger_handle: Mutex::new(None),
        }
    }

    /// Open the event log and build every client from configuration
    pub async fn from_config(config: &WorkerConfig) -> Result<Self> {
        let store = open_event_store(config.durable_store_path.as_deref())
            .await
            .context("Failed to open workflow event store")?;
        let services = PipelineServices::from_config(config)?;
        Ok(Self::new(store, services, PipelineSettings::from_config(config)))
    }

    pub fn executor(&self) -> &Arc<DocumentExecutor> {
        &self.executor
    }

    pub fn trigger(&self) -> &Arc<BlobTrigger> {
        &self.trigger
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Resume unfinished workflows, then start the worker pool and the trigger
    pub async fn start(&self) -> Result<RecoveryReport> {
        let report = self
            .executor
            .recover_workflows()
            .await
            .context("Failed to recover workflows")?;

        let submitted = self
            .submitted_items()
            .await
            .context("Failed to load submitted documents")?;
        debug!(count = submitted.len(), "Seeding trigger with submitted documents");
        self.trigger.seed(submitted);

        self.pool.start().context("Failed to start worker pool")?;

        self.shutdown_tx.send_replace(false);
        let handle = tokio::spawn(trigger_loop(
            self.trigger.clone(),
            self.executor.clone(),
            self.settings.retry_policy.clone(),
            self.shutdown_tx.subscribe(),
        ));
        *self.trigger_handle.lock() = Some(handle);

        info!(
            container = %self.trigger.container(),
            poll_interval_ms = self.settings.trigger_poll_interval.as_millis() as u64,
            worker_id = %self.pool.worker_id(),
            "Document pipeline started"
        );
        Ok(report)
    }

    /// Start a workflow for one blob version and mark it seen
    pub async fn submit(&self, arrival: &BlobArrival) -> Result<Uuid, ExecutorError> {
        submit_arrival(
            &self.executor,
            &self.trigger,
            &self.settings.retry_policy,
            arrival,
        )
        .await
    }

    /// Blob versions that already have a workflow in the event log
    pub async fn submitted_items(&self) -> Result<Vec<(WorkItem, String)>, StoreError> {
        let workflows = self.executor.store().list_workflows(None).await?;
        Ok(workflows
            .into_iter()
            .filter(|info| info.workflow_type == ProcessDocumentWorkflow::TYPE)
            .filter_map(|info| {
                serde_json::from_value::<ProcessDocumentInput>(info.input)
                    .map(|input| (input.blob_name, input.blob_version))
                    .ok()
            })
            .collect())
    }

    /// Stop the trigger, then drain the worker pool
    pub async fn shutdown(&self) -> Result<()> {
        info!("Stopping document pipeline");
        self.shutdown_tx.send_replace(true);

        let handle = self.trigger_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Trigger loop terminated abnormally");
            }
        }

        self.pool
            .shutdown()
            .await
            .context("Worker pool did not shut down cleanly")?;
        info!("Document pipeline stopped");
        Ok(())
    }
}

async fn submit_arrival(
    executor: &DocumentExecutor,
    trigger: &BlobTrigger,
    retry_policy: &RetryPolicy,
    arrival: &BlobArrival,
) -> Result<Uuid, ExecutorError> {
    info!(
        name = %arrival.path,
        size = arrival.size,
        "Processing blob: Name={}, Size={} bytes",
        arrival.path,
        arrival.size
    );

    let item = arrival.work_item();
    let input = ProcessDocumentInput::new(item.clone())
        .with_blob_version(arrival.version.clone())
        .with_retry_policy(retry_policy.clone());
    let workflow_id = executor
        .start_workflow::<ProcessDocumentWorkflow>(input)
        .await?;
    trigger.mark_seen(arrival);

    info!(
        %workflow_id,
        blob_name = %item,
        blob_version = %arrival.version,
        "Started process_document workflow"
    );
    Ok(workflow_id)
}

async fn trigger_loop(
    trigger: Arc<BlobTrigger>,
    executor: Arc<DocumentExecutor>,
    retry_policy: RetryPolicy,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            debug!("Trigger loop: shutdown requested");
            break;
        }

        match trigger.poll().await {
            Ok(arrivals) => {
                for arrival in arrivals {
                    if let Err(e) =
                        submit_arrival(&executor, &trigger, &retry_policy, &arrival).await
                    {
                        // Left unseen, so the next poll delivers it again
                        error!(name = %arrival.path, error = %e, "Failed to start workflow");
                    }
                }
            }
            Err(e) => {
                warn!(
                    container = %trigger.container(),
                    error = %e,
                    "Failed to list input container"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(trigger.poll_interval()) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
