use anyhow::{Context, Result};
use docflow_core::telemetry::{init_telemetry, TelemetryConfig};
use docflow_worker::{DocumentPipeline, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real deployments set the environment directly
    let _ = dotenvy::dotenv();

    // Configure logging via environment variables:
    // - SERVICE_NAME: Service name (default: "docflow-worker")
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "info")
    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "docflow" {
        telemetry_config.service_name = "docflow-worker".to_string();
    }
    init_telemetry(&telemetry_config).context("Failed to initialize logging")?;

    tracing::info!("docflow-worker starting...");

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    tracing::info!(
        worker_id = %config.worker_id,
        input = %config.input_container,
        output = %config.output_container,
        max_concurrent = config.max_concurrent_tasks,
        durable_store = ?config.durable_store_path,
        "Starting document pipeline"
    );

    let pipeline = DocumentPipeline::from_config(&config)
        .await
        .context("Failed to create document pipeline")?;

    let report = pipeline.start().await?;
    if report.workflows_resumed > 0 {
        tracing::info!(
            workflows_resumed = report.workflows_resumed,
            tasks_requeued = report.tasks_requeued,
            "Resumed unfinished workflows"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    pipeline.shutdown().await?;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
