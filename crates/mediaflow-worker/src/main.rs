//! Media processing worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediaflow_media::FfmpegToolkit;
use mediaflow_queue::{QueueBackend, QueueConfig};
use mediaflow_storage::{HttpRecordStore, R2Client};
use mediaflow_worker::config::select_record_store;
use mediaflow_worker::{metrics, ProcessorContext, WorkerConfig, WorkerRuntime};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting mediaflow-worker");

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    info!("Worker config: {:?}", config);
    tokio::fs::create_dir_all(&config.temp_dir)
        .await
        .with_context(|| format!("cannot create {}", config.temp_dir.display()))?;

    if let Some(port) = config.metrics_port {
        metrics::init_metrics(port)?;
        info!("Prometheus metrics on :{}", port);
    }

    let toolkit = FfmpegToolkit::new(&config.ffmpeg_path, &config.ffprobe_path)
        .with_probe_timeout(config.probe_timeout)
        .with_max_stderr_bytes(config.max_stderr_bytes);
    if !toolkit.self_check() {
        warn!("Media tools missing; jobs will fail until they are installed");
    }

    let store = R2Client::from_env().context("object storage")?;
    if let Err(e) = store.check_connectivity().await {
        warn!("Object storage connectivity check failed: {}", e);
    }

    let queue_config = QueueConfig::from_env().context("queue configuration")?;

    let records = select_record_store(queue_config.backend, HttpRecordStore::from_env())
        .context("records service")?;

    let longest_job = config.pipeline.timeouts.longest();
    if queue_config.backend == QueueBackend::Redis && queue_config.visibility_timeout <= longest_job {
        warn!(
            "QUEUE_VISIBILITY_TIMEOUT {:?} does not exceed the longest job timeout {:?}; slow jobs may be redelivered while running",
            queue_config.visibility_timeout, longest_job
        );
    }

    let transport = queue_config
        .connect(config.pipeline.retry)
        .await
        .context("queue transport")?;
    info!("Connected to {:?} queue backend", queue_config.backend);

    let ctx = ProcessorContext::new(
        Arc::new(toolkit),
        Arc::new(store),
        records,
        Arc::new(config),
    );
    let runtime = Arc::new(WorkerRuntime::new(ctx, transport));

    let signal_runtime = Arc::clone(&runtime);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_runtime.shutdown();
        }
    });

    runtime.run().await?;

    info!("Worker shutdown complete");
    Ok(())
}

/// JSON logs when `LOG_FORMAT=json`, colored text otherwise.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("mediaflow=info".parse()?)
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_smithy_runtime=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
