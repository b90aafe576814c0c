use anyhow::{Context, Result};
use filesync_agent::config::LoggingConfig;
use filesync_agent::{Config, DiskFs, Filesystem, HttpTransmitter, Scheduler, SyncAgent};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    init_tracing(&config.logging)?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        watch_path = %config.watch.path.display(),
        endpoint = %config.endpoint.url,
        state_path = %config.state.path.display(),
        poll_interval_secs = config.scheduler.poll_interval_secs,
        "Starting file sync agent"
    );

    if let Some(port) = config.service.metrics_port {
        init_metrics(port)?;
    }

    // Initialize components
    let fs: Arc<dyn Filesystem> = Arc::new(DiskFs::new());
    let transmitter = Arc::new(
        HttpTransmitter::new(&config.endpoint).context("Failed to initialize HTTP transmitter")?,
    );
    let agent = Arc::new(SyncAgent::from_config(&config, fs, transmitter));
    let scheduler = Scheduler::new(agent, config.poll_interval())?;

    let shutdown = CancellationToken::new();
    let scheduler_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down file sync agent");

    shutdown.cancel();
    scheduler_handle
        .await
        .context("Scheduler task panicked")?;

    info!("File sync agent stopped");

    Ok(())
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize tracing with stderr output and an optional append-only log file
fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = if config.format == "json" {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.level))
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.level))
            .boxed()
    };
    layers.push(console);

    if let Some(path) = &config.file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create log directory: {}", parent.display())
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        layers.push(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(env_filter(&config.level))
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).init();

    Ok(())
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
