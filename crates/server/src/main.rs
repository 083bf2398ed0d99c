use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use bookbinder_core::{
    create_log_sink, load_config, validate_config, BackupStore, Config, ConversionOrchestrator,
    ConversionTool, EventBus, FfprobeDurationProbe, JobStore, LogFormat, LogSinkHandle,
    LoggingConfig, M4bToolInvoker, PipelineStores, ProgressInferencer, ProgressWatcher,
    RedisEventBus, SqliteCatalog, SqliteJobStore, SqliteTrackingStore, TrackingStore,
};

use bookbinder_server::api::create_router;
use bookbinder_server::state::AppState;

/// Audiobook conversion pipeline services.
#[derive(Debug, Parser)]
#[command(name = "bookbinder", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "BOOKBINDER_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Consume download/retry events, convert books and serve the admin API.
    Converter,
    /// Watch the staging directories and keep conversion progress current.
    Watcher,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration. Logging falls back to defaults so a bad file is reported.
    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            return Err(e).with_context(|| format!("Failed to load config from {:?}", cli.config));
        }
    };

    init_logging(&config.logging);
    info!("Loaded configuration from {:?}", cli.config);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;
    info!("Database path: {:?}", config.database.path);

    match cli.command {
        Command::Converter => run_converter(config).await,
        Command::Watcher => run_watcher(config).await,
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured filter.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let fmt_layer = match logging.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Build the log sink for `service` and spawn its shipper.
fn start_log_sink(config: &Config, service: &str) -> Result<LogSinkHandle> {
    let (handle, shipper) =
        create_log_sink(&config.log_sink, service).context("Failed to create log sink")?;
    match shipper {
        Some(shipper) => {
            tokio::spawn(shipper.run());
            info!("Log sink enabled for {}", service);
        }
        None => info!("Log sink disabled (no api_url configured)"),
    }
    Ok(handle)
}

async fn run_converter(config: Config) -> Result<()> {
    // Stores
    let jobs: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database).context("Failed to create job store")?,
    );
    let tracking: Arc<dyn TrackingStore> = Arc::new(
        SqliteTrackingStore::new(&config.database).context("Failed to create tracking store")?,
    );
    let catalog = Arc::new(
        SqliteCatalog::new(&config.database).context("Failed to open catalog")?,
    );
    info!("Stores initialized");

    let backups = Arc::new(BackupStore::new(
        config.backup.clone(),
        config.orchestrator.output_dir.clone(),
        catalog.clone(),
    ));
    info!(
        "Backup store at {} (retention {})",
        backups.backup_dir().display(),
        backups.retention()
    );

    let bus: Arc<dyn EventBus> = Arc::new(
        RedisEventBus::connect(&config.bus)
            .await
            .with_context(|| format!("Failed to connect to {}", config.bus.redis_url))?,
    );
    info!("Connected to event bus ({})", bus.name());

    let tool = Arc::new(M4bToolInvoker::new(config.converter.clone()));
    if let Err(e) = tool.validate().await {
        warn!("Conversion tool is not ready: {}", e);
    }

    let log_sink = start_log_sink(&config, "converter")?;

    let mut orchestrator = ConversionOrchestrator::new(
        config.orchestrator.clone(),
        PipelineStores {
            jobs: jobs.clone(),
            tracking: tracking.clone(),
            catalog,
        },
        backups.clone(),
        tool,
        bus.clone(),
        log_sink,
    )
    .with_poll_timeout(Duration::from_millis(config.bus.poll_timeout_ms));
    if config.converter.validate_duration {
        orchestrator = orchestrator.with_duration_probe(
            Arc::new(FfprobeDurationProbe::new(&config.converter)),
            config.converter.duration_tolerance_percent,
        );
        info!(
            "Duration validation enabled ({}% tolerance)",
            config.converter.duration_tolerance_percent
        );
    }
    let orchestrator = Arc::new(orchestrator);

    let orchestrator_handle = orchestrator.start();
    info!("Conversion orchestrator started");

    if config.admin.enabled {
        let state = Arc::new(AppState::new(
            config.clone(),
            jobs,
            tracking,
            backups,
            orchestrator.clone(),
            bus,
        ));
        let app = create_router(state);

        let addr = SocketAddr::new(config.admin.host, config.admin.port);
        info!("Starting admin server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;
    } else {
        info!("Admin server disabled in config");
        shutdown_signal().await;
    }

    info!("Stopping orchestrator...");
    orchestrator.stop();
    if let Err(e) = orchestrator_handle.await {
        error!("Orchestrator task ended abnormally: {}", e);
    }
    info!("Orchestrator stopped");

    Ok(())
}

async fn run_watcher(config: Config) -> Result<()> {
    let jobs: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database).context("Failed to create job store")?,
    );
    let tracking: Arc<dyn TrackingStore> = Arc::new(
        SqliteTrackingStore::new(&config.database).context("Failed to create tracking store")?,
    );

    let log_sink = start_log_sink(&config, "conversion-watcher")?;
    let inferencer = Arc::new(ProgressInferencer::new(
        config.progress.clone(),
        tracking,
        jobs,
        log_sink,
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut watcher = tokio::spawn(ProgressWatcher::new(inferencer).run(shutdown_rx));
    info!(
        "Watching {} and {}",
        config.progress.merge_dir.display(),
        config.progress.untagged_dir.display()
    );

    // A watcher that dies on its own ends the process with its error.
    let result = tokio::select! {
        result = &mut watcher => {
            error!("Watcher exited before shutdown");
            result
        }
        _ = shutdown_signal() => {
            info!("Stopping watcher...");
            let _ = shutdown_tx.send(());
            watcher.await
        }
    };

    result
        .context("Watcher task panicked")?
        .context("Watcher failed")?;
    info!("Watcher stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
