//! Sensor Logger Binary Entry Point
//!
//! Runs the serial ingest loop and the HTTP query API in one process.
//! Core functionality is provided by the `sensor_logger` library crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sensor_logger::{
    config::{AppConfig, parse_duration},
    ingest::IngestLoop,
    manual::ManualEntry,
    reading::SystemClock,
    server::{self, AppState},
    storage::{ReadingSink, StorageBuilder, StorageHandles, WriteOutcome, init_db},
    transport::{SerialConnector, list_ports},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Config file used when `--config` is not given and the file exists.
const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Sensor Logger - serial sensor ingestion with an HTTP query API
#[derive(Parser, Debug)]
#[command(name = "sensor-logger", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SENSOR_LOGGER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "SENSOR_LOGGER_SERVER_BIND", global = true)]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "SENSOR_LOGGER_SERVER_PORT", global = true)]
    server_port: Option<u16>,

    /// Database file (overrides config file)
    #[arg(long, env = "SENSOR_LOGGER_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Serial device (overrides config file)
    #[arg(long, env = "SENSOR_LOGGER_SERIAL_PORT", global = true)]
    serial_port: Option<String>,

    /// Serial baud rate (overrides config file)
    #[arg(long, env = "SENSOR_LOGGER_BAUD_RATE", global = true)]
    baud_rate: Option<u32>,

    /// Wait between failed connection attempts, e.g. "10s" (overrides config file)
    #[arg(long, env = "SENSOR_LOGGER_RETRY_DELAY", value_parser = parse_duration, global = true)]
    retry_delay: Option<Duration>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest from the serial device and serve the HTTP API (default)
    Run {
        /// Serve the HTTP API only, without opening the serial device
        #[arg(long)]
        no_ingest: bool,
    },
    /// Record one reading by hand
    Record {
        /// Sensor identifier
        #[arg(long)]
        sensor_id: String,
        /// Measurement type, e.g. "pH"
        #[arg(long = "type")]
        sensor_type: String,
        /// Measured value
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
        /// RFC 3339 or YYYY-MM-DDTHH:MM (UTC); defaults to now
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Create the database file and schema, then exit
    InitDb,
    /// List serial ports on this machine
    ListPorts,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sensor_logger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Command::Run { no_ingest: false }) {
        Command::Run { no_ingest } => run(config, no_ingest).await,
        Command::Record {
            sensor_id,
            sensor_type,
            value,
            timestamp,
        } => {
            let entry = ManualEntry {
                sensor_id,
                sensor_type,
                value,
                timestamp,
            };
            record(&config, entry).await
        }
        Command::InitDb => {
            init_db(&config.database.path).await?;
            tracing::info!(path = %config.database.path.display(), "Database initialized");
            Ok(())
        }
        Command::ListPorts => {
            let ports = list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{port}");
            }
            Ok(())
        }
    }
}

/// Load the config file and apply CLI/env overrides (CLI > ENV > config file).
fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            AppConfig::load(path)?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            tracing::info!(path = DEFAULT_CONFIG_PATH, "Loading configuration");
            AppConfig::load(DEFAULT_CONFIG_PATH)?
        }
        None => {
            tracing::info!("No configuration file, using defaults");
            AppConfig::default()
        }
    };

    if let Some(bind) = &cli.server_bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }
    if let Some(port) = &cli.serial_port {
        config.serial.port = port.clone();
    }
    if let Some(baud_rate) = cli.baud_rate {
        config.serial.baud_rate = baud_rate;
    }
    if let Some(delay) = cli.retry_delay {
        config.ingest.retry_delay = delay;
    }
    config.validate()?;

    tracing::info!(
        bind = %config.server.bind,
        port = config.server.port,
        db = %config.database.path.display(),
        serial = %config.serial.port,
        baud_rate = config.serial.baud_rate,
        "Configuration loaded"
    );
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<StorageHandles, Box<dyn std::error::Error>> {
    Ok(StorageBuilder::new(&config.database.path)
        .pool_size(config.database.pool_size)
        .channel_capacity(config.database.channel_capacity)
        .max_query_limit(config.database.max_query_limit)
        .build()
        .await?)
}

async fn run(config: AppConfig, no_ingest: bool) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(&config).await?;
    let sink: Arc<dyn ReadingSink> = Arc::new(storage.writer.clone());
    let mut state = AppState::new(storage.reader.clone(), Arc::clone(&sink));

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, initiating graceful shutdown");
        cancel_on_signal.cancel();
    });

    let ingest_task = if no_ingest {
        tracing::info!("Ingest disabled, serving HTTP API only");
        None
    } else {
        let connector = SerialConnector::new(config.serial.settings());
        let ingest = IngestLoop::new(Box::new(connector), config.ingest.line_codec()?, sink)
            .with_retry_delay(config.ingest.retry_delay)
            .with_read_timeout(config.serial.read_timeout);
        state = state.with_ingest(ingest.monitor());
        Some(tokio::spawn(ingest.run(cancel.clone())))
    };

    let listener = tokio::net::TcpListener::bind(config.socket_addr()?).await?;
    tracing::info!("Press Ctrl+C to shutdown");
    let served = server::serve(listener, state, cancel.clone()).await;

    // Stop ingest too if the server ended on its own
    cancel.cancel();

    if let Some(task) = ingest_task {
        match task.await {
            Ok(snapshot) => tracing::info!(
                written = snapshot.readings_written,
                rejections = snapshot.rejections,
                "Ingest finished"
            ),
            Err(e) => tracing::error!(error = %e, "Ingest task failed"),
        }
    }

    tracing::info!("Shutting down storage...");
    storage.shutdown().await?;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn record(config: &AppConfig, entry: ManualEntry) -> Result<(), Box<dyn std::error::Error>> {
    let reading = entry.into_reading(&SystemClock)?;
    let storage = open_storage(config).await?;
    let outcome = storage.writer.insert(reading.clone()).await;
    storage.shutdown().await?;

    match outcome? {
        WriteOutcome::Written => {
            println!("{}", serde_json::to_string(&reading)?);
            Ok(())
        }
        WriteOutcome::Duplicate => Err(format!("reading already recorded: {reading}").into()),
    }
}

/// Resolve when the process is asked to stop.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
