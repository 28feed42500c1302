use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use relay_rs::{OutputMode, RegistryConfig, RelayServer, ServerConfig, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Live media relay server", long_about = None)]
struct Args {
    /// HTTP/WebSocket listen port
    #[arg(long, env = "PORT", default_value_t = 80)]
    port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Base directory for segmented output
    #[arg(long, env = "RELAY_BASE_PATH")]
    base_path: Option<PathBuf>,

    /// Delete segment files older than this many seconds
    #[arg(long, env = "RELAY_RETENTION_SECS", default_value_t = 6 * 60 * 60)]
    retention_secs: u64,

    /// Seconds between sweeps
    #[arg(long, env = "RELAY_SWEEP_INTERVAL_SECS", default_value_t = 60 * 60)]
    sweep_interval_secs: u64,

    /// Default output mode (live, segmented)
    #[arg(long, env = "RELAY_OUTPUT_MODE", default_value = "live")]
    output_mode: OutputMode,

    /// Transcoder executable
    #[arg(long, env = "RELAY_WORKER", default_value = "ffmpeg")]
    worker: PathBuf,

    /// Raw pipe ingest address (disabled when unset)
    #[arg(long, env = "RELAY_RAW_INGEST_ADDR")]
    raw_ingest_addr: Option<SocketAddr>,

    /// Seconds a subscriber waits for a late publisher
    #[arg(long, env = "RELAY_WAIT_SECS", default_value_t = 10)]
    wait_secs: u64,

    /// Maximum concurrent raw pipe connections (0 = unlimited)
    #[arg(long, env = "RELAY_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Debug logging for the relay
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_filter = if args.verbose {
        "relay_rs=debug,tower_http=debug"
    } else {
        "relay_rs=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut worker = WorkerConfig::default();
    worker.program = args.worker;
    if let Some(base_path) = args.base_path {
        worker = worker.base_path(base_path);
    }

    tokio::fs::create_dir_all(&worker.base_path)
        .await
        .with_context(|| format!("creating base path {}", worker.base_path.display()))?;

    let registry_config = RegistryConfig::default()
        .wait_timeout(Duration::from_secs(args.wait_secs))
        .worker(worker);

    let mut config = ServerConfig::with_addr(SocketAddr::new(args.host, args.port))
        .default_mode(args.output_mode)
        .max_connections(args.max_connections)
        .retention(Duration::from_secs(args.retention_secs))
        .sweep_interval(Duration::from_secs(args.sweep_interval_secs));
    if let Some(raw_addr) = args.raw_ingest_addr {
        config = config.raw_ingest(raw_addr);
    }

    tracing::info!(
        addr = %config.bind_addr,
        mode = %config.default_mode,
        base_path = %registry_config.worker.base_path.display(),
        worker = %registry_config.worker.program.display(),
        "Starting relay server"
    );

    let server = RelayServer::with_registry_config(config, registry_config);
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("relay server failed")?;

    tracing::info!("Relay server stopped");
    Ok(())
}
