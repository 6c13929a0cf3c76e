//! Code Intelligence Core — server binary.
//!
//! A single long-running process; no subcommands. Registers projects and
//! serves the HTTP surface described in spec.md §6 until shut down.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use cic_search::{GatewayConfig, KeyPool, KeysFile};
use cic_server::AppState;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Code Intelligence Core server
#[derive(Parser, Debug)]
#[command(name = "cic", author, version, about, long_about = None)]
struct Cli {
    /// Root directory under which per-project storage lives
    #[arg(long, env = "CIC_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Address to bind the HTTP surface to
    #[arg(long, env = "CIC_BIND_ADDR", default_value = "127.0.0.1:4317")]
    bind_addr: SocketAddr,

    /// Path to a JSON credentials file (ordered `keys` array, optional `serper_key`)
    #[arg(long, env = "CIC_KEYS_FILE", default_value = "./keys.json")]
    keys_file: PathBuf,

    /// Base URL of the remote embedding/generation API
    #[arg(long, env = "CIC_GATEWAY_URL", default_value = "https://api.openai.com/v1")]
    gateway_url: String,

    /// Number of background sync workers
    #[arg(long, env = "CIC_SYNC_WORKERS", default_value_t = 4)]
    sync_workers: usize,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Fails closed before any listener opens: the data directory must exist
/// or be creatable.
fn preflight(data_dir: &PathBuf) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("data directory '{}' is not usable", data_dir.display()))
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = preflight(&cli.data_dir) {
        error!(error = %err, "pre-flight check failed");
        return ExitCode::FAILURE;
    }

    let keys = if cli.keys_file.exists() {
        KeyPool::from_file(KeysFile::load(&cli.keys_file))
    } else {
        info!(path = %cli.keys_file.display(), "no keys file found, starting with an empty key pool");
        KeyPool::new(Vec::new(), None)
    };

    let gateway_config = GatewayConfig { base_url: cli.gateway_url, ..GatewayConfig::default() };
    let state = std::sync::Arc::new(AppState::new(gateway_config, keys, Some(cli.sync_workers)));
    let app = cic_server::router(state);

    info!(addr = %cli.bind_addr, "starting server");
    let listener = match tokio::net::TcpListener::bind(cli.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, addr = %cli.bind_addr, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = axum::serve(listener, app).await {
        error!(error = %err, "server exited with an error");
        return ExitCode::FAILURE;
    }

    info!("server shut down normally");
    ExitCode::SUCCESS
}
