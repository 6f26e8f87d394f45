//! Readings Proxy - cache telemetry readings and document queries
//!
//! Serves the latest telemetry reading and aggregated document-database query
//! results over HTTP, shielding callers from provider latency and rate limits.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use readings_proxy::app::build_state;
use readings_proxy::cli::{parse_bind_arg, Cli, StartupConfig};
use readings_proxy::config::Config;
use readings_proxy::logging::init_logging;
use readings_proxy::server::router;

async fn run(startup: StartupConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(startup.config_path.as_deref())?;
    let state = build_state(&config)?;

    let addr: SocketAddr = match startup.bind {
        Some(addr) => addr,
        None => parse_bind_arg(&config.server.bind)?,
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Readings proxy listening on http://{}", addr);
    info!("  Telemetry: http://{}/api/telemetry", addr);
    info!("  Documents: http://{}/api/documents", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let startup = match StartupConfig::from_cli(&cli) {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&startup.log_level);

    match run(startup).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
