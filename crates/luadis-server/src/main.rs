//! luadis-server: point d’entrée
//!
//!   luadis-server --port 8080 --line-info
//!   LUADIS_PORT=9000 luadis-server -vv
//!
//! Arrêt propre sur Ctrl-C.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, warn};
use tokio::net::TcpListener;

use luadis_server::{serve, ServerConfig};
use luadis_tools::{init_logging, version_banner};

#[tokio::main]
async fn main() -> ExitCode {
    let config = ServerConfig::parse();
    init_logging(config.verbose, config.quiet);
    debug!("{}", version_banner("luadis-server"));

    if let Err(e) = run(config).await {
        error!("{e:#}");
        eprintln!("error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(config: ServerConfig) -> Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("bind {addr}"))?;
    serve(listener, config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // sans gestionnaire de signal, on sert jusqu’à la mort du processus
        warn!("ctrl-c handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
}
