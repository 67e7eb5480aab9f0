//! Runlet server binary: run arbitrary programs over HTTP and WebSocket.
//!
//! Exposes `POST /execute/{language}` for one-shot runs and `WS
//! /io/{language}` for interactive sessions. Execution happens directly on
//! the host with no sandboxing, resource limits, or authentication — run
//! this only against trusted input, behind collaborators that provide those
//! guarantees.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use runlet_server::{shutdown_signal, RunletServer, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Runlet - multi-language code execution server")]
struct Cli {
    #[clap(long, default_value = "127.0.0.1:3001")]
    bind_addr: String,

    #[clap(
        long,
        short,
        default_value = "./code",
        help = "Scratch directory for transient source and binary artifacts"
    )]
    work_dir: PathBuf,

    #[clap(long, short, default_value = "info")]
    log_level: String,

    #[clap(long, help = "Disable permissive CORS headers")]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let bind_addr: SocketAddr = cli
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", cli.bind_addr, e))?;

    let config = ServerConfig::default()
        .with_bind_addr(bind_addr)
        .with_work_dir(cli.work_dir)
        .with_cors(!cli.no_cors);

    log::info!("Starting Runlet server on {}...", bind_addr);

    let server = RunletServer::with_config(config);
    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e);
    }

    Ok(())
}
