//! async-echo: a completion-driven TCP echo server
//!
//! Modes:
//! - `serve`: listen until Ctrl-C, then shut down cleanly
//! - `bench`: start an in-process server and time echo round trips
//!
//! Configuration via CLI arguments or TOML file.

use async_echo::config::{Config, Mode};
use async_echo::{bench, EchoServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        payload_length = config.payload_length,
        workers = config.workers,
        mode = ?config.mode,
        "Starting async-echo"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .thread_name("echo-worker")
        .enable_all()
        .build()?;

    match config.mode {
        Mode::Serve => runtime.block_on(serve(config)),
        Mode::Bench => runtime.block_on(run_bench(config)),
    }
}

/// Serve until Ctrl-C
async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = EchoServer::new(config.server_config());
    server.start(config.port).await?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");

    server.shutdown().await;
    Ok(())
}

/// Run the round-trip benchmark against an in-process server
async fn run_bench(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = EchoServer::new(config.server_config());
    let addr = server.start(config.port).await?;

    let result = bench::run(addr, &config.bench).await;
    server.shutdown().await;

    let report = result?;
    println!(
        "{} round trips over {} connection(s) in {:?} ({:?} per round trip)",
        report.round_trips,
        report.connections,
        report.elapsed,
        report.mean_round_trip()
    );
    Ok(())
}
