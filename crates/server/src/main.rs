//! NFT Cases Server
//!
//! Runs the crash round loop and serves the HTTP API and the WebSocket round
//! stream. All state lives in memory and is lost on exit.

use anyhow::Result;
use api_server::{methods::ApiContext, HttpApiServer, WebSocketServer};
use case_runtime::{
    rng::{make_rng, shared_rng},
    CaseCatalog, RoundDriver, SessionStore, WithdrawalPolicy,
};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::ServerConfig;

/// NFT case opening and crash game server
#[derive(Parser, Debug)]
#[command(name = "nft-cases")]
#[command(about = "Case opening, crash rounds and withdrawal requests", long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP API bind address
    #[arg(long)]
    http_addr: Option<String>,

    /// WebSocket bind address
    #[arg(long)]
    ws_addr: Option<String>,

    /// Crash loop tick in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Balance for new sessions
    #[arg(long)]
    starting_balance: Option<u64>,

    /// Minimum withdrawal amount
    #[arg(long)]
    min_withdrawal: Option<f64>,

    /// Fixed RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn resolve_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(addr) = &self.http_addr {
            config.http_addr = addr.clone();
        }
        if let Some(addr) = &self.ws_addr {
            config.ws_addr = addr.clone();
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_ms = tick_ms;
        }
        if let Some(balance) = self.starting_balance {
            config.starting_balance = balance;
        }
        if let Some(min) = self.min_withdrawal {
            config.min_withdrawal = min;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.resolve_config()?;
    run(config).await
}

async fn run(config: ServerConfig) -> Result<()> {
    let timings = config.round_timings();

    tracing::info!("Starting NFT cases server");
    tracing::info!("  HTTP API: {}", config.http_addr);
    tracing::info!("  WebSocket: {}", config.ws_addr);
    tracing::info!(
        "  Round: {}ms ticks, {}ms waiting, {}ms after crash",
        timings.tick_ms,
        timings.waiting_delay_ms,
        timings.crashed_delay_ms
    );
    tracing::info!("  Starting balance: {}", config.starting_balance);
    if let Some(seed) = config.seed {
        tracing::info!("  RNG seed: {}", seed);
    }

    let sessions = Arc::new(SessionStore::with_starting_balance(config.starting_balance));

    // The round loop and the request handlers draw from separate generators
    let driver = RoundDriver::new(timings, make_rng(config.seed), sessions.clone());
    let handler_seed = config.seed.map(|seed| seed.wrapping_add(1));

    let context = Arc::new(ApiContext {
        sessions,
        catalog: Arc::new(CaseCatalog::builtin()),
        round: driver.handle(),
        rng: shared_rng(handler_seed),
        withdrawal_policy: WithdrawalPolicy::with_min_amount(config.min_withdrawal),
        case_open_delay: config.case_open_delay(),
    });

    // Spawn round driver
    let running = driver.running_flag();
    let driver_handle = tokio::spawn(async move {
        driver.run_async().await;
    });

    // Start HTTP API server
    let http_context = context.clone();
    let http_addr = config.http_addr.clone();
    let http_server = tokio::spawn(async move {
        let server = HttpApiServer::new(http_context);
        if let Err(e) = server.run(&http_addr).await {
            tracing::error!("HTTP API server error: {}", e);
        }
    });

    // Start WebSocket server
    let ws_context = context.clone();
    let ws_addr = config.ws_addr.clone();
    let ws_server = tokio::spawn(async move {
        let server = WebSocketServer::new(ws_context);
        if let Err(e) = server.run(&ws_addr).await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    tracing::info!("Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    tracing::info!("{} sessions discarded", context.sessions.len());

    running.store(false, std::sync::atomic::Ordering::SeqCst);
    driver_handle.abort();
    http_server.abort();
    ws_server.abort();

    tracing::info!("Server stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tick_ms": 20, "starting_balance": 500, "seed": 1}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = Args::parse_from([
            "nft-cases",
            "--config",
            &path,
            "--tick-ms",
            "40",
            "--http-addr",
            "0.0.0.0:80",
        ]);
        let config = args.resolve_config().unwrap();

        assert_eq!(config.tick_ms, 40);
        assert_eq!(config.http_addr, "0.0.0.0:80");
        assert_eq!(config.starting_balance, 500);
        assert_eq!(config.seed, Some(1));
        assert_eq!(config.ws_addr, "127.0.0.1:8788");
    }

    #[test]
    fn test_no_config_uses_defaults() {
        let args = Args::parse_from(["nft-cases", "--seed", "9"]);
        let config = args.resolve_config().unwrap();
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.min_withdrawal, 100.0);
        assert_eq!(args.log_level, "info");
    }
}
