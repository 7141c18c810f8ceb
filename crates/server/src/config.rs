//! Server Configuration

use anyhow::Context;
use case_runtime::{
    withdraw::MIN_WITHDRAWAL, RoundTimings, CASE_OPEN_DELAY_MS, CRASHED_DELAY_MS,
    STARTING_BALANCE, TICK_MS, WAITING_DELAY_MS,
};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP API bind address
    pub http_addr: String,
    /// WebSocket bind address
    pub ws_addr: String,
    /// Crash loop tick in milliseconds
    pub tick_ms: u64,
    /// Pause before a round starts
    pub waiting_delay_ms: u64,
    /// Pause after a crash before the next round
    pub crashed_delay_ms: u64,
    /// Reveal delay when opening a case
    pub case_open_delay_ms: u64,
    /// Balance given to a new session
    pub starting_balance: u64,
    /// Smallest accepted withdrawal
    pub min_withdrawal: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8787".to_string(),
            ws_addr: "127.0.0.1:8788".to_string(),
            tick_ms: TICK_MS,
            waiting_delay_ms: WAITING_DELAY_MS,
            crashed_delay_ms: CRASHED_DELAY_MS,
            case_open_delay_ms: CASE_OPEN_DELAY_MS,
            starting_balance: STARTING_BALANCE,
            min_withdrawal: MIN_WITHDRAWAL,
            seed: None,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn round_timings(&self) -> RoundTimings {
        RoundTimings {
            waiting_delay_ms: self.waiting_delay_ms,
            tick_ms: self.tick_ms.max(1),
            crashed_delay_ms: self.crashed_delay_ms,
        }
    }

    pub fn case_open_delay(&self) -> Duration {
        Duration::from_millis(self.case_open_delay_ms)
    }
}
