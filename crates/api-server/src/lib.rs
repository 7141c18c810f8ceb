//! API Server - HTTP and WebSocket front end for the case game
//!
//! - HTTP: withdraw, cases, crash bets and cash-outs, sessions, health
//! - WebSocket: live crash round stream

pub mod http_server;
pub mod methods;
pub mod ws_server;

pub use http_server::HttpApiServer;
pub use methods::{error_label, kind_from_label, ApiContext, ApiError, ErrorBody};
pub use ws_server::WebSocketServer;

/// API server configuration
#[derive(Clone, Debug)]
pub struct ApiServerConfig {
    /// HTTP bind address
    pub http_addr: String,
    /// WebSocket bind address
    pub ws_addr: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8787".to_string(),
            ws_addr: "127.0.0.1:8788".to_string(),
        }
    }
}
