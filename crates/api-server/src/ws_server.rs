//! WebSocket Server
//!
//! Streams crash round state. Every connection is sent a `roundNotification`
//! for each published snapshot and may ask for the current one with
//! `{"method":"getRound"}`.

use crate::methods::ApiContext;
use case_runtime::RoundSnapshot;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast::error::RecvError,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Message sent by a WebSocket client
#[derive(Debug, Deserialize)]
pub struct WsRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
}

/// WebSocket Server
pub struct WebSocketServer {
    context: Arc<ApiContext>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new(context: Arc<ApiContext>) -> Self {
        Self { context }
    }

    /// Run the WebSocket server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("WebSocket server listening on {}", listener.local_addr()?);

        while let Ok((stream, peer_addr)) = listener.accept().await {
            let ctx = self.context.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, ctx).await {
                    tracing::warn!("WebSocket connection error from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(stream: TcpStream, context: Arc<ApiContext>) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut updates = context.round.subscribe();

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let Some(msg) = msg else { break };
                match msg? {
                    Message::Text(text) => {
                        let response = handle_ws_message(&context, &text);
                        ws_sender.send(Message::Text(response.to_string())).await?;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(snapshot) => {
                        let notification = round_notification(&snapshot);
                        ws_sender.send(Message::Text(notification.to_string())).await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("WebSocket subscriber lagged, skipped {} updates", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}

/// Answer a client message
fn handle_ws_message(context: &ApiContext, text: &str) -> Value {
    let request: WsRequest = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(_) => return error_response(Value::Null, "Invalid request"),
    };

    match request.method.as_str() {
        "getRound" => json!({
            "id": request.id,
            "result": context.round.snapshot(),
        }),
        _ => error_response(request.id, "Method not found"),
    }
}

fn round_notification(snapshot: &RoundSnapshot) -> Value {
    json!({
        "method": "roundNotification",
        "params": snapshot,
    })
}

fn error_response(id: Value, message: &str) -> Value {
    json!({
        "id": id,
        "error": { "message": message },
    })
}
