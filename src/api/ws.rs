//! Live push of parsed records to websocket clients.

use super::ApiState;
use crate::events::PipeEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

const CONNECTED: &str = r#"{"type":"connected"}"#;

pub async fn upgrade(State(state): State<Arc<ApiState>>, ws: WebSocketUpgrade) -> Response {
    // Subscribe before the handshake completes so no record slips through.
    let rx = state.bus.subscribe();
    ws.on_upgrade(move |socket| push_records(socket, rx))
}

async fn push_records(socket: WebSocket, mut rx: broadcast::Receiver<PipeEvent>) {
    info!("Websocket client connected");
    let (mut sender, mut receiver) = socket.split();

    if sender.send(Message::Text(CONNECTED.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(PipeEvent::Message(record)) => {
                    let text = match serde_json::to_string(&record) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode record for websocket: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(PipeEvent::Lifecycle(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Websocket client fell behind by {} events, disconnecting", skipped);
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("Websocket error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Websocket client disconnected");
}
