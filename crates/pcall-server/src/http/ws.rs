//! WebSocket transport for the socket layer

use crate::socket::{Io, Socket};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use pcall_protocol::Frame;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

pub(crate) fn ws_routes(path: &str, io: Io) -> Router {
    Router::new().route(path, get(ws_handler)).with_state(io)
}

async fn ws_handler(State(io): State<Io>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, io))
}

async fn handle_socket(socket: WebSocket, io: Io) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    warn!(event = %frame.event, error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                debug!(error = %e, "Socket send failed");
                break;
            }
        }
        sender.close().await.ok();
    });

    let socket = io.connect(tx).await;
    let id = socket.id();
    info!(connection = %id, "Socket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(&socket, text.as_str()).await,
            Ok(Message::Close(frame)) => {
                if let Some(cf) = frame {
                    debug!(connection = %id, code = cf.code, reason = %cf.reason.as_str(), "Close frame");
                }
                break;
            }
            Ok(Message::Binary(_)) => {
                warn!(connection = %id, "Ignoring binary message");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                debug!(connection = %id, error = %e, "Socket read failed");
                break;
            }
        }
    }

    io.remove_connection(id).await;

    // Removal drops the outbound sender, so the writer finishes once the
    // frames queued by the disconnect handler are flushed.
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    info!(connection = %id, "Socket closed");
}

async fn handle_frame(socket: &Socket, text: &str) {
    let (event, args) = match Frame::parse(text).and_then(Frame::into_parts) {
        Ok(parts) => parts,
        Err(e) => {
            error!(connection = %socket.id(), error = %e, "Rejected socket frame");
            return;
        }
    };

    if let Err(e) = socket.trigger(&event, args).await {
        error!(connection = %socket.id(), %event, error = %e, "Socket event failed");
    }
}
