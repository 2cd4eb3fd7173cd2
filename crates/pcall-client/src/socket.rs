//! Socket sub-client
//!
//! Register handlers with [`SocketClient::on`], then [`SocketClient::open`].
//! `connect` and `disconnect` are fired locally when the connection opens and
//! closes; every other event comes from the server.

use crate::error::{ClientError, Result};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use pcall_protocol::{ConnectionState, Frame};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

pub const CONNECT_EVENT: &str = "connect";
pub const DISCONNECT_EVENT: &str = "disconnect";

type Handler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;
type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derive the socket URL from an RPC base URL.
///
/// `http` maps to `ws`, `https` to `wss`, and a bare host gets `ws://`.
/// `/ws` is appended in every case.
pub fn socket_url(url: &str) -> String {
    let base = if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else {
        format!("ws://{}", url)
    };
    format!("{}/ws", base.trim_end_matches('/'))
}

struct Connection {
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

struct Shared {
    handlers: RwLock<HashMap<String, Handler>>,
    connection: Mutex<Connection>,
}

impl Shared {
    fn fire(&self, event: &str, args: Vec<Value>) -> bool {
        let handler = self.handlers.read().get(event).cloned();
        match handler {
            Some(handler) => {
                handler(args);
                true
            }
            None => false,
        }
    }

    fn dispatch(&self, text: &str) {
        let (event, args) = match Frame::parse(text).and_then(Frame::into_parts) {
            Ok(parts) => parts,
            Err(e) => {
                error!(error = %e, "Rejected socket frame");
                return;
            }
        };
        if !self.fire(&event, args) {
            error!(%event, "No handler for event");
        }
    }

    fn closed(&self) {
        {
            let mut connection = self.connection.lock();
            connection.state = ConnectionState::Closed;
            connection.outbound = None;
        }
        self.fire(DISCONNECT_EVENT, Vec::new());
    }
}

/// Event client for one socket connection.
pub struct SocketClient {
    url: String,
    shared: Arc<Shared>,
}

impl SocketClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            shared: Arc::new(Shared {
                handlers: RwLock::new(HashMap::new()),
                connection: Mutex::new(Connection {
                    state: ConnectionState::Closed,
                    outbound: None,
                }),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.connection.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Register the handler for `event`, replacing any previous one.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.shared.handlers.write().insert(event.into(), Arc::new(handler));
    }

    pub fn off(&self, event: &str) -> bool {
        self.shared.handlers.write().remove(event).is_some()
    }

    /// Connect, start the reader and writer tasks and fire `connect`.
    pub async fn open(&self) -> Result<()> {
        {
            let mut connection = self.shared.connection.lock();
            if connection.state != ConnectionState::Closed {
                return Err(ClientError::Socket(format!(
                    "cannot open a socket that is {:?}",
                    connection.state
                )));
            }
            connection.state = ConnectionState::Connecting;
        }

        let ws = match connect_async(self.url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                self.shared.connection.lock().state = ConnectionState::Closed;
                return Err(e.into());
            }
        };
        info!(url = %self.url, "Socket open");

        let (mut sink, stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        {
            let mut connection = self.shared.connection.lock();
            connection.state = ConnectionState::Open;
            connection.outbound = Some(tx);
        }
        self.shared.fire(CONNECT_EVENT, Vec::new());

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "Socket send failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });
        tokio::spawn(read_loop(stream, Arc::clone(&self.shared)));
        Ok(())
    }

    /// Send an event to the server. Fails unless the socket is open.
    pub fn emit(&self, event: &str, args: &[Value]) -> Result<()> {
        let connection = self.shared.connection.lock();
        let outbound = match (&connection.state, &connection.outbound) {
            (ConnectionState::Open, Some(outbound)) => outbound,
            _ => return Err(ClientError::NotConnected),
        };
        let text = Frame::new(event, args)
            .to_text()
            .map_err(|e| ClientError::Socket(e.to_string()))?;
        outbound
            .send(Message::Text(text.into()))
            .map_err(|_| ClientError::NotConnected)
    }

    /// Start the close handshake. `disconnect` fires once it completes.
    pub fn close(&self) {
        let mut connection = self.shared.connection.lock();
        if let Some(outbound) = connection.outbound.take() {
            connection.state = ConnectionState::Closing;
            let _ = outbound.send(Message::Close(None));
        }
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_loop(mut stream: SplitStream<Ws>, shared: Arc<Shared>) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => shared.dispatch(text.as_str()),
            Ok(Message::Close(_)) => debug!("Server closed the socket"),
            Ok(Message::Binary(_)) => warn!("Ignoring binary message"),
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Socket read failed");
                break;
            }
        }
    }
    info!("Socket closed");
    shared.closed();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url() {
        assert_eq!(socket_url("http://localhost:8000/rpc"), "ws://localhost:8000/rpc/ws");
        assert_eq!(socket_url("https://api.example.com/rpc"), "wss://api.example.com/rpc/ws");
        assert_eq!(socket_url("localhost:8000"), "ws://localhost:8000/ws");
        assert_eq!(socket_url("http://localhost:8000/"), "ws://localhost:8000/ws");
    }

    #[test]
    fn test_emit_requires_open_socket() {
        let socket = SocketClient::new("ws://127.0.0.1:1/ws");
        assert_eq!(socket.state(), ConnectionState::Closed);
        assert!(matches!(
            socket.emit("hello", &[]),
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn test_on_off() {
        let socket = SocketClient::new("ws://127.0.0.1:1/ws");
        socket.on("tick", |_| {});
        assert!(socket.off("tick"));
        assert!(!socket.off("tick"));
    }

    #[tokio::test]
    async fn test_open_failure_resets_state() {
        let socket = SocketClient::new("ws://127.0.0.1:1/ws");
        assert!(socket.open().await.is_err());
        assert_eq!(socket.state(), ConnectionState::Closed);
    }
}
