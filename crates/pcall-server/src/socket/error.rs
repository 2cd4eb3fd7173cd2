//! Socket layer errors
//!
//! These signal a broken contract between peers (an unknown connection,
//! channel or event) and are logged loudly rather than mapped onto
//! [`RpcError`](pcall_protocol::RpcError).

use super::ConnectionId;
use pcall_protocol::FrameError;
use thiserror::Error;

/// Failure of a registry or connection operation.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Lookups of unknown channels fail instead of doing nothing.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// An inbound event with no registered handler.
    #[error("No handler for event '{event}' on {connection}")]
    NoHandler {
        connection: ConnectionId,
        event: String,
    },

    /// The handler ran and returned an error.
    #[error("Handler for '{event}' on {connection} failed: {message}")]
    Handler {
        connection: ConnectionId,
        event: String,
        message: String,
    },

    /// The connection's outbound queue is gone.
    #[error("Connection {0} is closed")]
    Closed(ConnectionId),

    #[error(transparent)]
    Frame(#[from] FrameError),
}
