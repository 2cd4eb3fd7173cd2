//! Per-connection handle
//!
//! A [`Socket`] is what connection handlers receive. It forwards to the
//! owning [`Io`] with its own id filled in.

use super::{EventFuture, Io, SocketError};
use pcall_protocol::ConnectionState;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Identifier of one live connection, unique per [`Io`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle to one connection.
///
/// Clones refer to the same connection. Once the connection has been removed
/// from its [`Io`], operations through the handle fail with
/// [`SocketError::UnknownConnection`].
#[derive(Clone)]
pub struct Socket {
    id: ConnectionId,
    io: Io,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Socket {
    pub(crate) fn new(id: ConnectionId, io: Io) -> Self {
        Self { id, io }
    }

    /// Id of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Registry the connection lives in.
    pub fn io(&self) -> &Io {
        &self.io
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.io.state(self.id)
    }

    /// Register the handler for `event`, replacing any previous one.
    ///
    /// The `disconnect` event is fired by the server itself with no arguments.
    pub fn on<F, Fut>(&self, event: impl Into<String>, handler: F) -> Result<(), SocketError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = Arc::new(move |args: Vec<Value>| -> EventFuture { Box::pin(handler(args)) });
        self.io.set_handler(self.id, event.into(), handler)
    }

    /// Drop the handler for `event`. Returns `false` if none was set.
    pub fn off(&self, event: &str) -> bool {
        self.io.remove_handler(self.id, event)
    }

    /// Send an event to this connection only.
    pub fn emit(&self, event: &str, args: &[Value]) -> Result<(), SocketError> {
        self.io.send(self.id, event, args)
    }

    /// Run this connection's handler for `event` as if the peer had sent it.
    pub async fn trigger(&self, event: &str, args: Vec<Value>) -> Result<(), SocketError> {
        self.io.trigger(self.id, event, args).await
    }

    /// Join `channel`, creating it if needed.
    pub fn join(&self, channel: &str) -> Result<(), SocketError> {
        self.io.join(channel, self.id)
    }

    /// Leave `channel`. Returns `false` if this connection was not a member.
    pub fn leave(&self, channel: &str) -> bool {
        self.io.leave(channel, self.id)
    }

    /// Send to every member of `channel` except this connection.
    pub fn broadcast(&self, channel: &str, event: &str, args: &[Value]) -> Result<usize, SocketError> {
        self.io.broadcast(channel, event, args, Some(self.id))
    }

    /// Channels this connection belongs to, sorted.
    pub fn channels(&self) -> Vec<String> {
        self.io.channels_of(self.id)
    }
}
