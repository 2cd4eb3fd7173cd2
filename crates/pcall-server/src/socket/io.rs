//! Connection and channel registry
//!
//! [`Io`] owns every live connection and every channel. Each connection has an
//! outbound frame queue, drained by its transport task, and a table of event
//! handlers. Channels group connections for [`Io::broadcast`] and carry an
//! opaque JSON context.

use super::{ConnectionId, Socket, SocketError};
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use pcall_protocol::{ConnectionState, Frame};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Event fired once when a connection goes away.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Future returned by event and connection handlers.
pub type EventFuture = BoxFuture<'static, anyhow::Result<()>>;

pub(crate) type EventHandler = Arc<dyn Fn(Vec<Value>) -> EventFuture + Send + Sync>;
type ConnectionHandler = Arc<dyn Fn(Socket) -> EventFuture + Send + Sync>;

struct ConnectionEntry {
    outbound: mpsc::UnboundedSender<Frame>,
    handlers: HashMap<String, EventHandler>,
    channels: HashSet<String>,
    closing: bool,
}

struct Channel {
    members: HashSet<ConnectionId>,
    context: Value,
    /// Created through `add_channel` rather than by a first join.
    explicit: bool,
}

impl Channel {
    fn implicit() -> Self {
        Self {
            members: HashSet::new(),
            context: Value::Null,
            explicit: false,
        }
    }
}

/// Snapshot of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: String,
    pub context: Value,
    pub members: Vec<ConnectionId>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    channels: HashMap<String, Channel>,
}

impl Registry {
    /// Drop `id` from `channel`, pruning the channel if asked and it is now
    /// empty. The caller updates the connection's own channel set.
    fn detach(&mut self, channel: &str, id: ConnectionId, prune: bool) -> bool {
        let Some(entry) = self.channels.get_mut(channel) else {
            return false;
        };
        let removed = entry.members.remove(&id);
        if prune && !entry.explicit && entry.members.is_empty() {
            self.channels.remove(channel);
            debug!(%channel, "Pruned empty channel");
        }
        removed
    }

    fn deliver<'a>(
        &self,
        targets: impl Iterator<Item = &'a ConnectionId>,
        frame: &Frame,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let mut delivered = 0;
        for id in targets {
            if Some(*id) == exclude {
                continue;
            }
            let Some(entry) = self.connections.get(id) else {
                continue;
            };
            if entry.outbound.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(connection = %id, event = %frame.event, "Outbound channel closed, dropping frame");
            }
        }
        delivered
    }
}

struct IoInner {
    registry: Mutex<Registry>,
    on_connection: RwLock<Option<ConnectionHandler>>,
    next_id: AtomicU64,
    prune_empty_channels: bool,
}

/// Registry of live connections and channels.
///
/// Cloning is cheap and every clone shares the same state. All registry
/// mutations happen under a single lock, so channel membership and the
/// connection table never disagree.
#[derive(Clone)]
pub struct Io {
    inner: Arc<IoInner>,
}

impl Default for Io {
    fn default() -> Self {
        Self::new()
    }
}

impl Io {
    /// Registry that keeps channels after their last member leaves.
    pub fn new() -> Self {
        Self::with_pruning(false)
    }

    /// With `prune` set, a channel that was created by a join is dropped once
    /// its last member leaves.
    pub fn with_pruning(prune: bool) -> Self {
        Self {
            inner: Arc::new(IoInner {
                registry: Mutex::new(Registry::default()),
                on_connection: RwLock::new(None),
                next_id: AtomicU64::new(1),
                prune_empty_channels: prune,
            }),
        }
    }

    /// Set the handler run for every new connection from [`Io::connect`].
    pub fn on_connection<F, Fut>(&self, handler: F)
    where
        F: Fn(Socket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: ConnectionHandler = Arc::new(move |socket| Box::pin(handler(socket)));
        *self.inner.on_connection.write() = Some(handler);
    }

    /// Register a connection whose outbound frames go to `outbound`.
    ///
    /// The connection belongs to no channel until it joins one.
    pub fn add_connection(&self, outbound: mpsc::UnboundedSender<Frame>) -> Socket {
        let id = ConnectionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.registry.lock().connections.insert(
            id,
            ConnectionEntry {
                outbound,
                handlers: HashMap::new(),
                channels: HashSet::new(),
                closing: false,
            },
        );
        debug!(connection = %id, "Connection registered");
        Socket::new(id, self.clone())
    }

    /// Register a connection and run the connection handler on it.
    ///
    /// A failing connection handler is logged; the connection stays registered.
    pub async fn connect(&self, outbound: mpsc::UnboundedSender<Frame>) -> Socket {
        let socket = self.add_connection(outbound);
        let handler = self.inner.on_connection.read().clone();
        if let Some(handler) = handler {
            if let Err(e) = handler(socket.clone()).await {
                warn!(connection = %socket.id(), error = %e, "Connection handler failed");
            }
        }
        socket
    }

    /// Tear down a connection.
    ///
    /// The `disconnect` handler runs first, while the connection is still
    /// registered and still a member of its channels. Only after it completes
    /// is the connection removed from the registry and from every channel.
    /// Returns `false` if the connection was unknown or already closing.
    pub async fn remove_connection(&self, id: ConnectionId) -> bool {
        let handler = {
            let mut registry = self.inner.registry.lock();
            match registry.connections.get_mut(&id) {
                Some(entry) if !entry.closing => {
                    entry.closing = true;
                    entry.handlers.get(DISCONNECT_EVENT).cloned()
                }
                _ => return false,
            }
        };

        if let Some(handler) = handler {
            if let Err(e) = handler(Vec::new()).await {
                warn!(connection = %id, error = %e, "Disconnect handler failed");
            }
        }

        let mut registry = self.inner.registry.lock();
        if let Some(entry) = registry.connections.remove(&id) {
            for channel in &entry.channels {
                registry.detach(channel, id, self.inner.prune_empty_channels);
            }
        }
        info!(connection = %id, "Connection removed");
        true
    }

    /// Remove every connection, firing each `disconnect` handler.
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for id in self.connection_ids() {
            if self.remove_connection(id).await {
                closed += 1;
            }
        }
        closed
    }

    /// Handle for a live connection.
    pub fn socket(&self, id: ConnectionId) -> Result<Socket, SocketError> {
        if self.inner.registry.lock().connections.contains_key(&id) {
            Ok(Socket::new(id, self.clone()))
        } else {
            Err(SocketError::UnknownConnection(id))
        }
    }

    /// Lifecycle state of `id`. Unknown ids report `Closed`.
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        match self.inner.registry.lock().connections.get(&id) {
            Some(entry) if entry.closing => ConnectionState::Closing,
            Some(_) => ConnectionState::Open,
            None => ConnectionState::Closed,
        }
    }

    /// Live connection ids, sorted.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.inner.registry.lock().connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.registry.lock().connections.len()
    }

    pub(crate) fn set_handler(
        &self,
        id: ConnectionId,
        event: String,
        handler: EventHandler,
    ) -> Result<(), SocketError> {
        let mut registry = self.inner.registry.lock();
        let entry = registry
            .connections
            .get_mut(&id)
            .ok_or(SocketError::UnknownConnection(id))?;
        entry.handlers.insert(event, handler);
        Ok(())
    }

    pub(crate) fn remove_handler(&self, id: ConnectionId, event: &str) -> bool {
        self.inner
            .registry
            .lock()
            .connections
            .get_mut(&id)
            .is_some_and(|entry| entry.handlers.remove(event).is_some())
    }

    /// Run the handler registered for `event` on connection `id`.
    pub async fn trigger(
        &self,
        id: ConnectionId,
        event: &str,
        args: Vec<Value>,
    ) -> Result<(), SocketError> {
        let handler = {
            let registry = self.inner.registry.lock();
            let entry = registry
                .connections
                .get(&id)
                .ok_or(SocketError::UnknownConnection(id))?;
            entry
                .handlers
                .get(event)
                .cloned()
                .ok_or_else(|| SocketError::NoHandler {
                    connection: id,
                    event: event.to_string(),
                })?
        };

        handler(args).await.map_err(|e| SocketError::Handler {
            connection: id,
            event: event.to_string(),
            message: format!("{:#}", e),
        })
    }

    /// Send an event to a single connection.
    pub fn send(&self, id: ConnectionId, event: &str, args: &[Value]) -> Result<(), SocketError> {
        let registry = self.inner.registry.lock();
        let entry = registry
            .connections
            .get(&id)
            .ok_or(SocketError::UnknownConnection(id))?;
        entry
            .outbound
            .send(Frame::new(event, args))
            .map_err(|_| SocketError::Closed(id))
    }

    /// Send an event to every live connection. Returns the number reached.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        let registry = self.inner.registry.lock();
        let frame = Frame::new(event, args);
        registry.deliver(registry.connections.keys(), &frame, None)
    }

    /// Send an event to the members of `channel`, optionally skipping one.
    pub fn broadcast(
        &self,
        channel: &str,
        event: &str,
        args: &[Value],
        exclude: Option<ConnectionId>,
    ) -> Result<usize, SocketError> {
        let registry = self.inner.registry.lock();
        let members = &registry
            .channels
            .get(channel)
            .ok_or_else(|| SocketError::UnknownChannel(channel.to_string()))?
            .members;
        let frame = Frame::new(event, args);
        let delivered = registry.deliver(members.iter(), &frame, exclude);
        debug!(%channel, %event, delivered, "Broadcast");
        Ok(delivered)
    }

    /// Create `channel` with a context value, or replace the context of an
    /// existing one. Members are kept.
    pub fn add_channel(&self, channel: impl Into<String>, context: Value) {
        let mut registry = self.inner.registry.lock();
        match registry.channels.entry(channel.into()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.context = context;
                existing.explicit = true;
            }
            Entry::Vacant(vacant) => {
                debug!(channel = %vacant.key(), "Channel created");
                vacant.insert(Channel {
                    members: HashSet::new(),
                    context,
                    explicit: true,
                });
            }
        }
    }

    /// Delete `channel`. Former members stay connected.
    pub fn remove_channel(&self, channel: &str) -> bool {
        let mut guard = self.inner.registry.lock();
        let registry = &mut *guard;
        let Some(removed) = registry.channels.remove(channel) else {
            return false;
        };
        for member in &removed.members {
            if let Some(entry) = registry.connections.get_mut(member) {
                entry.channels.remove(channel);
            }
        }
        debug!(%channel, "Channel removed");
        true
    }

    /// Add connection `id` to `channel`, creating the channel if needed.
    pub fn join(&self, channel: &str, id: ConnectionId) -> Result<(), SocketError> {
        let mut guard = self.inner.registry.lock();
        let registry = &mut *guard;
        let entry = registry
            .connections
            .get_mut(&id)
            .ok_or(SocketError::UnknownConnection(id))?;
        entry.channels.insert(channel.to_string());
        registry
            .channels
            .entry(channel.to_string())
            .or_insert_with(Channel::implicit)
            .members
            .insert(id);
        debug!(%channel, connection = %id, "Joined channel");
        Ok(())
    }

    /// Remove `id` from `channel`. Returns `false` if it was not a member.
    pub fn leave(&self, channel: &str, id: ConnectionId) -> bool {
        let mut registry = self.inner.registry.lock();
        if let Some(entry) = registry.connections.get_mut(&id) {
            entry.channels.remove(channel);
        }
        let left = registry.detach(channel, id, self.inner.prune_empty_channels);
        if left {
            debug!(%channel, connection = %id, "Left channel");
        }
        left
    }

    /// Members of `channel`, sorted.
    pub fn members(&self, channel: &str) -> Result<Vec<ConnectionId>, SocketError> {
        let registry = self.inner.registry.lock();
        let channel = registry
            .channels
            .get(channel)
            .ok_or_else(|| SocketError::UnknownChannel(channel.to_string()))?;
        let mut members: Vec<_> = channel.members.iter().copied().collect();
        members.sort_unstable();
        Ok(members)
    }

    /// Context and members of `channel`.
    pub fn channel(&self, channel: &str) -> Result<ChannelInfo, SocketError> {
        let members = self.members(channel)?;
        let registry = self.inner.registry.lock();
        let context = registry
            .channels
            .get(channel)
            .map(|c| c.context.clone())
            .ok_or_else(|| SocketError::UnknownChannel(channel.to_string()))?;
        Ok(ChannelInfo {
            id: channel.to_string(),
            context,
            members,
        })
    }

    /// Whether `channel` exists.
    pub fn has_channel(&self, channel: &str) -> bool {
        self.inner.registry.lock().channels.contains_key(channel)
    }

    /// All channel ids, sorted.
    pub fn channel_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.registry.lock().channels.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn channels_of(&self, id: ConnectionId) -> Vec<String> {
        let registry = self.inner.registry.lock();
        let mut channels: Vec<_> = registry
            .connections
            .get(&id)
            .map(|entry| entry.channels.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort_unstable();
        channels
    }
}
