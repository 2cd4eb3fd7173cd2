//! Pub/sub socket layer
//!
//! [`Io`] owns every live connection and every channel. A [`Socket`] is a
//! cheap handle to one connection through which event handlers are
//! registered and events are emitted. Transports feed inbound frames into
//! [`Io::trigger`] and drain outbound frames from the channel they passed to
//! [`Io::add_connection`].

mod connection;
mod error;
mod io;

pub use connection::{ConnectionId, Socket};
pub use error::SocketError;
pub use io::{ChannelInfo, EventFuture, Io, DISCONNECT_EVENT};
