//! Shared wire types for pcall
//!
//! Used by both `pcall-server` and `pcall-client`: the RPC error model, the
//! request/response envelopes and the socket frame vocabulary.

mod envelope;
mod error;
mod frame;

pub use envelope::{Outcome, Payload, Reply, Request, RequestId, Response, PROTOCOL_VERSION};
pub use error::{ErrorKind, RpcError};
pub use frame::{Arg, ConnectionState, Frame, FrameError};

/// Top-level path segment the client proxy reserves for its socket sub-client.
pub const SOCKET_SEGMENT: &str = "$ws";

/// Terminal path segment marking an argument-list call on the client proxy.
pub const APPLY_SEGMENT: &str = "apply";
